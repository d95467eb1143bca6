use clap::{
    builder::{styling::AnsiColor, Styles},
    ArgAction, Parser, Subcommand,
};
use vault_version::SHORT_VERSION;
use vaultscan::cmd::{
    CheckReaderStatesCommand, PurgePriceDataCommand, ScanPricesCommand, ScanVaultsCommand,
};
use vaultscan_cli_runner::CliRunner;

/// The verbosity level.
pub type Verbosity = u8;

#[derive(Debug, Parser)]
#[command(
    name = "vaultscan",
    about = "ERC-4626 vault discovery, classification and historical scanning engine.",
    author = "vaultscan contributors",
    version = SHORT_VERSION.as_str(),
    term_width = 80,
    styles = get_color_style()
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable debug logging")]
    pub debug: bool,

    /// Verbosity level of the log messages.
    ///
    /// Pass multiple times to increase the verbosity (e.g. -v, -vv, -vvv).
    #[arg(help_heading = "Display options", global = true, short, long, verbatim_doc_comment, action = ArgAction::Count)]
    verbosity: Verbosity,
}

impl Cli {
    pub fn run(self) -> eyre::Result<()> {
        let runner = CliRunner::default();
        match self.command {
            Commands::ScanVaults(scan_vaults) => {
                runner.run_command_until_exit(|ctx| scan_vaults.execute(ctx))
            }
            Commands::ScanPrices(scan_prices) => {
                runner.run_command_until_exit(|ctx| scan_prices.execute(ctx))
            }
            Commands::CheckReaderStates(check) => {
                runner.run_command_until_exit(|ctx| check.execute(ctx))
            }
            Commands::PurgePriceData(purge) => {
                runner.run_command_until_exit(|ctx| purge.execute(ctx))
            }
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(name = "scan-vaults")]
    ScanVaults(ScanVaultsCommand),

    #[command(name = "scan-prices")]
    ScanPrices(ScanPricesCommand),

    #[command(name = "check-reader-states")]
    CheckReaderStates(CheckReaderStatesCommand),

    #[command(name = "purge-price-data")]
    PurgePriceData(PurgePriceDataCommand),
}

fn get_color_style() -> Styles {
    Styles::styled()
        .usage(AnsiColor::Green.on_default().bold().underline())
        .header(AnsiColor::Yellow.on_default().bold().underline())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}
