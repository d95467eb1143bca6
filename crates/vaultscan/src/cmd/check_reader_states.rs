//! `check-reader-states`: diagnostics over every persisted `VaultReaderState`, surfacing the
//! functions a vault is known to revert on or be gas-pathological for, per §4.6/§7's
//! user-visible-behaviour note that operators need a way to see what's been pruned.

use clap::Parser;
use colored::Colorize;
use prettytable::{row, Table};
use vaultscan_cli_runner::CliContext;

use crate::cmd::{init_tracing, open_data_paths};

#[derive(Debug, Parser)]
#[clap(about = "List every function call known to revert or be gas-pathological for a discovered vault.")]
pub struct CheckReaderStatesCommand {
    #[arg(long, value_name = "CHAIN_ID", help = "Only show rows for this chain id.")]
    chain_id: Option<i64>,
}

impl CheckReaderStatesCommand {
    pub async fn execute(self, _ctx: CliContext) -> eyre::Result<()> {
        init_tracing("info");
        let paths = open_data_paths()?;

        let mut broken = paths.store.list_broken_calls()?;
        if let Some(chain_id) = self.chain_id {
            broken.retain(|row| row.chain_id == chain_id);
        }

        if broken.is_empty() {
            println!("{}", "No broken calls recorded.".bright_green());
            return Ok(());
        }

        let mut table = Table::new();
        table.add_row(row![b -> "chain", b -> "address", b -> "function", b -> "checked at block"]);
        for row in &broken {
            table.add_row(row![row.chain_id, row.address, row.function_label, row.check_block]);
        }
        table.printstd();

        println!("{}", format!("{} broken call(s).", broken.len()).bright_yellow());
        Ok(())
    }
}
