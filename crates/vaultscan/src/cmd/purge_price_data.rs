//! `purge-price-data`: deletes persisted `VaultReaderState` for one vault, or every vault on
//! a chain, so the next `scan-prices` run re-reads from a clean warmup. Classification
//! (`VaultRecord`) is untouched — this only clears C7's scan bookkeeping.

use std::str::FromStr;

use clap::Parser;
use colored::Colorize;
use vaultscan_cli_runner::CliContext;
use vaultscan_primitives::{Address, ChainId};

use crate::{
    cmd::{init_tracing, open_data_paths},
    models::VaultSpec,
};

#[derive(Debug, Parser)]
#[clap(about = "Purge persisted reader state so affected vaults are re-read from a clean warmup.")]
pub struct PurgePriceDataCommand {
    #[arg(long, value_name = "CHAIN_ID", help = "Chain id whose vaults should be purged.")]
    chain_id: i64,

    #[arg(long, value_name = "ADDRESS", help = "Only purge this vault; defaults to every vault on the chain.")]
    address: Option<String>,
}

impl PurgePriceDataCommand {
    pub async fn execute(self, _ctx: CliContext) -> eyre::Result<()> {
        init_tracing("info");
        let paths = open_data_paths()?;
        let chain_id = ChainId::from(self.chain_id);

        let keys: Vec<VaultSpec> = match self.address {
            Some(raw) => {
                let address = Address::from_str(&raw)
                    .map_err(|e| eyre::eyre!("invalid --address: {e}"))?;
                vec![VaultSpec::new(chain_id, address)]
            }
            None => paths
                .store
                .list_vault_keys()?
                .into_iter()
                .filter(|key| key.chain_id == chain_id)
                .collect(),
        };

        for key in &keys {
            paths.store.purge_reader_state(key)?;
        }

        println!("{}", format!("Purged reader state for {} vault(s).", keys.len()).bright_green());
        Ok(())
    }
}
