//! `scan-vaults`: runs discovery only for the chain reachable at `JSON_RPC_URL`, classifying
//! every vault deployment event it sees and persisting a `VaultRecord`/`VaultReaderState`
//! pair per vault. `scan-prices` is the companion command that reads them historically.

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use prettytable::{row, Table};
use vaultscan_cli_runner::CliContext;

use crate::{
    cmd::{connect_client, init_tracing, lock_chain_cursor, open_data_paths, select_event_source},
    config::Config,
    evm::EvmClient,
    orchestrator::{ChainTask, Orchestrator},
};

#[derive(Debug, Parser)]
#[clap(about = "Discover and classify ERC-4626 vaults on the configured chain.")]
pub struct ScanVaultsCommand {
    #[arg(long, value_name = "BLOCK", help = "First block to scan from; defaults to the persisted cursor, or 0 on a fresh store.")]
    from_block: Option<u64>,
}

impl ScanVaultsCommand {
    pub async fn execute(self, ctx: CliContext) -> eyre::Result<()> {
        let config = Config::from_env()?;
        init_tracing(&config.log_level);

        let paths = open_data_paths()?;
        let (chain_id, client) = connect_client(&config).await?;
        let _lock = lock_chain_cursor(&paths.root, chain_id)?;

        let cursor = paths.store.load_cursor(chain_id)?;
        let from_block = self.from_block.or(cursor).unwrap_or(0);
        let to_block = match config.end_block {
            Some(end) => end,
            None => client.latest_block().await?,
        };

        println!(
            "{}",
            format!("Scanning chain {chain_id} for vaults from block {from_block} to {to_block}").bright_cyan()
        );

        let orchestrator = Orchestrator::new(
            paths.store.clone(),
            paths.token_cache.clone(),
            config.max_getlogs_range as u64,
            config.max_workers,
            config.retry_count,
        );
        let dashboard = orchestrator.dashboard();

        let evm_client: Arc<dyn EvmClient> = client.clone();
        let event_source = select_event_source(&config, client.clone())?;
        let chains = vec![ChainTask { chain_id, client: evm_client, event_source, from_block, to_block, block_step: 1 }];

        orchestrator.run_discovery(ctx, &chains).await;
        paths.store.put_cursor(chain_id, to_block)?;

        let mut table = Table::new();
        table.add_row(row![b -> "chain", b -> "discovered", b -> "failed"]);
        for (id, snap) in dashboard.snapshot_all() {
            table.add_row(row![id, snap.vaults_discovered, if snap.chain_failed { "yes" } else { "no" }]);
        }
        table.printstd();

        Ok(())
    }
}
