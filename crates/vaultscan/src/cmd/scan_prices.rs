//! `scan-prices`: the historical reader (C6) over vaults a prior `scan-vaults` run already
//! discovered. Decoded reads are handed to a [`ReadSink`] that appends them as CSV, since
//! `HistoricalRead` is deliberately never persisted in the `redb` store (§4.7/§6 describe it
//! as a typed stream meant for a downstream dataframe/parquet writer, not durable state).

use std::{
    fs::OpenOptions,
    io::Write,
    sync::{Arc, Mutex},
};

use clap::Parser;
use colored::Colorize;
use prettytable::{row, Table};
use vaultscan_cli_runner::CliContext;

use crate::{
    cmd::{connect_client, init_tracing, open_data_paths, select_event_source},
    config::Config,
    evm::EvmClient,
    models::HistoricalRead,
    orchestrator::{ChainTask, Orchestrator},
    reader,
};

#[derive(Debug, Parser)]
#[clap(about = "Read historical price/TVL data for previously discovered vaults.")]
pub struct ScanPricesCommand {
    #[arg(
        long,
        value_name = "BLOCK",
        help = "First block of the range to read; defaults to --to-block, i.e. a single-block read."
    )]
    from_block: Option<u64>,

    #[arg(long, value_name = "BLOCK", help = "Last block to read at; defaults to the chain's current tip.")]
    to_block: Option<u64>,

    #[arg(long, value_name = "PATH", default_value = "vaultscan-reads.csv", help = "CSV file reads are appended to.")]
    output: String,
}

impl ScanPricesCommand {
    pub async fn execute(self, ctx: CliContext) -> eyre::Result<()> {
        let config = Config::from_env()?;
        init_tracing(&config.log_level);

        let paths = open_data_paths()?;
        let (chain_id, client) = connect_client(&config).await?;
        let to_block = match self.to_block.or(config.end_block) {
            Some(block) => block,
            None => client.latest_block().await?,
        };
        let from_block = match self.from_block {
            Some(block) => block,
            None => to_block,
        };
        let block_step = if from_block == to_block { 1 } else { reader::block_step(chain_id, config.frequency)? };

        println!(
            "{}",
            format!("Reading vaults on chain {chain_id} from block {from_block} to {to_block}, every {block_step} blocks")
                .bright_cyan()
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
        let chains = vec![ChainTask { chain_id, client: evm_client, event_source, from_block, to_block, block_step }];

        let file = OpenOptions::new().create(true).append(true).open(&self.output)?;
        let writer: Arc<Mutex<std::fs::File>> = Arc::new(Mutex::new(file));
        let sink: Arc<dyn crate::orchestrator::ReadSink> = Arc::new(move |read: HistoricalRead| {
            let mut file = writer.lock().unwrap();
            let _ = writeln!(file, "{}", csv_row(&read));
        });

        orchestrator.run_reads(ctx, chains, sink).await;

        let mut table = Table::new();
        table.add_row(row![b -> "chain", b -> "read", b -> "failed"]);
        for (id, snap) in dashboard.snapshot_all() {
            table.add_row(row![id, snap.vaults_read, snap.vaults_failed]);
        }
        table.printstd();

        Ok(())
    }
}

/// One `HistoricalRead` as a CSV line. No header row is written here; callers append to a
/// file they're expected to have seeded with a header once, matching how the store's other
/// exports are meant to be consumed by a downstream dataframe loader.
fn csv_row(read: &HistoricalRead) -> String {
    let opt_dec = |v: &Option<vaultscan_primitives::Decimal>| v.as_ref().map(|d| d.to_string()).unwrap_or_default();
    let opt_u64 = |v: Option<u64>| v.map(|n| n.to_string()).unwrap_or_default();
    let opt_u32 = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_default();

    format!(
        "{},{},{},{},{},{},{},{},{},{},{}",
        read.key.chain_id,
        read.key.address.canonical(),
        read.block,
        opt_u64(read.timestamp),
        opt_dec(&read.total_assets),
        opt_dec(&read.total_supply),
        opt_dec(&read.share_price),
        opt_u32(read.management_fee_bps),
        opt_u32(read.performance_fee_bps),
        opt_dec(&read.available_liquidity),
        opt_dec(&read.utilisation),
    )
}
