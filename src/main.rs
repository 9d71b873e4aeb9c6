use anyhow::Result;
use clap::Parser;
use event_sync::{SyncConfig, SyncerBuilder};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Sync protocol events from the chain into the dashboard cache
#[derive(Parser, Debug)]
#[command(name = "event-sync", version)]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Force a re-sync starting at this block instead of the saved cursor
    #[arg(long)]
    from_block: Option<u64>,

    /// Run the full pipeline but print the diff instead of writing the cache
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = SyncConfig::load(args.config.as_deref())?;

    let syncer = SyncerBuilder::new()
        .config(config)
        .from_block(args.from_block)
        .dry_run(args.dry_run)
        .build()?;

    match syncer.run().await {
        Ok(summary) => {
            if summary.dry_run {
                println!(
                    "dry run: {} events over blocks [{}, {}], {} day(s) would change",
                    summary.events,
                    summary.from_block,
                    summary.to_block,
                    summary.days_touched.len()
                );
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "sync run failed");
            Err(e.into())
        }
    }
}
