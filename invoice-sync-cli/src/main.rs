use anyhow::Result;
use clap::Parser;

use invoice_sync_cli::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    invoice_sync_cli::cli::run(cli).await
}
