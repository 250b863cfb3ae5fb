//! Command-line interface

pub mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::sync::RemovalMode;

#[derive(Parser)]
#[command(name = "invoice-sync-cli")]
#[command(about = "Sync invoice spreadsheets into the CRM")]
#[command(version)]
pub struct Cli {
    /// Config file location (defaults to ~/.config/invoice-sync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync one invoice workbook for one period
    Sync(SyncArgs),
    /// Inspect and manage sync jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },
}

#[derive(Parser)]
pub struct SyncArgs {
    /// Path to the invoice workbook (.xlsx)
    pub file: PathBuf,

    /// Period to reconcile, as YYYYMM or YYYY-MM
    #[arg(long)]
    pub period: String,

    /// Worksheet name (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,

    /// How records absent from the file are removed remotely
    #[arg(long, value_enum, default_value = "hard")]
    pub mode: RemovalMode,
}

#[derive(Subcommand)]
pub enum JobsCommands {
    /// List recent jobs
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show one job, including its log and result
    Show { id: Uuid },
    /// Cancel a pending job
    Cancel { id: Uuid },
    /// Print the error report location of a completed job
    Report { id: Uuid },
}

pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path)?;

    match cli.command {
        Commands::Sync(args) => commands::sync::handle(args, config).await,
        Commands::Jobs { command } => commands::jobs::handle(command, config).await,
    }
}
