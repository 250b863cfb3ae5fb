//! Sync command handler

use anyhow::{Result, bail};

use crate::cli::SyncArgs;
use crate::config::AppConfig;
use crate::store::{JobStatus, Store};
use crate::sync::{JobParams, JobRunner, SyncOutcome};

pub async fn handle(args: SyncArgs, config: AppConfig) -> Result<()> {
    if !args.file.exists() {
        bail!("workbook does not exist: {}", args.file.display());
    }
    // Validated up front so a bad period never creates a job.
    let _period: crate::ingest::Period = args.period.parse()?;

    let store = Store::connect(&config.database_path).await?;
    let runner = JobRunner::new(store, config);

    let params = JobParams {
        file: args.file,
        sheet: args.sheet,
        period: args.period,
        removal_mode: args.mode,
    };
    let id = runner.submit(&params).await?;
    println!("job {id}");

    let job = runner.run(id).await?;
    match job.status {
        JobStatus::Completed => {
            let outcome: SyncOutcome = serde_json::from_str(
                job.result_json.as_deref().unwrap_or("{}"),
            )?;
            println!(
                "completed: {} created, {} updated, {} removed, {} voided, {} unchanged",
                outcome.created,
                outcome.updated,
                outcome.removed,
                outcome.voided,
                outcome.unchanged
            );
            if outcome.skipped_rows > 0 {
                println!("excluded {} row(s) with unreadable dates", outcome.skipped_rows);
            }
            if outcome.failed > 0 {
                println!("{} item(s) failed", outcome.failed);
                if let Some(report) = &outcome.report_path {
                    println!("error report: {}", report.display());
                }
                bail!("sync completed with failures");
            }
            Ok(())
        }
        JobStatus::Failed => {
            bail!(
                "job failed: {}",
                job.error_message.as_deref().unwrap_or("unknown error")
            )
        }
        status => bail!("job ended in unexpected status {status}"),
    }
}
