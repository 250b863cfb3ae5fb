//! Jobs command handlers

use anyhow::{Context, Result, bail};
use uuid::Uuid;

use crate::cli::JobsCommands;
use crate::config::AppConfig;
use crate::store::{self, Job, Store};
use crate::sync::SyncOutcome;

pub async fn handle(command: JobsCommands, config: AppConfig) -> Result<()> {
    let store = Store::connect(&config.database_path).await?;

    match command {
        JobsCommands::List { limit } => list(&store, limit).await,
        JobsCommands::Show { id } => show(&store, id).await,
        JobsCommands::Cancel { id } => cancel(&store, id).await,
        JobsCommands::Report { id } => report(&store, id).await,
    }
}

async fn load(store: &Store, id: Uuid) -> Result<Job> {
    store::jobs::get_job(store.pool(), id)
        .await?
        .with_context(|| format!("no job with id {id}"))
}

async fn list(store: &Store, limit: i64) -> Result<()> {
    let jobs = store::jobs::list_jobs(store.pool(), limit).await?;
    if jobs.is_empty() {
        println!("no jobs");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{}  {:<9}  {:>3}%  {}",
            job.id,
            job.status.as_str(),
            job.progress,
            job.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn show(store: &Store, id: Uuid) -> Result<()> {
    let job = load(store, id).await?;
    println!("id:        {}", job.id);
    println!("status:    {}", job.status);
    println!(
        "progress:  {}% ({}/{} items, {} failed)",
        job.progress, job.processed_count, job.total_count, job.failed_count
    );
    println!("created:   {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(started) = job.started_at {
        println!("started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(completed) = job.completed_at {
        println!("completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(error) = &job.error_message {
        println!("error:     {error}");
    }
    if !job.log.is_empty() {
        println!("log:");
        for line in job.log.lines() {
            println!("  {line}");
        }
    }
    if let Some(result) = &job.result_json {
        println!("result:    {result}");
    }
    Ok(())
}

async fn cancel(store: &Store, id: Uuid) -> Result<()> {
    // Ensure the id exists so the failure message distinguishes
    // "unknown job" from "not cancellable".
    let job = load(store, id).await?;
    if store::jobs::cancel_job(store.pool(), id).await? {
        println!("job {id} cancelled");
        Ok(())
    } else {
        bail!(
            "job {id} is {} and cannot be cancelled; only pending jobs can",
            job.status
        )
    }
}

async fn report(store: &Store, id: Uuid) -> Result<()> {
    let job = load(store, id).await?;
    let Some(result_json) = &job.result_json else {
        bail!("job {id} has no result (status {})", job.status);
    };
    let outcome: SyncOutcome =
        serde_json::from_str(result_json).context("failed to decode job result")?;
    match outcome.report_path {
        Some(path) => println!("{}", path.display()),
        None => println!("no error report: all {} item(s) succeeded", outcome.items.len()),
    }
    Ok(())
}
