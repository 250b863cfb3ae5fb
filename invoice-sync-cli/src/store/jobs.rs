//! Persisted job state machine
//!
//! `PENDING -> RUNNING -> {COMPLETED, FAILED, CANCELLED}`. Cancellation
//! is only reachable from PENDING; a running job always runs to its
//! terminal state. Progress and logs are updated throughout execution
//! and read by polling clients.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row as _, SqlitePool};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "RUNNING" => Some(JobStatus::Running),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            "CANCELLED" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted unit of sync work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// Monotonically non-decreasing percentage, 0..=100.
    pub progress: i64,
    pub processed_count: i64,
    pub failed_count: i64,
    pub total_count: i64,
    /// Append-only log lines, newline-separated.
    pub log: String,
    /// Opaque submission parameters (serialized by the runner).
    pub params_json: String,
    pub result_json: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let started_at: Option<String> = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    let parse_ts = |s: &str| -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("malformed timestamp '{s}'"))?
            .with_timezone(&Utc))
    };

    Ok(Job {
        id: Uuid::parse_str(&id).with_context(|| format!("malformed job id '{id}'"))?,
        status: JobStatus::parse(&status)
            .with_context(|| format!("unknown job status '{status}'"))?,
        progress: row.try_get("progress")?,
        processed_count: row.try_get("processed_count")?,
        failed_count: row.try_get("failed_count")?,
        total_count: row.try_get("total_count")?,
        log: row.try_get("log")?,
        params_json: row.try_get("params_json")?,
        result_json: row.try_get("result_json")?,
        error_message: row.try_get("error_message")?,
        created_at: parse_ts(&created_at)?,
        started_at: started_at.as_deref().map(parse_ts).transpose()?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
    })
}

const JOB_COLUMNS: &str = "id, status, progress, processed_count, failed_count, total_count, \
                           log, params_json, result_json, error_message, \
                           created_at, started_at, completed_at";

/// Create a job in PENDING state.
pub async fn create_job(pool: &SqlitePool, id: Uuid, params_json: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO sync_jobs (id, status, params_json, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(JobStatus::Pending.as_str())
    .bind(params_json)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .context("failed to create job")?;
    Ok(())
}

pub async fn get_job(pool: &SqlitePool, id: Uuid) -> Result<Option<Job>> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("failed to load job")?;
    row.as_ref().map(job_from_row).transpose()
}

/// Most recent jobs first.
pub async fn list_jobs(pool: &SqlitePool, limit: i64) -> Result<Vec<Job>> {
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM sync_jobs ORDER BY created_at DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list jobs")?;
    rows.iter().map(job_from_row).collect()
}

/// PENDING -> RUNNING, timestamped. Returns false when the job was not
/// in PENDING (already cancelled or picked up elsewhere).
pub async fn mark_running(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE sync_jobs SET status = ?, started_at = ? WHERE id = ? AND status = ?",
    )
    .bind(JobStatus::Running.as_str())
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .bind(JobStatus::Pending.as_str())
    .execute(pool)
    .await
    .context("failed to mark job running")?;
    Ok(result.rows_affected() > 0)
}

/// Terminal COMPLETED transition with the structured result payload.
pub async fn complete_job(pool: &SqlitePool, id: Uuid, result_json: &str) -> Result<()> {
    sqlx::query(
        "UPDATE sync_jobs SET status = ?, progress = 100, result_json = ?, completed_at = ? \
         WHERE id = ?",
    )
    .bind(JobStatus::Completed.as_str())
    .bind(result_json)
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await
    .context("failed to complete job")?;
    Ok(())
}

/// Terminal FAILED transition, recording the orchestration error.
pub async fn fail_job(pool: &SqlitePool, id: Uuid, message: &str) -> Result<()> {
    sqlx::query(
        "UPDATE sync_jobs SET status = ?, error_message = ?, completed_at = ? WHERE id = ?",
    )
    .bind(JobStatus::Failed.as_str())
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await
    .context("failed to mark job failed")?;
    Ok(())
}

/// Cancel a job. Only a PENDING job can be cancelled; returns false for
/// any other state.
pub async fn cancel_job(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE sync_jobs SET status = ?, completed_at = ? WHERE id = ? AND status = ?",
    )
    .bind(JobStatus::Cancelled.as_str())
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .bind(JobStatus::Pending.as_str())
    .execute(pool)
    .await
    .context("failed to cancel job")?;
    Ok(result.rows_affected() > 0)
}

/// Append one log line (timestamped) to the job's append-only log.
pub async fn append_log(pool: &SqlitePool, id: Uuid, line: &str) -> Result<()> {
    let entry = format!("[{}] {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"), line);
    sqlx::query("UPDATE sync_jobs SET log = log || ? WHERE id = ?")
        .bind(entry)
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("failed to append job log")?;
    Ok(())
}

/// Persist the item counters and derived percentage. Concurrent item
/// completions may persist out of order, so each column only ever
/// moves forward: a write carrying a lower counter never overwrites a
/// higher one.
pub async fn update_progress(
    pool: &SqlitePool,
    id: Uuid,
    processed: i64,
    failed: i64,
    total: i64,
) -> Result<()> {
    let progress = if total > 0 {
        (processed * 100) / total
    } else {
        100
    };
    sqlx::query(
        "UPDATE sync_jobs SET progress = MAX(progress, ?), \
         processed_count = MAX(processed_count, ?), \
         failed_count = MAX(failed_count, ?), \
         total_count = ? WHERE id = ?",
    )
    .bind(progress)
    .bind(processed)
    .bind(failed)
    .bind(total)
    .bind(id.to_string())
    .execute(pool)
    .await
    .context("failed to update job progress")?;
    Ok(())
}
