//! Job orchestration
//!
//! Owns the job lifecycle: submit persists a PENDING job with its
//! parameters, run drives PENDING -> RUNNING -> terminal. Everything
//! between reading the workbook and writing the error report happens
//! here; per-item remote failures stay inside the result payload while
//! orchestration failures (unreadable file, bad period, no credential)
//! fail the whole job.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use uuid::Uuid;

use crate::api::{HttpInvoiceApi, RemoteInvoiceApi};
use crate::api::resilience::RetryPolicy;
use crate::config::AppConfig;
use crate::ingest::{self, InvoiceGroup, Period};
use crate::store::{self, Job, Store};

use super::executor::SyncExecutor;
use super::planner::build_sync_plan;
use super::report;
use super::resolver::ReferenceMaps;
use super::types::{JobParams, SyncOutcome};

/// Submits and runs sync jobs.
pub struct JobRunner {
    store: Store,
    config: AppConfig,
    api: Option<Arc<dyn RemoteInvoiceApi>>,
}

impl JobRunner {
    /// Runner with the production HTTP client, built lazily at run time
    /// so submit and inspection never need a credential.
    pub fn new(store: Store, config: AppConfig) -> Self {
        Self {
            store,
            config,
            api: None,
        }
    }

    /// Runner with an injected API client.
    pub fn with_api(store: Store, config: AppConfig, api: Arc<dyn RemoteInvoiceApi>) -> Self {
        Self {
            store,
            config,
            api: Some(api),
        }
    }

    /// Persist a new PENDING job and return its id.
    pub async fn submit(&self, params: &JobParams) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let params_json =
            serde_json::to_string(params).context("failed to encode job parameters")?;
        store::jobs::create_job(self.store.pool(), id, &params_json).await?;
        info!("job {id}: submitted for {}", params.file.display());
        Ok(id)
    }

    /// Run a job to its terminal state and return the final record.
    /// A job that is no longer PENDING (cancelled in the meantime) is
    /// returned untouched.
    pub async fn run(&self, job_id: Uuid) -> Result<Job> {
        if !store::jobs::mark_running(self.store.pool(), job_id).await? {
            let Some(job) = store::jobs::get_job(self.store.pool(), job_id).await? else {
                bail!("job {job_id} not found");
            };
            info!("job {job_id}: not started, status is {}", job.status);
            return Ok(job);
        }

        match self.execute(job_id).await {
            Ok(outcome) => {
                let result_json =
                    serde_json::to_string(&outcome).context("failed to encode job result")?;
                store::jobs::complete_job(self.store.pool(), job_id, &result_json).await?;
                info!(
                    "job {job_id}: completed ({} created, {} updated, {} removed, {} voided, {} failed)",
                    outcome.created, outcome.updated, outcome.removed, outcome.voided, outcome.failed
                );
            }
            Err(e) => {
                warn!("job {job_id}: failed: {e:#}");
                store::jobs::fail_job(self.store.pool(), job_id, &format!("{e:#}")).await?;
            }
        }

        store::jobs::get_job(self.store.pool(), job_id)
            .await?
            .with_context(|| format!("job {job_id} disappeared"))
    }

    async fn execute(&self, job_id: Uuid) -> Result<SyncOutcome> {
        let job = store::jobs::get_job(self.store.pool(), job_id)
            .await?
            .with_context(|| format!("job {job_id} not found"))?;
        let params: JobParams = serde_json::from_str(&job.params_json)
            .context("failed to decode job parameters")?;

        let api: Arc<dyn RemoteInvoiceApi> = match &self.api {
            Some(api) => api.clone(),
            None => Arc::new(HttpInvoiceApi::new(
                self.config.api_base_url.clone(),
                self.config.api_token.clone(),
            )?),
        };

        let period: Period = params.period.parse()?;
        let sheet = ingest::read_invoice_sheet(&params.file, params.sheet.as_deref())?;
        if sheet.skipped_dates > 0 {
            self.log(job_id, &format!(
                "excluded {} row(s) with unreadable dates",
                sheet.skipped_dates
            ))
            .await;
        }

        let all_groups = ingest::group_rows(&sheet, self.config.hash_columns);
        let total = all_groups.len();
        let groups: Vec<InvoiceGroup> = all_groups
            .into_iter()
            .filter(|g| g.period == period)
            .collect();
        if groups.len() < total {
            self.log(job_id, &format!(
                "excluded {} group(s) outside period {period}",
                total - groups.len()
            ))
            .await;
        }

        let links = store::links::find_links(self.store.pool(), &period.key()).await?;
        let plan = build_sync_plan(groups, links);
        self.log(job_id, &format!(
            "plan: {} create, {} update, {} remove, {} unchanged",
            plan.to_create.len(),
            plan.to_update.len(),
            plan.to_remove.len(),
            plan.unchanged.len()
        ))
        .await;

        let refs = ReferenceMaps::load(self.store.pool(), &plan).await?;
        let executor = SyncExecutor::new(
            api,
            self.store.clone(),
            RetryPolicy::new(self.config.retry.to_retry_config()),
            self.config.workers,
        );
        let items = executor
            .execute(job_id, &plan, &refs, params.removal_mode)
            .await?;

        let mut outcome =
            SyncOutcome::from_items(items, plan.unchanged.len(), sheet.skipped_dates);

        if outcome.failed > 0 {
            let report_groups: Vec<InvoiceGroup> = plan
                .to_create
                .iter()
                .cloned()
                .chain(plan.to_update.iter().map(|(g, _)| g.clone()))
                .collect();
            let errors = report::attribute_errors(&report_groups, &outcome.items);
            if !errors.is_empty() {
                let path = report::error_report_path(&self.config.report_dir, job_id);
                let columns = sheet.headers.len().min(self.config.hash_columns);
                report::write_error_report(&path, &sheet.headers[..columns], &errors)?;
                self.log(job_id, &format!("error report: {}", path.display()))
                    .await;
                outcome.report_path = Some(path);
            }
        }

        Ok(outcome)
    }

    async fn log(&self, job_id: Uuid, line: &str) {
        info!("job {job_id}: {line}");
        if let Err(e) = store::jobs::append_log(self.store.pool(), job_id, line).await {
            warn!("failed to append job log: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_xlsxwriter::Workbook;

    use crate::api::models::{DocumentStatus, InvoicePayload};
    use crate::error::{RefKind, SyncError};
    use crate::store::JobStatus;
    use crate::store::refs;
    use crate::sync::types::RemovalMode;

    #[derive(Default)]
    struct MockApi {
        inserted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteInvoiceApi for MockApi {
        async fn insert(&self, invoice: &InvoicePayload) -> Result<Uuid, SyncError> {
            self.inserted
                .lock()
                .unwrap()
                .push(invoice.external_key.clone());
            Ok(Uuid::new_v4())
        }

        async fn update(&self, _: Uuid, _: &InvoicePayload) -> Result<(), SyncError> {
            Ok(())
        }

        async fn clear_lines(&self, _: Uuid) -> Result<(), SyncError> {
            Ok(())
        }

        async fn delete(&self, _: Uuid) -> Result<(), SyncError> {
            Ok(())
        }

        async fn set_status(&self, _: Uuid, _: DocumentStatus) -> Result<(), SyncError> {
            Ok(())
        }
    }

    /// Write a minimal invoice workbook into the temp directory.
    fn write_workbook(rows: &[[&str; 8]]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("invoice-test-{}.xlsx", Uuid::new_v4()));
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        let headers = [
            "Document No",
            "Document Date",
            "Customer",
            "Product",
            "Quantity",
            "Unit Price",
            "Discount",
            "Salesperson",
        ];
        for (col, header) in headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, *header).unwrap();
        }
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if let Ok(n) = cell.parse::<f64>() {
                    worksheet.write_number((r + 1) as u32, c as u16, n).unwrap();
                } else {
                    worksheet.write_string((r + 1) as u32, c as u16, *cell).unwrap();
                }
            }
        }
        workbook.save(&path).unwrap();
        path
    }

    fn test_config() -> AppConfig {
        AppConfig {
            report_dir: std::env::temp_dir().join(format!("reports-{}", Uuid::new_v4())),
            ..AppConfig::default()
        }
    }

    async fn setup() -> (Store, Arc<MockApi>, JobRunner) {
        let store = Store::in_memory().await.unwrap();
        refs::seed(store.pool(), RefKind::Customer, "A100", Uuid::new_v4())
            .await
            .unwrap();
        refs::seed(store.pool(), RefKind::Product, "P-1", Uuid::new_v4())
            .await
            .unwrap();
        refs::seed(store.pool(), RefKind::Salesperson, "E1", Uuid::new_v4())
            .await
            .unwrap();
        let api = Arc::new(MockApi::default());
        let runner = JobRunner::with_api(store.clone(), test_config(), api.clone());
        (store, api, runner)
    }

    fn params(file: PathBuf) -> JobParams {
        JobParams {
            file,
            sheet: None,
            period: "202508".into(),
            removal_mode: RemovalMode::Hard,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_create() {
        let (store, api, runner) = setup().await;
        let file = write_workbook(&[
            ["7", "2025-08-10", "A100", "P-1", "2", "10.50", "0", "E1"],
            ["7", "2025-08-10", "A100", "P-1", "1", "99", "0", "E1"],
        ]);

        let id = runner.submit(&params(file.clone())).await.unwrap();
        let job = runner.run(id).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        let outcome: SyncOutcome = serde_json::from_str(job.result_json.as_deref().unwrap()).unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(
            api.inserted.lock().unwrap().as_slice(),
            ["INV:202508:0000007:A100"]
        );

        let links = store::links::find_links(store.pool(), "202508").await.unwrap();
        assert_eq!(links.len(), 1);
        std::fs::remove_file(file).unwrap();
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let (_store, api, runner) = setup().await;
        let file = write_workbook(&[["7", "2025-08-10", "A100", "P-1", "2", "10.50", "0", ""]]);

        let first = runner.submit(&params(file.clone())).await.unwrap();
        runner.run(first).await.unwrap();
        let second = runner.submit(&params(file.clone())).await.unwrap();
        let job = runner.run(second).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        let outcome: SyncOutcome = serde_json::from_str(job.result_json.as_deref().unwrap()).unwrap();
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.unchanged, 1);
        assert_eq!(api.inserted.lock().unwrap().len(), 1);
        std::fs::remove_file(file).unwrap();
    }

    #[tokio::test]
    async fn test_unresolved_code_produces_report() {
        let (_store, _api, runner) = setup().await;
        let file = write_workbook(&[["7", "2025-08-10", "A100", "P-404", "1", "10", "0", ""]]);

        let id = runner.submit(&params(file.clone())).await.unwrap();
        let job = runner.run(id).await.unwrap();

        // The job itself completes; the group failure is in the payload.
        assert_eq!(job.status, JobStatus::Completed);
        let outcome: SyncOutcome = serde_json::from_str(job.result_json.as_deref().unwrap()).unwrap();
        assert_eq!(outcome.failed, 1);
        let report = outcome.report_path.expect("report written");
        assert!(report.exists());
        assert!(job.log.contains("error report"));

        std::fs::remove_file(file).unwrap();
        std::fs::remove_file(report).unwrap();
    }

    #[tokio::test]
    async fn test_bad_period_fails_job() {
        let (_store, _api, runner) = setup().await;
        let file = write_workbook(&[["7", "2025-08-10", "A100", "P-1", "1", "10", "0", ""]]);

        let mut p = params(file.clone());
        p.period = "garbage".into();
        let id = runner.submit(&p).await.unwrap();
        let job = runner.run(id).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap().contains("unreadable period"));
        std::fs::remove_file(file).unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_job_never_runs() {
        let (store, api, runner) = setup().await;
        let file = write_workbook(&[["7", "2025-08-10", "A100", "P-1", "1", "10", "0", ""]]);

        let id = runner.submit(&params(file.clone())).await.unwrap();
        assert!(store::jobs::cancel_job(store.pool(), id).await.unwrap());
        let job = runner.run(id).await.unwrap();

        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(api.inserted.lock().unwrap().is_empty());
        std::fs::remove_file(file).unwrap();
    }

    #[tokio::test]
    async fn test_out_of_period_groups_excluded() {
        let (_store, api, runner) = setup().await;
        let file = write_workbook(&[
            ["7", "2025-08-10", "A100", "P-1", "1", "10", "0", ""],
            ["8", "2025-09-02", "A100", "P-1", "1", "10", "0", ""],
        ]);

        let id = runner.submit(&params(file.clone())).await.unwrap();
        let job = runner.run(id).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(
            api.inserted.lock().unwrap().as_slice(),
            ["INV:202508:0000007:A100"]
        );
        assert!(job.log.contains("excluded 1 group(s) outside period 202508"));
        std::fs::remove_file(file).unwrap();
    }
}
