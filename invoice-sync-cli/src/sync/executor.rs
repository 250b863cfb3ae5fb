//! Plan execution
//!
//! Runs a [`SyncPlan`] against the remote API in three ordered phases:
//! create, update, remove. Items within a phase run concurrently under
//! the worker limit; phases never overlap. One item failing never stops
//! the others, and progress counters are persisted after every item so
//! polling clients see monotone progress.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use futures::future::join_all;
use log::{info, warn};
use uuid::Uuid;

use crate::api::RemoteInvoiceApi;
use crate::api::models::DocumentStatus;
use crate::api::resilience::{ConcurrencyLimiter, RetryPolicy};
use crate::error::SyncError;
use crate::ingest::InvoiceGroup;
use crate::store::{self, Link, Store};

use super::resolver::{ReferenceMaps, build_invoice_payload};
use super::types::{ItemStatus, RemovalMode, SyncPlan, SyncResultItem};

/// Executes sync plans. One executor serves one job.
pub struct SyncExecutor {
    api: Arc<dyn RemoteInvoiceApi>,
    store: Store,
    retry: RetryPolicy,
    limiter: ConcurrencyLimiter,
}

struct Progress {
    job_id: Uuid,
    processed: AtomicU64,
    failed: AtomicU64,
    total: u64,
}

impl Progress {
    /// Count one finished item and persist the counters. Counters only
    /// ever grow, so the stored percentage never goes backwards.
    async fn record(&self, store: &Store, failure: bool) {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        let failed = if failure {
            self.failed.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.failed.load(Ordering::SeqCst)
        };

        if let Err(e) = store::jobs::update_progress(
            store.pool(),
            self.job_id,
            processed as i64,
            failed as i64,
            self.total as i64,
        )
        .await
        {
            warn!("failed to persist progress for job {}: {e:#}", self.job_id);
        }
    }
}

impl SyncExecutor {
    pub fn new(
        api: Arc<dyn RemoteInvoiceApi>,
        store: Store,
        retry: RetryPolicy,
        workers: usize,
    ) -> Self {
        Self {
            api,
            store,
            retry,
            limiter: ConcurrencyLimiter::new(workers),
        }
    }

    /// Run the plan's three phases in order and return every per-item
    /// outcome. Orchestration-level failures (the database going away)
    /// are the only errors that escape; remote failures stay per-item.
    pub async fn execute(
        &self,
        job_id: Uuid,
        plan: &SyncPlan,
        refs: &ReferenceMaps,
        removal_mode: RemovalMode,
    ) -> Result<Vec<SyncResultItem>> {
        let progress = Progress {
            job_id,
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total: plan.total_items() as u64,
        };

        let mut items = Vec::with_capacity(plan.total_items());

        if !plan.to_create.is_empty() {
            self.log_phase(job_id, "create", plan.to_create.len()).await;
            let futures = plan
                .to_create
                .iter()
                .map(|group| self.create_one(group, refs, &progress));
            items.extend(join_all(futures).await);
        }

        if !plan.to_update.is_empty() {
            self.log_phase(job_id, "update", plan.to_update.len()).await;
            let futures = plan
                .to_update
                .iter()
                .map(|(group, link)| self.update_one(group, link, refs, &progress));
            items.extend(join_all(futures).await);
        }

        if !plan.to_remove.is_empty() {
            let phase = match removal_mode {
                RemovalMode::Hard => "remove",
                RemovalMode::Void => "void",
            };
            self.log_phase(job_id, phase, plan.to_remove.len()).await;
            let futures = plan
                .to_remove
                .iter()
                .map(|link| self.remove_one(link, removal_mode, &progress));
            items.extend(join_all(futures).await);
        }

        Ok(items)
    }

    async fn log_phase(&self, job_id: Uuid, phase: &str, count: usize) {
        info!("job {job_id}: phase {phase}: {count} item(s)");
        if let Err(e) = store::jobs::append_log(
            self.store.pool(),
            job_id,
            &format!("phase {phase}: {count} item(s)"),
        )
        .await
        {
            warn!("failed to append job log: {e:#}");
        }
    }

    async fn create_one(
        &self,
        group: &InvoiceGroup,
        refs: &ReferenceMaps,
        progress: &Progress,
    ) -> SyncResultItem {
        let _permit = self.limiter.acquire().await;
        let key = group.external_key.clone();

        let item = match build_invoice_payload(group, refs) {
            Err(err) => skipped(key, &err),
            Ok(payload) => {
                let result = self
                    .retry
                    .execute(&format!("create {key}"), || self.api.insert(&payload))
                    .await;
                match result {
                    Ok(remote_id) => {
                        match store::links::upsert_link(
                            self.store.pool(),
                            &group.period.key(),
                            &key,
                            remote_id,
                            &group.content_hash,
                        )
                        .await
                        {
                            Ok(()) => SyncResultItem::ok(key, remote_id, ItemStatus::Created),
                            Err(e) => SyncResultItem::failed(
                                key,
                                Some(remote_id),
                                ItemStatus::Error,
                                &SyncError::orchestration(format!(
                                    "record created remotely but link not saved: {e:#}"
                                )),
                            ),
                        }
                    }
                    Err(err) => SyncResultItem::failed(key, None, ItemStatus::Error, &err),
                }
            }
        };

        progress.record(&self.store, item.status.is_failure()).await;
        item
    }

    async fn update_one(
        &self,
        group: &InvoiceGroup,
        link: &Link,
        refs: &ReferenceMaps,
        progress: &Progress,
    ) -> SyncResultItem {
        let _permit = self.limiter.acquire().await;
        let key = group.external_key.clone();
        let remote_id = link.remote_id;

        let item = match build_invoice_payload(group, refs) {
            Err(err) => skipped(key, &err),
            Ok(payload) => {
                // Clear-then-write: the remote PATCH appends line items,
                // so stale lines must be removed first.
                let result = async {
                    self.retry
                        .execute(&format!("clear lines {key}"), || {
                            self.api.clear_lines(remote_id)
                        })
                        .await?;
                    self.retry
                        .execute(&format!("update {key}"), || {
                            self.api.update(remote_id, &payload)
                        })
                        .await
                }
                .await;

                match result {
                    Ok(()) => {
                        match store::links::upsert_link(
                            self.store.pool(),
                            &link.period,
                            &key,
                            remote_id,
                            &group.content_hash,
                        )
                        .await
                        {
                            Ok(()) => SyncResultItem::ok(key, remote_id, ItemStatus::Updated),
                            Err(e) => SyncResultItem::failed(
                                key,
                                Some(remote_id),
                                ItemStatus::Error,
                                &SyncError::orchestration(format!(
                                    "record updated remotely but link not refreshed: {e:#}"
                                )),
                            ),
                        }
                    }
                    Err(err) => {
                        SyncResultItem::failed(key, Some(remote_id), ItemStatus::Error, &err)
                    }
                }
            }
        };

        progress.record(&self.store, item.status.is_failure()).await;
        item
    }

    async fn remove_one(
        &self,
        link: &Link,
        mode: RemovalMode,
        progress: &Progress,
    ) -> SyncResultItem {
        let _permit = self.limiter.acquire().await;
        let key = link.external_key.clone();
        let remote_id = link.remote_id;

        let item = match mode {
            RemovalMode::Hard => {
                let result = self
                    .retry
                    .execute(&format!("delete {key}"), || self.api.delete(remote_id))
                    .await;
                match result {
                    Ok(()) => match store::links::delete_link(self.store.pool(), link.id).await {
                        Ok(()) => SyncResultItem::ok(key, remote_id, ItemStatus::Deleted),
                        Err(e) => SyncResultItem::failed(
                            key,
                            Some(remote_id),
                            ItemStatus::Error,
                            &SyncError::orchestration(format!(
                                "record deleted remotely but link not removed: {e:#}"
                            )),
                        ),
                    },
                    Err(err) => {
                        SyncResultItem::failed(key, Some(remote_id), ItemStatus::Error, &err)
                    }
                }
            }
            RemovalMode::Void => {
                // The link stays so the voided record remains traceable
                // to its external key.
                let result = self
                    .retry
                    .execute(&format!("void {key}"), || {
                        self.api.set_status(remote_id, DocumentStatus::Cancelled)
                    })
                    .await;
                match result {
                    Ok(()) => SyncResultItem::ok(key, remote_id, ItemStatus::Voided),
                    Err(err) => {
                        SyncResultItem::failed(key, Some(remote_id), ItemStatus::Error, &err)
                    }
                }
            }
        };

        progress.record(&self.store, item.status.is_failure()).await;
        item
    }
}

fn skipped(external_key: String, err: &SyncError) -> SyncResultItem {
    warn!("{external_key}: {err}");
    SyncResultItem::failed(external_key, None, ItemStatus::Skipped, err)
}
