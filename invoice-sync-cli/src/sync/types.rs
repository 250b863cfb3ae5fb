//! Plan, parameter and result types for the sync engine

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::models::RemoteErrorDetail;
use crate::ingest::InvoiceGroup;
use crate::store::Link;

/// How records absent from the current file are removed remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RemovalMode {
    /// Delete the remote record and its link.
    Hard,
    /// Mark the remote record cancelled. The link is kept.
    Void,
}

/// Opaque submission parameters persisted with the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    pub file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Period key, e.g. `202508`.
    pub period: String,
    pub removal_mode: RemovalMode,
}

/// The three disjoint sets produced by the diff planner.
///
/// Every group in the file appears in exactly one of `to_create`,
/// `to_update` or `unchanged`; `to_remove` holds the links of the period
/// with no group in the current file.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub to_create: Vec<InvoiceGroup>,
    pub to_update: Vec<(InvoiceGroup, Link)>,
    pub unchanged: Vec<String>,
    pub to_remove: Vec<Link>,
}

impl SyncPlan {
    /// Items processed across all three phases.
    pub fn total_items(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_remove.len()
    }

    pub fn is_noop(&self) -> bool {
        self.total_items() == 0
    }
}

/// Per-item outcome tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Created,
    Updated,
    Deleted,
    Voided,
    Skipped,
    Error,
}

impl ItemStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, ItemStatus::Skipped | ItemStatus::Error)
    }
}

/// Outcome of one group or link within a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResultItem {
    pub external_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<Uuid>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<RemoteErrorDetail>,
}

impl SyncResultItem {
    pub fn ok(external_key: String, remote_id: Uuid, status: ItemStatus) -> Self {
        Self {
            external_key,
            remote_id: Some(remote_id),
            status,
            error: None,
            detail: None,
        }
    }

    pub fn failed(
        external_key: String,
        remote_id: Option<Uuid>,
        status: ItemStatus,
        error: &crate::error::SyncError,
    ) -> Self {
        Self {
            external_key,
            remote_id,
            status,
            error: Some(error.to_string()),
            detail: error.detail().cloned(),
        }
    }
}

/// Structured result payload persisted with a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub voided: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Rows excluded during parsing because their date was unreadable.
    pub skipped_rows: usize,
    pub items: Vec<SyncResultItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl SyncOutcome {
    /// Tally counts from the per-item outcomes.
    pub fn from_items(items: Vec<SyncResultItem>, unchanged: usize, skipped_rows: usize) -> Self {
        let count = |status: ItemStatus| items.iter().filter(|i| i.status == status).count();
        Self {
            created: count(ItemStatus::Created),
            updated: count(ItemStatus::Updated),
            removed: count(ItemStatus::Deleted),
            voided: count(ItemStatus::Voided),
            unchanged,
            failed: items.iter().filter(|i| i.status.is_failure()).count(),
            skipped_rows,
            items,
            report_path: None,
        }
    }
}
