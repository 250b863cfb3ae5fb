//! Error taxonomy for the sync engine
//!
//! Item-scoped errors (unresolved references, remote rejections, exhausted
//! retries) are caught at the item boundary and converted into result
//! entries; only orchestration-level errors propagate and fail the job.

use std::fmt;
use std::time::Duration;

use crate::api::models::RemoteErrorDetail;

/// Reference entity kinds resolvable from the local mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Customer,
    Product,
    Salesperson,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Customer => "customer",
            RefKind::Product => "product",
            RefKind::Salesperson => "salesperson",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failures of the sync engine.
#[derive(Debug, Clone)]
pub enum SyncError {
    /// A required column is missing from the uploaded sheet. Fails the
    /// whole job before any remote call is made.
    Schema { column: String },
    /// A business code in a group has no match in the local mirror.
    /// Scoped to the offending group only.
    ReferenceNotFound {
        kind: RefKind,
        code: String,
        external_key: String,
    },
    /// Rate-limited or transient server-side failure. Retried per policy,
    /// escalated to an item error once the retry budget is exhausted.
    /// Status 0 marks a transport-level failure with no HTTP response.
    RemoteTransient {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
        detail: Option<RemoteErrorDetail>,
    },
    /// Remote rejection (4xx other than 429). Surfaced immediately as an
    /// item error, never retried.
    RemoteRejection {
        status: u16,
        message: String,
        detail: Option<RemoteErrorDetail>,
    },
    /// Credential acquisition failure, malformed job parameters or an
    /// unreadable period. Fails the whole job.
    Orchestration { message: String },
}

impl SyncError {
    pub fn schema(column: impl Into<String>) -> Self {
        SyncError::Schema {
            column: column.into(),
        }
    }

    pub fn orchestration(message: impl Into<String>) -> Self {
        SyncError::Orchestration {
            message: message.into(),
        }
    }

    /// Classify a remote HTTP failure. 429 and the transient server
    /// statuses are retryable; everything else is a rejection.
    pub fn from_status(
        status: u16,
        message: String,
        detail: Option<RemoteErrorDetail>,
        retry_after: Option<Duration>,
    ) -> Self {
        match status {
            429 | 502 | 503 | 504 => SyncError::RemoteTransient {
                status,
                message,
                retry_after,
                detail,
            },
            _ => SyncError::RemoteRejection {
                status,
                message,
                detail,
            },
        }
    }

    /// A transport-level failure (connect error, timeout) with no response.
    pub fn transport(message: impl Into<String>) -> Self {
        SyncError::RemoteTransient {
            status: 0,
            message: message.into(),
            retry_after: None,
            detail: None,
        }
    }

    /// Whether the retry policy may attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::RemoteTransient { .. })
    }

    /// Server-supplied backoff hint, when one was present.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RemoteTransient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Structured detail from the remote error envelope, if any. Both
    /// rejections and transient failures that exhausted the retry
    /// budget keep their detail for row attribution.
    pub fn detail(&self) -> Option<&RemoteErrorDetail> {
        match self {
            SyncError::RemoteRejection { detail, .. }
            | SyncError::RemoteTransient { detail, .. } => detail.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Schema { column } => {
                write!(f, "required column '{}' is missing", column)
            }
            SyncError::ReferenceNotFound {
                kind,
                code,
                external_key,
            } => {
                write!(f, "unknown {} code '{}' (invoice {})", kind, code, external_key)
            }
            SyncError::RemoteTransient {
                status, message, ..
            } => {
                if *status == 0 {
                    write!(f, "remote call failed: {}", message)
                } else {
                    write!(f, "remote call failed with HTTP {}: {}", status, message)
                }
            }
            SyncError::RemoteRejection {
                status, message, ..
            } => {
                write!(f, "remote rejected the request (HTTP {}): {}", status, message)
            }
            SyncError::Orchestration { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for SyncError {}
