//! Wire types for the remote invoice API

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One invoice line as sent to the remote system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLinePayload {
    pub product_id: Uuid,
    pub quantity: f64,
    pub unit_price: f64,
    pub discount: f64,
}

/// A full invoice record as sent to the remote system.
///
/// The external key is carried on every create/update so the remote
/// record stays traceable to its spreadsheet group across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicePayload {
    pub external_key: String,
    pub document_no: String,
    pub document_date: NaiveDate,
    pub customer_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salesperson_id: Option<Uuid>,
    pub lines: Vec<InvoiceLinePayload>,
}

/// Remote document status used by the soft-void removal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Active,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Active => "active",
            DocumentStatus::Cancelled => "cancelled",
        }
    }
}

/// Structured detail carried by remote error envelopes.
///
/// `line_index` references an entry in the submitted `lines` array and
/// lets the error reporter attribute a failure to one spreadsheet row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteErrorDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_index: Option<usize>,
}

/// Error envelope returned by the remote API on failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteErrorEnvelope {
    pub error: RemoteErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteErrorBody {
    pub message: String,
    #[serde(default)]
    pub detail: Option<RemoteErrorDetail>,
}

/// Success envelope for record creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedResponse {
    pub id: Uuid,
}
