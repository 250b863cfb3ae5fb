//! Remote invoice API client
//!
//! The engine consumes the remote system exclusively through the
//! [`RemoteInvoiceApi`] trait; [`HttpInvoiceApi`] is the reqwest-backed
//! production implementation speaking a JSON envelope protocol.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Method, Response, StatusCode};
use uuid::Uuid;

use crate::error::SyncError;

use super::models::{
    CreatedResponse, DocumentStatus, InvoicePayload, RemoteErrorEnvelope,
};

/// The five remote operations the sync executor needs.
#[async_trait]
pub trait RemoteInvoiceApi: Send + Sync {
    /// Create a new invoice record, returning its remote id.
    async fn insert(&self, invoice: &InvoicePayload) -> Result<Uuid, SyncError>;

    /// Overwrite the header fields and line items of an existing record.
    async fn update(&self, remote_id: Uuid, invoice: &InvoicePayload) -> Result<(), SyncError>;

    /// Remove all line items from an existing record. Called before every
    /// update so stale sub-items never accumulate under partial overwrite
    /// semantics.
    async fn clear_lines(&self, remote_id: Uuid) -> Result<(), SyncError>;

    /// Hard-delete a record.
    async fn delete(&self, remote_id: Uuid) -> Result<(), SyncError>;

    /// Change a record's document status (soft void).
    async fn set_status(&self, remote_id: Uuid, status: DocumentStatus) -> Result<(), SyncError>;
}

/// Production client for the remote invoice API.
#[derive(Debug)]
pub struct HttpInvoiceApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpInvoiceApi {
    /// Build a client. Fails with an orchestration error when no bearer
    /// token is available, so the job fails before any remote call.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, SyncError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SyncError::orchestration(
                "no API credential available: set api_token in the config file \
                 or the INVOICE_SYNC_TOKEN environment variable",
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SyncError::orchestration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, SyncError> {
        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!("remote call: {} {}", method, path);
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(&response);
        let text = response.text().await.unwrap_or_default();
        let (message, detail) = match serde_json::from_str::<RemoteErrorEnvelope>(&text) {
            Ok(envelope) => (envelope.error.message, envelope.error.detail),
            Err(_) => (
                if text.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    text
                },
                None,
            ),
        };

        Err(SyncError::from_status(
            status.as_u16(),
            message,
            detail,
            retry_after,
        ))
    }
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    if response.status() != StatusCode::TOO_MANY_REQUESTS
        && !response.status().is_server_error()
    {
        return None;
    }
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl RemoteInvoiceApi for HttpInvoiceApi {
    async fn insert(&self, invoice: &InvoicePayload) -> Result<Uuid, SyncError> {
        let body = serde_json::to_value(invoice)
            .map_err(|e| SyncError::orchestration(format!("failed to encode invoice: {e}")))?;
        let response = self.send(Method::POST, "/invoices", Some(body)).await?;
        let created: CreatedResponse = response
            .json()
            .await
            .map_err(|e| SyncError::transport(format!("malformed create response: {e}")))?;
        Ok(created.id)
    }

    async fn update(&self, remote_id: Uuid, invoice: &InvoicePayload) -> Result<(), SyncError> {
        let body = serde_json::to_value(invoice)
            .map_err(|e| SyncError::orchestration(format!("failed to encode invoice: {e}")))?;
        self.send(
            Method::PATCH,
            &format!("/invoices/{remote_id}"),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn clear_lines(&self, remote_id: Uuid) -> Result<(), SyncError> {
        self.send(
            Method::DELETE,
            &format!("/invoices/{remote_id}/lines"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, remote_id: Uuid) -> Result<(), SyncError> {
        self.send(Method::DELETE, &format!("/invoices/{remote_id}"), None)
            .await?;
        Ok(())
    }

    async fn set_status(&self, remote_id: Uuid, status: DocumentStatus) -> Result<(), SyncError> {
        self.send(
            Method::POST,
            &format!("/invoices/{remote_id}/status"),
            Some(serde_json::json!({ "status": status.as_str() })),
        )
        .await?;
        Ok(())
    }
}
