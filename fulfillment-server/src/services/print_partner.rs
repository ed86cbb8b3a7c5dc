//! Print fulfillment partner client
//!
//! Submits manufacturing jobs to the print partner. Submission errors
//! are classified at this boundary:
//!
//! - **Retryable**: timeouts, 5xx, 408/429 - the retry worker backs off
//!   and tries again.
//! - **Terminal**: any other 4xx (validation, unsupported combination) -
//!   retrying can never succeed, the order must fail fulfillment.
//!
//! Every submission carries a client-supplied idempotency token (the
//! order id), so a retry after a lost response cannot create a second
//! physical print job.

use async_trait::async_trait;
use serde::Deserialize;
use shared::{Order, PosterFinish, PosterSize, ShippingAddress};
use std::time::Duration;
use thiserror::Error;

/// Manufacturing job submission
#[derive(Debug, Clone)]
pub struct PrintJobRequest {
    pub order_id: String,
    pub draft_id: String,
    pub size: PosterSize,
    pub finish: PosterFinish,
    pub shipping_address: ShippingAddress,
    /// Client-supplied idempotency token honored by the partner
    pub idempotency_token: String,
}

impl PrintJobRequest {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            draft_id: order.draft_id.clone(),
            size: order.size,
            finish: order.finish,
            shipping_address: order.shipping_address.clone(),
            idempotency_token: order.order_id.clone(),
        }
    }
}

/// Accepted job
#[derive(Debug, Clone)]
pub struct PrintJobRef {
    pub reference: String,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("retryable submission failure: {0}")]
    Retryable(String),

    #[error("terminal submission failure: {0}")]
    Terminal(String),
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Retryable(_))
    }
}

/// Print partner interface
#[async_trait]
pub trait PrintPartner: Send + Sync {
    async fn submit_job(&self, request: &PrintJobRequest) -> Result<PrintJobRef, SubmitError>;
}

/// reqwest-backed print partner client
pub struct HttpPrintPartner {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_reference: String,
}

impl HttpPrintPartner {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Classify an HTTP status: 408/429/5xx can succeed later, other 4xx
    /// cannot.
    fn classify_status(status: reqwest::StatusCode, detail: String) -> SubmitError {
        if status.is_server_error()
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            SubmitError::Retryable(format!("{status}: {detail}"))
        } else {
            SubmitError::Terminal(format!("{status}: {detail}"))
        }
    }
}

#[async_trait]
impl PrintPartner for HttpPrintPartner {
    async fn submit_job(&self, request: &PrintJobRequest) -> Result<PrintJobRef, SubmitError> {
        let url = format!("{}/v1/jobs", self.base_url);
        let body = serde_json::json!({
            "artwork_ref": request.draft_id,
            "size": request.size,
            "finish": request.finish,
            "recipient": {
                "name": request.shipping_address.recipient,
                "street": request.shipping_address.street,
                "city": request.shipping_address.city,
                "postal_code": request.shipping_address.postal_code,
                "country": request.shipping_address.country,
            },
            "metadata": { "order_id": request.order_id },
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", &request.idempotency_token)
            .json(&body)
            .send()
            .await
            // A timeout never proves the job was not created; the
            // idempotency token makes the retry safe.
            .map_err(|e| SubmitError::Retryable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, detail));
        }

        let parsed: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| SubmitError::Retryable(e.to_string()))?;

        Ok(PrintJobRef {
            reference: parsed.job_reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        for code in [500u16, 502, 503, 408, 429] {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            assert!(
                HttpPrintPartner::classify_status(status, String::new()).is_retryable(),
                "{code}"
            );
        }
    }

    #[test]
    fn client_errors_are_terminal() {
        for code in [400u16, 404, 409, 422] {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            assert!(
                !HttpPrintPartner::classify_status(status, String::new()).is_retryable(),
                "{code}"
            );
        }
    }
}
