//! Payment gateway client
//!
//! Thin call-out to the hosted payment processor. The service only ever
//! asks for an authorization; the actual charge happens out-of-band on
//! the processor's side and comes back as a webhook.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// A created authorization: the reference we persist and the opaque
/// secret the client uses to complete payment in the browser.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PaymentAuthorization {
    pub reference: String,
    pub client_secret: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway rejected request: {0}")]
    Rejected(String),

    #[error("gateway transport error: {0}")]
    Transport(String),
}

/// Payment processor interface
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment authorization for the given amount (minor units).
    ///
    /// `order_id` is attached as metadata the processor must echo back in
    /// its webhooks - it is how webhook events resolve to orders.
    async fn create_authorization(
        &self,
        order_id: &str,
        amount: i64,
        customer_email: &str,
    ) -> Result<PaymentAuthorization, GatewayError>;
}

/// reqwest-backed gateway client
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct AuthorizationResponse {
    reference: String,
    client_secret: String,
}

impl HttpPaymentGateway {
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
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_authorization(
        &self,
        order_id: &str,
        amount: i64,
        customer_email: &str,
    ) -> Result<PaymentAuthorization, GatewayError> {
        let url = format!("{}/v1/authorizations", self.base_url);
        let body = serde_json::json!({
            "amount": amount,
            "receipt_email": customer_email,
            "metadata": { "order_id": order_id },
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("{status}: {detail}")));
        }

        let parsed: AuthorizationResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        tracing::info!(
            order_id = %order_id,
            reference = %parsed.reference,
            "Payment authorization created"
        );

        Ok(PaymentAuthorization {
            reference: parsed.reference,
            client_secret: parsed.client_secret,
        })
    }
}
