//! Customer notification mailer
//!
//! Best-effort transactional email. Failures here never block or roll
//! back an order transition; the notify worker owns the retry schedule.

use async_trait::async_trait;
use shared::Order;
use std::time::Duration;
use thiserror::Error;

/// Template kind for a customer notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    OrderConfirmation,
    OrderShipped,
    OrderDelivered,
}

impl std::fmt::Display for EmailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailKind::OrderConfirmation => write!(f, "order_confirmation"),
            EmailKind::OrderShipped => write!(f, "order_shipped"),
            EmailKind::OrderDelivered => write!(f, "order_delivered"),
        }
    }
}

#[derive(Debug, Error)]
#[error("mail send failed: {0}")]
pub struct MailerError(pub String);

/// Mail provider interface
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, kind: EmailKind, order: &Order)
    -> Result<(), MailerError>;
}

/// reqwest-backed mailer (transactional email provider HTTP API)
pub struct HttpMailer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from_address: String,
}

impl HttpMailer {
    pub fn new(base_url: String, api_key: String, from_address: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url,
            api_key,
            from_address,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(
        &self,
        recipient: &str,
        kind: EmailKind,
        order: &Order,
    ) -> Result<(), MailerError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::json!({
            "from": self.from_address,
            "to": recipient,
            "template": kind,
            "variables": {
                "order_id": order.order_id,
                "size": order.size,
                "finish": order.finish,
                "amount": order.amount,
            },
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailerError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(MailerError(format!("{status}: {detail}")));
        }
        Ok(())
    }
}
