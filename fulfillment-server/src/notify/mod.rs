//! Notification Worker
//!
//! 监听通知队列，发送客户邮件。尽力而为：失败只重试少量次数，
//! 永不回滚订单状态，永不阻塞履约流程。

use crate::orders::OrderStorage;
use crate::services::{EmailKind, Mailer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Queued customer notification
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub recipient: String,
    pub kind: EmailKind,
    pub order_id: String,
}

/// Attempts per notification, including the first
const MAX_ATTEMPTS: u32 = 3;
/// Fixed pause between attempts
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// 通知工作者
pub struct NotifyWorker {
    mailer: Arc<dyn Mailer>,
    storage: OrderStorage,
}

impl NotifyWorker {
    pub fn new(mailer: Arc<dyn Mailer>, storage: OrderStorage) -> Self {
        Self { mailer, storage }
    }

    /// 运行工作者（阻塞直到通道关闭或收到 shutdown 信号）
    pub async fn run(
        self,
        mut request_rx: mpsc::Receiver<NotificationRequest>,
        shutdown: CancellationToken,
    ) {
        tracing::info!("Notify worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Notify worker received shutdown signal");
                    break;
                }
                request = request_rx.recv() => {
                    let Some(request) = request else {
                        tracing::info!("Notification channel closed, worker stopping");
                        break;
                    };
                    self.deliver(request).await;
                }
            }
        }
    }

    /// Send one notification. Every attempt leaves a structured log
    /// line; a final failure is logged and dropped.
    async fn deliver(&self, request: NotificationRequest) {
        let order = match self.storage.get_order(&request.order_id) {
            Ok(Some(order)) => order,
            Ok(None) => {
                tracing::warn!(
                    order_id = %request.order_id,
                    kind = %request.kind,
                    "Notification for unknown order dropped"
                );
                return;
            }
            Err(e) => {
                tracing::error!(
                    order_id = %request.order_id,
                    error = %e,
                    "Failed to load order for notification"
                );
                return;
            }
        };

        for attempt in 1..=MAX_ATTEMPTS {
            match self
                .mailer
                .send(&request.recipient, request.kind, &order)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        order_id = %request.order_id,
                        kind = %request.kind,
                        attempt = attempt,
                        "Notification sent"
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        order_id = %request.order_id,
                        kind = %request.kind,
                        attempt = attempt,
                        error = %e,
                        "Notification attempt failed"
                    );
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        tracing::error!(
            order_id = %request.order_id,
            kind = %request.kind,
            attempts = MAX_ATTEMPTS,
            "Notification given up"
        );
    }
}
