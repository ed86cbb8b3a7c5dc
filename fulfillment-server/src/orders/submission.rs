//! Print Submission Worker
//!
//! 监听提交队列，向打印伙伴提交作业。
//! 指数退避重试，预算耗尽或终端错误时转入死信。

use crate::services::{PrintJobRequest, PrintPartner, SubmitError};
use shared::OrderStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Orchestrator;

/// Queued request to submit one order's print job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub order_id: String,
}

/// Retry schedule for print submissions
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Base delay for the exponential schedule
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            cap: Duration::from_secs(30),
        }
    }
}

/// Delay before retry number `attempt` (1-based): capped exponential
/// with full jitter, so herds of retries spread out.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let raw = policy
        .base_delay
        .saturating_mul(1u32 << exp)
        .min(policy.cap);
    let jitter: f64 = rand::random::<f64>();
    raw.mul_f64(jitter.max(0.1))
}

/// 打印提交工作者
///
/// 从队列取出订单，提交打印作业。每个请求在独立任务中处理，
/// 慢速伙伴不会阻塞队列。
pub struct PrintSubmissionWorker {
    orchestrator: Arc<Orchestrator>,
    print_partner: Arc<dyn PrintPartner>,
    policy: RetryPolicy,
}

impl PrintSubmissionWorker {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        print_partner: Arc<dyn PrintPartner>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            orchestrator,
            print_partner,
            policy,
        }
    }

    /// 运行工作者（阻塞直到通道关闭或收到 shutdown 信号）
    pub async fn run(
        self,
        mut request_rx: mpsc::Receiver<SubmissionRequest>,
        shutdown: CancellationToken,
    ) {
        tracing::info!("Print submission worker started");
        let worker = Arc::new(self);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Print submission worker received shutdown signal");
                    break;
                }
                request = request_rx.recv() => {
                    let Some(request) = request else {
                        tracing::info!("Submission channel closed, worker stopping");
                        break;
                    };
                    let worker = worker.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        worker.process(request, shutdown).await;
                    });
                }
            }
        }
    }

    /// Submit one order's print job, retrying on transient failures.
    async fn process(&self, request: SubmissionRequest, shutdown: CancellationToken) {
        let order_id = request.order_id;

        // Consult persisted state, not the queue entry: the order may
        // have moved on (duplicate enqueue, recovery overlap).
        let order = match self.orchestrator.storage().get_order(&order_id) {
            Ok(Some(order)) => order,
            Ok(None) => {
                tracing::warn!(order_id = %order_id, "Submission requested for unknown order");
                return;
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Failed to load order");
                return;
            }
        };
        if order.status != OrderStatus::Paid {
            tracing::debug!(
                order_id = %order_id,
                status = %order.status,
                "Skipping submission, order no longer awaiting production"
            );
            return;
        }

        let job_request = PrintJobRequest::from_order(&order);
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match self.print_partner.submit_job(&job_request).await {
                Ok(job_ref) => {
                    if let Err(e) = self
                        .orchestrator
                        .record_print_submission(&order_id, &job_ref.reference)
                        .await
                    {
                        tracing::error!(
                            order_id = %order_id,
                            error = %e,
                            "Submission succeeded but could not be recorded"
                        );
                    }
                    return;
                }
                Err(SubmitError::Terminal(detail)) => {
                    tracing::error!(
                        order_id = %order_id,
                        attempt = attempt,
                        detail = %detail,
                        "Print partner rejected the job"
                    );
                    self.give_up(&order_id, attempt, &detail);
                    return;
                }
                Err(SubmitError::Retryable(detail)) => {
                    last_error = detail;
                    if attempt == self.policy.max_attempts {
                        break;
                    }
                    let delay = backoff_delay(attempt, &self.policy);
                    tracing::warn!(
                        order_id = %order_id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "Print submission failed, retrying"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            // Unfinished work is re-driven by the
                            // recovery scan on the next startup.
                            tracing::info!(order_id = %order_id, "Submission retry aborted by shutdown");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::error!(
            order_id = %order_id,
            attempts = self.policy.max_attempts,
            error = %last_error,
            "Print submission retry budget exhausted"
        );
        self.give_up(&order_id, self.policy.max_attempts, &last_error);
    }

    fn give_up(&self, order_id: &str, attempts: u32, detail: &str) {
        if let Err(e) = self.orchestrator.fail_fulfillment(order_id, attempts, detail) {
            tracing::error!(order_id = %order_id, error = %e, "Failed to record fulfillment failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_stays_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            cap: Duration::from_secs(4),
        };
        for attempt in 1..=10 {
            let delay = backoff_delay(attempt, &policy);
            assert!(delay <= policy.cap, "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn first_retry_starts_from_base() {
        let policy = RetryPolicy::default();
        let delay = backoff_delay(1, &policy);
        assert!(delay <= policy.base_delay);
        assert!(delay >= policy.base_delay.mul_f64(0.1));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = RetryPolicy::default();
        let delay = backoff_delay(u32::MAX, &policy);
        assert!(delay <= policy.cap);
    }
}
