//! Order fulfillment orchestrator
//!
//! Consumes verified webhook events and user commands, drives the order
//! state machine, and hands external side effects to the workers.
//!
//! # Event Flow
//!
//! ```text
//! handle_event(event)
//!     ├─ 1. Ledger lookup (source, event_id) - replay short-circuits here
//!     ├─ 2. Resolve order (echoed order_id, else reference index)
//!     ├─ 3. Compute transition from current status
//!     ├─ 4. Write order + ledger row in ONE redb transaction
//!     ├─ 5. Commit (durable before the webhook is acknowledged)
//!     └─ 6. Dispatch external side effects to workers
//! ```
//!
//! Steps 1-5 run inside a single write transaction; redb serializes write
//! transactions, so the status precondition observed in step 3 still
//! holds at commit time. Concurrent handlers for the same order race
//! safely: exactly one applies the transition, the rest record a no-op.
//! External side effects run strictly after commit - a crash between 5
//! and 6 is recovered by the startup scan re-driving from persisted
//! state, never by re-processing the webhook.

use super::state_machine::{self, TransitionDecision};
use super::storage::{DeadLetterEntry, OrderStorage, StorageError};
use super::submission::SubmissionRequest;
use crate::notify::NotificationRequest;
use crate::pricing;
use crate::services::{EmailKind, GatewayError, PaymentAuthorization, PaymentGateway};
use crate::utils::AppError;
use shared::{
    EventOutcome, EventSource, NormalizedEvent, Order, OrderStatus, PosterFinish, PosterSize,
    ProcessedEvent, ShippingAddress,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("No price entry for {size}/{finish}")]
    NoPriceEntry {
        size: PosterSize,
        finish: PosterFinish,
    },

    #[error("Order {order_id} is not pending (status: {status})")]
    NotPending {
        order_id: String,
        status: OrderStatus,
    },

    #[error("Too late to cancel order {order_id} (status: {status})")]
    TooLateToCancel {
        order_id: String,
        status: OrderStatus,
    },

    #[error("Order {0} has no customer contact")]
    MissingContact(String),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match &err {
            OrchestratorError::OrderNotFound(_) => AppError::NotFound(err.to_string()),
            OrchestratorError::NoPriceEntry { .. } | OrchestratorError::MissingContact(_) => {
                AppError::Validation(err.to_string())
            }
            OrchestratorError::NotPending { .. } | OrchestratorError::TooLateToCancel { .. } => {
                AppError::Conflict(err.to_string())
            }
            OrchestratorError::Gateway(_) => AppError::Upstream(err.to_string()),
            OrchestratorError::Storage(_) => AppError::Storage(err.to_string()),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// External side effect computed during a transition, dispatched only
/// after the local state is durably committed.
#[derive(Debug)]
enum SideEffect {
    SubmitPrintJob { order_id: String },
    Notify { recipient: String, kind: EmailKind, order_id: String },
    OperatorAlert { order_id: String, reason: String },
}

/// Order fulfillment orchestrator
pub struct Orchestrator {
    storage: OrderStorage,
    payment_gateway: Arc<dyn PaymentGateway>,
    submission_tx: mpsc::Sender<SubmissionRequest>,
    notify_tx: mpsc::Sender<NotificationRequest>,
}

impl Orchestrator {
    pub fn new(
        storage: OrderStorage,
        payment_gateway: Arc<dyn PaymentGateway>,
        submission_tx: mpsc::Sender<SubmissionRequest>,
        notify_tx: mpsc::Sender<NotificationRequest>,
    ) -> Self {
        Self {
            storage,
            payment_gateway,
            submission_tx,
            notify_tx,
        }
    }

    pub fn storage(&self) -> &OrderStorage {
        &self.storage
    }

    // ========== Commands ==========

    /// Create a new pending order.
    ///
    /// The amount comes from the pricing table; request shapes carrying a
    /// client amount do not exist.
    pub fn create_order(
        &self,
        draft_id: String,
        customer_email: String,
        size: PosterSize,
        finish: PosterFinish,
        shipping_address: ShippingAddress,
    ) -> OrchestratorResult<Order> {
        let amount = pricing::price_for(size, finish)
            .ok_or(OrchestratorError::NoPriceEntry { size, finish })?;

        let order = Order::new(draft_id, customer_email, size, finish, amount, shipping_address);
        self.storage.insert_order(&order)?;

        tracing::info!(
            order_id = %order.order_id,
            size = %size,
            finish = %finish,
            amount = amount,
            "Order created"
        );
        Ok(order)
    }

    /// Request a payment authorization for a pending order.
    ///
    /// The amount is recomputed fresh from the pricing table - the stored
    /// value is never trusted for charging.
    pub async fn create_payment_authorization(
        &self,
        order_id: &str,
    ) -> OrchestratorResult<PaymentAuthorization> {
        let order = self
            .storage
            .get_order(order_id)?
            .ok_or_else(|| OrchestratorError::OrderNotFound(order_id.to_string()))?;

        if order.status != OrderStatus::Pending {
            return Err(OrchestratorError::NotPending {
                order_id: order.order_id,
                status: order.status,
            });
        }
        if order.customer_email.trim().is_empty() {
            return Err(OrchestratorError::MissingContact(order.order_id));
        }

        let amount = pricing::price_for(order.size, order.finish).ok_or(
            OrchestratorError::NoPriceEntry {
                size: order.size,
                finish: order.finish,
            },
        )?;

        // Network call happens with no storage transaction open
        let auth = self
            .payment_gateway
            .create_authorization(&order.order_id, amount, &order.customer_email)
            .await?;

        // Persist the reference, re-checking the status: the order may
        // have been cancelled while the gateway call was in flight.
        let txn = self.storage.begin_write()?;
        let mut current = self
            .storage
            .get_order_txn(&txn, order_id)?
            .ok_or_else(|| OrchestratorError::OrderNotFound(order_id.to_string()))?;
        if current.status != OrderStatus::Pending {
            return Err(OrchestratorError::NotPending {
                order_id: current.order_id,
                status: current.status,
            });
        }
        current.payment_reference = Some(auth.reference.clone());
        current.updated_at = chrono::Utc::now().timestamp_millis();
        self.storage.put_order_txn(&txn, &current)?;
        txn.commit().map_err(StorageError::from)?;

        Ok(auth)
    }

    /// Cancel a pending order.
    ///
    /// Rejected - not silently ignored - once the order has left
    /// `Pending`: the caller must see an explicit "too late" outcome.
    pub fn cancel_order(&self, order_id: &str) -> OrchestratorResult<Order> {
        let txn = self.storage.begin_write()?;
        let mut order = self
            .storage
            .get_order_txn(&txn, order_id)?
            .ok_or_else(|| OrchestratorError::OrderNotFound(order_id.to_string()))?;

        if order.status != OrderStatus::Pending {
            return Err(OrchestratorError::TooLateToCancel {
                order_id: order.order_id,
                status: order.status,
            });
        }

        let now = chrono::Utc::now().timestamp_millis();
        order.status = OrderStatus::Cancelled;
        order.cancelled_at = Some(now);
        order.updated_at = now;
        self.storage.put_order_txn(&txn, &order)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(order_id = %order.order_id, "Order cancelled by customer");
        Ok(order)
    }

    // ========== Webhook Events ==========

    /// Process one verified inbound event (at-most-once side effects,
    /// at-least-once delivery tolerance).
    pub async fn handle_event(&self, event: &NormalizedEvent) -> OrchestratorResult<EventOutcome> {
        let txn = self.storage.begin_write()?;

        // 1. Replay check - return the recorded outcome, run nothing
        if let Some(prev) =
            self.storage
                .get_processed_event_txn(&txn, event.source, &event.event_id)?
        {
            drop(txn);
            tracing::debug!(
                event_id = %event.event_id,
                source = %event.source,
                outcome = %prev.outcome,
                "Duplicate event delivery short-circuited"
            );
            return Ok(prev.outcome);
        }

        // 2. Resolve the target order
        let Some(mut order) = self.resolve_order_txn(&txn, event)? else {
            let record = ProcessedEvent::new(event, None, EventOutcome::SkippedUnknownOrder);
            self.storage.record_processed_event_txn(&txn, &record)?;
            txn.commit().map_err(StorageError::from)?;
            tracing::info!(
                event_id = %event.event_id,
                source = %event.source,
                "Event references no known order, acknowledged as skipped"
            );
            return Ok(EventOutcome::SkippedUnknownOrder);
        };

        // 3. Compute the transition for the current status
        let decision = state_machine::transition_for_event(order.status, event.event_type);
        let (outcome, effects) = match decision {
            TransitionDecision::Invalid => {
                tracing::warn!(
                    event_id = %event.event_id,
                    order_id = %order.order_id,
                    status = %order.status,
                    event_type = %event.event_type,
                    "Out-of-order event skipped"
                );
                (EventOutcome::SkippedInvalidTransition, Vec::new())
            }
            TransitionDecision::AlreadyApplied => {
                (EventOutcome::AlreadyApplied, Vec::new())
            }
            TransitionDecision::Apply(new_status) => {
                // 4. Apply the transition in this transaction
                self.apply_transition(&mut order, new_status, event);
                self.storage.put_order_txn(&txn, &order)?;
                let effects = Self::effects_for(new_status, &order);
                (EventOutcome::Applied { new_status }, effects)
            }
        };

        // 5. Ledger row commits together with the order mutation
        let record = ProcessedEvent::new(event, Some(order.order_id.clone()), outcome.clone());
        self.storage.record_processed_event_txn(&txn, &record)?;
        txn.commit().map_err(StorageError::from)?;

        if let EventOutcome::Applied { new_status } = &outcome {
            tracing::info!(
                event_id = %event.event_id,
                order_id = %order.order_id,
                new_status = %new_status,
                "Order transitioned"
            );
        }

        // 6. External side effects, strictly after the commit
        self.dispatch_effects(effects).await;

        Ok(outcome)
    }

    /// Resolve the order an event targets: echoed order id first, then
    /// reverse lookup through the reference index.
    fn resolve_order_txn(
        &self,
        txn: &redb::WriteTransaction,
        event: &NormalizedEvent,
    ) -> OrchestratorResult<Option<Order>> {
        if let Some(order_id) = &event.order_id
            && let Some(order) = self.storage.get_order_txn(txn, order_id)?
        {
            return Ok(Some(order));
        }
        if let Some(reference) = &event.reference
            && let Some(order_id) =
                self.storage
                    .order_id_for_reference_txn(txn, event.source, reference)?
        {
            return Ok(self.storage.get_order_txn(txn, &order_id)?);
        }
        Ok(None)
    }

    /// Mutate the order row for an applied transition.
    fn apply_transition(&self, order: &mut Order, new_status: OrderStatus, event: &NormalizedEvent) {
        let now = chrono::Utc::now().timestamp_millis();
        order.status = new_status;
        order.updated_at = now;
        match new_status {
            OrderStatus::Paid => order.paid_at = Some(now),
            OrderStatus::InProduction => {
                if order.print_submitted_at.is_none() {
                    order.print_submitted_at = Some(now);
                }
            }
            OrderStatus::Shipped => order.shipped_at = Some(now),
            OrderStatus::Delivered => order.delivered_at = Some(now),
            OrderStatus::Cancelled => order.cancelled_at = Some(now),
            OrderStatus::Pending | OrderStatus::FailedFulfillment => {}
        }
        // Fold the partner's job reference into the order on first sight
        // (our own submission response may have been lost).
        if event.source == EventSource::Fulfillment
            && order.print_job_reference.is_none()
            && let Some(reference) = &event.reference
        {
            order.print_job_reference = Some(reference.clone());
        }
    }

    /// Side effects owed after a committed transition.
    ///
    /// The confirmation email rides on whichever path applies
    /// `InProduction`: usually the submission success callback, but when
    /// our submission response is lost and the partner's `job.submitted`
    /// webhook wins the race, this is the only place left to send it.
    /// Exactly one path applies the transition, so the email is sent
    /// exactly once.
    fn effects_for(new_status: OrderStatus, order: &Order) -> Vec<SideEffect> {
        match new_status {
            OrderStatus::Paid => vec![SideEffect::SubmitPrintJob {
                order_id: order.order_id.clone(),
            }],
            OrderStatus::InProduction => vec![SideEffect::Notify {
                recipient: order.customer_email.clone(),
                kind: EmailKind::OrderConfirmation,
                order_id: order.order_id.clone(),
            }],
            OrderStatus::Shipped => vec![SideEffect::Notify {
                recipient: order.customer_email.clone(),
                kind: EmailKind::OrderShipped,
                order_id: order.order_id.clone(),
            }],
            OrderStatus::Delivered => vec![SideEffect::Notify {
                recipient: order.customer_email.clone(),
                kind: EmailKind::OrderDelivered,
                order_id: order.order_id.clone(),
            }],
            OrderStatus::FailedFulfillment => vec![SideEffect::OperatorAlert {
                order_id: order.order_id.clone(),
                reason: "print partner cancelled the job".to_string(),
            }],
            _ => Vec::new(),
        }
    }

    async fn dispatch_effects(&self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::SubmitPrintJob { order_id } => {
                    // Submission is critical; if the channel is gone the
                    // startup recovery scan re-drives from the Paid row.
                    if let Err(e) = self
                        .submission_tx
                        .send(SubmissionRequest {
                            order_id: order_id.clone(),
                        })
                        .await
                    {
                        tracing::error!(
                            order_id = %order_id,
                            error = %e,
                            "Submission queue unavailable, deferring to recovery scan"
                        );
                    }
                }
                SideEffect::Notify {
                    recipient,
                    kind,
                    order_id,
                } => {
                    // Best-effort: a full queue never blocks fulfillment
                    if let Err(e) = self.notify_tx.try_send(NotificationRequest {
                        recipient,
                        kind,
                        order_id: order_id.clone(),
                    }) {
                        tracing::warn!(
                            order_id = %order_id,
                            kind = %kind,
                            error = %e,
                            "Notification dropped"
                        );
                    }
                }
                SideEffect::OperatorAlert { order_id, reason } => {
                    self.raise_operator_alert(&order_id, 0, &reason);
                }
            }
        }
    }

    // ========== Submission Worker Callbacks ==========

    /// Record a successful print submission.
    ///
    /// Sets the job reference (at most once), advances `Paid ->
    /// InProduction`, and owes the confirmation email iff this call
    /// applied the transition. Safe to call concurrently with webhook
    /// handlers for the same order - the status is re-read in the write
    /// transaction.
    pub async fn record_print_submission(
        &self,
        order_id: &str,
        job_reference: &str,
    ) -> OrchestratorResult<bool> {
        let txn = self.storage.begin_write()?;
        let mut order = self
            .storage
            .get_order_txn(&txn, order_id)?
            .ok_or_else(|| OrchestratorError::OrderNotFound(order_id.to_string()))?;

        let now = chrono::Utc::now().timestamp_millis();
        if order.print_job_reference.is_none() {
            order.print_job_reference = Some(job_reference.to_string());
            order.print_submitted_at = Some(now);
        }

        let decision =
            state_machine::forward_transition(order.status, OrderStatus::InProduction);
        let applied = matches!(decision, TransitionDecision::Apply(_));
        if let TransitionDecision::Apply(new_status) = decision {
            order.status = new_status;
        }
        order.updated_at = now;
        self.storage.put_order_txn(&txn, &order)?;
        txn.commit().map_err(StorageError::from)?;

        if applied {
            tracing::info!(
                order_id = %order_id,
                job_reference = %job_reference,
                "Print job submitted, order in production"
            );
            if let Err(e) = self.notify_tx.try_send(NotificationRequest {
                recipient: order.customer_email.clone(),
                kind: EmailKind::OrderConfirmation,
                order_id: order_id.to_string(),
            }) {
                tracing::warn!(order_id = %order_id, error = %e, "Confirmation email dropped");
            }
        }
        Ok(applied)
    }

    /// Mark an order as unfulfillable after a terminal submission error
    /// or an exhausted retry budget. The order never silently stays in
    /// `Paid`.
    pub fn fail_fulfillment(
        &self,
        order_id: &str,
        attempts: u32,
        last_error: &str,
    ) -> OrchestratorResult<()> {
        let txn = self.storage.begin_write()?;
        let mut order = self
            .storage
            .get_order_txn(&txn, order_id)?
            .ok_or_else(|| OrchestratorError::OrderNotFound(order_id.to_string()))?;

        match order.status {
            OrderStatus::Paid | OrderStatus::InProduction => {
                let now = chrono::Utc::now().timestamp_millis();
                order.status = OrderStatus::FailedFulfillment;
                order.updated_at = now;
                self.storage.put_order_txn(&txn, &order)?;
                // Same transaction as the status flip: a failed order is
                // never invisible to the dead-letter view.
                self.storage.push_dead_letter_txn(
                    &txn,
                    &DeadLetterEntry {
                        order_id: order_id.to_string(),
                        failed_at: now,
                        attempts,
                        last_error: last_error.to_string(),
                    },
                )?;
                txn.commit().map_err(StorageError::from)?;
            }
            OrderStatus::FailedFulfillment => {
                // already recorded
                return Ok(());
            }
            status => {
                tracing::warn!(
                    order_id = %order_id,
                    status = %status,
                    "Ignoring fulfillment failure for order outside production"
                );
                return Ok(());
            }
        }

        self.raise_operator_alert(order_id, attempts, last_error);
        Ok(())
    }

    fn raise_operator_alert(&self, order_id: &str, attempts: u32, reason: &str) {
        tracing::error!(
            target: "operator_alert",
            order_id = %order_id,
            attempts = attempts,
            reason = %reason,
            "Order requires manual intervention"
        );
    }

    // ========== Recovery ==========

    /// Re-enqueue print submission for every paid order without a job
    /// reference (crash between commit and dispatch). Runs at startup.
    pub async fn recover_pending_submissions(&self) -> OrchestratorResult<usize> {
        let paid = self.storage.orders_with_status(OrderStatus::Paid)?;
        let mut recovered = 0;
        for order in paid {
            if let Some(reference) = &order.print_job_reference {
                // Submission succeeded but the InProduction transition was
                // lost; re-drive the transition, not the submission.
                self.record_print_submission(&order.order_id, reference).await?;
                continue;
            }
            if self
                .submission_tx
                .send(SubmissionRequest {
                    order_id: order.order_id.clone(),
                })
                .await
                .is_ok()
            {
                recovered += 1;
                tracing::info!(order_id = %order.order_id, "Recovered pending print submission");
            }
        }
        Ok(recovered)
    }
}
