//! Order state machine - pure transition rules
//!
//! The lifecycle is monotonic along
//! `Pending -> Paid -> InProduction -> Shipped -> Delivered`, with
//! `Cancelled` reachable from `Pending` only and `FailedFulfillment`
//! reachable from `Paid`/`InProduction`. No transition moves backward.
//!
//! External senders are not trusted to be ordered, so computing a
//! transition never fails hard: a request for a state the order already
//! reached is a no-op success, and a request that skips ahead (e.g. a
//! shipped callback on a still-pending order) is a skip, not an error.

use shared::{InboundEventType, OrderStatus};

/// What to do with a requested transition given the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Move the order to the new status
    Apply(OrderStatus),
    /// Order is already at or past the target state - no-op success
    AlreadyApplied,
    /// Transition is invalid for the current state - record and skip
    Invalid,
}

/// Position on the forward path, used for the at-or-past check.
/// Terminal branches (`Cancelled`, `FailedFulfillment`) have no rank.
fn rank(status: OrderStatus) -> Option<u8> {
    match status {
        OrderStatus::Pending => Some(0),
        OrderStatus::Paid => Some(1),
        OrderStatus::InProduction => Some(2),
        OrderStatus::Shipped => Some(3),
        OrderStatus::Delivered => Some(4),
        OrderStatus::Cancelled | OrderStatus::FailedFulfillment => None,
    }
}

/// Target status an inbound event asks for
fn target_of(event_type: InboundEventType) -> OrderStatus {
    match event_type {
        InboundEventType::PaymentSucceeded => OrderStatus::Paid,
        // The partner confirming it has the job is the same fact as our
        // own submission success: the order is in production.
        InboundEventType::JobSubmitted | InboundEventType::JobInProgress => {
            OrderStatus::InProduction
        }
        InboundEventType::JobShipped => OrderStatus::Shipped,
        InboundEventType::JobDelivered => OrderStatus::Delivered,
        // Partner-side abort is a terminal fulfillment failure
        InboundEventType::JobCancelled => OrderStatus::FailedFulfillment,
    }
}

/// Compute the transition for an inbound webhook event.
pub fn transition_for_event(
    current: OrderStatus,
    event_type: InboundEventType,
) -> TransitionDecision {
    let target = target_of(event_type);
    match target {
        OrderStatus::FailedFulfillment => {
            // Only a job we actually hold can fail
            match current {
                OrderStatus::Paid | OrderStatus::InProduction => {
                    TransitionDecision::Apply(OrderStatus::FailedFulfillment)
                }
                OrderStatus::FailedFulfillment => TransitionDecision::AlreadyApplied,
                _ => TransitionDecision::Invalid,
            }
        }
        _ => forward_transition(current, target),
    }
}

/// Compute a forward transition along the main path.
///
/// Also used for internal commands: successful print submission requests
/// `InProduction`, a customer cancel requests `Cancelled` (handled
/// separately because it must reject rather than skip).
pub fn forward_transition(current: OrderStatus, target: OrderStatus) -> TransitionDecision {
    let Some(target_rank) = rank(target) else {
        return TransitionDecision::Invalid;
    };
    let Some(current_rank) = rank(current) else {
        // Cancelled / FailedFulfillment are terminal
        return TransitionDecision::Invalid;
    };
    if current_rank >= target_rank {
        return TransitionDecision::AlreadyApplied;
    }
    // Forward transitions advance exactly one step; anything further
    // means a prerequisite event has not arrived yet.
    if target_rank - current_rank == 1 {
        TransitionDecision::Apply(target)
    } else {
        TransitionDecision::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::InboundEventType::*;
    use shared::OrderStatus::*;

    #[test]
    fn payment_succeeded_moves_pending_to_paid() {
        assert_eq!(
            transition_for_event(Pending, PaymentSucceeded),
            TransitionDecision::Apply(Paid)
        );
    }

    #[test]
    fn redelivered_payment_event_is_noop() {
        for current in [Paid, InProduction, Shipped, Delivered] {
            assert_eq!(
                transition_for_event(current, PaymentSucceeded),
                TransitionDecision::AlreadyApplied,
                "{current}"
            );
        }
    }

    #[test]
    fn shipped_before_paid_is_invalid_not_fatal() {
        assert_eq!(
            transition_for_event(Pending, JobShipped),
            TransitionDecision::Invalid
        );
        // a later in-order payment event still works
        assert_eq!(
            transition_for_event(Pending, PaymentSucceeded),
            TransitionDecision::Apply(Paid)
        );
    }

    #[test]
    fn full_forward_path() {
        assert_eq!(
            transition_for_event(Paid, JobSubmitted),
            TransitionDecision::Apply(InProduction)
        );
        assert_eq!(
            transition_for_event(InProduction, JobShipped),
            TransitionDecision::Apply(Shipped)
        );
        assert_eq!(
            transition_for_event(Shipped, JobDelivered),
            TransitionDecision::Apply(Delivered)
        );
    }

    #[test]
    fn delivered_event_cannot_skip_shipped() {
        assert_eq!(
            transition_for_event(InProduction, JobDelivered),
            TransitionDecision::Invalid
        );
    }

    #[test]
    fn no_backward_transitions() {
        assert_eq!(
            transition_for_event(Delivered, JobShipped),
            TransitionDecision::AlreadyApplied
        );
        assert_eq!(
            transition_for_event(Shipped, JobInProgress),
            TransitionDecision::AlreadyApplied
        );
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for event in [PaymentSucceeded, JobSubmitted, JobShipped, JobDelivered] {
            assert_eq!(
                transition_for_event(Cancelled, event),
                TransitionDecision::Invalid,
                "{event}"
            );
            assert_eq!(
                transition_for_event(FailedFulfillment, event),
                TransitionDecision::Invalid,
                "{event}"
            );
        }
    }

    #[test]
    fn job_cancelled_fails_fulfillment_from_paid_or_production() {
        assert_eq!(
            transition_for_event(Paid, JobCancelled),
            TransitionDecision::Apply(FailedFulfillment)
        );
        assert_eq!(
            transition_for_event(InProduction, JobCancelled),
            TransitionDecision::Apply(FailedFulfillment)
        );
        assert_eq!(
            transition_for_event(Shipped, JobCancelled),
            TransitionDecision::Invalid
        );
        assert_eq!(
            transition_for_event(FailedFulfillment, JobCancelled),
            TransitionDecision::AlreadyApplied
        );
    }
}
