//! End-to-end fulfillment flow against a file-backed store.
//!
//! Drives the lifecycle the way the partners do: signed webhook bytes
//! in, submission worker in the middle, and a reopen of the database to
//! check that acknowledged events survive a restart.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fulfillment_server::orders::{Orchestrator, OrderStorage, PrintSubmissionWorker, RetryPolicy};
use fulfillment_server::services::{
    EmailKind, GatewayError, Mailer, MailerError, PaymentAuthorization, PaymentGateway,
    PrintJobRef, PrintJobRequest, PrintPartner, SubmitError,
};
use fulfillment_server::webhook;
use shared::{EventSource, Order, OrderStatus, PosterFinish, PosterSize, ShippingAddress};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const PAYMENT_SECRET: &str = "whsec_payment_test";
const FULFILLMENT_SECRET: &str = "whsec_fulfillment_test";

struct FakeGateway;

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_authorization(
        &self,
        order_id: &str,
        _amount: i64,
        _customer_email: &str,
    ) -> Result<PaymentAuthorization, GatewayError> {
        Ok(PaymentAuthorization {
            reference: format!("pay_{order_id}"),
            client_secret: "cs_test".to_string(),
        })
    }
}

/// Fails with a retryable error `flaky_failures` times, then succeeds.
struct FlakyPartner {
    calls: AtomicU32,
    flaky_failures: u32,
}

#[async_trait]
impl PrintPartner for FlakyPartner {
    async fn submit_job(&self, request: &PrintJobRequest) -> Result<PrintJobRef, SubmitError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.flaky_failures {
            return Err(SubmitError::Retryable(format!("503 on attempt {call}")));
        }
        Ok(PrintJobRef {
            reference: format!("job_{}", request.order_id),
        })
    }
}

/// Rejects every job outright.
struct RejectingPartner;

#[async_trait]
impl PrintPartner for RejectingPartner {
    async fn submit_job(&self, _request: &PrintJobRequest) -> Result<PrintJobRef, SubmitError> {
        Err(SubmitError::Terminal("unsupported artwork".to_string()))
    }
}

struct RecordingMailer {
    sent: std::sync::Mutex<Vec<(String, EmailKind)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        recipient: &str,
        kind: EmailKind,
        _order: &Order,
    ) -> Result<(), MailerError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), kind));
        Ok(())
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        recipient: "Ada Buyer".into(),
        street: "42 Print Lane".into(),
        city: "Porto".into(),
        postal_code: "4000-001".into(),
        country: "PT".into(),
    }
}

fn signed_payment_event(event_id: &str, order_id: &str) -> (Vec<u8>, String) {
    let body = serde_json::json!({
        "id": event_id,
        "type": "payment.succeeded",
        "data": { "order_id": order_id, "payment_reference": format!("pay_{order_id}") },
    });
    let bytes = serde_json::to_vec(&body).unwrap();
    let sig = webhook::sign_payload(PAYMENT_SECRET, &bytes);
    (bytes, sig)
}

fn signed_fulfillment_event(event_id: &str, order_id: &str, kind: &str) -> (Vec<u8>, String) {
    let body = serde_json::json!({
        "id": event_id,
        "type": kind,
        "data": { "order_id": order_id, "job_reference": format!("job_{order_id}") },
    });
    let bytes = serde_json::to_vec(&body).unwrap();
    let sig = webhook::sign_payload(FULFILLMENT_SECRET, &bytes);
    (bytes, sig)
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    submission_rx: Option<mpsc::Receiver<fulfillment_server::orders::SubmissionRequest>>,
    notify_rx: mpsc::Receiver<fulfillment_server::notify::NotificationRequest>,
}

fn harness(storage: OrderStorage) -> Harness {
    let (submission_tx, submission_rx) = mpsc::channel(16);
    let (notify_tx, notify_rx) = mpsc::channel(16);
    let orchestrator = Arc::new(Orchestrator::new(
        storage,
        Arc::new(FakeGateway),
        submission_tx,
        notify_tx,
    ));
    Harness {
        orchestrator,
        submission_rx: Some(submission_rx),
        notify_rx,
    }
}

async fn deliver(
    orchestrator: &Orchestrator,
    source: EventSource,
    secret: &str,
    body: &[u8],
    sig: &str,
) -> shared::EventOutcome {
    let event = webhook::ingest(source, secret, Some(sig), body).unwrap();
    orchestrator.handle_event(&event).await.unwrap()
}

#[tokio::test]
async fn full_lifecycle_with_flaky_partner() {
    let dir = tempfile::tempdir().unwrap();
    let storage = OrderStorage::open(dir.path().join("orders.redb")).unwrap();
    let mut h = harness(storage);

    let order = h
        .orchestrator
        .create_order(
            "draft-77".into(),
            "ada@example.com".into(),
            PosterSize::A4,
            PosterFinish::Matte,
            address(),
        )
        .unwrap();
    assert_eq!(order.amount, 2999);

    // Start the submission worker with a partner that fails once.
    let partner = Arc::new(FlakyPartner {
        calls: AtomicU32::new(0),
        flaky_failures: 1,
    });
    let worker = PrintSubmissionWorker::new(
        h.orchestrator.clone(),
        partner.clone(),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            cap: Duration::from_millis(20),
        },
    );
    let shutdown = CancellationToken::new();
    let submission_rx = h.submission_rx.take().unwrap();
    let worker_handle = tokio::spawn(worker.run(submission_rx, shutdown.clone()));

    // Payment webhook moves the order to Paid and feeds the worker.
    let (body, sig) = signed_payment_event("evt_pay_1", &order.order_id);
    let outcome = deliver(
        &h.orchestrator,
        EventSource::Payment,
        PAYMENT_SECRET,
        &body,
        &sig,
    )
    .await;
    assert_eq!(
        outcome,
        shared::EventOutcome::Applied {
            new_status: OrderStatus::Paid
        }
    );

    // Wait for the worker to retry its way to success.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stored = h
            .orchestrator
            .storage()
            .get_order(&order.order_id)
            .unwrap()
            .unwrap();
        if stored.status == OrderStatus::InProduction {
            assert_eq!(
                stored.print_job_reference.as_deref(),
                Some(format!("job_{}", order.order_id).as_str())
            );
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "order never reached production, status: {}",
            stored.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(partner.calls.load(Ordering::SeqCst), 2);

    // Shipped and delivered webhooks, with the shipped one replayed.
    let (body, sig) = signed_fulfillment_event("evt_ship_1", &order.order_id, "job.shipped");
    deliver(
        &h.orchestrator,
        EventSource::Fulfillment,
        FULFILLMENT_SECRET,
        &body,
        &sig,
    )
    .await;
    let replay = deliver(
        &h.orchestrator,
        EventSource::Fulfillment,
        FULFILLMENT_SECRET,
        &body,
        &sig,
    )
    .await;
    assert_eq!(
        replay,
        shared::EventOutcome::Applied {
            new_status: OrderStatus::Shipped
        },
        "replay returns the originally recorded outcome"
    );

    let (body, sig) = signed_fulfillment_event("evt_del_1", &order.order_id, "job.delivered");
    deliver(
        &h.orchestrator,
        EventSource::Fulfillment,
        FULFILLMENT_SECRET,
        &body,
        &sig,
    )
    .await;

    // Confirmation, shipped, delivered. Exactly three despite the replay.
    let kinds: Vec<EmailKind> = std::iter::from_fn(|| h.notify_rx.try_recv().ok())
        .map(|n| n.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EmailKind::OrderConfirmation,
            EmailKind::OrderShipped,
            EmailKind::OrderDelivered
        ]
    );

    shutdown.cancel();
    worker_handle.await.unwrap();

    // Reopen the database: everything acknowledged must still be there.
    drop(h);
    let storage = OrderStorage::open(dir.path().join("orders.redb")).unwrap();
    let reloaded = storage.get_order(&order.order_id).unwrap().unwrap();
    assert_eq!(reloaded.status, OrderStatus::Delivered);
    assert!(reloaded.delivered_at.is_some());
}

#[tokio::test]
async fn terminal_rejection_dead_letters_the_order() {
    let dir = tempfile::tempdir().unwrap();
    let storage = OrderStorage::open(dir.path().join("orders.redb")).unwrap();
    let mut h = harness(storage);

    let order = h
        .orchestrator
        .create_order(
            "draft-88".into(),
            "ada@example.com".into(),
            PosterSize::A2,
            PosterFinish::Glossy,
            address(),
        )
        .unwrap();

    let worker = PrintSubmissionWorker::new(
        h.orchestrator.clone(),
        Arc::new(RejectingPartner),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            cap: Duration::from_millis(20),
        },
    );
    let shutdown = CancellationToken::new();
    let submission_rx = h.submission_rx.take().unwrap();
    let worker_handle = tokio::spawn(worker.run(submission_rx, shutdown.clone()));

    let (body, sig) = signed_payment_event("evt_pay_1", &order.order_id);
    deliver(
        &h.orchestrator,
        EventSource::Payment,
        PAYMENT_SECRET,
        &body,
        &sig,
    )
    .await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stored = h
            .orchestrator
            .storage()
            .get_order(&order.order_id)
            .unwrap()
            .unwrap();
        if stored.status == OrderStatus::FailedFulfillment {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "order never failed, status: {}",
            stored.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let dead = h.orchestrator.storage().list_dead_letters().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].order_id, order.order_id);
    assert_eq!(dead[0].last_error, "unsupported artwork");
    // rejected on the first call, no retries burned on a terminal error
    assert_eq!(dead[0].attempts, 1);

    shutdown.cancel();
    worker_handle.await.unwrap();
}

#[tokio::test]
async fn exhausted_retry_budget_lands_in_failed_fulfillment() {
    let dir = tempfile::tempdir().unwrap();
    let storage = OrderStorage::open(dir.path().join("orders.redb")).unwrap();
    let mut h = harness(storage);

    let order = h
        .orchestrator
        .create_order(
            "draft-66".into(),
            "ada@example.com".into(),
            PosterSize::A1,
            PosterFinish::Matte,
            address(),
        )
        .unwrap();

    // Partner never stops returning retryable errors.
    let partner = Arc::new(FlakyPartner {
        calls: AtomicU32::new(0),
        flaky_failures: u32::MAX,
    });
    let worker = PrintSubmissionWorker::new(
        h.orchestrator.clone(),
        partner.clone(),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            cap: Duration::from_millis(20),
        },
    );
    let shutdown = CancellationToken::new();
    let submission_rx = h.submission_rx.take().unwrap();
    let worker_handle = tokio::spawn(worker.run(submission_rx, shutdown.clone()));

    let (body, sig) = signed_payment_event("evt_pay_1", &order.order_id);
    deliver(
        &h.orchestrator,
        EventSource::Payment,
        PAYMENT_SECRET,
        &body,
        &sig,
    )
    .await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stored = h
            .orchestrator
            .storage()
            .get_order(&order.order_id)
            .unwrap()
            .unwrap();
        if stored.status == OrderStatus::FailedFulfillment {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "budget exhaustion never failed the order, status: {}",
            stored.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Every attempt in the budget was burned before giving up.
    assert_eq!(partner.calls.load(Ordering::SeqCst), 3);
    let dead = h.orchestrator.storage().list_dead_letters().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].order_id, order.order_id);
    assert_eq!(dead[0].attempts, 3);
    assert!(dead[0].last_error.contains("attempt 3"));

    shutdown.cancel();
    worker_handle.await.unwrap();
}

#[tokio::test]
async fn notify_worker_sends_through_the_mailer() {
    let storage = OrderStorage::open_in_memory().unwrap();
    let h = harness(storage.clone());

    let order = h
        .orchestrator
        .create_order(
            "draft-99".into(),
            "ada@example.com".into(),
            PosterSize::A4,
            PosterFinish::Glossy,
            address(),
        )
        .unwrap();

    let mailer = Arc::new(RecordingMailer {
        sent: std::sync::Mutex::new(Vec::new()),
    });
    let worker = fulfillment_server::notify::NotifyWorker::new(mailer.clone(), storage);
    let (tx, rx) = mpsc::channel(4);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(rx, shutdown.clone()));

    tx.send(fulfillment_server::notify::NotificationRequest {
        recipient: order.customer_email.clone(),
        kind: EmailKind::OrderConfirmation,
        order_id: order.order_id.clone(),
    })
    .await
    .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if !mailer.sent.lock().unwrap().is_empty() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "mail never sent");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        mailer.sent.lock().unwrap()[0],
        ("ada@example.com".to_string(), EmailKind::OrderConfirmation)
    );

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn tampered_webhook_never_reaches_the_ledger() {
    let storage = OrderStorage::open_in_memory().unwrap();
    let h = harness(storage);

    let order = h
        .orchestrator
        .create_order(
            "draft-55".into(),
            "ada@example.com".into(),
            PosterSize::A3,
            PosterFinish::Matte,
            address(),
        )
        .unwrap();

    let (body, _) = signed_payment_event("evt_x", &order.order_id);
    let bad_sig = webhook::sign_payload("wrong_secret", &body);
    assert!(webhook::ingest(EventSource::Payment, PAYMENT_SECRET, Some(&bad_sig), &body).is_err());

    let stored = h
        .orchestrator
        .storage()
        .get_order(&order.order_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(h
        .orchestrator
        .storage()
        .get_processed_event(EventSource::Payment, "evt_x")
        .unwrap()
        .is_none());
}
