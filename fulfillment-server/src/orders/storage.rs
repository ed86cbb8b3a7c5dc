//! redb-based storage layer for orders and the idempotency ledger
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` | One row per order |
//! | `processed_events` | `(source, event_id)` | `ProcessedEvent` | Idempotency ledger |
//! | `payment_ref_index` | `payment_reference` | `order_id` | Reverse lookup from payment webhooks |
//! | `print_ref_index` | `print_job_reference` | `order_id` | Reverse lookup from fulfillment webhooks |
//! | `dead_letter` | `order_id` | `DeadLetterEntry` | Orders needing manual intervention |
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate`: once `commit()` returns the
//! write is on disk and the file is in a consistent state. Webhook
//! endpoints rely on this - they acknowledge an event only after the
//! ledger row is committed, never from memory.
//!
//! # Concurrency
//!
//! redb serializes write transactions. The orchestrator re-reads the
//! order's status inside its write transaction before applying a
//! transition, which gives the conditional-write semantics the state
//! machine needs: concurrent handlers for the same order race safely and
//! the losers observe the already-advanced status.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::{EventSource, Order, OrderStatus, ProcessedEvent};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Table for orders: key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Table for the idempotency ledger: key = (source, event_id),
/// value = JSON-serialized ProcessedEvent
const PROCESSED_EVENTS_TABLE: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("processed_events");

/// Reverse index: payment_reference -> order_id
const PAYMENT_REF_TABLE: TableDefinition<&str, &str> = TableDefinition::new("payment_ref_index");

/// Reverse index: print_job_reference -> order_id
const PRINT_REF_TABLE: TableDefinition<&str, &str> = TableDefinition::new("print_ref_index");

/// Table for dead letters: key = order_id, value = JSON-serialized DeadLetterEntry
const DEAD_LETTER_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("dead_letter");

/// Dead letter entry - a paid order the print partner could not take
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeadLetterEntry {
    pub order_id: String,
    pub failed_at: i64,
    pub attempts: u32,
    pub last_error: String,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Order storage backed by redb
#[derive(Clone)]
pub struct OrderStorage {
    db: Arc<Database>,
}

impl OrderStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let storage = Self { db: Arc::new(db) };
        storage.init_tables()?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let storage = Self { db: Arc::new(db) };
        storage.init_tables()?;
        Ok(storage)
    }

    /// Create all tables if they don't exist
    fn init_tables(&self) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(PROCESSED_EVENTS_TABLE)?;
            let _ = write_txn.open_table(PAYMENT_REF_TABLE)?;
            let _ = write_txn.open_table(PRINT_REF_TABLE)?;
            let _ = write_txn.open_table(DEAD_LETTER_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Order Operations ==========

    /// Insert a newly created order (own transaction)
    pub fn insert_order(&self, order: &Order) -> StorageResult<()> {
        let txn = self.begin_write()?;
        self.put_order_txn(&txn, order)?;
        txn.commit()?;
        Ok(())
    }

    /// Write an order row and maintain the reference indices (within transaction)
    pub fn put_order_txn(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        let bytes = serde_json::to_vec(order)?;
        {
            let mut table = txn.open_table(ORDERS_TABLE)?;
            table.insert(order.order_id.as_str(), bytes.as_slice())?;
        }
        if let Some(payment_ref) = &order.payment_reference {
            let mut index = txn.open_table(PAYMENT_REF_TABLE)?;
            index.insert(payment_ref.as_str(), order.order_id.as_str())?;
        }
        if let Some(print_ref) = &order.print_job_reference {
            let mut index = txn.open_table(PRINT_REF_TABLE)?;
            index.insert(print_ref.as_str(), order.order_id.as_str())?;
        }
        Ok(())
    }

    /// Get an order by id (read-only)
    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order by id (within a write transaction)
    ///
    /// This is the read the orchestrator's conditional transitions use:
    /// because it happens under the (serialized) write transaction, the
    /// status it observes cannot be advanced by a racing handler before
    /// this transaction commits.
    pub fn get_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List orders, newest first (paginated, for operator tooling)
    pub fn list_orders(&self, limit: usize, offset: usize) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        let mut orders = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            orders.push(serde_json::from_slice::<Order>(value.value())?);
        }
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    /// All orders currently in the given status (recovery scan)
    pub fn orders_with_status(&self, status: OrderStatus) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        let mut orders = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let order: Order = serde_json::from_slice(value.value())?;
            if order.status == status {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    // ========== Reverse Lookup ==========

    /// Resolve an order id from a payment authorization reference
    pub fn order_id_for_payment_ref(&self, reference: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PAYMENT_REF_TABLE)?;
        Ok(table.get(reference)?.map(|g| g.value().to_string()))
    }

    /// Resolve an order id from a print job reference
    pub fn order_id_for_print_ref(&self, reference: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINT_REF_TABLE)?;
        Ok(table.get(reference)?.map(|g| g.value().to_string()))
    }

    /// Reverse lookup within a write transaction
    pub fn order_id_for_reference_txn(
        &self,
        txn: &WriteTransaction,
        source: EventSource,
        reference: &str,
    ) -> StorageResult<Option<String>> {
        let table = match source {
            EventSource::Payment => txn.open_table(PAYMENT_REF_TABLE)?,
            EventSource::Fulfillment => txn.open_table(PRINT_REF_TABLE)?,
        };
        Ok(table.get(reference)?.map(|g| g.value().to_string()))
    }

    // ========== Idempotency Ledger ==========

    /// Look up a ledger entry (read-only)
    pub fn get_processed_event(
        &self,
        source: EventSource,
        event_id: &str,
    ) -> StorageResult<Option<ProcessedEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROCESSED_EVENTS_TABLE)?;
        match table.get((source.as_str(), event_id))? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a ledger entry (within a write transaction)
    pub fn get_processed_event_txn(
        &self,
        txn: &WriteTransaction,
        source: EventSource,
        event_id: &str,
    ) -> StorageResult<Option<ProcessedEvent>> {
        let table = txn.open_table(PROCESSED_EVENTS_TABLE)?;
        match table.get((source.as_str(), event_id))? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Append a ledger entry (within transaction)
    ///
    /// Committed together with the order mutation it describes, closing
    /// the idempotency window atomically.
    pub fn record_processed_event_txn(
        &self,
        txn: &WriteTransaction,
        record: &ProcessedEvent,
    ) -> StorageResult<()> {
        let bytes = serde_json::to_vec(record)?;
        let mut table = txn.open_table(PROCESSED_EVENTS_TABLE)?;
        table.insert((record.source.as_str(), record.event_id.as_str()), bytes.as_slice())?;
        Ok(())
    }

    // ========== Dead Letter ==========

    /// Record an order whose print submission permanently failed
    pub fn push_dead_letter(&self, entry: &DeadLetterEntry) -> StorageResult<()> {
        let txn = self.begin_write()?;
        self.push_dead_letter_txn(&txn, entry)?;
        txn.commit()?;
        Ok(())
    }

    /// Dead-letter write inside a caller-owned transaction, so the row
    /// commits together with the status flip it explains.
    pub fn push_dead_letter_txn(
        &self,
        txn: &WriteTransaction,
        entry: &DeadLetterEntry,
    ) -> StorageResult<()> {
        let bytes = serde_json::to_vec(entry)?;
        let mut table = txn.open_table(DEAD_LETTER_TABLE)?;
        table.insert(entry.order_id.as_str(), bytes.as_slice())?;
        Ok(())
    }

    /// List dead letters (operator tooling)
    pub fn list_dead_letters(&self) -> StorageResult<Vec<DeadLetterEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEAD_LETTER_TABLE)?;
        let mut entries = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    /// Storage liveness probe (health endpoint)
    pub fn ping(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(ORDERS_TABLE)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{EventOutcome, NormalizedEvent, PosterFinish, PosterSize, ShippingAddress};

    fn test_order() -> Order {
        Order::new(
            "draft-1".into(),
            "buyer@example.com".into(),
            PosterSize::A4,
            PosterFinish::Matte,
            2999,
            ShippingAddress {
                recipient: "Test Buyer".into(),
                street: "1 Main St".into(),
                city: "Lisbon".into(),
                postal_code: "1000-001".into(),
                country: "PT".into(),
            },
        )
    }

    #[test]
    fn insert_and_get_order() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let order = test_order();
        storage.insert_order(&order).unwrap();

        let loaded = storage.get_order(&order.order_id).unwrap().unwrap();
        assert_eq!(loaded, order);
        assert!(storage.get_order("missing").unwrap().is_none());
    }

    #[test]
    fn reference_indices_resolve_orders() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let mut order = test_order();
        order.payment_reference = Some("pay_123".into());
        order.print_job_reference = Some("job_456".into());
        storage.insert_order(&order).unwrap();

        assert_eq!(
            storage.order_id_for_payment_ref("pay_123").unwrap(),
            Some(order.order_id.clone())
        );
        assert_eq!(
            storage.order_id_for_print_ref("job_456").unwrap(),
            Some(order.order_id.clone())
        );
        assert_eq!(storage.order_id_for_payment_ref("pay_x").unwrap(), None);
    }

    #[test]
    fn ledger_round_trip_is_namespaced_by_source() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let event = NormalizedEvent {
            event_id: "evt_1".into(),
            source: EventSource::Payment,
            event_type: shared::InboundEventType::PaymentSucceeded,
            order_id: None,
            reference: None,
        };
        let record = ProcessedEvent::new(&event, None, EventOutcome::SkippedUnknownOrder);

        let txn = storage.begin_write().unwrap();
        storage.record_processed_event_txn(&txn, &record).unwrap();
        txn.commit().unwrap();

        let loaded = storage
            .get_processed_event(EventSource::Payment, "evt_1")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.outcome, EventOutcome::SkippedUnknownOrder);

        // Same id from the other sender is a different ledger row
        assert!(
            storage
                .get_processed_event(EventSource::Fulfillment, "evt_1")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn list_orders_is_newest_first() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let mut a = test_order();
        a.created_at = 100;
        let mut b = test_order();
        b.created_at = 200;
        storage.insert_order(&a).unwrap();
        storage.insert_order(&b).unwrap();

        let listed = storage.list_orders(10, 0).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].order_id, b.order_id);

        let page = storage.list_orders(10, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].order_id, a.order_id);
    }

    #[test]
    fn dead_letters_are_listed() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let entry = DeadLetterEntry {
            order_id: "ord-1".into(),
            failed_at: 123,
            attempts: 5,
            last_error: "unsupported finish".into(),
        };
        storage.push_dead_letter(&entry).unwrap();

        let entries = storage.list_dead_letters().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].order_id, "ord-1");
        assert_eq!(entries[0].attempts, 5);
    }

    #[test]
    fn dead_letter_commits_atomically_with_order_write() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let mut order = test_order();
        storage.insert_order(&order).unwrap();

        // Status flip and dead-letter row in one transaction: dropping
        // the txn instead of committing leaves neither behind.
        order.status = OrderStatus::FailedFulfillment;
        let entry = DeadLetterEntry {
            order_id: order.order_id.clone(),
            failed_at: 123,
            attempts: 5,
            last_error: "partner unreachable".into(),
        };
        let txn = storage.begin_write().unwrap();
        storage.put_order_txn(&txn, &order).unwrap();
        storage.push_dead_letter_txn(&txn, &entry).unwrap();
        drop(txn);

        let loaded = storage.get_order(&order.order_id).unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Pending);
        assert!(storage.list_dead_letters().unwrap().is_empty());

        let txn = storage.begin_write().unwrap();
        storage.put_order_txn(&txn, &order).unwrap();
        storage.push_dead_letter_txn(&txn, &entry).unwrap();
        txn.commit().unwrap();

        let loaded = storage.get_order(&order.order_id).unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::FailedFulfillment);
        assert_eq!(storage.list_dead_letters().unwrap().len(), 1);
    }

    #[test]
    fn orders_with_status_filters() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let mut paid = test_order();
        paid.status = OrderStatus::Paid;
        let pending = test_order();
        storage.insert_order(&paid).unwrap();
        storage.insert_order(&pending).unwrap();

        let found = storage.orders_with_status(OrderStatus::Paid).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order_id, paid.order_id);
    }
}
