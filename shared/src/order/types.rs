//! Order domain types - the central entity and its value types

use serde::{Deserialize, Serialize};

/// Poster size (ISO 216 paper formats offered by the shop)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PosterSize {
    A4,
    A3,
    A2,
    A1,
}

impl std::fmt::Display for PosterSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PosterSize::A4 => write!(f, "A4"),
            PosterSize::A3 => write!(f, "A3"),
            PosterSize::A2 => write!(f, "A2"),
            PosterSize::A1 => write!(f, "A1"),
        }
    }
}

/// Poster finish
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PosterFinish {
    Matte,
    Glossy,
}

impl std::fmt::Display for PosterFinish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PosterFinish::Matte => write!(f, "MATTE"),
            PosterFinish::Glossy => write!(f, "GLOSSY"),
        }
    }
}

/// Order status
///
/// Transitions are monotonic along
/// `Pending -> Paid -> InProduction -> Shipped -> Delivered`.
/// `Cancelled` is reachable from `Pending` only; `FailedFulfillment` from
/// `Paid`/`InProduction` on an unrecoverable print-job error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    InProduction,
    Shipped,
    Delivered,
    Cancelled,
    FailedFulfillment,
}

impl OrderStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::FailedFulfillment
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Paid => write!(f, "PAID"),
            OrderStatus::InProduction => write!(f, "IN_PRODUCTION"),
            OrderStatus::Shipped => write!(f, "SHIPPED"),
            OrderStatus::Delivered => write!(f, "DELIVERED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::FailedFulfillment => write!(f, "FAILED_FULFILLMENT"),
        }
    }
}

/// Shipping address - embedded in the order, immutable once paid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingAddress {
    pub recipient: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
}

/// Order - one printed poster tracked from creation to delivery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Order ID (assigned by server)
    pub order_id: String,
    /// Approved artwork draft this order prints (opaque reference)
    pub draft_id: String,
    /// Customer contact for notifications
    pub customer_email: String,
    /// Poster size
    pub size: PosterSize,
    /// Poster finish
    pub finish: PosterFinish,
    /// Price in minor currency units, derived solely from (size, finish)
    pub amount: i64,
    /// Lifecycle state
    pub status: OrderStatus,
    /// Shipping address (immutable once payment succeeds)
    pub shipping_address: ShippingAddress,
    /// Payment gateway authorization reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    /// Print partner job reference (set at most once)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_job_reference: Option<String>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_submitted_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Order {
    /// Create a new pending order
    ///
    /// `amount` must come from the pricing table; this constructor never
    /// sees a client-supplied value.
    pub fn new(
        draft_id: String,
        customer_email: String,
        size: PosterSize,
        finish: PosterFinish,
        amount: i64,
        shipping_address: ShippingAddress,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            order_id: uuid::Uuid::new_v4().to_string(),
            draft_id,
            customer_email,
            size,
            finish,
            amount,
            status: OrderStatus::Pending,
            shipping_address,
            payment_reference: None,
            print_job_reference: None,
            created_at: now,
            paid_at: None,
            print_submitted_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            updated_at: now,
        }
    }
}
