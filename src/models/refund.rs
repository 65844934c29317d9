use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RefundStatus {
    Initiated,
    Processing,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RefundReason {
    Cancelled,
    OutOfStock,
    PrescriptionRejected,
    Damaged,
    WrongItem,
    PaymentFailure,
}

/// Status only ever moves forward: Processing settles to Success exactly
/// once; nothing moves a settled refund back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub order_id: OrderId,
    pub payment_ref: String,
    pub amount: f64,
    pub reason: RefundReason,
    pub status: RefundStatus,
    pub gateway_ref: Option<String>,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Refund {
    pub fn processing(
        order_id: OrderId,
        payment_ref: String,
        amount: f64,
        reason: RefundReason,
        due_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            payment_ref,
            amount,
            reason,
            status: RefundStatus::Processing,
            gateway_ref: None,
            due_at,
            created_at: Utc::now(),
            settled_at: None,
        }
    }
}
