use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Rejected,
}

/// One fan-out row per (order, pharmacist) candidate. At most one row
/// per order ever reaches Accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PharmacistAssignment {
    pub order_id: OrderId,
    pub pharmacist_id: Uuid,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
}

impl PharmacistAssignment {
    pub fn pending(order_id: OrderId, pharmacist_id: Uuid) -> Self {
        Self {
            order_id,
            pharmacist_id,
            status: AssignmentStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
