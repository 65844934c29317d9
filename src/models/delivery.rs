use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryStatus {
    Assigned,
    PickedUp,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CancelReason {
    VehicleBreakdown,
    HealthIssue,
    Emergency,
    StoreDelay,
    CustomerUnreachable,
    CustomerCancelled,
    WrongAddress,
}

impl CancelReason {
    /// Central reassignment policy. The first four reasons fault the agent
    /// or the store and the order gets a fresh dispatch; the rest terminate
    /// the order.
    pub fn allows_reassign(&self) -> bool {
        match self {
            CancelReason::VehicleBreakdown
            | CancelReason::HealthIssue
            | CancelReason::Emergency
            | CancelReason::StoreDelay => true,
            CancelReason::CustomerUnreachable
            | CancelReason::CustomerCancelled
            | CancelReason::WrongAddress => false,
        }
    }
}

/// One row per dispatch attempt. A cancelled-and-reassigned order gets a
/// new row; cancelled rows keep their history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: OrderId,
    pub agent_id: Uuid,
    pub status: DeliveryStatus,
    pub eta_minutes: u32,
    pub assigned_at: DateTime<Utc>,
    pub picked_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<CancelReason>,
}

impl Delivery {
    pub fn assigned(order_id: OrderId, agent_id: Uuid, eta_minutes: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            agent_id,
            status: DeliveryStatus::Assigned,
            eta_minutes,
            assigned_at: Utc::now(),
            picked_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancel_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, DeliveryStatus::Assigned | DeliveryStatus::PickedUp)
    }
}

#[cfg(test)]
mod tests {
    use super::CancelReason;

    #[test]
    fn reassign_policy_partitions_every_reason() {
        let reassign = [
            CancelReason::VehicleBreakdown,
            CancelReason::HealthIssue,
            CancelReason::Emergency,
            CancelReason::StoreDelay,
        ];
        let terminal = [
            CancelReason::CustomerUnreachable,
            CancelReason::CustomerCancelled,
            CancelReason::WrongAddress,
        ];

        for reason in reassign {
            assert!(reason.allows_reassign(), "{reason:?} should reassign");
        }
        for reason in terminal {
            assert!(!reason.allows_reassign(), "{reason:?} should terminate");
        }
    }
}
