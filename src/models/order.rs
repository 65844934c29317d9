use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

pub type OrderId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    PaymentInitiated,
    Paid,
    WaitingPharmacist,
    Accepted,
    Packed,
    ReadyForDelivery,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderStatus::WaitingPharmacist
                | OrderStatus::Accepted
                | OrderStatus::Packed
                | OrderStatus::ReadyForDelivery
                | OrderStatus::OutForDelivery
        )
    }

    /// Canonical transition table. `OutForDelivery -> ReadyForDelivery` is
    /// the agent-cancellation reassignment path.
    pub fn can_advance_to(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;

        match (*self, to) {
            (Pending, PaymentInitiated)
            | (PaymentInitiated, Paid)
            | (Paid, WaitingPharmacist)
            | (WaitingPharmacist, Accepted)
            | (Accepted, Packed)
            | (Packed, ReadyForDelivery)
            | (ReadyForDelivery, OutForDelivery)
            | (OutForDelivery, Delivered)
            | (OutForDelivery, ReadyForDelivery) => true,
            (from, Cancelled) => from.is_cancellable(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: f64,
    pub cgst: f64,
    pub sgst: f64,
    pub handling_fee: f64,
    pub delivery_fee: f64,
    pub free_delivery_applied: bool,
    pub surge_fee: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub customer_id: Uuid,
    pub subtotal: f64,
    pub cgst: f64,
    pub sgst: f64,
    pub handling_fee: f64,
    pub delivery_fee: f64,
    pub surge_fee: f64,
    pub total: f64,
    pub payment_status: PaymentStatus,
    pub payment_ref: Option<String>,
    pub status: OrderStatus,
    pub invoice_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Pricing is frozen here; nothing recalculates it later.
    pub fn checked_out(id: OrderId, customer_id: Uuid, pricing: &PriceBreakdown) -> Self {
        Self {
            id,
            order_number: format!("ORD{id:03}"),
            customer_id,
            subtotal: pricing.subtotal,
            cgst: pricing.cgst,
            sgst: pricing.sgst,
            handling_fee: pricing.handling_fee,
            delivery_fee: pricing.delivery_fee,
            surge_fee: pricing.surge_fee,
            total: pricing.total,
            payment_status: PaymentStatus::Pending,
            payment_ref: None,
            status: OrderStatus::Pending,
            invoice_ref: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAddress {
    pub order_id: OrderId,
    pub street: String,
    pub city: String,
    pub pincode: String,
    pub location: GeoPoint,
}
