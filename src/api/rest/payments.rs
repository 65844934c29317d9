use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::post;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{lifecycle, pharmacist};
use crate::error::AppError;
use crate::external::PaymentVerdict;
use crate::models::order::{Order, OrderId, OrderStatus, PaymentStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments/initiate", post(initiate))
        .route("/payments/verify", post(verify))
}

#[derive(Deserialize)]
pub struct InitiateRequest {
    pub order_id: OrderId,
}

#[derive(Serialize)]
pub struct InitiateResponse {
    pub order_id: OrderId,
    pub payment_ref: String,
    pub amount: f64,
}

async fn initiate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>, AppError> {
    let order = lifecycle::transition(
        &state,
        payload.order_id,
        &[OrderStatus::Pending],
        OrderStatus::PaymentInitiated,
    )?;

    let payment_ref = format!(
        "PAY-{}-{}",
        Utc::now().format("%Y%m%d"),
        Uuid::new_v4().simple().to_string()[..8].to_uppercase()
    );
    if let Some(mut stored) = state.orders.get_mut(&payload.order_id) {
        stored.payment_ref = Some(payment_ref.clone());
    }

    info!(order_id = order.id, payment_ref, "payment initiated");
    Ok(Json(InitiateResponse {
        order_id: order.id,
        payment_ref,
        amount: order.total,
    }))
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub order_id: OrderId,
    pub payment_ref: String,
    pub signature: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub payment_status: PaymentStatus,
    pub order: Order,
}

/// Gateway callback. A rejection marks the payment Failed but keeps the
/// order where it is, so verification can be retried. A replayed success
/// is answered idempotently.
async fn verify(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    let mut order = state
        .orders
        .get(&payload.order_id)
        .map(|o| o.clone())
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", payload.order_id)))?;

    if order.payment_status == PaymentStatus::Success {
        // Replay also re-offers the order if the fan-out found nobody
        // the first time; existing offers are never duplicated.
        if order.status == OrderStatus::WaitingPharmacist {
            if let Err(err) = pharmacist::dispatch_pharmacists(&state, order.id) {
                warn!(order_id = order.id, error = %err, "re-offer on replayed verification failed");
            }
        }
        return Ok(Json(VerifyResponse {
            verified: true,
            payment_status: PaymentStatus::Success,
            order,
        }));
    }

    let expected = order
        .payment_ref
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("payment was never initiated".to_string()))?;
    if expected != payload.payment_ref {
        return Err(AppError::BadRequest("unknown payment ref".to_string()));
    }

    let verdict = state
        .services
        .payments
        .verify(&order.order_number, &payload.payment_ref, &payload.signature)
        .await;

    if verdict == PaymentVerdict::Rejected {
        if let Some(mut stored) = state.orders.get_mut(&payload.order_id) {
            stored.payment_status = PaymentStatus::Failed;
        }
        order.payment_status = PaymentStatus::Failed;
        warn!(order_id = order.id, "payment verification rejected");
        return Ok(Json(VerifyResponse {
            verified: false,
            payment_status: PaymentStatus::Failed,
            order,
        }));
    }

    if let Some(mut stored) = state.orders.get_mut(&payload.order_id) {
        stored.payment_status = PaymentStatus::Success;
    }
    lifecycle::transition(
        &state,
        payload.order_id,
        &[OrderStatus::PaymentInitiated],
        OrderStatus::Paid,
    )?;
    let order = lifecycle::transition(
        &state,
        payload.order_id,
        &[OrderStatus::Paid],
        OrderStatus::WaitingPharmacist,
    )?;

    // Payment stands even if nobody can take the order right now.
    if let Err(err) = pharmacist::dispatch_pharmacists(&state, order.id) {
        warn!(order_id = order.id, error = %err, "pharmacist fan-out failed after payment");
    }

    info!(order_id = order.id, "payment captured");
    Ok(Json(VerifyResponse {
        verified: true,
        payment_status: PaymentStatus::Success,
        order,
    }))
}
