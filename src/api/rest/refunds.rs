use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::Deserialize;

use crate::engine::settlement;
use crate::error::AppError;
use crate::models::order::OrderId;
use crate::models::refund::{Refund, RefundReason};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/refunds", post(initiate))
        .route("/refunds/:order_id", get(for_order))
}

#[derive(Deserialize)]
pub struct InitiateRefundRequest {
    pub order_id: OrderId,
    pub reason: RefundReason,
}

async fn initiate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InitiateRefundRequest>,
) -> Result<Json<Refund>, AppError> {
    let refund = settlement::initiate_refund(&state, payload.order_id, payload.reason)?;
    Ok(Json(refund))
}

async fn for_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Vec<Refund>>, AppError> {
    if !state.orders.contains_key(&order_id) {
        return Err(AppError::NotFound(format!("order {} not found", order_id)));
    }

    let mut refunds: Vec<Refund> = state
        .refunds
        .iter()
        .filter(|r| r.order_id == order_id)
        .map(|r| r.clone())
        .collect();
    refunds.sort_by_key(|r| r.created_at);

    Ok(Json(refunds))
}
