use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::delivery::{self, CancelOutcome, TrackInfo};
use crate::error::AppError;
use crate::models::delivery::{CancelReason, Delivery};
use crate::models::order::{Order, OrderId};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries/assign/:order_id", post(assign))
        .route("/deliveries/:order_id", get(history))
        .route("/deliveries/:order_id/pickup", post(pickup))
        .route("/deliveries/:order_id/otp", post(issue_otp))
        .route("/deliveries/:order_id/verify", post(verify_otp))
        .route("/deliveries/:order_id/cancel", post(cancel))
        .route("/deliveries/:order_id/track", get(track))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = delivery::assign_delivery(&state, order_id).await?;
    Ok(Json(delivery))
}

#[derive(Deserialize)]
pub struct AgentActionRequest {
    pub agent_id: Uuid,
}

async fn pickup(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
    Json(payload): Json<AgentActionRequest>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = delivery::confirm_pickup(&state, order_id, payload.agent_id)?;
    Ok(Json(delivery))
}

#[derive(Serialize)]
pub struct OtpIssuedResponse {
    pub order_id: OrderId,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

async fn issue_otp(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
    Json(payload): Json<AgentActionRequest>,
) -> Result<Json<OtpIssuedResponse>, AppError> {
    let entry = delivery::issue_handoff_code(&state, order_id, payload.agent_id)?;
    Ok(Json(OtpIssuedResponse {
        order_id,
        code: entry.code,
        expires_at: entry.expires_at,
    }))
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub agent_id: Uuid,
    pub code: String,
}

async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<Order>, AppError> {
    let order =
        delivery::complete_delivery(&state, order_id, payload.agent_id, &payload.code).await?;
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct CancelDeliveryRequest {
    pub agent_id: Uuid,
    pub reason: CancelReason,
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelDeliveryResponse {
    Cancelled { order: Order },
    Reassigned { delivery: Delivery },
    AdminInterventionRequired,
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
    Json(payload): Json<CancelDeliveryRequest>,
) -> Result<Json<CancelDeliveryResponse>, AppError> {
    let outcome =
        delivery::cancel_delivery(&state, order_id, payload.agent_id, payload.reason).await?;

    let response = match outcome {
        CancelOutcome::Cancelled { order } => CancelDeliveryResponse::Cancelled { order },
        CancelOutcome::Reassigned { delivery } => CancelDeliveryResponse::Reassigned { delivery },
        CancelOutcome::AdminInterventionRequired => {
            CancelDeliveryResponse::AdminInterventionRequired
        }
    };
    Ok(Json(response))
}

/// Every dispatch attempt for the order, oldest first.
async fn history(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    if !state.orders.contains_key(&order_id) {
        return Err(AppError::NotFound(format!("order {} not found", order_id)));
    }

    let mut rows: Vec<Delivery> = state
        .deliveries
        .iter()
        .filter(|d| d.order_id == order_id)
        .map(|d| d.clone())
        .collect();
    rows.sort_by_key(|d| d.assigned_at);

    Ok(Json(rows))
}

async fn track(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<TrackInfo>, AppError> {
    let info = delivery::track(&state, order_id)?;
    Ok(Json(info))
}
