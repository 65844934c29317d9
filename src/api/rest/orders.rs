use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{lifecycle, pharmacist, pricing};
use crate::error::AppError;
use crate::external::geocode_or_fallback;
use crate::models::order::{Order, OrderAddress, OrderId, PriceBreakdown};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(checkout))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/pack", post(pack_order))
        .route("/orders/:id/ready", post(ready_order))
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: Uuid,
    pub subtotal: f64,
    pub street: String,
    pub city: String,
    pub pincode: String,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    pub pricing: PriceBreakdown,
}

/// Geocodes the address, reads the current surge, and freezes the price
/// in one step.
async fn checkout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    if payload.street.trim().is_empty() || payload.pincode.trim().is_empty() {
        return Err(AppError::BadRequest(
            "street and pincode cannot be empty".to_string(),
        ));
    }

    let full_address = format!(
        "{}, {} {}",
        payload.street.trim(),
        payload.city.trim(),
        payload.pincode.trim()
    );
    let location = geocode_or_fallback(&state, &full_address).await;

    let surge = state.surge.current().await;
    let breakdown = pricing::quote(payload.subtotal, surge.amount, &state.config)?;

    let order_id = state.next_order_id();
    let order = Order::checked_out(order_id, payload.customer_id, &breakdown);
    state.orders.insert(order_id, order.clone());
    state.addresses.insert(
        order_id,
        OrderAddress {
            order_id,
            street: payload.street.trim().to_string(),
            city: payload.city.trim().to_string(),
            pincode: payload.pincode.trim().to_string(),
            location,
        },
    );

    Ok(Json(CheckoutResponse {
        order,
        pricing: breakdown,
    }))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))?;

    Ok(Json(order.value().clone()))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    let order = lifecycle::cancel_order(&state, id)?;
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct PharmacistActionRequest {
    pub pharmacist_id: Uuid,
}

async fn pack_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
    Json(payload): Json<PharmacistActionRequest>,
) -> Result<Json<Order>, AppError> {
    let order = pharmacist::pack(&state, id, payload.pharmacist_id)?;
    Ok(Json(order))
}

async fn ready_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
    Json(payload): Json<PharmacistActionRequest>,
) -> Result<Json<Order>, AppError> {
    let order = pharmacist::mark_ready(&state, id, payload.pharmacist_id)?;
    Ok(Json(order))
}
