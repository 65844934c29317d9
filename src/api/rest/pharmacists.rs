use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::pharmacist;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::actor::Pharmacist;
use crate::models::assignment::AssignmentStatus;
use crate::models::order::{Order, OrderId};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pharmacists", post(register).get(list))
        .route("/pharmacists/:id/status", patch(update_status))
        .route("/pharmacists/:id/queue", get(queue))
        .route("/pharmacists/:id/accept/:order_id", post(accept))
        .route("/pharmacists/:id/reject/:order_id", post(reject))
}

#[derive(Deserialize)]
pub struct RegisterPharmacistRequest {
    pub name: String,
    pub location: GeoPoint,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPharmacistRequest>,
) -> Result<Json<Pharmacist>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let pharmacist = Pharmacist {
        id: Uuid::new_v4(),
        name: payload.name,
        active: true,
        location: payload.location.clone(),
        updated_at: Utc::now(),
    };

    state.pharmacists.insert(pharmacist.id, pharmacist.clone());
    state
        .pharmacist_index
        .upsert(pharmacist.id, payload.location);

    Ok(Json(pharmacist))
}

async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<Pharmacist>> {
    let pharmacists = state
        .pharmacists
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(pharmacists)
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub active: bool,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Pharmacist>, AppError> {
    let mut pharmacist = state
        .pharmacists
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("pharmacist {} not found", id)))?;

    pharmacist.active = payload.active;
    pharmacist.updated_at = Utc::now();

    Ok(Json(pharmacist.clone()))
}

#[derive(Serialize)]
pub struct QueueEntry {
    pub order: Order,
    pub offered_at: DateTime<Utc>,
}

/// Open offers for this pharmacist, oldest first.
async fn queue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<QueueEntry>>, AppError> {
    if !state.pharmacists.contains_key(&id) {
        return Err(AppError::NotFound(format!("pharmacist {} not found", id)));
    }

    let mut entries: Vec<QueueEntry> = state
        .assignments
        .iter()
        .filter(|entry| {
            entry.key().1 == id && entry.value().status == AssignmentStatus::Pending
        })
        .filter_map(|entry| {
            let order = state.orders.get(&entry.key().0)?.clone();
            Some(QueueEntry {
                order,
                offered_at: entry.value().created_at,
            })
        })
        .collect();
    entries.sort_by_key(|e| e.offered_at);

    Ok(Json(entries))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path((id, order_id)): Path<(Uuid, OrderId)>,
) -> Result<Json<Order>, AppError> {
    let order = pharmacist::accept(&state, order_id, id)?;
    Ok(Json(order))
}

#[derive(Serialize)]
pub struct RejectResponse {
    pub order_id: OrderId,
    pub remaining_offers: usize,
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path((id, order_id)): Path<(Uuid, OrderId)>,
) -> Result<Json<RejectResponse>, AppError> {
    let remaining_offers = pharmacist::reject(&state, order_id, id)?;
    Ok(Json(RejectResponse {
        order_id,
        remaining_offers,
    }))
}
