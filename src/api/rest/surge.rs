use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde::Deserialize;
use tracing::info;

use crate::engine::surge::SurgeQuote;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/surge", get(current).post(set_manual).delete(clear_manual))
}

async fn current(State(state): State<Arc<AppState>>) -> Json<SurgeQuote> {
    Json(state.surge.current().await)
}

#[derive(Deserialize)]
pub struct SetSurgeRequest {
    pub amount: f64,
    pub reason: String,
}

async fn set_manual(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetSurgeRequest>,
) -> Result<Json<SurgeQuote>, AppError> {
    if !payload.amount.is_finite() || payload.amount < 0.0 {
        return Err(AppError::InvalidAmount(format!(
            "surge amount {} is not a valid fee",
            payload.amount
        )));
    }
    if payload.reason.trim().is_empty() {
        return Err(AppError::BadRequest("reason cannot be empty".to_string()));
    }

    state
        .surge
        .set_manual(payload.amount, payload.reason.trim().to_string())
        .await;
    state.metrics.surge_fee_amount.set(payload.amount);
    info!(amount = payload.amount, "manual surge set");

    Ok(Json(state.surge.current().await))
}

async fn clear_manual(State(state): State<Arc<AppState>>) -> Json<SurgeQuote> {
    state.surge.clear_manual().await;
    let quote = state.surge.current().await;
    state.metrics.surge_fee_amount.set(quote.amount);
    info!("manual surge cleared");
    Json(quote)
}
