pub mod agents;
pub mod deliveries;
pub mod orders;
pub mod payments;
pub mod pharmacists;
pub mod refunds;
pub mod surge;
pub mod ws;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(orders::router())
        .merge(payments::router())
        .merge(pharmacists::router())
        .merge(agents::router())
        .merge(deliveries::router())
        .merge(surge::router())
        .merge(refunds::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws/:role/:id", get(ws::ws_handler))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    orders: usize,
    pharmacists: usize,
    agents: usize,
    deliveries: usize,
    refunds: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        orders: state.orders.len(),
        pharmacists: state.pharmacists.len(),
        agents: state.agents.len(),
        deliveries: state.deliveries.len(),
        refunds: state.refunds.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
