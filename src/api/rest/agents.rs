use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{patch, post};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::actor::Agent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", post(register).get(list))
        .route("/agents/:id/online", post(go_online))
        .route("/agents/:id/offline", post(go_offline))
        .route("/agents/:id/location", patch(update_location))
}

#[derive(Deserialize)]
pub struct RegisterAgentRequest {
    pub name: String,
    pub location: GeoPoint,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterAgentRequest>,
) -> Result<Json<Agent>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let agent = Agent {
        id: Uuid::new_v4(),
        name: payload.name,
        online: true,
        location: payload.location.clone(),
        updated_at: Utc::now(),
    };

    state.agents.insert(agent.id, agent.clone());
    state.agent_index.upsert(agent.id, payload.location);

    Ok(Json(agent))
}

async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<Agent>> {
    let agents = state.agents.iter().map(|entry| entry.value().clone()).collect();
    Json(agents)
}

async fn go_online(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Agent>, AppError> {
    let agent = {
        let mut agent = state
            .agents
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("agent {} not found", id)))?;
        agent.online = true;
        agent.updated_at = Utc::now();
        agent.clone()
    };

    state.agent_index.upsert(id, agent.location.clone());
    Ok(Json(agent))
}

async fn go_offline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Agent>, AppError> {
    let agent = {
        let mut agent = state
            .agents
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("agent {} not found", id)))?;
        agent.online = false;
        agent.updated_at = Utc::now();
        agent.clone()
    };

    state.agent_index.remove(&id);
    Ok(Json(agent))
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Serialize)]
pub struct UpdateLocationResponse {
    pub applied: bool,
    pub agent: Agent,
}

/// Pings inside the throttle window are acknowledged but not applied.
async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<UpdateLocationResponse>, AppError> {
    let throttle = chrono::Duration::seconds(state.config.location_throttle_secs as i64);

    let (applied, agent) = {
        let mut agent = state
            .agents
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("agent {} not found", id)))?;

        if Utc::now() - agent.updated_at < throttle {
            (false, agent.clone())
        } else {
            agent.location = payload.location.clone();
            agent.updated_at = Utc::now();
            (true, agent.clone())
        }
    };

    if applied && agent.online {
        state.agent_index.upsert(id, payload.location);
    }

    Ok(Json(UpdateLocationResponse { applied, agent }))
}
