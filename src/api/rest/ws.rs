use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::notify::{Destination, Role};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((role, id)): Path<(String, Uuid)>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let role = match role.as_str() {
        "customer" => Role::Customer,
        "pharmacist" => Role::Pharmacist,
        "agent" => Role::Agent,
        other => {
            return Err(AppError::BadRequest(format!("unknown role {other}")));
        }
    };
    let dest = Destination { role, id };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, dest)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, dest: Destination) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.notifier.subscribe(dest);

    info!(role = ?dest.role, id = %dest.id, "notice stream connected");

    let send_task = tokio::spawn(async move {
        while let Ok(notice) = rx.recv().await {
            let json = match serde_json::to_string(&notice) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize notice for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(role = ?dest.role, id = %dest.id, "notice stream disconnected");
}
