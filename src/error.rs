use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::order::{OrderId, OrderStatus};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid transition: order {order_id} is {current:?}, cannot move to {to:?}")]
    InvalidTransition {
        order_id: OrderId,
        current: OrderStatus,
        to: OrderStatus,
    },

    #[error("no pharmacists available")]
    NoPharmacistsAvailable,

    #[error("no delivery agents available")]
    NoAgentsAvailable,

    #[error("otp invalid or expired")]
    OtpInvalidOrExpired,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidTransition { .. } => (StatusCode::CONFLICT, self.to_string()),
            AppError::NoPharmacistsAvailable | AppError::NoAgentsAvailable => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::OtpInvalidOrExpired => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
