//! Error types for the entitlement and workflow core

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::workflow::WorkflowStatus;

#[derive(Error, Debug)]
pub enum AppError {
    /// Unknown actor, tenant, module or item
    #[error("Not found: {0}")]
    NotFound(String),

    /// Actor, tenant or subcontractor has been deactivated
    #[error("Access is inactive")]
    Inactive,

    /// An authorization rule failed. Carries no detail on purpose.
    #[error("Not permitted")]
    PolicyViolation,

    #[error("Invalid transition: cannot move item from {current}")]
    InvalidTransition { current: WorkflowStatus },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage failure")]
    Database(#[from] sqlx::Error),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build a `PolicyViolation`, logging the real reason at debug level only.
    pub fn denied(reason: &str) -> Self {
        tracing::debug!(reason, "policy violation");
        AppError::PolicyViolation
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Inactive => (StatusCode::FORBIDDEN, "You do not have access".to_string()),
            AppError::PolicyViolation => (
                StatusCode::FORBIDDEN,
                "You are not allowed to do this".to_string(),
            ),
            AppError::InvalidTransition { current } => (
                StatusCode::CONFLICT,
                format!("Cannot move this item from {}", current),
            ),
            AppError::BadRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage failure".to_string())
            }
            AppError::Dispatch(e) => {
                tracing::error!("Dispatch error: {}", e);
                (StatusCode::BAD_GATEWAY, "Dispatch failure".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
