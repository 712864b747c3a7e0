use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, RuntimeErr, SqlErr};
use serde::Serialize;
use thiserror::Error;

use crate::{
    entity::{baskets::BasketStatus, orders::OrderStatus},
    response::{ApiResponse, Meta},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Basket is not available. Status: {status}")]
    BasketNotAvailable { status: BasketStatus },

    #[error("Basket pickup window has expired")]
    PickupWindowExpired,

    #[error("Not enough quantity available. Requested: {requested}, Available: {available}")]
    InsufficientInventory { requested: i32, available: i32 },

    #[error("Maximum quantity per order is {max}")]
    QuantityLimitExceeded { max: i32 },

    #[error("Cannot cancel order less than {cutoff_minutes} minutes before pickup start")]
    CancellationWindowClosed { cutoff_minutes: i64 },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Too early: {0}")]
    TooEarly(String),

    #[error("Failed to generate unique pickup code after {attempts} attempts")]
    PickupCodeExhausted { attempts: usize },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(resource.to_string())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn not_reserved(action: &str, current: OrderStatus) -> Self {
        AppError::InvalidStateTransition(format!(
            "Only reserved orders can be {action}. Current status: {current}"
        ))
    }

    /// Whether the failed unit of work may be re-run from scratch.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::OrmError(err) => is_conflict(err),
            AppError::DbError(err) => is_conflict_code(err),
            _ => false,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_)
            | AppError::BasketNotAvailable { .. }
            | AppError::PickupWindowExpired
            | AppError::InsufficientInventory { .. }
            | AppError::QuantityLimitExceeded { .. }
            | AppError::CancellationWindowClosed { .. }
            | AppError::InvalidStateTransition(_)
            | AppError::TooEarly(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PickupCodeExhausted { .. }
            | AppError::DbError(_)
            | AppError::OrmError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn is_conflict(err: &DbErr) -> bool {
    if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
        return true;
    }
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(inner))
        | DbErr::Query(RuntimeErr::SqlxError(inner))
        | DbErr::Conn(RuntimeErr::SqlxError(inner)) => is_conflict_code(inner),
        _ => false,
    }
}

// 40001 serialization_failure, 40P01 deadlock_detected, 5/517 SQLITE_BUSY.
fn is_conflict_code(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => matches!(
            db_err.code().as_deref(),
            Some("40001") | Some("40P01") | Some("5") | Some("517")
        ),
        _ => false,
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let message = match &self {
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let body = ApiResponse {
            message: message.clone(),
            data: Some(ErrorData { error: message }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
