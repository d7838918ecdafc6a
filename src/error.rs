use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::models::{Chain, TransactionStatus};

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Lease error: {0}")]
    Lease(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),
}

/// Errors raised while resolving receipts or balances through the chain gateway
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Request to {chain} timed out")]
    Timeout { chain: Chain },

    #[error("Transport failure on {chain}: {message}")]
    Transport { chain: Chain, message: String },

    #[error("Gateway returned {status} for {chain}")]
    UnexpectedStatus { chain: Chain, status: u16 },

    #[error("Could not decode gateway response for {chain}: {message}")]
    Decode { chain: Chain, message: String },
}

/// Transaction record errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} has no hash")]
    MissingHash(Uuid),

    #[error("Transaction {id} has malformed metadata: {reason}")]
    MalformedMetadata { id: Uuid, reason: String },

    #[error("Transaction {id} cannot move to {to:?}")]
    InvalidTransition { id: Uuid, to: TransactionStatus },
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::InvalidInput(reason) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                format!("Invalid input: {}", reason),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = AppError::NotFound("transaction".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_resolver_error_message_names_chain() {
        let err: AppError = ResolverError::UnexpectedStatus {
            chain: Chain::Ethereum,
            status: 502,
        }
        .into();
        assert_eq!(err.to_string(), "Resolver error: Gateway returned 502 for ethereum");
    }

    #[test]
    fn test_lease_error_is_internal_to_clients() {
        let err = AppError::Lease("failed to acquire lease transaction-reconciler".into());
        assert_eq!(
            err.to_string(),
            "Lease error: failed to acquire lease transaction-reconciler"
        );
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
