//! Application error types
//!
//! Every fallible operation in the payment core returns [`AppResult`]. The
//! HTTP layer turns an [`AppError`] into `{ "error": ..., "details": ... }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::database::error::DatabaseError;

/// Result type used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// Errors raised while talking to a payment provider
#[derive(Debug, Clone, Error)]
pub enum ExternalError {
    /// The provider answered but refused the request
    #[error("{provider} rejected the request: {message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    /// The provider could not be reached or answered garbage
    #[error("{service} is unreachable: {message}")]
    Network { service: String, message: String },
}

/// Errors in the service's own infrastructure
#[derive(Debug, Clone, Error)]
pub enum InfrastructureError {
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Error)]
pub enum AppErrorKind {
    #[error("validation failed: {message}")]
    Validation { message: String },
    /// The request is well formed but the resource's state forbids it
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },
    #[error("signature mismatch on {provider} callback")]
    SignatureMismatch { provider: String },
    #[error(transparent)]
    External(#[from] ExternalError),
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(AppErrorKind::Validation {
            message: message.into(),
        })
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::new(AppErrorKind::Conflict {
            message: message.into(),
        })
    }

    pub fn not_found<E: Into<String>, I: ToString>(entity: E, id: I) -> Self {
        Self::new(AppErrorKind::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, AppErrorKind::NotFound { .. })
    }

    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self.kind, AppErrorKind::SignatureMismatch { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            AppErrorKind::Validation { .. } => StatusCode::BAD_REQUEST,
            AppErrorKind::Conflict { .. } => StatusCode::CONFLICT,
            AppErrorKind::NotFound { .. } => StatusCode::NOT_FOUND,
            AppErrorKind::SignatureMismatch { .. } => StatusCode::BAD_REQUEST,
            AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                if *is_retryable {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::BAD_REQUEST
                }
            }
            AppErrorKind::External(ExternalError::Network { .. }) => StatusCode::BAD_GATEWAY,
            AppErrorKind::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Internal failures never leak details.
    fn public_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Validation { message } | AppErrorKind::Conflict { message } => {
                message.clone()
            }
            AppErrorKind::NotFound { entity, .. } => format!("{} not found", entity),
            AppErrorKind::SignatureMismatch { .. } => "Invalid signature".to_string(),
            AppErrorKind::External(ExternalError::PaymentProvider { provider, .. }) => {
                format!("{} payment could not be started", provider)
            }
            AppErrorKind::External(ExternalError::Network { service, .. }) => {
                format!("{} is unavailable", service)
            }
            AppErrorKind::Infrastructure(_) => "Payment could not be processed".to_string(),
        }
    }

    fn details(&self) -> Option<String> {
        match &self.kind {
            AppErrorKind::External(ExternalError::PaymentProvider { message, .. }) => {
                Some(message.clone())
            }
            AppErrorKind::External(ExternalError::Network { message, .. }) => {
                Some(message.clone())
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.kind, context),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AppError {}

impl From<DatabaseError> for AppError {
    fn from(error: DatabaseError) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Database(
            error,
        )))
    }
}

impl From<ExternalError> for AppError {
    fn from(error: ExternalError) -> Self {
        Self::new(AppErrorKind::External(error))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = match self.details() {
            Some(details) => json!({ "error": self.public_message(), "details": details }),
            None => json!({ "error": self.public_message() }),
        };

        (status, Json(body)).into_response()
    }
}
