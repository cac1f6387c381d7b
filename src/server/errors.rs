//! HTTP error responses
//!
//! Every failure leaves the server as `{error_kind, message}` with a status
//! chosen by the kind of failure, so callers can tell retrieval problems
//! from generation problems from throttling.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::RagError;

pub const INVALID_REQUEST_KIND: &str = "invalid_request";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Rag(#[from] RagError),
}

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_kind: String,
    pub message: String,
}

impl ApiError {
    #[inline]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Rag(error) => match error {
                RagError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
                RagError::Service(_) | RagError::Generation(_) => StatusCode::BAD_GATEWAY,
                RagError::Retrieval(_) => StatusCode::SERVICE_UNAVAILABLE,
                RagError::IndexCorrupt(_)
                | RagError::Config(_)
                | RagError::Catalog(_)
                | RagError::Io(_)
                | RagError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => INVALID_REQUEST_KIND,
            Self::Rag(error) => error.kind(),
        }
    }

    #[inline]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error_kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", self.kind(), self);
        } else {
            warn!("Request rejected ({}): {}", self.kind(), self);
        }
        (status, Json(self.body())).into_response()
    }
}
