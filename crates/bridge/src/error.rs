use thiserror::Error;

use crate::protocol::anthropic::response::{ErrorBody, ErrorResponse};

/// Errors raised while translating a downstream request into an upstream one.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("image source kind is not supported")]
    UnsupportedImage,
}

impl TranslationError {
    pub fn into_anthropic_error(self) -> ErrorResponse {
        match self {
            TranslationError::UnsupportedImage => {
                ErrorResponse::new(ErrorBody::invalid_request("unsupported image source"))
            }
        }
    }
}

/// Errors surfaced while servicing a single HTTP request — carries enough
/// to pick both an HTTP status and an Anthropic-shaped error envelope.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An upstream API error, non-streaming path. `status` is the upstream's
    /// own status when present, otherwise a generic 502.
    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::Upstream { status, .. } => *status,
            GatewayError::Translation(_) => 400,
            GatewayError::Internal(_) => 500,
        }
    }

    pub fn into_anthropic_error(self) -> ErrorResponse {
        match self {
            GatewayError::InvalidRequest(message) => ErrorResponse::new(ErrorBody::invalid_request(message)),
            GatewayError::Upstream { message, .. } => ErrorResponse::new(ErrorBody::api_error(message)),
            GatewayError::Translation(err) => err.into_anthropic_error(),
            GatewayError::Internal(message) => ErrorResponse::new(ErrorBody::api_error(message)),
        }
    }
}
