//! Error types for the HTTP surface and the service binary.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nova_authenticator::{AttestationError, ConfigError, TokenError};
use nova_authenticator_openstack::OpenStackError;
use serde::Serialize;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable reason
    pub error: String,
}

/// Reasons an `/auth` request does not yield a token.
#[derive(Debug)]
pub enum ApiError {
    /// The request used a method other than `POST`.
    MethodNotAllowed,
    /// The `instance_id` field is missing or empty.
    InvalidInstanceId,
    /// The `role` field is missing or empty.
    InvalidRole,
    /// Attestation rejected the caller.
    AuthenticationFailed(AttestationError),
    /// Token signing failed.
    Signing(TokenError),
    /// The attestation task did not complete.
    Task {
        /// Description of the join failure
        reason: String,
    },
}

impl ApiError {
    /// Returns the HTTP status this error is answered with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidInstanceId | Self::InvalidRole | Self::AuthenticationFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Signing(_) | Self::Task { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MethodNotAllowed => write!(f, "Method Not Allowed"),
            Self::InvalidInstanceId => write!(f, "Invalid instance ID"),
            Self::InvalidRole => write!(f, "Invalid role"),
            Self::AuthenticationFailed(err) => {
                write!(f, "Authentication failed: {}", err.public_reason())
            }
            // Internal details stay in the log.
            Self::Signing(_) | Self::Task { .. } => write!(f, "Internal Server Error"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AuthenticationFailed(err) => Some(err),
            Self::Signing(err) => Some(err),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

/// Errors that stop the service from starting or running.
#[derive(Debug)]
pub enum ServerError {
    /// The configuration could not be loaded.
    Config(ConfigError),
    /// The OpenStack client could not be built.
    OpenStack(OpenStackError),
    /// Logging could not be initialised.
    Logging {
        /// Description of the failure
        reason: String,
    },
    /// Binding or serving the listener failed.
    Io {
        /// What was being attempted
        context: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// A blocking startup task did not complete.
    Task {
        /// Description of the join failure
        reason: String,
    },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::OpenStack(err) => write!(f, "openstack error: {err}"),
            Self::Logging { reason } => write!(f, "failed to initialise logging: {reason}"),
            Self::Io { context, source } => write!(f, "{context}: {source}"),
            Self::Task { reason } => write!(f, "startup task failed: {reason}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::OpenStack(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Logging { .. } | Self::Task { .. } => None,
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<OpenStackError> for ServerError {
    fn from(err: OpenStackError) -> Self {
        Self::OpenStack(err)
    }
}
