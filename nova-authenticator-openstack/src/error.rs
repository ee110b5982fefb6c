//! Error types for building an OpenStack client.

use std::fmt;

/// Errors raised while reading credentials or authenticating against
/// Keystone.
///
/// Lookup failures after construction are reported as
/// [`DirectoryError`](nova_authenticator::DirectoryError) instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenStackError {
    /// A required environment variable is unset or empty.
    MissingVariable {
        /// Name of the variable, or the alternatives that would satisfy it
        name: &'static str,
    },
    /// The HTTP client could not be built or the request was not sent.
    Http {
        /// Description of the transport failure
        reason: String,
    },
    /// Keystone refused the credentials.
    Authentication {
        /// HTTP status code returned by Keystone
        status: u16,
        /// Response body, if it could be read
        message: String,
    },
    /// Keystone accepted the credentials but returned no `X-Subject-Token`.
    MissingToken,
    /// The service catalog has no matching compute endpoint.
    EndpointNotFound {
        /// The endpoint interface that was requested
        interface: String,
        /// The region that was requested, if any
        region: Option<String>,
    },
    /// Keystone answered with a body that could not be decoded.
    InvalidResponse {
        /// Description of the decoding failure
        reason: String,
    },
}

impl fmt::Display for OpenStackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVariable { name } => {
                write!(f, "missing environment variable: {name}")
            }
            Self::Http { reason } => write!(f, "openstack request failed: {reason}"),
            Self::Authentication { status, message } => {
                write!(f, "keystone authentication failed ({status}): {message}")
            }
            Self::MissingToken => write!(f, "keystone response carried no subject token"),
            Self::EndpointNotFound { interface, region } => match region {
                Some(region) => write!(
                    f,
                    "no {interface} compute endpoint in region '{region}'"
                ),
                None => write!(f, "no {interface} compute endpoint in service catalog"),
            },
            Self::InvalidResponse { reason } => {
                write!(f, "invalid keystone response: {reason}")
            }
        }
    }
}

impl std::error::Error for OpenStackError {}
