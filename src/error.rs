//! Error types for attestation, directory lookup, token and configuration
//! operations.

use std::fmt;

/// Errors returned by an [`InstanceDirectory`](crate::InstanceDirectory)
/// lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory has no instance with this identifier.
    NotFound {
        /// The instance identifier that was requested
        instance_id: String,
    },
    /// The directory could not be reached or answered with an error.
    Unreachable {
        /// Description of the transport or service failure
        reason: String,
    },
    /// The directory answered but the instance record could not be decoded.
    InvalidResponse {
        /// Description of the decoding failure
        reason: String,
    },
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { instance_id } => write!(f, "instance '{instance_id}' not found"),
            Self::Unreachable { reason } => {
                write!(f, "instance directory unreachable: {reason}")
            }
            Self::InvalidResponse { reason } => {
                write!(f, "invalid instance directory response: {reason}")
            }
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Reasons an attestation attempt is rejected.
///
/// The transport maps every variant to the same class of response. Its
/// message is [`AttestationError::public_reason`], which drops directory
/// transport details that `Display` keeps for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationError {
    /// The requested role is not configured.
    UnknownRole {
        /// The role name that was requested
        role: String,
    },
    /// The instance record could not be fetched.
    LookupFailed(DirectoryError),
    /// The instance is older than the configured authentication period.
    PeriodExceeded {
        /// When the authentication period ended (RFC 3339)
        deadline: String,
    },
    /// The instance has used up its attestation attempts.
    TooManyAttempts {
        /// Attempt count after recording this attempt
        count: u32,
        /// Configured maximum
        limit: u32,
    },
    /// The instance is not in the active state.
    InstanceNotActive {
        /// The status reported by the directory
        status: String,
    },
    /// The caller's address is not one of the instance's addresses.
    AddressMismatch {
        /// The caller's address
        remote_addr: String,
    },
    /// A metadata entry required by the role is missing or different.
    MetadataMismatch {
        /// The required metadata key
        key: String,
        /// True when the key is absent from the instance metadata
        missing: bool,
    },
    /// The instance belongs to a different project than the role requires.
    ProjectMismatch {
        /// Project required by the role
        expected: String,
        /// Project the instance belongs to
        actual: String,
    },
    /// The instance was created by a different user than the role requires.
    UserMismatch {
        /// User required by the role
        expected: String,
        /// User that owns the instance
        actual: String,
    },
}

impl fmt::Display for AttestationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRole { role } => write!(f, "invalid role name: {role}"),
            Self::LookupFailed(err) => write!(f, "instance lookup failed: {err}"),
            Self::PeriodExceeded { deadline } => {
                write!(f, "authentication deadline exceeded at {deadline}")
            }
            Self::TooManyAttempts { count, limit } => {
                write!(
                    f,
                    "too many authentication attempts ({count} of {limit} allowed)"
                )
            }
            Self::InstanceNotActive { status } => {
                write!(f, "instance is not active (status {status})")
            }
            Self::AddressMismatch { remote_addr } => {
                write!(f, "address mismatched: {remote_addr}")
            }
            Self::MetadataMismatch { key, missing: true } => {
                write!(f, "metadata key '{key}' not found")
            }
            Self::MetadataMismatch { key, missing: false } => {
                write!(f, "metadata key '{key}' mismatched")
            }
            Self::ProjectMismatch { .. } => write!(f, "project ID mismatched"),
            Self::UserMismatch { .. } => write!(f, "user ID mismatched"),
        }
    }
}

impl AttestationError {
    /// Returns the rejection reason to show the caller.
    ///
    /// Identical to the `Display` text except for directory failures other
    /// than not-found, whose details may name internal endpoints.
    #[must_use]
    pub fn public_reason(&self) -> String {
        match self {
            Self::LookupFailed(
                DirectoryError::Unreachable { .. } | DirectoryError::InvalidResponse { .. },
            ) => "instance lookup failed: instance directory unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl std::error::Error for AttestationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::LookupFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DirectoryError> for AttestationError {
    fn from(err: DirectoryError) -> Self {
        Self::LookupFailed(err)
    }
}

/// Errors that can occur while issuing or verifying tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// A required claim was not provided.
    MissingField {
        /// Name of the missing claim
        field: &'static str,
    },
    /// The claims could not be serialized or signed.
    SigningFailed {
        /// Description of the signing failure
        reason: String,
    },
    /// Key material is not a usable RSA key.
    InvalidKeyFormat {
        /// Description of the key error
        reason: String,
    },
    /// The token lifetime cannot be represented as a timestamp offset.
    InvalidLifetime,
    /// The role name cannot be turned into an audience URL.
    InvalidAudience {
        /// The role name
        role: String,
    },
    /// Token signature verification failed.
    InvalidSignature,
    /// Token has expired.
    TokenExpired,
    /// Token format is invalid.
    InvalidTokenFormat {
        /// Description of the format error
        reason: String,
    },
    /// Claims are missing or do not match what the verifier expects.
    InvalidClaims {
        /// Description of the claim error
        reason: String,
    },
    /// The token was issued for another role.
    AudienceMismatch {
        /// Audience the verifier expected
        expected: String,
    },
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => {
                write!(f, "missing required field '{field}' in token claims")
            }
            Self::SigningFailed { reason } => write!(f, "failed to sign token: {reason}"),
            Self::InvalidKeyFormat { reason } => write!(f, "invalid key format: {reason}"),
            Self::InvalidLifetime => write!(f, "token lifetime is out of range"),
            Self::InvalidAudience { role } => {
                write!(f, "cannot derive audience for role '{role}'")
            }
            Self::InvalidSignature => {
                write!(
                    f,
                    "token signature verification failed; token may have been tampered with"
                )
            }
            Self::TokenExpired => write!(f, "token expired; attest again for a new token"),
            Self::InvalidTokenFormat { reason } => write!(f, "invalid token format: {reason}"),
            Self::InvalidClaims { reason } => write!(f, "invalid claims: {reason}"),
            Self::AudienceMismatch { expected } => {
                write!(f, "token audience does not include '{expected}'")
            }
        }
    }
}

impl std::error::Error for TokenError {}

/// Errors raised while loading configuration at startup.
#[derive(Debug)]
pub enum ConfigError {
    /// A file could not be read.
    Io {
        /// Path that failed to load
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The configuration document is not valid YAML for this schema.
    Parse {
        /// Description of the parse error, including durations that failed to parse
        reason: String,
    },
    /// A configuration value is out of range or inconsistent.
    Invalid {
        /// Name of the offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
    /// The signing key could not be loaded.
    SigningKey(TokenError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read '{path}': {source}"),
            Self::Parse { reason } => write!(f, "invalid configuration: {reason}"),
            Self::Invalid { field, reason } => write!(f, "invalid value for '{field}': {reason}"),
            Self::SigningKey(err) => write!(f, "cannot load signing key: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::SigningKey(err) => Some(err),
            Self::Parse { .. } | Self::Invalid { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_messages_distinguish_missing_from_mismatched() {
        let missing = AttestationError::MetadataMismatch {
            key: "env".into(),
            missing: true,
        };
        let mismatched = AttestationError::MetadataMismatch {
            key: "env".into(),
            missing: false,
        };

        assert_eq!(missing.to_string(), "metadata key 'env' not found");
        assert_eq!(mismatched.to_string(), "metadata key 'env' mismatched");
    }

    #[test]
    fn lookup_failure_wraps_directory_error() {
        let err: AttestationError = DirectoryError::NotFound {
            instance_id: "i-1".into(),
        }
        .into();

        assert_eq!(err.to_string(), "instance lookup failed: instance 'i-1' not found");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn public_reason_hides_directory_transport_details() {
        let unreachable: AttestationError = DirectoryError::Unreachable {
            reason: "error sending request for url (http://nova.internal:8774/v2.1/servers/i-1)"
                .into(),
        }
        .into();
        let not_found: AttestationError = DirectoryError::NotFound {
            instance_id: "i-1".into(),
        }
        .into();

        assert_eq!(
            unreachable.public_reason(),
            "instance lookup failed: instance directory unavailable"
        );
        assert!(unreachable.to_string().contains("nova.internal"));
        assert_eq!(not_found.public_reason(), not_found.to_string());
    }
}
