//! Service configuration loaded once at startup.
//!
//! The configuration is a YAML document:
//!
//! ```yaml
//! listen: 0.0.0.0:18775
//! auth:
//!   limit: 3
//!   period: 5m
//!   signingKeyFile: /etc/nova-authenticator/signing.pem
//!   tokenIssuer: https://auth.example.com/
//!   tokenExpiry: 10m
//! roles:
//!   web:
//!     projectID: 0123456789abcdef
//!     metadata:
//!       env: prod
//! ```
//!
//! Durations use `humantime` syntax (`90s`, `5m`, `1h 30m`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::attestor::Attestor;
use crate::error::ConfigError;
use crate::instance::InstanceDirectory;
use crate::issuer::Issuer;
use crate::keys::SigningKey;
use crate::role::{Role, RoleRegistry};
use crate::tracker::AttemptTracker;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:18775";
/// Default number of attestation attempts per instance.
pub const DEFAULT_LIMIT: u32 = 3;
/// Default authentication period after instance creation.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5 * 60);
/// Default token lifetime.
pub const DEFAULT_TOKEN_EXPIRY: Duration = Duration::from_secs(10 * 60);

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP listener binds to
    pub listen: String,
    /// Attestation and token settings
    pub auth: AuthConfig,
    /// Role constraints by role name
    pub roles: HashMap<String, Role>,
    /// Certificate settings from older deployments. Accepted by the parser
    /// only so that [`Config::validate`] can refuse them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            auth: AuthConfig::default(),
            roles: HashMap::new(),
            tls: None,
        }
    }
}

/// A `tls` block naming a certificate and key.
///
/// The service listens in plaintext and expects a fronting proxy to
/// terminate TLS, so a configuration carrying this block fails validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TlsConfig {
    /// Path to the PEM certificate chain
    pub cert_file: PathBuf,
    /// Path to the PEM private key
    pub key_file: PathBuf,
}

/// Attestation and token settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthConfig {
    /// Maximum attestation attempts per instance
    pub limit: u32,
    /// How long after creation an instance may attest
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    /// Path to the PEM-encoded RSA signing key
    pub signing_key_file: PathBuf,
    /// Issuer identity, an absolute URL
    pub token_issuer: String,
    /// Lifetime of issued tokens
    #[serde(with = "humantime_serde")]
    pub token_expiry: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            period: DEFAULT_PERIOD,
            signing_key_file: PathBuf::new(),
            token_issuer: String::new(),
            token_expiry: DEFAULT_TOKEN_EXPIRY,
        }
    }
}

impl Config {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed YAML or durations and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that the schema alone cannot enforce.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tls.is_some() {
            return Err(ConfigError::Invalid {
                field: "tls",
                reason: "TLS is not served directly; terminate it at a fronting proxy \
                         and remove this block"
                    .to_string(),
            });
        }
        if self.auth.limit == 0 {
            return Err(ConfigError::Invalid {
                field: "auth.limit",
                reason: "must be a positive integer".to_string(),
            });
        }
        if self.auth.signing_key_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "auth.signingKeyFile",
                reason: "must be set".to_string(),
            });
        }
        self.issuer_url()?;
        Ok(())
    }

    /// Parses the token issuer identity.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the issuer is not an absolute URL
    /// that relative references can be resolved against.
    pub fn issuer_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.auth.token_issuer).map_err(|e| ConfigError::Invalid {
            field: "auth.tokenIssuer",
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                field: "auth.tokenIssuer",
                reason: "must be a hierarchical URL such as https://auth.example.com/".to_string(),
            });
        }
        Ok(url)
    }

    /// Builds the read-only role registry.
    #[must_use]
    pub fn role_registry(&self) -> RoleRegistry {
        RoleRegistry::new(self.roles.clone())
    }

    /// Reads the signing key named by `auth.signingKeyFile`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read and
    /// `ConfigError::SigningKey` if it does not hold a usable RSA key.
    pub fn load_signing_key(&self) -> Result<SigningKey, ConfigError> {
        let path = &self.auth.signing_key_file;
        let pem = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        SigningKey::from_pem(&pem).map_err(ConfigError::SigningKey)
    }

    /// Builds the token issuer.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the issuer URL or signing key is unusable.
    pub fn build_issuer(&self) -> Result<Issuer, ConfigError> {
        Ok(Issuer::new(
            self.issuer_url()?,
            self.load_signing_key()?,
            self.auth.token_expiry,
        ))
    }

    /// Builds an attestor over `directory` with a fresh attempt tracker.
    #[must_use]
    pub fn build_attestor<D: InstanceDirectory>(&self, directory: D) -> Attestor<D> {
        Attestor::new(
            directory,
            self.role_registry(),
            AttemptTracker::new(self.auth.limit),
            self.auth.period,
        )
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
