//! Token issuer for attested instances.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::Header;
use tracing::info;
use url::Url;

use crate::claims::{TokenClaims, TokenClaimsBuilder, role_audience};
use crate::error::TokenError;
use crate::instance::Instance;
use crate::keys::{SigningKey, TOKEN_ALGORITHM};

/// Creates signed tokens for instances that passed attestation.
///
/// Tokens are RS256 JWS compact serializations whose payload is a
/// [`TokenClaims`].
///
/// # Example
///
/// ```
/// use nova_authenticator::{Issuer, SigningKey};
/// use std::time::Duration;
/// use url::Url;
///
/// let pem = std::fs::read("tests/fixtures/signing_key.pem").unwrap();
/// let issuer = Issuer::new(
///     Url::parse("https://auth.example.com/").unwrap(),
///     SigningKey::from_pem(&pem).unwrap(),
///     Duration::from_secs(600),
/// );
///
/// assert_eq!(issuer.audience_for("web").unwrap(), "https://auth.example.com/roles/web");
/// ```
#[derive(Debug, Clone)]
pub struct Issuer {
    issuer: Url,
    signing_key: SigningKey,
    lifetime: Duration,
}

impl Issuer {
    /// Creates a new issuer.
    ///
    /// # Arguments
    ///
    /// * `issuer` - Issuer identity placed in `iss` and used as the base of audiences
    /// * `signing_key` - The RSA signing key
    /// * `lifetime` - How long issued tokens stay valid
    #[must_use]
    pub fn new(issuer: Url, signing_key: SigningKey, lifetime: Duration) -> Self {
        Self {
            issuer,
            signing_key,
            lifetime,
        }
    }

    /// Returns the issuer identity.
    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    /// Returns the lifetime of issued tokens.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Returns the audience used for tokens scoped to `role`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidAudience` if the role cannot be resolved
    /// against the issuer URL.
    pub fn audience_for(&self, role: &str) -> Result<String, TokenError> {
        role_audience(&self.issuer, role)
    }

    /// Issues a token for a verified instance, valid from now.
    ///
    /// # Errors
    ///
    /// Returns `TokenError` if the claims cannot be built or signed.
    pub fn new_token(&self, instance: &Instance, role: &str) -> Result<String, TokenError> {
        self.issue_at(instance, role, Utc::now())
    }

    /// Issues a token for a verified instance with `now` as its issue time.
    ///
    /// # Errors
    ///
    /// Returns `TokenError` if the claims cannot be built or signed.
    pub fn issue_at(
        &self,
        instance: &Instance,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = TokenClaimsBuilder::new()
            .issuer(self.issuer.as_str())
            .subject(&instance.id)
            .audience(self.audience_for(role)?)
            .instance_name(&instance.name)
            .lifetime(self.lifetime)
            .issued_at(now)
            .build()?;

        let token = self.issue_claims(&claims)?;
        info!(instance_id = %instance.id, role, exp = claims.exp, "issued token");
        Ok(token)
    }

    /// Signs pre-built claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::SigningFailed` if serialization or signing fails.
    pub fn issue_claims(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(
            &Header::new(TOKEN_ALGORITHM),
            claims,
            self.signing_key.as_encoding_key(),
        )
        .map_err(|e| TokenError::SigningFailed {
            reason: e.to_string(),
        })
    }
}
