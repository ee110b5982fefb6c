//! Token claim set.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TokenError;

/// Claims carried in an issued token.
///
/// Serialized as the JWT payload with exactly these fields; `instance_name`
/// is left out when the instance has no display name.
///
/// # Example
///
/// ```
/// use nova_authenticator::TokenClaims;
/// use std::time::Duration;
///
/// let claims = TokenClaims::builder()
///     .issuer("https://auth.example.com/")
///     .subject("i-1")
///     .audience("https://auth.example.com/roles/web")
///     .lifetime(Duration::from_secs(600))
///     .build()
///     .unwrap();
///
/// assert_eq!(claims.exp - claims.iat, 600);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer identity
    pub iss: String,
    /// Instance identifier
    pub sub: String,
    /// Role audience URL
    pub aud: String,
    /// Expiry, seconds since the epoch
    pub exp: i64,
    /// Issue time, seconds since the epoch
    pub iat: i64,
    /// Instance display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
}

impl TokenClaims {
    /// Creates a new builder for token claims.
    #[must_use]
    pub fn builder() -> TokenClaimsBuilder {
        TokenClaimsBuilder::new()
    }

    /// Returns true if the claims have expired at `now`.
    ///
    /// A token is still valid during the second named by `exp`, matching
    /// [`Verifier::verify`](crate::Verifier::verify).
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.exp
    }
}

/// Returns the audience for tokens scoped to `role`.
///
/// The audience is the reference `roles/<role>` resolved against the issuer
/// URL, so an issuer of `https://auth.example.com/` yields
/// `https://auth.example.com/roles/web` for the role `web`.
///
/// # Errors
///
/// Returns `TokenError::InvalidAudience` if the reference cannot be resolved.
///
/// # Examples
///
/// ```
/// use nova_authenticator::role_audience;
/// use url::Url;
///
/// let issuer = Url::parse("https://auth.example.com/v1/").unwrap();
/// assert_eq!(
///     role_audience(&issuer, "web").unwrap(),
///     "https://auth.example.com/v1/roles/web"
/// );
/// ```
pub fn role_audience(issuer: &Url, role: &str) -> Result<String, TokenError> {
    issuer
        .join(&format!("roles/{role}"))
        .map(String::from)
        .map_err(|_| TokenError::InvalidAudience {
            role: role.to_string(),
        })
}

/// Builder for constructing [`TokenClaims`].
#[derive(Debug, Clone)]
pub struct TokenClaimsBuilder {
    issuer: Option<String>,
    subject: Option<String>,
    audience: Option<String>,
    lifetime: Duration,
    issued_at: Option<DateTime<Utc>>,
    instance_name: Option<String>,
}

impl TokenClaimsBuilder {
    /// Creates a new builder with a default lifetime of 10 minutes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            issuer: None,
            subject: None,
            audience: None,
            lifetime: Duration::from_secs(600),
            issued_at: None,
            instance_name: None,
        }
    }

    /// Sets the issuer identity.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Sets the subject (instance identifier).
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the audience.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the token lifetime. Sub-second parts are dropped.
    #[must_use]
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Sets the issue time; defaults to the time `build` is called.
    #[must_use]
    pub fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    /// Sets the instance display name. An empty name is left out.
    #[must_use]
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.instance_name = (!name.is_empty()).then_some(name);
        self
    }

    /// Builds the claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::MissingField` if issuer, subject or audience is
    /// not set, and `TokenError::InvalidLifetime` if the expiry overflows.
    pub fn build(self) -> Result<TokenClaims, TokenError> {
        let iss = self
            .issuer
            .ok_or(TokenError::MissingField { field: "iss" })?;
        let sub = self
            .subject
            .ok_or(TokenError::MissingField { field: "sub" })?;
        let aud = self
            .audience
            .ok_or(TokenError::MissingField { field: "aud" })?;

        let iat = self.issued_at.unwrap_or_else(Utc::now).timestamp();
        let exp = i64::try_from(self.lifetime.as_secs())
            .ok()
            .and_then(|lifetime| iat.checked_add(lifetime))
            .ok_or(TokenError::InvalidLifetime)?;

        Ok(TokenClaims {
            iss,
            sub,
            aud,
            exp,
            iat,
            instance_name: self.instance_name,
        })
    }
}

impl Default for TokenClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
