//! Token verifier for resource servers.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode};
use url::Url;

use crate::claims::{TokenClaims, role_audience};
use crate::error::TokenError;
use crate::keys::{TOKEN_ALGORITHM, VerifyingKey};

/// Verifies tokens issued by an [`Issuer`](crate::Issuer).
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use nova_authenticator::{Instance, Issuer, SigningKey, Verifier, VerifyingKey};
/// use std::collections::{BTreeSet, HashMap};
/// use std::time::Duration;
/// use url::Url;
///
/// let issuer_url = Url::parse("https://auth.example.com/").unwrap();
/// let private_pem = std::fs::read("tests/fixtures/signing_key.pem").unwrap();
/// let public_pem = std::fs::read("tests/fixtures/signing_key.pub.pem").unwrap();
///
/// let issuer = Issuer::new(
///     issuer_url.clone(),
///     SigningKey::from_pem(&private_pem).unwrap(),
///     Duration::from_secs(600),
/// );
/// let verifier = Verifier::new(issuer_url, VerifyingKey::from_pem(&public_pem).unwrap());
///
/// let now = Utc::now();
/// let instance = Instance {
///     id: "i-1".into(),
///     name: String::new(),
///     project_id: "p-1".into(),
///     user_id: "u-1".into(),
///     addresses: BTreeSet::new(),
///     metadata: HashMap::new(),
///     status: "ACTIVE".into(),
///     created: now,
///     updated: now,
/// };
///
/// let token = issuer.new_token(&instance, "web").unwrap();
/// let claims = verifier.verify_for_role(&token, "web").unwrap();
/// assert_eq!(claims.sub, "i-1");
/// ```
#[derive(Debug, Clone)]
pub struct Verifier {
    issuer: Url,
    key: VerifyingKey,
}

impl Verifier {
    /// Creates a verifier trusting tokens from `issuer` signed by `key`.
    #[must_use]
    pub fn new(issuer: Url, key: VerifyingKey) -> Self {
        Self { issuer, key }
    }

    /// Returns the trusted issuer identity.
    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    /// Verifies a token and returns its claims.
    ///
    /// This method:
    /// 1. Checks the RS256 signature with the trusted key
    /// 2. Checks `iss` equals the trusted issuer
    /// 3. Checks the token has not expired (no leeway)
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` - Signature doesn't match the trusted key
    /// - `TokenExpired` - Token has passed its expiration time
    /// - `InvalidClaims` - Issuer mismatch or missing claims
    /// - `InvalidTokenFormat` - Token is malformed or uses another algorithm
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);

        decode::<TokenClaims>(token, self.key.as_decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::TokenExpired,
                ErrorKind::InvalidIssuer => TokenError::InvalidClaims {
                    reason: "issuer is not trusted".to_string(),
                },
                ErrorKind::MissingRequiredClaim(claim) => TokenError::InvalidClaims {
                    reason: format!("missing {claim} claim"),
                },
                _ => TokenError::InvalidTokenFormat {
                    reason: e.to_string(),
                },
            })
    }

    /// Verifies a token and checks that it was issued for `role`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError` if verification fails or the audience is not the
    /// role's audience.
    pub fn verify_for_role(&self, token: &str, role: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(token)?;
        let expected = role_audience(&self.issuer, role)?;

        if claims.aud != expected {
            return Err(TokenError::AudienceMismatch { expected });
        }

        Ok(claims)
    }
}
