//! Key types for token signing and verification.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use crate::error::TokenError;

/// Signature algorithm used for every issued token.
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::RS256;

/// An RSA private key used to sign tokens.
///
/// The key is exercised once when it is loaded, so a PEM file that decodes
/// but does not hold a usable RSA key is rejected at startup rather than on
/// the first token.
#[derive(Clone)]
pub struct SigningKey {
    inner: EncodingKey,
}

impl SigningKey {
    /// Loads a signing key from PEM (PKCS#1 `RSA PRIVATE KEY`).
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidKeyFormat` if the PEM cannot be decoded or
    /// the key cannot produce an RS256 signature.
    pub fn from_pem(pem: &[u8]) -> Result<Self, TokenError> {
        let inner = EncodingKey::from_rsa_pem(pem).map_err(|e| TokenError::InvalidKeyFormat {
            reason: e.to_string(),
        })?;

        jsonwebtoken::crypto::sign(b"probe", &inner, TOKEN_ALGORITHM).map_err(|e| {
            TokenError::InvalidKeyFormat {
                reason: e.to_string(),
            }
        })?;

        Ok(Self { inner })
    }

    pub(crate) fn as_encoding_key(&self) -> &EncodingKey {
        &self.inner
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &TOKEN_ALGORITHM)
            .finish_non_exhaustive()
    }
}

/// An RSA public key used to verify tokens.
#[derive(Clone)]
pub struct VerifyingKey {
    inner: DecodingKey,
}

impl VerifyingKey {
    /// Loads a verifying key from PEM (`PUBLIC KEY` or `RSA PUBLIC KEY`).
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidKeyFormat` if the PEM is not an RSA public
    /// key.
    pub fn from_pem(pem: &[u8]) -> Result<Self, TokenError> {
        DecodingKey::from_rsa_pem(pem)
            .map(|inner| Self { inner })
            .map_err(|e| TokenError::InvalidKeyFormat {
                reason: e.to_string(),
            })
    }

    pub(crate) fn as_decoding_key(&self) -> &DecodingKey {
        &self.inner
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyingKey")
            .field("algorithm", &TOKEN_ALGORITHM)
            .finish_non_exhaustive()
    }
}
