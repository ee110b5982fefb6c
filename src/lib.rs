//! Instance attestation and role-scoped token issuance for OpenStack Nova.
//!
//! A compute instance proves who it is by calling the authenticator from one
//! of its own addresses, naming its instance ID and the role it wants. The
//! authenticator compares the claim against the authoritative instance record
//! and, if everything lines up, returns a short-lived signed token scoped to
//! that role.
//!
//! # Overview
//!
//! ```text
//! attest(instance_id, role, remote_addr)
//!     -> RoleRegistry lookup
//!     -> InstanceDirectory fetch
//!     -> period, attempt limit, status, address, metadata, project, user
//!     -> Instance
//! Issuer::new_token(instance, role)
//!     -> RS256 JWT
//! ```
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use nova_authenticator::{
//!     Attestor, AttemptTracker, Instance, Issuer, Role, RoleRegistry, SigningKey,
//!     StaticDirectory, Verifier, VerifyingKey,
//! };
//! use std::collections::{BTreeSet, HashMap};
//! use std::time::Duration;
//! use url::Url;
//!
//! let now = Utc::now();
//! let directory = StaticDirectory::new().with_instance(Instance {
//!     id: "4f1c2b9e".into(),
//!     name: "web-1".into(),
//!     project_id: "p-1".into(),
//!     user_id: "u-1".into(),
//!     addresses: BTreeSet::from(["10.0.0.5".to_string()]),
//!     metadata: HashMap::from([("env".to_string(), "prod".to_string())]),
//!     status: "ACTIVE".into(),
//!     created: now,
//!     updated: now,
//! });
//! let roles = RoleRegistry::from_iter([(
//!     "web".to_string(),
//!     Role::new().project_id("p-1").require_metadata("env", "prod"),
//! )]);
//!
//! let attestor = Attestor::new(directory, roles, AttemptTracker::new(3), Duration::from_secs(300));
//! let instance = attestor.attest("4f1c2b9e", "web", "10.0.0.5").unwrap();
//!
//! let issuer_url = Url::parse("https://auth.example.com/").unwrap();
//! let pem = std::fs::read("tests/fixtures/signing_key.pem").unwrap();
//! let issuer = Issuer::new(
//!     issuer_url.clone(),
//!     SigningKey::from_pem(&pem).unwrap(),
//!     Duration::from_secs(600),
//! );
//! let token = issuer.new_token(&instance, "web").unwrap();
//!
//! let public = std::fs::read("tests/fixtures/signing_key.pub.pem").unwrap();
//! let verifier = Verifier::new(issuer_url, VerifyingKey::from_pem(&public).unwrap());
//! let claims = verifier.verify_for_role(&token, "web").unwrap();
//! assert_eq!(claims.sub, "4f1c2b9e");
//! assert_eq!(claims.instance_name.as_deref(), Some("web-1"));
//! ```
//!
//! # Token Structure
//!
//! Tokens are JWS compact serializations signed with RS256. The payload
//! holds exactly:
//!
//! - `iss`: Issuer identity (the configured issuer URL)
//! - `sub`: Instance ID
//! - `aud`: `roles/<role>` resolved against the issuer URL
//! - `exp`: Expiry, seconds since the epoch
//! - `iat`: Issue time, seconds since the epoch
//! - `instance_name`: Instance display name, omitted when empty
//!
//! # Attempt Limits
//!
//! Every attestation that gets past the period check counts against the
//! instance, whether or not it succeeds. An instance may attest at most
//! `limit` times before its authentication period ends; the count never
//! resets.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod attestor;
mod checks;
mod claims;
mod config;
mod error;
mod instance;
mod issuer;
mod keys;
mod role;
mod tracker;
mod verifier;

pub use attestor::Attestor;
pub use checks::{
    check_address, check_auth_period, check_metadata, check_project, check_status, check_user,
};
pub use claims::{TokenClaims, TokenClaimsBuilder, role_audience};
pub use config::{
    AuthConfig, Config, DEFAULT_LIMIT, DEFAULT_LISTEN, DEFAULT_PERIOD, DEFAULT_TOKEN_EXPIRY,
    TlsConfig,
};
pub use error::{AttestationError, ConfigError, DirectoryError, TokenError};
pub use instance::{ACTIVE_STATUS, Instance, InstanceDirectory, StaticDirectory};
pub use issuer::Issuer;
pub use keys::{SigningKey, TOKEN_ALGORITHM, VerifyingKey};
pub use role::{Role, RoleRegistry};
pub use tracker::{AttemptLimiter, AttemptOutcome, AttemptTracker, DEFAULT_SHARDS};
pub use verifier::Verifier;

/// A prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use nova_authenticator::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AttemptLimiter, AttemptTracker, AttestationError, Attestor, Config, Instance,
        InstanceDirectory, Issuer, Role, RoleRegistry, SigningKey, StaticDirectory, TokenClaims,
        TokenError, Verifier, VerifyingKey,
    };
}
