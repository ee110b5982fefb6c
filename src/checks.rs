//! Pure check functions applied during attestation.
//!
//! Each function inspects one aspect of an instance snapshot against the
//! requirement it is given. They are:
//!
//! - **Deterministic**: the current time is a parameter, never read inside
//! - **Side-effect free**: no I/O, no shared state
//! - **Exact**: every comparison is a verbatim, case-sensitive string match
//!
//! The [`Attestor`](crate::Attestor) calls them in a fixed order; the attempt
//! limit lives in [`AttemptTracker`](crate::AttemptTracker) because it is the
//! one check with state.
//!
//! | Function | Passes when |
//! |----------|-------------|
//! | [`check_auth_period`] | `now <= created + period` |
//! | [`check_status`] | status is `ACTIVE` |
//! | [`check_address`] | remote address is in the instance's address set |
//! | [`check_metadata`] | every required entry is present with an equal value |
//! | [`check_project`] | requirement is empty or equal to the instance's project |
//! | [`check_user`] | requirement is empty or equal to the instance's user |

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::AttestationError;
use crate::instance::ACTIVE_STATUS;

/// Checks that an instance is still inside its authentication period.
///
/// Returns the deadline, `created + period`, which the attempt tracker
/// records for the instance.
///
/// # Errors
///
/// Returns `AttestationError::PeriodExceeded` if `now` is after the deadline.
///
/// # Examples
///
/// ```
/// use chrono::{Duration as ChronoDuration, Utc};
/// use nova_authenticator::check_auth_period;
/// use std::time::Duration;
///
/// let now = Utc::now();
/// let created = now - ChronoDuration::seconds(10);
///
/// let deadline = check_auth_period(created, Duration::from_secs(300), now).unwrap();
/// assert_eq!(deadline, created + ChronoDuration::seconds(300));
///
/// assert!(check_auth_period(created, Duration::ZERO, now).is_err());
/// ```
pub fn check_auth_period(
    created: DateTime<Utc>,
    period: Duration,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, AttestationError> {
    // A period too large for chrono can never be exceeded.
    let deadline = chrono::Duration::from_std(period)
        .ok()
        .and_then(|period| created.checked_add_signed(period))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    if now > deadline {
        Err(AttestationError::PeriodExceeded {
            deadline: deadline.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    } else {
        Ok(deadline)
    }
}

/// Checks that an instance is active.
///
/// # Errors
///
/// Returns `AttestationError::InstanceNotActive` for any status other than
/// `ACTIVE`.
pub fn check_status(status: &str) -> Result<(), AttestationError> {
    if status == ACTIVE_STATUS {
        Ok(())
    } else {
        Err(AttestationError::InstanceNotActive {
            status: status.to_string(),
        })
    }
}

/// Checks that the caller's address belongs to the instance.
///
/// Addresses are compared as strings, so IPv4 and IPv6 entries are matched
/// verbatim.
///
/// # Errors
///
/// Returns `AttestationError::AddressMismatch` if `remote_addr` is not in
/// `addresses`.
///
/// # Examples
///
/// ```
/// use nova_authenticator::check_address;
/// use std::collections::BTreeSet;
///
/// let addresses = BTreeSet::from(["10.0.0.1".to_string(), "2001:db8::1".to_string()]);
///
/// assert!(check_address(&addresses, "2001:db8::1").is_ok());
/// assert!(check_address(&addresses, "10.0.0.2").is_err());
/// ```
pub fn check_address(
    addresses: &BTreeSet<String>,
    remote_addr: &str,
) -> Result<(), AttestationError> {
    if addresses.contains(remote_addr) {
        Ok(())
    } else {
        Err(AttestationError::AddressMismatch {
            remote_addr: remote_addr.to_string(),
        })
    }
}

/// Checks that the instance carries every metadata entry the role requires.
///
/// Entries the role does not mention are ignored. Keys are checked in
/// sorted order so the reported key is stable when several fail.
///
/// # Errors
///
/// Returns `AttestationError::MetadataMismatch` naming the first key that is
/// missing or has a different value.
///
/// # Examples
///
/// ```
/// use nova_authenticator::check_metadata;
/// use std::collections::HashMap;
///
/// let required = HashMap::from([("env".to_string(), "prod".to_string())]);
/// let actual = HashMap::from([
///     ("env".to_string(), "prod".to_string()),
///     ("team".to_string(), "x".to_string()),
/// ]);
///
/// assert!(check_metadata(&actual, &required).is_ok());
/// ```
pub fn check_metadata(
    actual: &HashMap<String, String>,
    required: &HashMap<String, String>,
) -> Result<(), AttestationError> {
    let mut keys: Vec<&String> = required.keys().collect();
    keys.sort_unstable();

    for key in keys {
        match actual.get(key) {
            None => {
                return Err(AttestationError::MetadataMismatch {
                    key: key.clone(),
                    missing: true,
                });
            }
            Some(value) if *value != required[key] => {
                return Err(AttestationError::MetadataMismatch {
                    key: key.clone(),
                    missing: false,
                });
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Checks the owning project against the role's requirement.
///
/// # Errors
///
/// Returns `AttestationError::ProjectMismatch` if `required` is non-empty and
/// differs from `actual`.
pub fn check_project(actual: &str, required: &str) -> Result<(), AttestationError> {
    if required.is_empty() || actual == required {
        Ok(())
    } else {
        Err(AttestationError::ProjectMismatch {
            expected: required.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Checks the owning user against the role's requirement.
///
/// # Errors
///
/// Returns `AttestationError::UserMismatch` if `required` is non-empty and
/// differs from `actual`.
pub fn check_user(actual: &str, required: &str) -> Result<(), AttestationError> {
    if required.is_empty() || actual == required {
        Ok(())
    } else {
        Err(AttestationError::UserMismatch {
            expected: required.to_string(),
            actual: actual.to_string(),
        })
    }
}
