//! Attestation of instance identity, role and origin.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::checks::{
    check_address, check_auth_period, check_metadata, check_project, check_status, check_user,
};
use crate::error::AttestationError;
use crate::instance::{Instance, InstanceDirectory};
use crate::role::RoleRegistry;
use crate::tracker::{AttemptLimiter, AttemptTracker};

/// Decides whether a caller may act as an instance in a role.
///
/// The attestor fetches the instance from its directory and runs a fixed
/// sequence of checks, stopping at the first failure:
///
/// 1. the role exists
/// 2. the instance can be fetched
/// 3. the instance is inside its authentication period
/// 4. the instance has attempts left
/// 5. the instance is active
/// 6. the caller's address belongs to the instance
/// 7. the instance carries the role's metadata
/// 8. the instance belongs to the role's project
/// 9. the instance is owned by the role's user
///
/// Step 4 records the attempt whatever the later steps decide.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use nova_authenticator::{
///     Attestor, AttemptTracker, Instance, Role, RoleRegistry, StaticDirectory,
/// };
/// use std::collections::{BTreeSet, HashMap};
/// use std::time::Duration;
///
/// let now = Utc::now();
/// let instance = Instance {
///     id: "i-1".into(),
///     name: "web-1".into(),
///     project_id: "p-1".into(),
///     user_id: "u-1".into(),
///     addresses: BTreeSet::from(["10.0.0.1".to_string()]),
///     metadata: HashMap::new(),
///     status: "ACTIVE".into(),
///     created: now,
///     updated: now,
/// };
///
/// let attestor = Attestor::new(
///     StaticDirectory::new().with_instance(instance),
///     RoleRegistry::from_iter([("web".to_string(), Role::new().project_id("p-1"))]),
///     AttemptTracker::new(3),
///     Duration::from_secs(300),
/// );
///
/// let verified = attestor.attest("i-1", "web", "10.0.0.1").unwrap();
/// assert_eq!(verified.id, "i-1");
/// assert!(attestor.attest("i-1", "web", "10.0.0.9").is_err());
/// ```
#[derive(Debug)]
pub struct Attestor<D, L = AttemptTracker> {
    directory: D,
    roles: RoleRegistry,
    limiter: L,
    auth_period: Duration,
}

impl<D, L> Attestor<D, L>
where
    D: InstanceDirectory,
    L: AttemptLimiter,
{
    /// Creates an attestor.
    ///
    /// # Arguments
    ///
    /// * `directory` - Source of instance records
    /// * `roles` - Role constraints
    /// * `limiter` - Attempt limiter shared by all attestations
    /// * `auth_period` - How long after creation an instance may attest
    #[must_use]
    pub fn new(directory: D, roles: RoleRegistry, limiter: L, auth_period: Duration) -> Self {
        Self {
            directory,
            roles,
            limiter,
            auth_period,
        }
    }

    /// Returns the configured authentication period.
    #[must_use]
    pub fn auth_period(&self) -> Duration {
        self.auth_period
    }

    /// Returns the role registry.
    #[must_use]
    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    /// Returns the attempt limiter.
    #[must_use]
    pub fn limiter(&self) -> &L {
        &self.limiter
    }

    /// Attests an instance at the current time.
    ///
    /// The clock is read once the instance has been fetched, so a slow
    /// directory cannot stretch the authentication period.
    ///
    /// # Arguments
    ///
    /// * `instance_id` - The instance the caller claims to be
    /// * `role_name` - The role the caller asks for
    /// * `remote_addr` - The caller's address without port
    ///
    /// # Errors
    ///
    /// Returns the `AttestationError` of the first check that fails.
    pub fn attest(
        &self,
        instance_id: &str,
        role_name: &str,
        remote_addr: &str,
    ) -> Result<Instance, AttestationError> {
        self.attest_with_clock(instance_id, role_name, remote_addr, Utc::now)
    }

    /// Attests an instance as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the `AttestationError` of the first check that fails.
    pub fn attest_at(
        &self,
        instance_id: &str,
        role_name: &str,
        remote_addr: &str,
        now: DateTime<Utc>,
    ) -> Result<Instance, AttestationError> {
        self.attest_with_clock(instance_id, role_name, remote_addr, || now)
    }

    /// Attests an instance, reading the time from `clock`.
    ///
    /// `clock` is read after the directory fetch for the period check and
    /// again after the attempt is recorded.
    ///
    /// # Errors
    ///
    /// Returns the `AttestationError` of the first check that fails.
    pub fn attest_with_clock<C>(
        &self,
        instance_id: &str,
        role_name: &str,
        remote_addr: &str,
        clock: C,
    ) -> Result<Instance, AttestationError>
    where
        C: Fn() -> DateTime<Utc>,
    {
        let result = self.run_checks(instance_id, role_name, remote_addr, clock);
        if let Err(err) = &result {
            debug!(instance_id, role = role_name, remote_addr, error = %err, "attestation rejected");
        }
        result
    }

    fn run_checks<C>(
        &self,
        instance_id: &str,
        role_name: &str,
        remote_addr: &str,
        clock: C,
    ) -> Result<Instance, AttestationError>
    where
        C: Fn() -> DateTime<Utc>,
    {
        let role = self
            .roles
            .get(role_name)
            .ok_or_else(|| AttestationError::UnknownRole {
                role: role_name.to_string(),
            })?;

        let instance = self.directory.get_instance(instance_id)?;

        let deadline = check_auth_period(instance.created, self.auth_period, clock())?;

        let outcome = self.limiter.record_attempt(&instance.id, deadline, clock());
        if outcome.expired {
            return Err(period_exceeded(deadline));
        }
        if outcome.exceeded {
            warn!(
                instance_id = %instance.id,
                count = outcome.count,
                limit = self.limiter.limit(),
                "attestation attempt limit exceeded"
            );
            return Err(AttestationError::TooManyAttempts {
                count: outcome.count,
                limit: self.limiter.limit(),
            });
        }
        // A purge between the period check and the increment recreates the
        // record with a fresh count; the deadline has passed by then.
        if clock() > deadline {
            return Err(period_exceeded(deadline));
        }

        check_status(&instance.status)?;
        check_address(&instance.addresses, remote_addr)?;
        check_metadata(&instance.metadata, &role.metadata)?;
        check_project(&instance.project_id, &role.project_id)?;
        check_user(&instance.user_id, &role.user_id)?;

        Ok(instance)
    }
}

fn period_exceeded(deadline: DateTime<Utc>) -> AttestationError {
    AttestationError::PeriodExceeded {
        deadline: deadline.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}
