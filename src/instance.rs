//! Instance records and the directory they are fetched from.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;

/// Status label of an instance that may attest.
pub const ACTIVE_STATUS: &str = "ACTIVE";

/// Point-in-time snapshot of a compute instance as reported by the
/// directory.
///
/// Snapshots are fetched fresh for every attestation and are never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance identifier
    pub id: String,
    /// Display name, possibly empty
    pub name: String,
    /// Owning project (tenant) identifier
    pub project_id: String,
    /// Identifier of the user that created the instance
    pub user_id: String,
    /// Every address the instance is known by, access and interface addresses
    pub addresses: BTreeSet<String>,
    /// Instance metadata
    pub metadata: HashMap<String, String>,
    /// Status label, e.g. `ACTIVE`
    pub status: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last update time
    pub updated: DateTime<Utc>,
}

/// Source of authoritative instance records.
///
/// Implementations perform one lookup per call and never retry; the
/// attestor treats any error as terminal for the attempt.
pub trait InstanceDirectory: Send + Sync {
    /// Fetches the current record for `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::NotFound` when no such instance exists and
    /// `DirectoryError::Unreachable` or `DirectoryError::InvalidResponse`
    /// when the directory cannot produce a record.
    fn get_instance(&self, instance_id: &str) -> Result<Instance, DirectoryError>;
}

impl<D: InstanceDirectory + ?Sized> InstanceDirectory for std::sync::Arc<D> {
    fn get_instance(&self, instance_id: &str) -> Result<Instance, DirectoryError> {
        (**self).get_instance(instance_id)
    }
}

/// In-memory directory serving a fixed set of instances.
///
/// Useful for tests and for running the service against a known inventory.
///
/// # Example
///
/// ```
/// use nova_authenticator::{InstanceDirectory, StaticDirectory};
///
/// let directory = StaticDirectory::new();
/// assert!(directory.get_instance("missing").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    instances: HashMap<String, Instance>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an instance record.
    #[must_use]
    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.insert(instance.id.clone(), instance);
        self
    }
}

impl InstanceDirectory for StaticDirectory {
    fn get_instance(&self, instance_id: &str) -> Result<Instance, DirectoryError> {
        self.instances
            .get(instance_id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound {
                instance_id: instance_id.to_string(),
            })
    }
}
