//! Role definitions and the read-only registry built from configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Constraints an instance must satisfy to receive a token for a role.
///
/// Empty fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Required owning project, empty for any
    #[serde(rename = "projectID", default)]
    pub project_id: String,
    /// Required owning user, empty for any
    #[serde(rename = "userID", default)]
    pub user_id: String,
    /// Metadata entries the instance must carry with equal values
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Role {
    /// Creates a role with no constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the instance to belong to `project_id`.
    #[must_use]
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Requires the instance to be owned by `user_id`.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Requires the metadata entry `key = value`.
    #[must_use]
    pub fn require_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Immutable mapping from role name to [`Role`].
///
/// Built once at startup; there is no way to change it afterwards.
///
/// # Example
///
/// ```
/// use nova_authenticator::{Role, RoleRegistry};
///
/// let registry = RoleRegistry::from_iter([
///     ("web".to_string(), Role::new().require_metadata("env", "prod")),
/// ]);
///
/// assert!(registry.get("web").is_some());
/// assert!(registry.get("db").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: HashMap<String, Role>,
}

impl RoleRegistry {
    /// Creates a registry from a role map.
    #[must_use]
    pub fn new(roles: HashMap<String, Role>) -> Self {
        Self { roles }
    }

    /// Looks up a role by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Returns the number of configured roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns true if no roles are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl FromIterator<(String, Role)> for RoleRegistry {
    fn from_iter<T: IntoIterator<Item = (String, Role)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_builder_sets_constraints() {
        let role = Role::new()
            .project_id("p-1")
            .user_id("u-1")
            .require_metadata("env", "prod");

        assert_eq!(role.project_id, "p-1");
        assert_eq!(role.user_id, "u-1");
        assert_eq!(role.metadata.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn role_deserializes_with_missing_fields() {
        let role: Role = serde_yaml::from_str("projectID: p-1\n").unwrap();

        assert_eq!(role.project_id, "p-1");
        assert!(role.user_id.is_empty());
        assert!(role.metadata.is_empty());
    }

    #[test]
    fn registry_lookup() {
        let registry = RoleRegistry::from_iter([("web".to_string(), Role::new())]);

        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
        assert!(registry.get("web").is_some());
        assert!(registry.get("Web").is_none());
    }
}
