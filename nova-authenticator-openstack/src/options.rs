//! Keystone v3 password credentials read from `OS_*` variables.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::error::OpenStackError;

/// Endpoint interface used when `OS_INTERFACE` is unset.
pub const DEFAULT_INTERFACE: &str = "public";

/// Keystone domain ID used when no domain is given.
pub const DEFAULT_DOMAIN_ID: &str = "default";

/// Reference to a Keystone object by ID or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameOrId {
    /// Object ID, globally unique
    Id(String),
    /// Object name, unique within `domain`
    Name {
        /// Object name
        name: String,
        /// Domain the name is scoped to, itself by ID or name
        domain: Domain,
    },
}

/// Reference to a Keystone domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Domain {
    /// Domain ID
    Id(String),
    /// Domain name
    Name(String),
}

impl Domain {
    fn to_json(&self) -> Value {
        match self {
            Self::Id(id) => json!({ "id": id }),
            Self::Name(name) => json!({ "name": name }),
        }
    }
}

/// Credentials and endpoint selection for an OpenStack cloud.
#[derive(Debug)]
pub struct AuthOptions {
    /// Keystone URL, with or without the `/v3` suffix
    pub auth_url: String,
    /// Authenticating user
    pub user: NameOrId,
    /// User password
    pub password: SecretString,
    /// Project to scope the token to
    pub project: Option<NameOrId>,
    /// Region to pick the compute endpoint from; any region when `None`
    pub region: Option<String>,
    /// Endpoint interface: `public`, `internal` or `admin`
    pub interface: String,
}

impl AuthOptions {
    /// Reads credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `OpenStackError::MissingVariable` when `OS_AUTH_URL`,
    /// `OS_PASSWORD` or both `OS_USER_ID` and `OS_USERNAME` are unset.
    pub fn from_env() -> Result<Self, OpenStackError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads credentials through `lookup`, which maps a variable name to its
    /// value. Empty values count as unset.
    ///
    /// Recognised variables: `OS_AUTH_URL`, `OS_USER_ID`, `OS_USERNAME`,
    /// `OS_PASSWORD`, `OS_PROJECT_ID` (or `OS_TENANT_ID`), `OS_PROJECT_NAME`
    /// (or `OS_TENANT_NAME`), `OS_USER_DOMAIN_ID`, `OS_USER_DOMAIN_NAME`,
    /// `OS_PROJECT_DOMAIN_ID`, `OS_PROJECT_DOMAIN_NAME`, `OS_DOMAIN_ID`,
    /// `OS_DOMAIN_NAME`, `OS_REGION_NAME`, `OS_INTERFACE`.
    ///
    /// # Errors
    ///
    /// Returns `OpenStackError::MissingVariable` naming the first required
    /// variable that is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OpenStackError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let first = |names: &[&str]| names.iter().find_map(|&name| var(name));

        let auth_url = var("OS_AUTH_URL").ok_or(OpenStackError::MissingVariable {
            name: "OS_AUTH_URL",
        })?;
        let password = var("OS_PASSWORD").ok_or(OpenStackError::MissingVariable {
            name: "OS_PASSWORD",
        })?;

        let domain = |id_vars: &[&str], name_vars: &[&str]| {
            first(id_vars)
                .map(Domain::Id)
                .or_else(|| first(name_vars).map(Domain::Name))
                .unwrap_or_else(|| Domain::Id(DEFAULT_DOMAIN_ID.to_string()))
        };

        let user = match (var("OS_USER_ID"), var("OS_USERNAME")) {
            (Some(id), _) => NameOrId::Id(id),
            (None, Some(name)) => NameOrId::Name {
                name,
                domain: domain(
                    &["OS_USER_DOMAIN_ID", "OS_DOMAIN_ID"],
                    &["OS_USER_DOMAIN_NAME", "OS_DOMAIN_NAME"],
                ),
            },
            (None, None) => {
                return Err(OpenStackError::MissingVariable {
                    name: "OS_USER_ID or OS_USERNAME",
                });
            }
        };

        let project = match (
            first(&["OS_PROJECT_ID", "OS_TENANT_ID"]),
            first(&["OS_PROJECT_NAME", "OS_TENANT_NAME"]),
        ) {
            (Some(id), _) => Some(NameOrId::Id(id)),
            (None, Some(name)) => Some(NameOrId::Name {
                name,
                domain: domain(
                    &["OS_PROJECT_DOMAIN_ID", "OS_DOMAIN_ID"],
                    &["OS_PROJECT_DOMAIN_NAME", "OS_DOMAIN_NAME"],
                ),
            }),
            (None, None) => None,
        };

        let interface = var("OS_INTERFACE").map_or_else(
            || DEFAULT_INTERFACE.to_string(),
            |interface| normalize_interface(&interface),
        );

        Ok(Self {
            auth_url,
            user,
            password: SecretString::from(password),
            project,
            region: var("OS_REGION_NAME"),
            interface,
        })
    }

    /// Returns the Keystone token endpoint, `<auth_url>/v3/auth/tokens`.
    #[must_use]
    pub fn tokens_url(&self) -> String {
        let base = self.auth_url.trim_end_matches('/');
        if base.ends_with("/v3") {
            format!("{base}/auth/tokens")
        } else {
            format!("{base}/v3/auth/tokens")
        }
    }

    /// Builds the password-method token request body.
    #[must_use]
    pub fn request_body(&self) -> Value {
        let mut user = match &self.user {
            NameOrId::Id(id) => json!({ "id": id }),
            NameOrId::Name { name, domain } => json!({ "name": name, "domain": domain.to_json() }),
        };
        user["password"] = Value::String(self.password.expose_secret().to_string());

        let mut auth = json!({
            "identity": {
                "methods": ["password"],
                "password": { "user": user },
            },
        });

        if let Some(project) = &self.project {
            let project = match project {
                NameOrId::Id(id) => json!({ "id": id }),
                NameOrId::Name { name, domain } => {
                    json!({ "name": name, "domain": domain.to_json() })
                }
            };
            auth["scope"] = json!({ "project": project });
        }

        json!({ "auth": auth })
    }
}

/// Maps legacy `publicURL`-style interface names to their v3 form.
fn normalize_interface(interface: &str) -> String {
    interface
        .strip_suffix("URL")
        .unwrap_or(interface)
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("OS_AUTH_URL", "https://keystone.example.com:5000/v3"),
        ("OS_USERNAME", "authenticator"),
        ("OS_PASSWORD", "secret"),
        ("OS_PROJECT_NAME", "service"),
        ("OS_USER_DOMAIN_NAME", "Default"),
        ("OS_PROJECT_DOMAIN_ID", "default"),
        ("OS_REGION_NAME", "RegionOne"),
    ];

    mod from_lookup_tests {
        use super::*;

        #[test]
        fn reads_named_user_and_project() {
            let options = AuthOptions::from_lookup(lookup(BASE)).unwrap();

            assert_eq!(options.auth_url, "https://keystone.example.com:5000/v3");
            assert_eq!(
                options.user,
                NameOrId::Name {
                    name: "authenticator".to_string(),
                    domain: Domain::Name("Default".to_string()),
                }
            );
            assert_eq!(
                options.project,
                Some(NameOrId::Name {
                    name: "service".to_string(),
                    domain: Domain::Id("default".to_string()),
                })
            );
            assert_eq!(options.region.as_deref(), Some("RegionOne"));
            assert_eq!(options.interface, DEFAULT_INTERFACE);
            assert_eq!(options.password.expose_secret(), "secret");
        }

        #[test]
        fn ids_win_over_names() {
            let mut vars = BASE.to_vec();
            vars.push(("OS_USER_ID", "u-1"));
            vars.push(("OS_PROJECT_ID", "p-1"));

            let options = AuthOptions::from_lookup(lookup(&vars)).unwrap();

            assert_eq!(options.user, NameOrId::Id("u-1".to_string()));
            assert_eq!(options.project, Some(NameOrId::Id("p-1".to_string())));
        }

        #[test]
        fn domain_defaults_to_default_id() {
            let options = AuthOptions::from_lookup(lookup(&[
                ("OS_AUTH_URL", "http://keystone"),
                ("OS_USERNAME", "a"),
                ("OS_PASSWORD", "b"),
            ]))
            .unwrap();

            assert_eq!(
                options.user,
                NameOrId::Name {
                    name: "a".to_string(),
                    domain: Domain::Id(DEFAULT_DOMAIN_ID.to_string()),
                }
            );
            assert_eq!(options.project, None);
            assert_eq!(options.region, None);
        }

        #[test]
        fn empty_values_count_as_unset() {
            let mut vars = BASE.to_vec();
            vars.retain(|(k, _)| *k != "OS_PASSWORD");
            vars.push(("OS_PASSWORD", ""));

            let result = AuthOptions::from_lookup(lookup(&vars));

            assert_eq!(
                result.unwrap_err(),
                OpenStackError::MissingVariable {
                    name: "OS_PASSWORD"
                }
            );
        }

        #[test]
        fn missing_user_is_reported() {
            let result = AuthOptions::from_lookup(lookup(&[
                ("OS_AUTH_URL", "http://keystone"),
                ("OS_PASSWORD", "b"),
            ]));

            assert_eq!(
                result.unwrap_err(),
                OpenStackError::MissingVariable {
                    name: "OS_USER_ID or OS_USERNAME"
                }
            );
        }

        #[test]
        fn legacy_interface_names_are_normalized() {
            let mut vars = BASE.to_vec();
            vars.push(("OS_INTERFACE", "internalURL"));

            let options = AuthOptions::from_lookup(lookup(&vars)).unwrap();

            assert_eq!(options.interface, "internal");
        }
    }

    mod request_tests {
        use super::*;

        #[test]
        fn tokens_url_appends_version_once() {
            let mut options = AuthOptions::from_lookup(lookup(BASE)).unwrap();
            assert_eq!(
                options.tokens_url(),
                "https://keystone.example.com:5000/v3/auth/tokens"
            );

            options.auth_url = "https://keystone.example.com:5000/".to_string();
            assert_eq!(
                options.tokens_url(),
                "https://keystone.example.com:5000/v3/auth/tokens"
            );
        }

        #[test]
        fn body_uses_password_method_with_project_scope() {
            let options = AuthOptions::from_lookup(lookup(BASE)).unwrap();

            assert_eq!(
                options.request_body(),
                json!({
                    "auth": {
                        "identity": {
                            "methods": ["password"],
                            "password": {
                                "user": {
                                    "name": "authenticator",
                                    "domain": { "name": "Default" },
                                    "password": "secret",
                                },
                            },
                        },
                        "scope": {
                            "project": {
                                "name": "service",
                                "domain": { "id": "default" },
                            },
                        },
                    },
                })
            );
        }

        #[test]
        fn unscoped_body_has_no_scope() {
            let options = AuthOptions::from_lookup(lookup(&[
                ("OS_AUTH_URL", "http://keystone"),
                ("OS_USER_ID", "u-1"),
                ("OS_PASSWORD", "b"),
            ]))
            .unwrap();

            let body = options.request_body();

            assert!(body["auth"].get("scope").is_none());
            assert_eq!(
                body["auth"]["identity"]["password"]["user"],
                json!({ "id": "u-1", "password": "b" })
            );
        }

        #[test]
        fn debug_output_redacts_password() {
            let options = AuthOptions::from_lookup(lookup(BASE)).unwrap();

            assert!(!format!("{options:?}").contains("secret"));
        }
    }
}
