//! OpenStack Compute instance directory for nova-authenticator.
//!
//! [`OpenStackClient`] implements
//! [`InstanceDirectory`](nova_authenticator::InstanceDirectory) over the
//! Compute API, authenticating with Keystone v3 password credentials taken
//! from the usual `OS_*` environment variables.
//!
//! # Example
//!
//! ```no_run
//! use nova_authenticator::InstanceDirectory;
//! use nova_authenticator_openstack::OpenStackClient;
//!
//! let client = OpenStackClient::from_env()?;
//! let instance = client.get_instance("4f1c2b9e-6f0a-4d3e-9c51-0a1b2c3d4e5f")?;
//! println!("{} is {}", instance.id, instance.status);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Lookup Errors
//!
//! | Compute API answer | Error |
//! |--------------------|-------|
//! | 404 | `DirectoryError::NotFound` |
//! | 401, after one re-authentication | `DirectoryError::Unreachable` |
//! | Any other non-2xx, or no answer | `DirectoryError::Unreachable` |
//! | 2xx with an undecodable body | `DirectoryError::InvalidResponse` |

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod catalog;
mod client;
mod error;
mod options;
mod server;

pub use catalog::{COMPUTE_SERVICE_TYPE, compute_endpoint};
pub use client::{AUTH_TOKEN_HEADER, OpenStackClient, SUBJECT_TOKEN_HEADER};
pub use error::OpenStackError;
pub use options::{AuthOptions, DEFAULT_DOMAIN_ID, DEFAULT_INTERFACE, Domain, NameOrId};
pub use server::parse_server;
