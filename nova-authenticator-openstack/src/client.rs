//! Blocking compute API client.

use std::time::Duration;

use nova_authenticator::{DirectoryError, Instance, InstanceDirectory};
use parking_lot::RwLock;
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::catalog::compute_endpoint;
use crate::error::OpenStackError;
use crate::options::AuthOptions;
use crate::server::parse_server;

/// Response header carrying a newly issued Keystone token.
pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Request header authenticating a compute API call.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

struct Session {
    token: SecretString,
    compute: Url,
}

/// Instance directory backed by the OpenStack Compute API.
///
/// The client authenticates once at construction and reuses the token for
/// every lookup. When the compute API rejects the token it authenticates
/// again and retries the lookup once.
///
/// Calls block; async callers should run lookups on a blocking thread.
pub struct OpenStackClient {
    options: AuthOptions,
    http: Client,
    session: RwLock<Session>,
}

impl std::fmt::Debug for OpenStackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStackClient")
            .field("auth_url", &self.options.auth_url)
            .field("compute", &self.session.read().compute.as_str())
            .finish_non_exhaustive()
    }
}

impl OpenStackClient {
    /// Builds a client from `OS_*` environment variables and authenticates.
    ///
    /// # Errors
    ///
    /// Returns `OpenStackError` if credentials are missing, Keystone refuses
    /// them, or the catalog has no matching compute endpoint.
    pub fn from_env() -> Result<Self, OpenStackError> {
        Self::new(AuthOptions::from_env()?)
    }

    /// Builds a client from explicit options and authenticates.
    ///
    /// # Errors
    ///
    /// Returns `OpenStackError` if the HTTP client cannot be built, Keystone
    /// refuses the credentials, or the catalog has no matching compute
    /// endpoint.
    pub fn new(options: AuthOptions) -> Result<Self, OpenStackError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OpenStackError::Http {
                reason: e.to_string(),
            })?;

        Self::with_http_client(options, http)
    }

    /// Builds a client over a caller-configured HTTP client and
    /// authenticates.
    ///
    /// # Errors
    ///
    /// Returns `OpenStackError` if Keystone refuses the credentials or the
    /// catalog has no matching compute endpoint.
    pub fn with_http_client(options: AuthOptions, http: Client) -> Result<Self, OpenStackError> {
        let session = authenticate(&http, &options)?;

        Ok(Self {
            options,
            http,
            session: RwLock::new(session),
        })
    }

    /// Returns the compute endpoint taken from the service catalog.
    #[must_use]
    pub fn compute_url(&self) -> Url {
        self.session.read().compute.clone()
    }

    /// Replaces the session with a freshly authenticated one.
    ///
    /// # Errors
    ///
    /// Returns `OpenStackError` if authentication fails; the old session is
    /// kept in that case.
    pub fn reauthenticate(&self) -> Result<(), OpenStackError> {
        let session = authenticate(&self.http, &self.options)?;
        *self.session.write() = session;
        Ok(())
    }

    fn fetch(&self, instance_id: &str) -> Result<reqwest::blocking::Response, DirectoryError> {
        let request = {
            let session = self.session.read();
            let url = server_url(&session.compute, instance_id)?;
            self.http
                .get(url)
                .header(AUTH_TOKEN_HEADER, session.token.expose_secret())
                .header(reqwest::header::ACCEPT, "application/json")
        };

        request.send().map_err(|e| DirectoryError::Unreachable {
            reason: e.to_string(),
        })
    }
}

impl InstanceDirectory for OpenStackClient {
    fn get_instance(&self, instance_id: &str) -> Result<Instance, DirectoryError> {
        let mut response = self.fetch(instance_id)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("compute API rejected token, authenticating again");
            self.reauthenticate()
                .map_err(|e| DirectoryError::Unreachable {
                    reason: e.to_string(),
                })?;
            response = self.fetch(instance_id)?;
        }

        let status = response.status();
        debug!(instance_id, status = status.as_u16(), "compute API lookup");

        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound {
                instance_id: instance_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DirectoryError::Unreachable {
                reason: format!("compute API returned {status}"),
            });
        }

        let body = response.text().map_err(|e| DirectoryError::Unreachable {
            reason: e.to_string(),
        })?;
        parse_server(&body)
    }
}

fn authenticate(http: &Client, options: &AuthOptions) -> Result<Session, OpenStackError> {
    let url = options.tokens_url();
    debug!(%url, "authenticating against keystone");

    let response = http
        .post(&url)
        .json(&options.request_body())
        .send()
        .map_err(|e| OpenStackError::Http {
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .unwrap_or_else(|_| "unable to read keystone response body".to_string());
        return Err(OpenStackError::Authentication {
            status: status.as_u16(),
            message,
        });
    }

    let token = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| SecretString::from(value.to_string()))
        .ok_or(OpenStackError::MissingToken)?;

    let body = response.text().map_err(|e| OpenStackError::Http {
        reason: e.to_string(),
    })?;
    let compute = compute_endpoint(&body, &options.interface, options.region.as_deref())?;
    debug!(compute = %compute, "selected compute endpoint");

    Ok(Session { token, compute })
}

/// Builds `{compute}/servers/{instance_id}` with the ID as one path segment.
fn server_url(compute: &Url, instance_id: &str) -> Result<Url, DirectoryError> {
    let mut url = compute.clone();
    url.path_segments_mut()
        .map_err(|()| DirectoryError::InvalidResponse {
            reason: format!("compute endpoint '{compute}' is not a base URL"),
        })?
        .pop_if_empty()
        .push("servers")
        .push(instance_id);
    Ok(url)
}
