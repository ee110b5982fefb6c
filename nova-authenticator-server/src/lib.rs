//! HTTP front end for nova-authenticator.
//!
//! # Endpoints
//!
//! | Method | Path | Body | Answer |
//! |--------|------|------|--------|
//! | `POST` | `/auth` | form: `instance_id`, `role` | `{"token": "<jwt>"}` |
//! | any other | `/auth` | | 405 `{"error": "Method Not Allowed"}` |
//! | `GET` | `/healthz` | | `{"status": "ok"}` |
//!
//! Both fields may also be given in the query string; a non-empty body value
//! takes precedence.
//!
//! The caller's address is the TCP peer address, so the service must see
//! instances directly or through a proxy that preserves source addresses.
//! Serve the router with
//! [`into_make_service_with_connect_info`](axum::Router::into_make_service_with_connect_info).

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod error;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{ConnectInfo, Form, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nova_authenticator::{Attestor, InstanceDirectory, Issuer};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use error::{ApiError, ErrorBody, ServerError};

/// Attestor over a type-erased instance directory.
pub type SharedAttestor = Attestor<Arc<dyn InstanceDirectory>>;

/// State shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// Attestor holding the role registry and attempt counts
    pub attestor: Arc<SharedAttestor>,
    /// Token issuer
    pub issuer: Arc<Issuer>,
}

/// Form fields of an `/auth` request. Missing fields read as empty.
#[derive(Debug, Default, Deserialize)]
pub struct AuthRequest {
    /// Instance the caller claims to be
    #[serde(default)]
    pub instance_id: String,
    /// Role the caller asks for
    #[serde(default)]
    pub role: String,
}

impl AuthRequest {
    /// Fills empty fields from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        let pick = |primary: String, secondary: String| {
            if primary.is_empty() {
                secondary
            } else {
                primary
            }
        };
        Self {
            instance_id: pick(self.instance_id, fallback.instance_id),
            role: pick(self.role, fallback.role),
        }
    }
}

/// Successful `/auth` answer.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed token
    pub token: String,
}

/// Builds the service router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth", post(authenticate).fallback(method_not_allowed))
        .route("/healthz", get(health))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn authenticate(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    query: Result<Query<AuthRequest>, QueryRejection>,
    form: Result<Form<AuthRequest>, FormRejection>,
) -> Response {
    let query = query.map(|Query(request)| request).unwrap_or_default();
    let request = form
        .map(|Form(request)| request)
        .unwrap_or_default()
        .or(query);
    let remote_addr = peer.ip().to_canonical().to_string();

    let result = issue_for(&state, &request, &remote_addr).await;
    let status = match &result {
        Ok(_) => axum::http::StatusCode::OK,
        Err(err) => err.status(),
    };

    info!(
        status = status.as_u16(),
        instance_id = %request.instance_id,
        role = %request.role,
        remote_addr = %remote_addr,
        "auth request"
    );

    match result {
        Ok(token) => Json(TokenResponse { token }).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn issue_for(
    state: &AppState,
    request: &AuthRequest,
    remote_addr: &str,
) -> Result<String, ApiError> {
    if request.instance_id.is_empty() {
        return Err(ApiError::InvalidInstanceId);
    }
    if request.role.is_empty() {
        return Err(ApiError::InvalidRole);
    }

    let attestor = Arc::clone(&state.attestor);
    let issuer = Arc::clone(&state.issuer);
    let instance_id = request.instance_id.clone();
    let role = request.role.clone();
    let remote_addr = remote_addr.to_string();

    // Directory lookups and RSA signing both block.
    tokio::task::spawn_blocking(move || {
        let instance = attestor
            .attest(&instance_id, &role, &remote_addr)
            .map_err(|err| {
                warn!(instance_id = %instance_id, error = %err, "attestation failed");
                ApiError::AuthenticationFailed(err)
            })?;
        issuer.new_token(&instance, &role).map_err(|err| {
            error!(instance_id = %instance_id, error = %err, "token signing failed");
            ApiError::Signing(err)
        })
    })
    .await
    .map_err(|err| ApiError::Task {
        reason: err.to_string(),
    })?
}

/// Shortest interval between attempt purges.
pub const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically drops attempt records whose authentication period ended.
///
/// `every` is raised to [`MIN_PURGE_INTERVAL`] if shorter. The task runs
/// until aborted.
pub fn spawn_attempt_purger(attestor: Arc<SharedAttestor>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(MIN_PURGE_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = attestor.limiter().purge_expired(chrono::Utc::now());
            if purged > 0 {
                debug!(purged, remaining = attestor.limiter().len(), "purged attempt records");
            }
        }
    })
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Serves `router` on `listener` until [`shutdown_signal`] resolves.
///
/// # Errors
///
/// Returns `ServerError::Io` if the server fails.
pub async fn serve(listener: tokio::net::TcpListener, router: Router) -> Result<(), ServerError> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|source| ServerError::Io {
        context: "server failed".to_string(),
        source,
    })
}
