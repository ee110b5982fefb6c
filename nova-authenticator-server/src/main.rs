//! nova-authenticator service binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use nova_authenticator::{Config, InstanceDirectory};
use nova_authenticator_openstack::OpenStackClient;
use nova_authenticator_server::{AppState, ServerError, router, serve, spawn_attempt_purger};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "nova-authenticator")]
#[command(version, about = "Instance authenticator for OpenStack Nova", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "NOVA_AUTH_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    /// Log filter, e.g. `info` or `nova_authenticator=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "NOVA_AUTH_LOG_JSON", default_value_t = false)]
    log_json: bool,

    /// Listen address, overriding the configuration file
    #[arg(long, env = "NOVA_AUTH_LISTEN")]
    listen: Option<String>,
}

fn init_logging(args: &Args) -> Result<(), ServerError> {
    let filter = EnvFilter::try_new(&args.log_level).map_err(|e| ServerError::Logging {
        reason: e.to_string(),
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if args.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| ServerError::Logging {
        reason: e.to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();
    init_logging(&args)?;

    let mut config = Config::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    info!(
        config = %args.config.display(),
        roles = config.roles.len(),
        limit = config.auth.limit,
        "configuration loaded"
    );

    let issuer = Arc::new(config.build_issuer()?);

    // The blocking HTTP client must be built and dropped off the async runtime.
    let client = tokio::task::spawn_blocking(OpenStackClient::from_env)
        .await
        .map_err(|e| ServerError::Task {
            reason: e.to_string(),
        })??;
    info!(compute = %client.compute_url(), "authenticated against openstack");
    let directory: Arc<dyn InstanceDirectory> = Arc::new(client);

    let attestor = Arc::new(config.build_attestor(Arc::clone(&directory)));
    let purger = spawn_attempt_purger(Arc::clone(&attestor), config.auth.period);

    let state = AppState {
        attestor: Arc::clone(&attestor),
        issuer,
    };

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .map_err(|source| ServerError::Io {
            context: format!("failed to bind {}", config.listen),
            source,
        })?;
    info!("nova-authenticator listening on {}", config.listen);

    let served = serve(listener, router(state)).await;

    purger.abort();
    let _ = purger.await;
    let _ = tokio::task::spawn_blocking(move || drop((attestor, directory))).await;

    info!("nova-authenticator stopped");
    served
}
