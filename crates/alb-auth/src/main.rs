//! alb-whoami
//!
//! Reference service for the ALB authenticator: serves `/health` and an
//! authenticated `/whoami` echoing the principal.

use alb_auth::auth::{CallbackIdentityResolver, Credentials, IdentityResolver};
use alb_auth::config::AlbAuthConfig;
use alb_auth::{routes, AlbAuthenticator};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting alb-whoami");

    let config = AlbAuthConfig::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        header = %config.header,
        return_payload = config.return_payload,
        region = ?config.region,
        cache_backend = ?config.cache.backend,
        clock_skew_seconds = config.clock_skew.as_secs(),
        "Configuration loaded successfully"
    );

    // Without a user directory, delegated lookups echo the mapped credentials
    let identity_resolver: Option<Arc<dyn IdentityResolver>> = if config.return_payload {
        None
    } else {
        Some(Arc::new(CallbackIdentityResolver::new(echo_identity)))
    };

    let authenticator = AlbAuthenticator::from_config(config, identity_resolver)
        .await
        .map_err(|e| {
            error!("Failed to build authenticator: {}", e);
            e
        })?;

    let app = routes::build_routes(Arc::new(authenticator));

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("alb-whoami listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("alb-whoami shutdown complete");

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "alb_auth=info,alb=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn echo_identity(credentials: Credentials) -> Option<Value> {
    credentials.get("sub")?.as_ref()?;
    serde_json::to_value(&credentials).ok()
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
