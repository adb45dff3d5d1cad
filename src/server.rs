//! Protected API host

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    http::{HeaderValue, Method, header},
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::auth::{
    AuthGate, HttpJwksFetcher, HttpKeySource, KeySource, KeySourceSettings, Principal,
    auth_middleware,
};
use crate::config::Config;
use crate::{Error, Result};

/// Create the router
///
/// # Errors
///
/// Returns [`Error::Config`] if a CORS origin is not a valid header value.
pub fn create_router(gate: Arc<AuthGate>, cors_origins: &[String]) -> Result<Router> {
    let origins = cors_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| Error::Config(format!("server.cors_origins: {origin}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/health", get(health_handler))
        .route("/api/protected", get(protected_handler))
        .route("/api/me", get(me_handler))
        // Authentication runs inside CORS so preflight requests never need a token
        .layer(middleware::from_fn_with_state(gate, auth_middleware))
        .layer(cors)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http()))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn protected_handler(Extension(principal): Extension<Principal>) -> impl IntoResponse {
    Json(json!({
        "msg": "Authenticated",
        "user": principal,
    }))
}

async fn me_handler(Extension(principal): Extension<Principal>) -> impl IntoResponse {
    Json(principal)
}

/// Build the HTTP-backed key source for the configured issuer.
pub fn build_key_source(config: &Config) -> Result<Arc<HttpKeySource>> {
    let fetcher = HttpJwksFetcher::new(
        config.identity.resolved_jwks_uri(),
        config.keys.fetch_timeout,
        config.identity.require_https,
    )?;
    Ok(Arc::new(HttpKeySource::new(
        fetcher,
        KeySourceSettings::from(&config.keys),
    )))
}

/// OBO gate server
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a server from validated configuration
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let config = &self.config;
        let addr = SocketAddr::new(
            config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            config.server.port,
        );

        let keys = build_key_source(config)?;
        if config.keys.warm_on_start {
            match keys.warm().await {
                Ok(count) => info!(keys = count, "Signing keys warmed"),
                Err(e) => warn!(error = %e, "Signing key warm-up failed, will retry on demand"),
            }
        }

        let gate = AuthGate::from_config(config, Arc::clone(&keys) as Arc<dyn KeySource>)?;
        let exchanges = gate.exchanges();
        let app = create_router(Arc::new(gate), &config.server.cors_origins)?;

        let listener = TcpListener::bind(addr).await?;
        info!(
            version = env!("CARGO_PKG_VERSION"),
            addr = %addr,
            issuer = %config.identity.issuer,
            audience = %config.identity.audience,
            exchange = exchanges,
            "Listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
