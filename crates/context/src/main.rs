//! Ragtrail Context Service
//!
//! Serves the retrieval tools and evidence digests to agent orchestrators.
//! Handles:
//! - Session scopes and cancellation
//! - Tool dispatch against the retrieval backend
//! - Digest accumulation and injection
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use ragtrail_common::{
    config::AppConfig,
    evidence::{DigestBuilder, DigestOptions},
    metrics,
    retrieval::{RetrievalGateway, ToolRunner},
    session::SessionRegistry,
    VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub runner: ToolRunner,
    pub registry: Arc<SessionRegistry>,
    pub digest: DigestBuilder,
}

impl AppState {
    /// Wire the service components from configuration
    pub fn from_config(config: AppConfig) -> ragtrail_common::Result<Self> {
        let gateway = RetrievalGateway::from_config(&config.retrieval)?;

        Ok(Self {
            runner: ToolRunner::new(Arc::new(gateway)),
            registry: Arc::new(SessionRegistry::from_config(&config.sessions)),
            digest: DigestBuilder::new(DigestOptions::from(&config.evidence)),
            config: Arc::new(config),
        })
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(config: &AppConfig) -> anyhow::Result<()> {
    let port = config.observability.metrics_port;
    if port == 0 {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Suffix("tool_duration_seconds".to_string()),
            metrics::TOOL_LATENCY_BUCKETS,
        )?
        .install()?;

    metrics::register_metrics();
    info!(port, "Metrics exporter listening");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    init_tracing(&config);
    info!(
        service = %config.observability.service_name,
        "Starting Ragtrail Context Service v{}", VERSION
    );

    // Initialize metrics
    init_metrics(&config)?;

    // Create app state
    let state = AppState::from_config(config).map_err(|e| {
        tracing::error!(error = %e, "Failed to initialize retrieval gateway");
        e
    })?;

    if !state.runner.gateway().is_configured() {
        tracing::warn!("Retrieval backend not configured; tools will answer with a sentinel");
    }

    // Evict idle sessions in the background
    let sweeper = spawn_session_sweeper(Arc::clone(&state.registry), state.config.session_idle_ttl());
    let registry = Arc::clone(&state.registry);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port).parse()?;
    let app = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    registry.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Periodically drop sessions idle past the TTL
fn spawn_session_sweeper(
    registry: Arc<SessionRegistry>,
    idle_ttl: Duration,
) -> tokio::task::JoinHandle<()> {
    let period = (idle_ttl / 2).max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let evicted = registry.sweep().await;
            if evicted > 0 {
                info!(evicted, "Idle sessions evicted");
            }
        }
    })
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let concurrency = GlobalConcurrencyLimitLayer::new(state.config.server.max_concurrent_requests.max(1));

    let api_routes = Router::new()
        // Tool catalogue
        .route("/tools", get(handlers::tools::list_tools))
        // Session endpoints
        .route("/sessions", post(handlers::sessions::create_session))
        .route("/sessions/{id}", delete(handlers::sessions::close_session))
        .route("/sessions/{id}/tools", post(handlers::sessions::run_tools))
        // Evidence digest
        .route("/digest", post(handlers::digest::prepare_digest));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v2", api_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(concurrency)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
