use axum::{Extension, Router, middleware, response::IntoResponse, routing::get, serve};
use shared::config::server::{Config, LogFormat};
use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::{
    app_state::AppState,
    handlers,
    middleware::request_context::{self, RequestContextState},
    routes::{self, openapi::openapi_routes},
    tracer,
};
use axum::http::{HeaderValue, StatusCode, header};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process-wide Prometheus handle. Installs the global recorder on first use;
/// if another recorder is already installed the handle renders an empty page.
pub fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                describe_metrics();
                handle
            }
            Err(err) => {
                warn!(error = %err, "prometheus recorder unavailable");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

fn describe_metrics() {
    metrics::describe_counter!(
        "chatline_push_delivered_total",
        "Push events enqueued on a live connection"
    );
    metrics::describe_counter!(
        "chatline_push_missed_total",
        "Push events dropped because the connection queue was full or closed"
    );
    metrics::describe_counter!(
        "chatline_connections_opened_total",
        "Push channels opened"
    );
    metrics::describe_counter!(
        "chatline_connections_closed_total",
        "Push channels closed"
    );
    metrics::describe_gauge!("chatline_online_users", "Identities with a live connection");
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Initializes the tracing subscriber for logging using the provided configuration.
pub fn initialize_tracing(config: &Config) -> String {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let installed = if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).try_init()
    } else {
        fmt_builder.with_ansi(true).try_init()
    };
    if installed.is_err() {
        warn!("tracing subscriber already installed");
    }

    config.logging.level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// Creates the CORS layer for the application.
pub fn create_cors_layer(config: &Config) -> CorsLayer {
    use http::Method;

    let methods = vec![
        Method::GET,
        Method::POST,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let mut cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .max_age(Duration::from_secs(config.server.cors.max_age_seconds));

    if config.server.cors.allowed_origins.is_empty() {
        cors = cors
            .allow_origin(AllowOrigin::any())
            .allow_headers(AllowHeaders::any());
    } else {
        let origins = config
            .server
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| http::HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        // wildcard headers cannot be combined with credentials
        cors = cors
            .allow_origin(AllowOrigin::list(origins))
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(config.server.cors.allow_credentials);
    }

    cors
}

/// Chat REST routes plus the push channel.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(handlers::messages::routes())
        .merge(handlers::groups::routes())
        .merge(handlers::websocket::routes())
}

/// Creates the main application router with all middleware and routes.
pub fn create_app_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let cors = create_cors_layer(&state.config);
    let context_state = RequestContextState::from_config(&state.config);

    Router::new()
        .merge(create_api_router())
        .merge(routes::health::create_health_router())
        .merge(openapi_routes())
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(metrics_handle))
        .layer(tracer::create_trace_layer())
        .layer(middleware::from_fn_with_state(
            context_state,
            request_context::assign_request_context,
        ))
        .layer(cors)
        .with_state(state)
}

/// Resolves when Ctrl+C is received.
pub async fn create_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

/// Serves `app` on an already bound listener until the shutdown signal.
///
/// # Errors
/// Returns an error if the accept loop fails.
pub async fn serve_on(listener: TcpListener, app: Router) -> anyhow::Result<()> {
    serve(listener, app)
        .with_graceful_shutdown(create_shutdown_signal())
        .await?;
    Ok(())
}

/// Starts the server with an in-memory store.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run(config: Config) -> anyhow::Result<()> {
    initialize_tracing(&config);
    info!(profile = ?config.profile, "Starting server...");

    let metrics_handle = metrics_handle();
    let config = Arc::new(config);
    let state = Arc::new(AppState::in_memory(Arc::clone(&config)));
    let app = create_app_router(state, metrics_handle);

    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(host, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    serve_on(listener, app).await
}
