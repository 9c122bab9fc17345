//! Server composition: tracing, metrics, database bootstrap, router
//! assembly and the serve loop.

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::Duration,
};

use axum::{Extension, Router, response::IntoResponse, routing::get, serve};
use axum::http::{HeaderValue, StatusCode, header};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shared::config::{Config, DatabaseConfig, LogFormat};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    app_state::AppState,
    db::bootstrap,
    listener::run_change_listener,
    middleware::request_context::{self, RequestIdState},
    routes::{self, openapi::openapi_routes},
    services::{
        Notifier,
        contacts::{ContactDirectory, PgContactDirectory, StaticContactDirectory},
        push_gateway::{PushGateway, WebPushGateway},
        registry::{MemorySubscriptionRegistry, PgSubscriptionRegistry, SubscriptionRegistry},
    },
    tracer,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Returns the process-wide Prometheus handle, installing the recorder
/// on first use.
///
/// # Panics
/// Panics if the recorder cannot be installed, which only happens when
/// another recorder was registered outside this function.
#[must_use]
pub fn prometheus_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("a metrics recorder was already installed")
        })
        .clone()
}

#[allow(clippy::unused_async)] // handlers must be async for axum routing
async fn render_metrics(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    let content_type = [(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    )];
    (StatusCode::OK, content_type, handle.render())
}

/// Installs the global tracing subscriber and returns the effective
/// level directive.
#[must_use]
pub fn init_tracing(config: &Config) -> String {
    let builder = fmt::fmt()
        .with_env_filter(env_filter_for(config))
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    match config.logging.format {
        LogFormat::Json => builder.json().with_ansi(false).init(),
        LogFormat::Text => builder.with_ansi(true).init(),
    }

    config.logging.level.clone()
}

fn env_filter_for(config: &Config) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Opens the Postgres pool sized from the database config.
///
/// # Errors
/// Returns an error if the connection attempt fails.
pub async fn connect_pool(db: &DatabaseConfig) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect(&db.url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(db.max_connections));
    Ok(pool)
}

/// Builds the application state. With a pool the registry and contact
/// directory are database-backed; without one the in-memory fallbacks
/// keep the push surface testable.
#[must_use]
pub fn build_app_state(config: &Config, pool: Option<sqlx::PgPool>) -> Arc<AppState> {
    let registry: Arc<dyn SubscriptionRegistry> = match pool.as_ref() {
        Some(pool) => Arc::new(PgSubscriptionRegistry::new(pool.clone())),
        None => Arc::new(MemorySubscriptionRegistry::default()),
    };
    let contacts: Arc<dyn ContactDirectory> = match pool.as_ref() {
        Some(pool) => Arc::new(PgContactDirectory::new(pool.clone())),
        None => Arc::new(StaticContactDirectory::default()),
    };
    let gateway: Arc<dyn PushGateway> = Arc::new(WebPushGateway::new(&config.push));

    Arc::new(AppState {
        pool,
        registry,
        contacts,
        gateway,
        push: config.push.clone(),
    })
}

/// Builds the CORS layer from the configured policy. An empty origin
/// list means any origin; an explicit list is passed through verbatim.
#[must_use]
pub fn cors_layer(config: &Config) -> CorsLayer {
    use http::Method;

    let policy = &config.server.cors;
    let allow_origin = if policy.allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            policy
                .allowed_origins
                .iter()
                .filter_map(|origin| http::HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::any())
        .allow_credentials(policy.allow_credentials)
        .max_age(Duration::from_secs(policy.max_age_seconds))
}

/// All routes nested under `/api`.
#[must_use]
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(routes::push::push_routes())
        .merge(routes::messages::message_routes())
}

/// Static file service for the built web UI, falling back to the SPA
/// index for client-side routes.
#[must_use]
pub fn spa_service<S>(static_dir: PathBuf, spa_index: PathBuf) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    use axum::routing::get_service;

    let files = ServeDir::new(static_dir)
        .append_index_html_on_directories(true)
        .fallback(get_service(ServeFile::new(spa_index)));
    Router::new().fallback_service(files)
}

/// Assembles the application router with all middleware and routes.
///
/// Routes are registered before the middleware stack is applied, so the
/// request-id, trace and CORS layers wrap every route including the
/// static fallback.
#[must_use]
pub fn build_router(state: Arc<AppState>, config: &Config, metrics: PrometheusHandle) -> Router {
    let spa = spa_service(config.web.static_dir.clone(), config.web.spa_index.clone());
    let request_id_state = RequestIdState::from_config(config);

    Router::new()
        .nest("/api", api_routes())
        .merge(routes::health::health_routes())
        .route("/metrics", get(render_metrics))
        .merge(openapi_routes())
        .merge(spa)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    request_id_state,
                    request_context::assign_request_id,
                ))
                .layer(tracer::trace_layer())
                .layer(cors_layer(config))
                .layer(Extension(metrics)),
        )
        .with_state(state)
}

/// Resolves when CTRL+C is received.
///
/// # Panics
/// Panics if the CTRL+C handler cannot be installed.
pub async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    info!("shutdown signal received");
}

/// Starts the backend server and binds it to the configured port.
///
/// # Errors
/// Returns an error if the database is unreachable, the schema cannot
/// be bootstrapped, or the listen socket cannot be bound.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let level = init_tracing(&config);
    info!(%level, "starting server");

    let metrics = prometheus_handle();

    let pool = connect_pool(&config.db).await?;
    bootstrap::ensure_liveness(&pool).await?;
    bootstrap::run(&pool).await?;
    bootstrap::ensure_readiness(&pool).await?;

    let state = build_app_state(&config, Some(pool.clone()));

    let shutdown_token = CancellationToken::new();
    let notifier = Arc::new(Notifier::new(
        Arc::clone(&state.registry),
        Arc::clone(&state.contacts),
        Arc::clone(&state.gateway),
    ));
    let listener_task = tokio::spawn(run_change_listener(
        pool,
        notifier,
        shutdown_token.clone(),
    ));

    let app = build_router(state, &config, metrics);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_token.cancel();
    let _ = listener_task.await;

    Ok(())
}
