//! # colabctl: GPU booking and notebook session control
//!
//! `colabctl` is the backend for a shared GPU notebook service. Users reserve GPU
//! time on a calendar and start Jupyter notebook containers that are pinned to a
//! physical GPU. The service exposes both as a JSON API under `/api`.
//!
//! ## Overview
//!
//! Two stores carry all of the state, both in memory:
//!
//! - The [`BookingRegistry`] holds calendar bookings. A booking reserves a number
//!   of GPUs for a half-open window `[start, end)`, and live bookings never
//!   overlap. Creating or rescheduling a booking into an occupied window fails
//!   with the list of bookings in the way.
//! - The [`SessionManager`] runs notebook sessions. Each session takes one GPU
//!   id from the [`GpuPool`](gpu::GpuPool), gets a random host port, and has its
//!   container launched through a [`ContainerRuntime`](runtime::ContainerRuntime).
//!   Sessions start as `creating`, flip to `running` after a boot delay, and
//!   become `terminated` when stopped, at which point the GPU returns to the pool.
//!
//! Bookings and sessions are independent: a booking reserves a GPU
//! *count* on the calendar, while sessions grab whichever physical GPU is free.
//!
//! ## Container runtimes
//!
//! The runtime is chosen in configuration. The simulated runtime fakes
//! containers in-process and is the default, which makes the whole service
//! runnable on a laptop. The Docker runtime drives the `docker` CLI on a GPU host.
//!
//! ## Configuration
//!
//! See [`config`] for the YAML layout and `COLABCTL_*` environment overrides.
//!
//! ## Observability
//!
//! Logging goes through `tracing` (see [`telemetry`]), with optional OTLP export.
//! Prometheus metrics, including the number of free GPUs, are served at
//! `/internal/metrics` when `enable_metrics` is set.

pub mod api;
pub mod bookings;
pub mod config;
pub mod errors;
pub mod gpu;
mod openapi;
pub mod runtime;
pub mod sessions;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderValue;
use axum::{
    Json, Router,
    routing::{delete, get, post, put},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use bookings::BookingRegistry;
pub use config::Config;
use config::CorsOrigin;
use gpu::GpuPool;
use openapi::ApiDoc;
pub use sessions::SessionManager;

/// Shared state handed to every request handler.
///
/// Both stores are reference counted, so cloning the state is cheap.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .bookings(bookings)
///     .sessions(sessions)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub bookings: Arc<BookingRegistry>,
    pub sessions: Arc<SessionManager>,
    #[builder(default = Instant::now())]
    pub started_at: Instant,
}

impl AppState {
    /// Build both stores from configuration.
    pub fn from_config(config: Config) -> Self {
        let gpus = Arc::new(GpuPool::new(config.gpus.device_ids.iter().copied()));
        let runtime = runtime::create_runtime(&config.container_runtime);
        let sessions = Arc::new(SessionManager::new(config.sessions.clone(), gpus, runtime));
        let bookings = Arc::new(BookingRegistry::new(&config.bookings));

        AppState::builder().config(config).bookings(bookings).sessions(sessions).build()
    }
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            // Browsers send origins without a trailing slash
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(config.cors.allow_credentials);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router.
///
/// - `/api/*`: health, calendar and session endpoints
/// - `/api/openapi.json` and `/api/docs`: OpenAPI document and Scalar UI
/// - `/internal/metrics`: Prometheus metrics, only when `enable_metrics` is set
///
/// # Errors
///
/// Returns an error if the CORS configuration cannot be turned into headers.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/health", get(api::handlers::health::health))
        // Calendar
        .route("/calendar/slots", get(api::handlers::calendar::list_slots))
        .route("/calendar/book", post(api::handlers::calendar::create_booking))
        .route("/calendar/reschedule/{id}", put(api::handlers::calendar::reschedule_booking))
        .route("/calendar/cancel/{id}", delete(api::handlers::calendar::cancel_booking))
        .route("/calendar/user/{user_id}", get(api::handlers::calendar::list_user_bookings))
        // Sessions
        .route("/sessions/create", post(api::handlers::sessions::create_session))
        .route("/sessions/user/{user_id}", get(api::handlers::sessions::list_user_sessions))
        .route(
            "/sessions/{id}",
            get(api::handlers::sessions::get_session).delete(api::handlers::sessions::terminate_session),
        )
        .route("/sessions/{id}/save", post(api::handlers::sessions::save_notebook))
        .route("/sessions/{id}/notebook", get(api::handlers::sessions::get_notebook))
        .route("/sessions/{id}/logs", get(api::handlers::sessions::get_session_logs))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state.clone());

    let router = Router::new()
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/api/docs", ApiDoc::openapi()));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        state.sessions.gpus().publish_current();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
}

impl Application {
    /// Create a new application instance with all stores initialized
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting colabctl with configuration: {:#?}", config);

        let app_state = AppState::from_config(config.clone());
        let router = build_router(&app_state)?;

        info!(
            gpus = app_state.sessions.gpus().capacity(),
            runtime = ?config.container_runtime,
            "Application initialized"
        );

        Ok(Self {
            router,
            app_state,
            config,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "colabctl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Abort boot timers still pending
        self.app_state.sessions.shutdown();

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
