//! The query service: an axum application over a shared facade snapshot,
//! with graceful shutdown and a readiness signal for supervising processes.

pub mod api;
pub mod params;
pub mod polyline;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::facade::{DataFacade, SharedDataFacade};

use api::{AppState, RequestLimits};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
    pub limits: RequestLimits,
    /// Poll interval for datastore-published snapshots.
    pub reload_interval: Duration,
    /// Per-request wall clock bound.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 5000,
            limits: RequestLimits::default(),
            reload_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(api::route),
    components(schemas(
        api::RouteResponse,
        api::RouteJson,
        api::RouteLegJson,
        api::RouteStepJson,
        api::StepManeuverJson,
        api::IntersectionJson,
        api::LaneJson,
        api::Waypoint,
        api::ErrorBody,
    )),
    info(
        title = "waymark routing API",
        description = "Turn-aware routing over an edge-expanded OSM graph"
    )
)]
struct ApiDoc;

async fn health(axum::extract::State(state): axum::extract::State<Arc<AppState>>) -> impl IntoResponse {
    let facade = state.facade.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": facade.data_timestamp(),
        "checksum": format!("{:08x}", facade.data_checksum()),
        "nodes": facade.edge_based_node_count(),
    }))
}

pub fn build_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/route/v1/{profile}/{coordinates}", get(api::route))
        .route("/nearest/v1/{profile}/{coordinates}", get(api::nearest))
        .route("/table/v1/{profile}/{coordinates}", get(api::table))
        .route("/match/v1/{profile}/{coordinates}", get(api::match_trace))
        .route("/trip/v1/{profile}/{coordinates}", get(api::trip))
        .route("/health", get(health))
        .fallback(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "code": "InvalidUrl",
                    "message": "URL did not match any service"
                })),
            )
        })
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Notify a supervising parent that the service is warm.
fn signal_parent_when_ready() {
    if std::env::var("SIGNAL_PARENT_WHEN_READY").is_ok() {
        // SAFETY: getppid and kill are async-signal-safe libc calls
        unsafe {
            libc::kill(libc::getppid(), libc::SIGUSR1);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown requested, draining connections");
    // hard abort if the drain exceeds its grace period
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        tracing::warn!("drain deadline exceeded, aborting");
        std::process::exit(2);
    });
}

/// Run the service until SIGINT/SIGTERM, with a bounded drain.
pub async fn run_server(base: &Path, config: ServerConfig) -> Result<()> {
    let facade = Arc::new(SharedDataFacade::load(base)?);
    let state = Arc::new(AppState {
        facade: facade.clone(),
        limits: config.limits,
    });

    // watch for datastore-published snapshots
    let reload_facade = facade.clone();
    let reload_interval = config.reload_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reload_interval);
        loop {
            ticker.tick().await;
            if let Err(error) = reload_facade.reload_if_changed() {
                tracing::warn!(%error, "snapshot reload failed, keeping current data");
            }
        }
    });

    let app = build_router(state, config.request_timeout);
    let address: SocketAddr = format!("{}:{}", config.ip, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.ip, config.port))?;

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(%address, "listening");
    signal_parent_when_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}
