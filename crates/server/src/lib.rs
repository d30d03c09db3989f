//! Gateway server library.
//!
//! Provides a reusable server function to serve the gateway either for the
//! binary, or for integration tests.

#![deny(missing_docs)]

pub mod config;
mod coordinator;
mod event_log;
pub mod logger;
mod sse;
mod tokens;
pub mod upstream;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bridge::{correlation, protocol::anthropic};
use config::Config;
use event_log::EventLogger;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use upstream::UpstreamClient;

pub use error::Error;

mod error;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Shared state handed to every axum handler: the upstream client, the
/// correlation store, resolved config, and the optional event logger.
#[derive(Clone)]
pub struct AppState {
    pub(crate) config: Arc<Config>,
    pub(crate) store: Arc<correlation::Store>,
    pub(crate) upstream: UpstreamClient,
    pub(crate) event_log: Option<Arc<EventLogger>>,
}

/// Configuration for serving the gateway.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// Resolved runtime configuration.
    pub config: Config,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// Log filter string (e.g. `"info"` or `"server=debug,bridge=debug"`).
    pub log_filter: String,
    /// The version string to log on startup.
    pub version: String,
    /// Optional oneshot sender to send back the bound address (useful if port 0 was specified).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the gateway with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        log_filter,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    logger::init(&log_filter);
    log::info!("gateway {version}");

    let event_log = if config.log_events {
        Some(Arc::new(EventLogger::new(config.log_dir.clone())))
    } else {
        None
    };

    let state = AppState {
        upstream: UpstreamClient::new(config.openai_api_key.clone()),
        store: Arc::new(correlation::Store::new()),
        config: Arc::new(config),
        event_log,
    };

    tokio::spawn(sweep_task(state.store.clone(), shutdown_signal.clone()));

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::HeaderName::from_static("x-requested-with")]);

    let app = Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/test-connection", get(test_connection))
        .route("/v1/messages", post(coordinator::handle_messages))
        .route("/v1/messages/count_tokens", post(count_tokens))
        .layer(cors)
        .with_state(state);

    let listener = TcpListener::bind(listen_address).await.map_err(Error::Bind)?;

    if let Some(sender) = bound_addr_sender {
        sender
            .send(listener.local_addr()?)
            .expect("failed to send back bound address");
    }

    log::info!("Anthropic-to-OpenAI gateway listening on http://{listen_address}");

    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result.map_err(Error::Server)?;
        }
        _ = shutdown_signal.cancelled() => {
            log::info!("received shutdown signal, shutting down gracefully...");
        }
    }

    Ok(())
}

/// Forces the correlation store's idle-eviction housekeeping on a fixed
/// cadence, independent of request traffic.
async fn sweep_task(store: Arc<correlation::Store>, shutdown_signal: CancellationToken) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = interval.tick() => store.sweep(),
            _ = shutdown_signal.cancelled() => break,
        }
    }
}

async fn banner() -> &'static str {
    "Anthropic-to-OpenAI translation gateway. POST /v1/messages to begin."
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "timestamp": jiff::Zoned::now().to_string(),
    }))
}

async fn test_connection(State(state): State<AppState>) -> impl IntoResponse {
    match state.upstream.probe().await {
        Ok(()) => (StatusCode::OK, axum::Json(serde_json::json!({"status": "ok"}))).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({"status": "error", "message": err.to_string()})),
        )
            .into_response(),
    }
}

async fn count_tokens(body: Bytes) -> Response {
    let request: anthropic::Request = match sonic_rs::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return coordinator::error_response(
                StatusCode::BAD_REQUEST,
                anthropic::ErrorResponse::new(anthropic::ErrorBody::invalid_request(format!(
                    "failed to parse request body: {err}"
                ))),
            );
        }
    };

    axum::Json(serde_json::json!({ "input_tokens": tokens::count(&request) })).into_response()
}
