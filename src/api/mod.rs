//! HTTP surface: health/readiness/liveness probes, Prometheus metrics,
//! a realtime websocket bridge, the streaming JSON-RPC endpoint, and a
//! hand-assembled OpenAPI description of that (intentionally thin)
//! surface. There is no REST CRUD duplication of the tool catalog --
//! task/agent mutation goes through `tools/call` on one of the two
//! JSON-RPC transports.

use crate::auth::{auth_middleware, AuthState};
use crate::config::ApiConfig;
use crate::dispatch::Dispatcher;
use crate::models::Subject;
use crate::monitoring::SystemMonitor;
use crate::rate_limit::RateLimitRegistry;
use crate::realtime::{ChannelRegistry, KNOWN_CHANNELS};
use crate::transport::streaming_http;
use crate::{Result, SpiralError};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, State,
    },
    http::{HeaderName, Method, StatusCode},
    middleware,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

const SERVICE_NAME: &str = "spiral-core";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    channels: Arc<ChannelRegistry>,
    monitor: Arc<SystemMonitor>,
    prometheus: PrometheusHandle,
}

impl axum::extract::FromRef<AppState> for Arc<Dispatcher> {
    fn from_ref(state: &AppState) -> Self {
        state.dispatcher.clone()
    }
}

pub struct ApiServer {
    config: ApiConfig,
    auth: Arc<AuthState>,
    rate_limit: Arc<RateLimitRegistry>,
    state: AppState,
}

impl ApiServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ApiConfig,
        dispatcher: Arc<Dispatcher>,
        auth: Arc<AuthState>,
        rate_limit: Arc<RateLimitRegistry>,
        channels: Arc<ChannelRegistry>,
        monitor: Arc<SystemMonitor>,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self { config, auth, rate_limit, state: AppState { dispatcher, channels, monitor, prometheus } }
    }

    pub async fn run(&self) -> Result<()> {
        let app = self.build_router();
        let listener = tokio::net::TcpListener::bind(format!("{}:{}", self.config.host, self.config.port))
            .await
            .map_err(|e| SpiralError::Internal(e.into()))?;
        info!(host = %self.config.host, port = self.config.port, "API server listening");
        axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await
            .map_err(|e| SpiralError::Internal(e.into()))?;
        Ok(())
    }

    pub fn build_router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(self.config.allowed_origins.iter().filter_map(|o| o.parse().ok()).collect::<Vec<_>>())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
                HeaderName::from_static("x-api-key"),
            ])
            .max_age(std::time::Duration::from_secs(3600));

        let public = Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/live", get(live))
            .route("/metrics", get(metrics_endpoint))
            .route("/openapi.json", get(openapi_json))
            .route("/docs", get(docs_html));

        let protected = Router::new()
            .route("/rpc", post(streaming_http::handle))
            .route("/ws/{channel}", get(ws_upgrade))
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn_with_state(self.auth.clone(), auth_middleware))
                    .layer(middleware::from_fn_with_state(self.rate_limit.clone(), rate_limit_middleware)),
            );

        public
            .merge(protected)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
            .with_state(self.state.clone())
    }
}

async fn rate_limit_middleware(
    State(registry): State<Arc<RateLimitRegistry>>,
    Extension(subject): Extension<Subject>,
    request: axum::extract::Request,
    next: middleware::Next,
) -> std::result::Result<Response, Response> {
    if registry.check(subject.as_str()).await {
        Ok(next.run(request).await)
    } else {
        (StatusCode::TOO_MANY_REQUESTS, Json(serde_json::json!({"error": "rate limit exceeded"}))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "service": SERVICE_NAME, "version": SERVICE_VERSION}))
}

async fn ready(State(state): State<AppState>) -> std::result::Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.monitor.readiness().await {
        Ok(()) => Ok(Json(serde_json::json!({"ready": true}))),
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            Err((StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"ready": false}))))
        }
    }
}

async fn live(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({"live": state.monitor.liveness()}))
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    let rendered = state.prometheus.render();
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        rendered,
    )
        .into_response()
}

async fn ws_upgrade(State(state): State<AppState>, Path(channel): Path<String>, ws: WebSocketUpgrade) -> Response {
    if !KNOWN_CHANNELS.contains(&channel.as_str()) {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "unknown channel"}))).into_response();
    }
    ws.on_upgrade(move |socket| forward_channel(socket, state.channels, channel))
}

async fn forward_channel(mut socket: WebSocket, channels: Arc<ChannelRegistry>, channel: String) {
    let mut rx = channels.subscribe(&channel).await;
    while let Some(event) = rx.recv().await {
        let text = match serde_json::to_string(&event) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to encode change event for websocket");
                continue;
            }
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

async fn openapi_json() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "openapi": "3.0.3",
        "info": {"title": SERVICE_NAME, "version": SERVICE_VERSION},
        "paths": {
            "/health": {"get": {"summary": "Liveness-independent health marker", "responses": {"200": {"description": "ok"}}}},
            "/ready": {"get": {"summary": "Readiness probe (DB reachable)", "responses": {"200": {"description": "ready"}, "503": {"description": "not ready"}}}},
            "/live": {"get": {"summary": "Liveness probe", "responses": {"200": {"description": "live"}}}},
            "/metrics": {"get": {"summary": "Prometheus text exposition", "responses": {"200": {"description": "metrics"}}}},
            "/rpc": {"post": {"summary": "Streaming JSON-RPC tool dispatch", "responses": {"200": {"description": "newline-delimited JSON-RPC responses"}}}},
            "/ws/{channel}": {"get": {"summary": "Realtime change-event subscription", "responses": {"101": {"description": "switching protocols"}}}}
        }
    }))
}

async fn docs_html() -> Html<&'static str> {
    Html(
        "<!doctype html><html><head><title>spiral-core API</title></head><body>\
         <h1>spiral-core</h1>\
         <p>Tool calls go through <code>POST /rpc</code> or the stdio transport; \
         see <a href=\"/openapi.json\">/openapi.json</a> for the thin REST surface.</p>\
         </body></html>",
    )
}
