//! `CampusServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use campus_auth::IdentityVerifier;
use campus_auth::credential::select_credential;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::publish::publish_handler;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::dispatcher::Dispatcher;
use crate::websocket::lifecycle::LifecycleController;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection lifecycle controller (owns registry and rooms).
    pub controller: Arc<LifecycleController>,
    /// Fan-out entry point.
    pub dispatcher: Dispatcher,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Open-session counter enforcing the connection cap.
    pub sessions: Arc<SessionGate>,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus render handle.
    pub metrics_handle: PrometheusHandle,
}

/// Counts open sessions and refuses new ones at the cap.
pub struct SessionGate {
    open: AtomicUsize,
    max: usize,
}

impl SessionGate {
    /// Create a gate admitting at most `max` concurrent sessions.
    pub fn new(max: usize) -> Self {
        Self {
            open: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve a slot, released when the returned permit drops.
    pub fn try_enter(self: &Arc<Self>) -> Option<SessionPermit> {
        self.open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max).then_some(n + 1))
            .ok()
            .map(|_| SessionPermit(Arc::clone(self)))
    }

    /// Sessions currently holding a slot.
    pub fn open(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }
}

/// A reserved session slot.
pub struct SessionPermit(Arc<SessionGate>);

impl Drop for SessionPermit {
    fn drop(&mut self) {
        let _ = self.0.open.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The hub server.
pub struct CampusServer {
    config: Arc<ServerConfig>,
    controller: Arc<LifecycleController>,
    shutdown: Arc<ShutdownCoordinator>,
    sessions: Arc<SessionGate>,
    start_time: Instant,
    metrics_handle: PrometheusHandle,
}

impl CampusServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        verifier: Arc<dyn IdentityVerifier>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let controller = LifecycleController::new(
            verifier,
            config.outbound_capacity,
            config.max_dropped_messages,
        );
        Self {
            sessions: Arc::new(SessionGate::new(config.max_connections)),
            config: Arc::new(config),
            controller: Arc::new(controller),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics_handle,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            controller: self.controller.clone(),
            dispatcher: self.controller.dispatcher(),
            shutdown: self.shutdown.clone(),
            sessions: self.sessions.clone(),
            start_time: self.start_time,
            config: self.config.clone(),
            metrics_handle: self.metrics_handle.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/publish", post(publish_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    /// The task ends once [`ShutdownCoordinator::shutdown`] is called.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr()?;

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });

        info!(addr = %local, "listening");
        Ok((local, handle))
    }

    /// Stop accepting, close every session with 1001, and wait (bounded by
    /// `timeout`) for the serve task and all sessions to finish.
    pub async fn shutdown_gracefully(&self, handle: JoinHandle<()>, timeout: Option<Duration>) -> bool {
        let sessions = self.sessions.clone();
        self.shutdown
            .graceful_shutdown(vec![handle], move || sessions.open(), timeout)
            .await
    }

    /// Fan-out entry point for in-process domain code.
    pub fn dispatcher(&self) -> Dispatcher {
        self.controller.dispatcher()
    }

    /// The lifecycle controller.
    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Sessions currently open, handshakes included.
    pub fn open_sessions(&self) -> usize {
        self.sessions.open()
    }
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let Some(permit) = state.sessions.try_enter() else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(max = state.config.max_connections, "connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let credential = select_credential(params.token.as_deref(), authorization);

    let controller = state.controller.clone();
    let timings = state.config.session_timings();
    let shutdown = state.shutdown.token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _permit = permit;
            run_ws_session(socket, credential, controller, timings, shutdown).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.controller.registry().len(),
        state.controller.rooms().room_count(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics_handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use campus_auth::JwtVerifier;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use tower::ServiceExt;

    fn make_server(config: ServerConfig) -> CampusServer {
        let verifier = Arc::new(JwtVerifier::new(b"unit-test-secret", None, 0));
        let handle = PrometheusBuilder::new().build_recorder().handle();
        CampusServer::new(config, verifier, handle)
    }

    async fn body_json(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_reports_counts() {
        let server = make_server(ServerConfig::default());
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
        assert_eq!(json["rooms"], 0);
    }

    #[tokio::test]
    async fn health_reports_draining_after_shutdown() {
        let server = make_server(ServerConfig::default());
        server.shutdown().shutdown();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["status"], "draining");
    }

    #[tokio::test]
    async fn metrics_endpoint_responds() {
        let server = make_server(ServerConfig::default());
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_rejected() {
        let server = make_server(ServerConfig::default());
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn publish_disabled_without_key() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder()
            .method("POST")
            .uri("/publish")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"target":{"kind":"all"},"event":"emergency:alert"}"#))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn publish_with_key_returns_delivered_count() {
        let server = make_server(ServerConfig {
            publish_key: Some("pk".into()),
            ..ServerConfig::default()
        });
        let req = Request::builder()
            .method("POST")
            .uri("/publish")
            .header("content-type", "application/json")
            .header("x-publish-key", "pk")
            .body(Body::from(
                r#"{"target":{"kind":"tenant","id":"school-42"},"event":"fee:paid","data":{"amount":1}}"#,
            ))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["delivered"], 0);
    }

    #[tokio::test]
    async fn publish_bad_body_is_400() {
        let server = make_server(ServerConfig {
            publish_key: Some("pk".into()),
            ..ServerConfig::default()
        });
        let req = Request::builder()
            .method("POST")
            .uri("/publish")
            .header("content-type", "application/json")
            .header("x-publish-key", "pk")
            .body(Body::from(r#"{"target":{"kind":"nowhere"},"event":"x"}"#))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server(ServerConfig::default());
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn session_gate_enforces_cap_and_releases() {
        let gate = Arc::new(SessionGate::new(2));
        let a = gate.try_enter().unwrap();
        let _b = gate.try_enter().unwrap();
        assert!(gate.try_enter().is_none());
        assert_eq!(gate.open(), 2);
        drop(a);
        assert_eq!(gate.open(), 1);
        assert!(gate.try_enter().is_some());
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops() {
        let server = make_server(ServerConfig::default());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.shutdown_gracefully(handle, Some(Duration::from_secs(5))).await);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let server = make_server(ServerConfig {
            port: taken.local_addr().unwrap().port(),
            ..ServerConfig::default()
        });
        assert!(matches!(server.listen().await, Err(ServerError::Bind { .. })));
    }
}
