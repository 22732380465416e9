//! HTTP listener setup and configuration.
//!
//! # Responsibilities
//! - Collect application routes before the app runs
//! - Wire up middleware (request ID, tracing, timeout, limits, server header)
//! - Bind the listener inside its own task and report the bound address
//! - Serve until the shutdown broadcast fires, then drain

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    http::{header, HeaderValue},
    middleware,
    routing::{get, MethodRouter},
    Router,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::schema::{AppIdentity, HttpSettings};
use crate::http::handlers::{healthz, HealthState};
use crate::http::limits::limit_concurrency;
use crate::http::request::make_request_span;
use crate::lifecycle::state::StateCell;
use crate::subsystem::{Closer, SubsystemError};

/// A spawned listener.
pub struct ListenerTask {
    /// Resolves once the socket is bound (or binding failed).
    pub bound: oneshot::Receiver<std::io::Result<SocketAddr>>,
    /// Completes after the graceful drain.
    pub handle: JoinHandle<std::io::Result<()>>,
}

/// Listener / router engine.
///
/// Routes are registered while the app is initializing; `spawn` consumes
/// them, so the listener starts at most once.
pub struct HttpServer {
    settings: HttpSettings,
    identity: AppIdentity,
    routes: Mutex<Option<Router>>,
}

impl HttpServer {
    pub fn new(settings: HttpSettings, identity: AppIdentity) -> Self {
        Self {
            settings,
            identity,
            routes: Mutex::new(Some(Router::new())),
        }
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// Add a route. Fails once the listener has started or closed.
    pub fn route(&self, path: &str, method_router: MethodRouter) -> Result<(), SubsystemError> {
        self.with_routes(|router| router.route(path, method_router))
    }

    /// Merge a router built elsewhere.
    pub fn merge(&self, other: Router) -> Result<(), SubsystemError> {
        self.with_routes(|router| router.merge(other))
    }

    fn with_routes(&self, f: impl FnOnce(Router) -> Router) -> Result<(), SubsystemError> {
        let mut routes = self.routes.lock();
        let router = routes
            .take()
            .ok_or_else(|| SubsystemError::Rejected("listener is already serving".to_string()))?;
        *routes = Some(f(router));
        Ok(())
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(&self, routes: Router, state: StateCell) -> Router {
        let health = Router::new()
            .route("/healthz", get(healthz))
            .with_state(HealthState::new(self.identity.clone(), state));

        let limiter = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));

        let mut router = routes
            .merge(health)
            .layer(middleware::from_fn_with_state(limiter, limit_concurrency))
            .layer(RequestBodyLimitLayer::new(self.settings.body_limit))
            .layer(TimeoutLayer::new(self.settings.request_timeout()));

        match HeaderValue::from_str(&self.settings.server_header) {
            Ok(value) => router = router.layer(SetResponseHeaderLayer::overriding(header::SERVER, value)),
            Err(_) => tracing::warn!(
                server_header = %self.settings.server_header,
                "Invalid server header, not setting it"
            ),
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Spawn the listener task.
    ///
    /// Binding happens inside the task; the outcome is reported through
    /// `ListenerTask::bound`. The task serves until `shutdown` fires.
    pub fn spawn(&self, state: StateCell, mut shutdown: broadcast::Receiver<()>) -> Result<ListenerTask, SubsystemError> {
        let routes = self.routes.lock().take().ok_or(SubsystemError::Closed)?;
        let router = self.build_router(routes, state);
        let host = self.settings.host.clone();
        let port = self.settings.port;
        let (bound_tx, bound_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let listener = match TcpListener::bind((host.as_str(), port)).await {
                Ok(listener) => listener,
                Err(e) => {
                    let copy = std::io::Error::new(e.kind(), e.to_string());
                    let _ = bound_tx.send(Err(e));
                    return Err(copy);
                }
            };
            let addr = listener.local_addr()?;
            let _ = bound_tx.send(Ok(addr));

            tracing::info!(address = %addr, "HTTP server starting");

            let app = router.into_make_service_with_connect_info::<SocketAddr>();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.recv().await;
                })
                .await?;

            tracing::info!("HTTP server stopped");
            Ok(())
        });

        Ok(ListenerTask { bound: bound_rx, handle })
    }
}

#[async_trait]
impl Closer for HttpServer {
    async fn close(&self) -> Result<(), SubsystemError> {
        self.routes.lock().take();
        Ok(())
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("bind_address", &self.settings.bind_address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let settings = HttpSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        HttpServer::new(settings, AppIdentity::default())
    }

    #[tokio::test]
    async fn routes_are_served_with_middleware() {
        let server = server();
        server.route("/ping", get(|| async { "pong" })).unwrap();

        let routes = server.routes.lock().take().unwrap();
        let router = server.build_router(routes, StateCell::new());

        let response = router
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::SERVER], "AppServer/v1");
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let settings = HttpSettings {
            body_limit: 8,
            ..Default::default()
        };
        let server = HttpServer::new(settings, AppIdentity::default());
        server
            .route("/echo", axum::routing::post(|body: String| async move { body }))
            .unwrap();

        let routes = server.routes.lock().take().unwrap();
        let router = server.build_router(routes, StateCell::new());

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header(header::CONTENT_LENGTH, "32")
                    .body(Body::from("x".repeat(32)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn closed_server_rejects_routes_and_spawn() {
        let server = server();
        server.close().await.unwrap();

        assert!(server.route("/late", get(|| async { "late" })).is_err());
        let shutdown = crate::lifecycle::shutdown::Shutdown::new();
        assert!(server.spawn(StateCell::new(), shutdown.subscribe()).is_err());
    }

    #[tokio::test]
    async fn spawn_reports_bound_address_and_drains() {
        let server = server();
        let shutdown = crate::lifecycle::shutdown::Shutdown::new();
        let task = server.spawn(StateCell::new(), shutdown.subscribe()).unwrap();

        let addr = task.bound.await.unwrap().unwrap();
        assert_ne!(addr.port(), 0);

        shutdown.trigger();
        task.handle.await.unwrap().unwrap();
    }
}
