//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for the forwarding endpoint
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Build the dispatcher and its HTTP forwarder from config
//! - Serve until shutdown, then drain the dispatcher

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::dispatch::Dispatcher;
use crate::forward::{Forward, HttpForwarder};
use crate::http::request::{self as inbound, InboundError, MakeProxyRequestId};
use crate::http::response::Envelope;
use crate::resilience::RetryPolicy;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_body_bytes: usize,
}

/// HTTP server for the forwarding proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Create the server and start its workers. Must be called inside a
    /// Tokio runtime.
    pub fn new(config: ProxyConfig) -> Self {
        let policy = RetryPolicy::from_config(&config.retries, &config.timeouts);
        let forwarder = Arc::new(HttpForwarder::new(policy, config.limits.max_body_bytes));
        Self::with_forwarder(config, forwarder)
    }

    /// Create the server around a caller-supplied forwarder.
    pub fn with_forwarder(config: ProxyConfig, forwarder: Arc<dyn Forward>) -> Self {
        let dispatcher = Arc::new(Dispatcher::start(config.workers.max_concurrent, forwarder));

        let state = AppState {
            dispatcher: dispatcher.clone(),
            max_body_bytes: config.limits.max_body_bytes,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            dispatcher,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/", any(forward_handler))
            .route("/{*path}", any(forward_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(config.timeouts.request()))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %inbound::request_id(request.headers()),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeProxyRequestId))
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, then drain the workers.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            workers = self.dispatcher.capacity(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server no longer accepting connections");
            })
            .await?;

        self.dispatcher.shutdown().await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Forwarding handler: admit, dispatch, and answer with the outcome.
async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = inbound::request_id(request.headers());
    let fire_and_forget = crate::forward::outbound::is_fire_and_forget(request.headers());

    let item = match inbound::into_work_item(request, request_id.clone(), state.max_body_bytes).await {
        Ok(item) => item,
        Err(InboundError::Target(e)) => {
            tracing::warn!(request_id = %request_id, error = %e, "Invalid target");
            if fire_and_forget {
                return Envelope::accepted().into_response();
            }
            return e.into_response();
        }
        Err(InboundError::TooLarge(e)) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request body over limit");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
        Err(InboundError::Body(e)) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "Request body unreadable").into_response();
        }
    };

    let ticket = match state.dispatcher.submit(item) {
        Ok(ticket) => ticket,
        Err(e) => return e.into_response(),
    };

    match ticket.outcome().await {
        Ok(None) => Envelope::accepted().into_response(),
        Ok(Some(Ok(result))) => result.into_response(),
        Ok(Some(Err(e))) => e.into_response(),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "No outcome for request");
            e.into_response()
        }
    }
}
