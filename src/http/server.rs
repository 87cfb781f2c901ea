//! HTTP server setup and the object handler.
//!
//! # Responsibilities
//! - Create the Axum Router with the object handler
//! - Wire up middleware (request ID, tracing, timeout, concurrency limit)
//! - Serve on a listener until shutdown
//! - Resolve, look up and stream objects for each request

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gridfs::{key, metadata, stream, StreamError};
use crate::http::request::{request_id_of, UuidRequestId, X_REQUEST_ID};
use crate::http::response::{object_response, ChannelSink};
use crate::lifecycle::startup::Gateway;
use crate::observability::metrics;
use crate::resilience::RetryPolicy;
use crate::routing::LocationRouter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<LocationRouter>,
    pub policy: RetryPolicy,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
}

impl GatewayServer {
    pub fn new(gateway: &Gateway) -> Self {
        let state = AppState {
            router: gateway.router.clone(),
            policy: gateway.policy,
        };
        let router = Self::build_router(&gateway.config, state);
        Self {
            router,
            config: gateway.config.clone(),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        request_id = %request_id_of(request),
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new()
            .route("/{*path}", get(gridfs_handler))
            .route("/", get(gridfs_handler))
            .with_state(state)
            .layer(middleware)
    }

    /// Run the server until `shutdown` fires, then drain in-flight responses.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_connections = self.config.listener.max_connections,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Object handler: location match → key → metadata → chunk stream.
async fn gridfs_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id_of(&request);
    let is_head = request.method() == Method::HEAD;
    let path = request.uri().path().to_string();

    let Some((location, segment)) = state.router.match_path(&path) else {
        tracing::debug!(request_id = %request_id, path = %path, "No location matched");
        metrics::record_request(metrics::NO_LOCATION, 404, start);
        return GatewayError::NoLocation(path.clone()).into_response();
    };
    let prefix = location.prefix().to_string();

    let key = match key::resolve(segment, location.key_type) {
        Ok(key) => key,
        Err(e) => {
            tracing::debug!(request_id = %request_id, location = %prefix, error = %e, "Malformed key");
            metrics::record_request(&prefix, 400, start);
            return GatewayError::from(e).into_response();
        }
    };

    let mut budget = state.policy.budget();
    let descriptor = match metadata::lookup(
        &state.policy,
        &location.group,
        &mut budget,
        &location.bucket,
        location.field,
        &key,
    )
    .await
    {
        Ok(descriptor) => descriptor,
        Err(e) => {
            log_failure(&request_id, &prefix, &e);
            metrics::record_request(&prefix, e.status().as_u16(), start);
            return e.into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        location = %prefix,
        key = %key,
        length = descriptor.length,
        chunks = descriptor.chunk_count,
        retries_used = budget.used(),
        "Object found"
    );
    metrics::record_request(&prefix, 200, start);

    if is_head {
        return object_response(&descriptor, Body::empty());
    }

    let (mut sink, body) = ChannelSink::channel();
    let response = object_response(&descriptor, body);
    tokio::spawn(async move {
        let result = stream::stream_object(
            &state.policy,
            &location.group,
            &mut budget,
            &location.bucket,
            &descriptor,
            &mut sink,
        )
        .await;

        match result {
            Ok(summary) => {
                metrics::record_stream(&prefix, summary.chunks, summary.bytes);
                tracing::debug!(
                    request_id = %request_id,
                    location = %prefix,
                    chunks = summary.chunks,
                    bytes = summary.bytes,
                    "Object streamed"
                );
            }
            Err(StreamError::ClientGone { chunks }) => {
                tracing::debug!(
                    request_id = %request_id,
                    location = %prefix,
                    chunks,
                    "Client disconnected mid-stream"
                );
            }
            Err(StreamError::Failed(e)) => {
                log_failure(&request_id, &prefix, &e);
                sink.abort(&e).await;
            }
        }
    });

    response
}

fn log_failure(request_id: &str, location: &str, err: &GatewayError) {
    match err {
        GatewayError::NotFound => {
            tracing::debug!(request_id = %request_id, location = %location, "Object not found");
        }
        GatewayError::Unavailable { .. } => {
            tracing::warn!(request_id = %request_id, location = %location, error = %err, "Backend unavailable");
        }
        _ => {
            tracing::error!(request_id = %request_id, location = %location, error = %err, "Request failed");
        }
    }
}
