//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, correlation)
//! - Bind server to listener
//! - Forward calls to the upstream through the resilient client
//! - Drive paced call sequences through the demand controller

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::FlowConfig;
use crate::correlation::{self, correlation_middleware, CorrelationContext, CorrelationLayerState};
use crate::flow::{DemandController, IterSource};
use crate::http::response::relay;
use crate::http::upstream::{HttpUpstream, UpstreamError};
use crate::resilience::{CircuitSnapshot, ResilientClient};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<HttpUpstream>,
    pub client: ResilientClient,
    pub demand: DemandController,
    pub max_paced_calls: u32,
}

/// HTTP server for the resilient upstream surface.
pub struct HttpServer {
    router: Router,
    config: FlowConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: FlowConfig) -> Result<Self, UpstreamError> {
        let state = AppState {
            upstream: Arc::new(HttpUpstream::new(&config.upstream)?),
            client: ResilientClient::from_config("upstream", &config),
            demand: DemandController::new(&config.demand),
            max_paced_calls: config.upstream.max_paced_calls,
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            config,
            state,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &FlowConfig, state: AppState) -> Router {
        let correlation_state =
            CorrelationLayerState::new(correlation::header_name(&config.correlation.header));

        Router::new()
            .route("/health", get(health_handler))
            .route("/upstream/{*path}", get(upstream_handler))
            .route("/paced", get(paced_handler))
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.listener.request_timeout_secs),
            ))
            .layer(middleware::from_fn_with_state(
                correlation_state,
                correlation_middleware,
            ))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.state.upstream.base_url(),
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

    /// Get a reference to the config.
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// The resilient client shared by all handlers.
    pub fn client(&self) -> &ResilientClient {
        &self.state.client
    }

    /// Router with state and middleware applied, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    circuit: CircuitSnapshot,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        circuit: state.client.breaker().snapshot(),
    })
}

/// One resilient GET against the upstream.
async fn upstream_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<CorrelationContext>,
    Path(path): Path<String>,
) -> Response {
    let upstream = state.upstream.as_ref();
    let path = path.as_str();

    match state
        .client
        .execute_result(&ctx, move |ctx| upstream.get(path, ctx))
        .await
    {
        Ok(response) => relay(response).await,
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct PacedParams {
    #[serde(default = "default_paced_path")]
    pub path: String,
    pub count: u32,
}

fn default_paced_path() -> String {
    "/".to_string()
}

/// Result of one call in a paced sequence.
#[derive(Debug, Serialize)]
pub struct PacedCall {
    pub index: u32,
    pub status: Option<u16>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PacedSummary {
    pub correlation_id: String,
    pub delivered: u64,
    pub batches: u64,
    pub calls: Vec<PacedCall>,
}

/// Issue `count` resilient calls, consumed in batches by the demand controller.
async fn paced_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<CorrelationContext>,
    Query(params): Query<PacedParams>,
) -> Response {
    if params.count > state.max_paced_calls {
        let message = format!(
            "count {} exceeds the limit of {}",
            params.count, state.max_paced_calls
        );
        return (StatusCode::BAD_REQUEST, message).into_response();
    }

    let calls = Mutex::new(Vec::with_capacity(params.count as usize));
    let client = &state.client;
    let upstream = state.upstream.as_ref();
    let path = params.path.as_str();
    let ctx_ref = &ctx;
    let calls_ref = &calls;

    let report = state
        .demand
        .run_to_end(IterSource::from_items(0..params.count), move |index| async move {
            let call = match client
                .execute_result(ctx_ref, move |ctx| upstream.get(path, ctx))
                .await
            {
                Ok(response) => PacedCall {
                    index,
                    status: Some(response.status().as_u16()),
                    error: None,
                },
                Err(e) => PacedCall {
                    index,
                    status: e.upstream_status().map(|s| s.as_u16()),
                    error: Some(e.to_string()),
                },
            };
            calls_ref
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
        })
        .await;

    match report {
        Ok(report) => Json(PacedSummary {
            correlation_id: ctx.id().to_string(),
            delivered: report.delivered,
            batches: report.batches,
            calls: calls.into_inner().unwrap_or_else(PoisonError::into_inner),
        })
        .into_response(),
        Err(e) => {
            tracing::error!(correlation_id = %ctx.id(), error = %e, "Paced sequence failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BackoffConfig, CircuitBreakerConfig, CorrelationConfig, DemandConfig, ListenerConfig,
        ObservabilityConfig, RetryConfig, TimeoutConfig, UpstreamConfig,
    };
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn config() -> FlowConfig {
        FlowConfig {
            listener: ListenerConfig::default(),
            upstream: UpstreamConfig {
                max_paced_calls: 10,
                ..UpstreamConfig::default()
            },
            correlation: CorrelationConfig {
                header: "x-trace".to_string(),
            },
            observability: ObservabilityConfig::default(),
            demand: DemandConfig {
                batch_size: 2,
                inter_batch_delay_ms: 10,
            },
            circuit_breaker: CircuitBreakerConfig {
                window_size: 10,
                failure_rate_threshold: 50.0,
                open_wait_ms: 1000,
                half_open_trial_count: 1,
            },
            retries: RetryConfig {
                max_attempts: 3,
                backoff: BackoffConfig::Fixed { delay_ms: 10 },
                non_retryable_statuses: vec![],
            },
            timeouts: TimeoutConfig { request_ms: 1000 },
        }
    }

    #[tokio::test]
    async fn health_reports_closed_circuit_and_echoes_header() {
        let server = HttpServer::new(config()).unwrap();
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-trace", "trace-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-trace"], "trace-7");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["circuit"]["state"], "closed");
    }

    #[tokio::test]
    async fn generates_id_when_header_missing() {
        let server = HttpServer::new(config()).unwrap();
        let response = server
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers()["x-trace"].to_str().unwrap();
        assert_eq!(id.len(), 36);
    }

    #[tokio::test]
    async fn paced_count_over_limit_is_rejected() {
        let server = HttpServer::new(config()).unwrap();
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/paced?count=11")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn slow_upstream_hits_listener_timeout() {
        // Accepts connections and never answers.
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = silent.accept().await {
                held.push(socket);
            }
        });

        let mut config = config();
        config.listener.request_timeout_secs = 1;
        config.upstream.base_url = format!("http://{addr}");
        config.timeouts.request_ms = 5000;
        config.retries.max_attempts = 1;

        let server = HttpServer::new(config).unwrap();
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/upstream/slow")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
