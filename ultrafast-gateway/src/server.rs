//! # HTTP Server Module
//!
//! This module provides the HTTP server setup and configuration for the Ultrafast Gateway.
//! It handles server initialization, middleware setup, routing, and application state management.
//!
//! ## Overview
//!
//! The server module is responsible for:
//! - **Server Initialization**: Setting up the HTTP server with Axum
//! - **Middleware Configuration**: Authentication, CORS, logging, and metrics
//! - **Route Registration**: API endpoints for chat, embeddings, and admin functions
//! - **Application State**: Shared state across all handlers
//!
//! ## Architecture
//!
//! The server uses Axum as the web framework with the following layers:
//!
//! 1. **Timeout Layer**: Request timeout handling
//! 2. **CORS Middleware**: Cross-origin resource sharing
//! 3. **Authentication Middleware**: API key validation and admission control
//! 4. **Logging Middleware**: Request/response logging
//! 5. **Metrics Middleware**: Performance monitoring
//!
//! ## API Endpoints
//!
//! ### Core API Endpoints
//!
//! - `POST /v1/chat/completions` - Chat completion API
//! - `POST /v1/embeddings` - Text embedding API
//! - `POST /v1/images/generations` - Image generation API
//!
//! ### Admin Endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `GET /metrics` - Performance metrics
//! - `GET /admin/providers` - Provider status
//! - `GET /admin/config` - Configuration status
//!
//! ## Usage
//!
//! ```rust
//! use ultrafast_gateway::server::create_server;
//! use ultrafast_gateway::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml")?;
//!     let app = create_server(config).await?;
//!     
//!     // The server is ready to handle requests
//!     Ok(())
//! }
//! ```
//!
//! ## Middleware Stack
//!
//! The server applies middleware in the following order:
//!
//! 1. **Timeout**: Ensures requests don't hang indefinitely
//! 2. **CORS**: Handles cross-origin requests
//! 3. **Logging**: Records request/response details
//! 4. **Metrics**: Tracks performance metrics
//! 5. **Authentication**: Validates API keys and JWT tokens
//! 6. **Input Validation**: Validates and sanitizes requests
//! 7. **Plugin Processing**: Applies dynamic plugins
//!
//! ## Application State
//!
//! The `AppState` struct contains shared state accessible to all handlers:
//!
//! - **Configuration**: Server and provider configuration
//! - **Client**: Ultrafast SDK client for provider communication
//! - **Overflow Queue**: Lease-based admission burst absorber
//! - **Telemetry Sink**: Event taxonomy emitter
//!
//! ## Error Handling
//!
//! The server includes comprehensive error handling:
//!
//! - **Timeout Errors**: Automatic request cancellation
//! - **Authentication Errors**: Proper HTTP status codes
//! - **Validation Errors**: Detailed error messages
//! - **Provider Errors**: Graceful fallback handling

use crate::config::Config;
use crate::handlers;
use crate::middleware::{auth_middleware, cors_middleware, logging_middleware, metrics_middleware};
use crate::overflow::{InMemoryOverflowQueue, OverflowQueue};
use crate::telemetry::{TelemetrySink, TracingSink};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use ultrafast_models_sdk::UltrafastClient;

/// Application state shared across all HTTP handlers.
///
/// Contains all the necessary components for handling requests:
/// configuration, client, overflow queue, and telemetry sink.
///
/// # Thread Safety
///
/// All fields are wrapped in `Arc` for thread-safe sharing across
/// multiple request handlers.
pub struct AppState {
    /// Server and provider configuration
    pub config: Arc<Config>,
    /// Ultrafast SDK client for provider communication
    pub client: Arc<UltrafastClient>,
    /// Lease-based overflow queue absorbing admission bursts
    pub overflow_queue: Arc<dyn OverflowQueue>,
    /// Telemetry sink events are emitted to
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            client: self.client.clone(),
            overflow_queue: self.overflow_queue.clone(),
            telemetry: self.telemetry.clone(),
        }
    }
}

/// Create and configure the HTTP server with all middleware and routes.
///
/// This function initializes all components of the gateway:
/// - Ultrafast SDK client with configured providers
/// - Authentication service and admission control
/// - Metrics collection system
/// - Overflow queue and telemetry sink
/// - HTTP server with middleware stack and routes
///
/// # Arguments
///
/// * `config` - The gateway configuration containing all settings
///
/// # Returns
///
/// Returns a configured Axum router ready to handle HTTP requests.
///
/// # Errors
///
/// Returns an error if:
/// - SDK client cannot be created
/// - Authentication service cannot be set up
/// - Metrics system cannot be initialized
///
/// # Example
///
/// ```rust
/// let config = Config::load("config.toml")?;
/// let app = create_server(config).await?;
/// ```
pub async fn create_server(config: Config) -> anyhow::Result<Router> {
    // Create the SDK client in standalone mode with configured providers
    let mut client_builder = UltrafastClient::standalone();

    // Add configured providers to the client
    for (name, provider_config) in &config.providers {
        client_builder = client_builder.with_provider(name.clone(), provider_config.clone());
    }

    // If no providers configured, add Ollama as default for development
    if config.providers.is_empty() {
        client_builder = client_builder.with_ollama("http://localhost:11434");
    }

    // `admission.router_policy` names one of the router's built-in
    // strategies and takes precedence over `routing.strategy` when it names
    // anything other than "default" — the named policy is the operator-facing
    // knob (env-overridable via RUNESTONE_ROUTER_POLICY), `routing.strategy`
    // is the full strategy value for cases the three named policies don't
    // cover (load balancing weights, conditional rules, A/B splits).
    let routing_strategy = match config.admission.router_policy.as_str() {
        "health_aware" => ultrafast_models_sdk::routing::RoutingStrategy::HealthAware,
        "cost_aware" => ultrafast_models_sdk::routing::RoutingStrategy::CostAware,
        _ => config.routing.strategy.clone(),
    };

    // Build the client with the configured routing strategy
    let client = client_builder
        .with_routing_strategy(routing_strategy)
        .build()?;

    // Perform security sanity check for JWT secrets before wiring the global
    // auth service, so a misconfigured secret never starts accepting traffic.
    {
        let tmp = crate::auth::AuthService::new(config.auth.clone());
        tmp.sanity_check()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    }

    crate::auth::initialize_auth_service(config.auth.clone());

    // Initialize metrics collector with configuration
    let metrics_config = crate::metrics::MetricsConfig {
        enabled: config.metrics.enabled,
        max_requests: config.metrics.max_requests,
        retention_duration: config.metrics.retention_duration,
        cleanup_interval: config.metrics.cleanup_interval,
    };
    crate::metrics::initialize_metrics(metrics_config).await;

    let overflow_queue: Arc<dyn OverflowQueue> = Arc::new(InMemoryOverflowQueue::new(
        config.admission.overflow_capacity_per_key,
        config.admission.overflow_visibility_timeout,
    ));
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(TracingSink);

    let state = AppState {
        config: Arc::new(config.clone()),
        client: Arc::new(client),
        overflow_queue,
        telemetry,
    };

    // Background drainer: periodically replays whatever admission diverted
    // into the overflow queue. Detached — it runs for the process lifetime,
    // same as the metrics cleanup task started by `initialize_metrics`.
    crate::overflow::spawn_drain_loop(
        state.clone(),
        config.admission.overflow_visibility_timeout / 2,
        16,
    );

    // Warn if permissive CORS is used in production-like settings
    if config.server.cors.enabled && config.server.cors.allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!(
            "CORS is enabled with wildcard origins. This is unsafe for production. Configure explicit allowed_origins."
        );
    }

    // Create the main router
    let app = Router::new()
        // OpenAI-compatible endpoints
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/completions", post(handlers::completions))
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/v1/images/generations", post(handlers::image_generations))
        .route(
            "/v1/audio/transcriptions",
            post(handlers::audio_transcriptions),
        )
        .route("/v1/audio/speech", post(handlers::text_to_speech))
        .route("/v1/models", get(handlers::list_models))
        // Health and admin endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_live))
        .route("/health/ready", get(handlers::health_ready))
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/prometheus", get(handlers::prometheus_metrics))
        .route("/admin/providers", get(handlers::list_providers))
        .route("/admin/config", get(handlers::get_config))
        .route(
            "/admin/circuit-breakers",
            get(handlers::get_circuit_breaker_metrics),
        )
        // Middleware stack
        .layer(
            ServiceBuilder::new()
                .layer(cors_middleware(&config.server.cors)) // 1. CORS (first)
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )) // 2. Authentication (includes admission control)
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    logging_middleware,
                )) // 3. Logging (only authenticated requests)
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                )) // 4. Metrics (only authenticated requests)
                .layer(TimeoutLayer::new(config.server.timeout)), // 5. Timeout (last)
        )
        .with_state(state);

    Ok(app)
}
