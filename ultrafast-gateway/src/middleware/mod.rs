//! # HTTP Middleware Module
//!
//! This module provides HTTP middleware components for the Ultrafast Gateway.
//! It includes authentication, logging, metrics collection, CORS handling,
//! and input validation middleware.
//!
//! ## Overview
//!
//! The middleware system provides:
//! - **Authentication Middleware**: API key and JWT token validation
//! - **Logging Middleware**: Request/response logging with context
//! - **Metrics Middleware**: Performance metrics collection
//! - **CORS Middleware**: Cross-origin resource sharing
//! - **Input Validation**: Request validation and sanitization
//!
//! ## Middleware Stack Order
//!
//! The middleware is applied in the following order:
//!
//! 1. **Timeout Middleware**: Request timeout handling
//! 2. **CORS Middleware**: Cross-origin request handling
//! 3. **Logging Middleware**: Request/response logging
//! 4. **Metrics Middleware**: Performance tracking
//! 5. **Authentication Middleware**: API key validation and admission control
//! 6. **Input Validation Middleware**: Request validation
//!
//! ## Authentication Middleware
//!
//! Handles API key and JWT token validation:
//!
//! - **API Key Extraction**: Extracts keys from headers
//! - **JWT Validation**: Validates JWT tokens
//! - **Rate Limiting**: Applies rate limits per user
//! - **Permission Checking**: Validates user permissions
//! - **Session Management**: Handles user sessions
//!
//! ## Logging Middleware
//!
//! Provides comprehensive request/response logging:
//!
//! - **Request Context**: Logs request method, URI, and headers
//! - **Response Status**: Tracks response status codes
//! - **Latency Tracking**: Measures request processing time
//! - **Request ID**: Unique request identifiers for tracing
//! - **Error Logging**: Detailed error information
//!
//! ## Metrics Middleware
//!
//! Collects performance metrics for each request:
//!
//! - **Request Metrics**: Method, path, status, latency
//! - **User Tracking**: User ID and session information
//! - **Provider Metrics**: Provider selection and performance
//! - **Cost Tracking**: Token usage and cost calculation
//! - **Error Metrics**: Error rates and types
//!
//! ## CORS Middleware
//!
//! Handles cross-origin resource sharing:
//!
//! - **Origin Validation**: Validates request origins
//! - **Method Allowance**: Controls allowed HTTP methods
//! - **Header Management**: Manages allowed headers
//! - **Preflight Handling**: Handles OPTIONS requests
//! - **Cache Control**: Manages CORS response caching
//!
//! ## Input Validation Middleware
//!
//! Validates and sanitizes request data:
//!
//! - **Request Validation**: Validates request structure
//! - **Content Sanitization**: Removes malicious content
//! - **Size Limits**: Enforces request size limits
//! - **Format Validation**: Validates data formats
//! - **Security Checks**: Performs security validations
//!
//! ## Usage
//!
//! ```rust
//! use ultrafast_gateway::middleware::{
//!     auth_middleware, cors_middleware, logging_middleware,
//!     metrics_middleware, input_validation_middleware
//! };
//!
//! // Apply middleware to router
//! let app = Router::new()
//!     .layer(cors_middleware(&cors_config))
//!     .layer(axum::middleware::from_fn(logging_middleware))
//!     .layer(axum::middleware::from_fn(metrics_middleware))
//!     .layer(axum::middleware::from_fn(auth_middleware))
//!     .layer(axum::middleware::from_fn(input_validation_middleware));
//! ```
//!
//! ## Configuration
//!
//! Middleware can be configured via the gateway configuration:
//!
//! ```toml
//! [server.cors]
//! enabled = true
//! allowed_origins = ["*"]
//! allowed_methods = ["GET", "POST", "PUT", "DELETE"]
//!
//! [auth]
//! enabled = true
//! jwt_secret = "your-secret"
//!
//! [metrics]
//! enabled = true
//! max_requests = 1000
//! ```
//!
//! ## Error Handling
//!
//! Each middleware includes comprehensive error handling:
//!
//! - **Authentication Errors**: Proper HTTP status codes
//! - **Validation Errors**: Detailed error messages
//! - **Rate Limit Errors**: Rate limit headers and responses
//! - **CORS Errors**: Proper CORS error responses
//!
//! ## Performance Impact
//!
//! The middleware is designed for minimal performance impact:
//!
//! - **Efficient Logging**: Structured logging with minimal overhead
//! - **Async Operations**: Non-blocking async middleware
//! - **Caching**: Cached authentication and validation results
//! - **Selective Metrics**: Metrics collection only for relevant requests
//! - **Optimized Validation**: Fast validation algorithms

use crate::config::CorsConfig;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::http;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
// Unused imports removed - using dedicated modules now

pub mod input_validation;

// Re-export the input validation middleware
pub use input_validation::input_validation_middleware;

/// Logging middleware for request/response tracking.
///
/// Logs detailed information about each request including method, URI,
/// status code, latency, and request ID for tracing.
///
/// # Arguments
///
/// * `_state` - Application state (unused in this middleware)
/// * `req` - The incoming HTTP request
/// * `next` - The next middleware in the chain
///
/// # Returns
///
/// Returns the HTTP response with logging information.
///
/// # Example
///
/// ```rust
/// let app = Router::new()
///     .layer(axum::middleware::from_fn(logging_middleware));
/// ```
pub async fn logging_middleware(
    State(_state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    // Extract request context if available
    let request_id = req
        .extensions()
        .get::<crate::request_context::RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status,
        latency_ms = latency.as_millis(),
        "Request processed"
    );

    response
}

/// Metrics middleware for performance tracking.
///
/// Collects performance metrics for each request including latency,
/// status codes, and user information. Skips metrics for the metrics
/// and health check endpoints themselves.
///
/// # Arguments
///
/// * `_state` - Application state (unused in this middleware)
/// * `req` - The incoming HTTP request
/// * `next` - The next middleware in the chain
///
/// # Returns
///
/// Returns the HTTP response with metrics recorded.
///
/// # Example
///
/// ```rust
/// let app = Router::new()
///     .layer(axum::middleware::from_fn(metrics_middleware));
/// ```
pub async fn metrics_middleware(
    State(_state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let start = std::time::Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = uuid::Uuid::new_v4().to_string();

    // Add request ID to extensions for logging
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;
    let latency = start.elapsed();
    let status = response.status();

    // Every response — success or error, since GatewayError's IntoResponse
    // has already run by the time middleware sees it — carries the id this
    // request was tagged with, so a client's error report can be correlated
    // back to the server-side log line above.
    if let Ok(value) = axum::http::HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    // Skip recording metrics for the metrics/health endpoints themselves
    let should_record_metrics =
        !uri.path().starts_with("/metrics") && !uri.path().starts_with("/health");

    if should_record_metrics {
        // Record metrics using the dedicated metrics module
        let metrics = crate::metrics::RequestMetricsBuilder::new(
            method.to_string(),
            uri.path().to_string(),
            status.as_u16(),
            latency,
        )
        .user_id(request_id.clone())
        .build();

        crate::metrics::record_request(metrics).await;

        // Log request ID for debugging
        tracing::debug!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = %status,
            latency_ms = latency.as_millis(),
            "Metrics recorded"
        );
    }

    response
}

// Legacy function - now using dedicated metrics module
pub async fn get_metrics() -> HashMap<String, serde_json::Value> {
    let aggregated = crate::metrics::get_aggregated_metrics().await;
    let mut result = HashMap::new();

    result.insert(
        "requests_per_minute".to_string(),
        serde_json::json!(aggregated.requests_per_minute),
    );
    result.insert(
        "average_latency_ms".to_string(),
        serde_json::json!(aggregated.average_latency_ms),
    );
    result.insert(
        "error_rate".to_string(),
        serde_json::json!(aggregated.error_rate),
    );
    result.insert(
        "active_connections".to_string(),
        serde_json::json!(aggregated.active_connections),
    );

    result
}

// Rate limiting now handled by auth module

/// Authenticates the request and runs the ordered admission check
/// (concurrent → minute → hour). The returned [`crate::auth::ConcurrencySlot`]
/// is inserted into the request's extensions so it is dropped — and the
/// concurrency slot released — whichever way the request finishes: normal
/// completion, handler error, or client cancellation.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() == http::Method::OPTIONS {
        return next.run(req).await;
    }

    if !state.config.auth.enabled {
        return next.run(req).await;
    }

    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let api_key = match crate::auth::AuthService::extract_api_key_from_header(auth_header) {
        Some(key) => key,
        None => {
            return crate::gateway_error::GatewayError::from(
                crate::auth::AdmissionFailure::MissingAuthorization,
            )
            .into_response();
        }
    };

    let auth_context = match crate::auth::validate_api_key_global(&api_key) {
        Ok(context) => context,
        Err(failure) => {
            state.telemetry.emit(
                crate::telemetry::Event::AuthFailure,
                &HashMap::new(),
                &crate::telemetry::meta(&[("reason", failure.message())]),
            );
            return crate::gateway_error::GatewayError::from(failure).into_response();
        }
    };
    state.telemetry.emit(
        crate::telemetry::Event::AuthSuccess,
        &HashMap::new(),
        &crate::telemetry::meta(&[("user_id", &auth_context.user_id)]),
    );

    let slot = match crate::auth::check_admission(&auth_context.user_id, &auth_context.rate_limits)
        .await
    {
        Ok(slot) => {
            state.telemetry.emit(
                crate::telemetry::Event::RateLimitAllow,
                &HashMap::new(),
                &crate::telemetry::meta(&[("user_id", &auth_context.user_id)]),
            );
            slot
        }
        Err(failure) => {
            state.telemetry.emit(
                crate::telemetry::Event::RateLimitBlock,
                &HashMap::new(),
                &crate::telemetry::meta(&[
                    ("user_id", &auth_context.user_id),
                    ("reason", failure.message()),
                ]),
            );
            if is_retryable(failure) && req.uri().path() == "/v1/chat/completions" {
                return divert_to_overflow(state, req, &auth_context.api_key).await;
            }
            return crate::gateway_error::GatewayError::from(failure).into_response();
        }
    };

    let request_context = crate::request_context::RequestContext::with_auth(
        Some(auth_context.user_id.clone()),
        Some(auth_context.api_key.clone()),
    );

    req.extensions_mut().insert(request_context);
    req.extensions_mut().insert(slot);

    next.run(req).await
}

/// Only budget exhaustion is worth queuing — a bad or missing key will never
/// pass on retry, so those stay immediate rejections.
fn is_retryable(failure: crate::auth::AdmissionFailure) -> bool {
    use crate::auth::AdmissionFailure::*;
    matches!(
        failure,
        RateLimitedConcurrent | RateLimitedMinute | RateLimitedHour
    )
}

/// Diverts a request that could not be admitted immediately into the
/// overflow queue instead of rejecting it. The body is consumed here since
/// this path never calls `next.run` — the request is parked, not forwarded,
/// and [`crate::overflow::drain_once`] replays it from the queue later.
async fn divert_to_overflow(state: AppState, req: Request<Body>, api_key: &str) -> Response {
    let (_, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, 2 * 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return crate::gateway_error::GatewayError::InvalidRequest {
                message: "request body could not be read for queuing".to_string(),
            }
            .into_response();
        }
    };
    let payload: serde_json::Value = match serde_json::from_slice(&body_bytes) {
        Ok(v) => v,
        Err(_) => {
            return crate::gateway_error::GatewayError::InvalidRequest {
                message: "request body is not valid JSON".to_string(),
            }
            .into_response();
        }
    };

    let request_id = uuid::Uuid::new_v4();
    let job = crate::overflow::OverflowJob::new(api_key.to_string(), request_id, payload);
    let job_id = job.job_id;

    match state.overflow_queue.enqueue(job).await {
        Ok(()) => {
            state.telemetry.emit(
                crate::telemetry::Event::OverflowEnqueue,
                &HashMap::new(),
                &crate::telemetry::meta(&[("job_id", &job_id.to_string())]),
            );
            (
                http::StatusCode::ACCEPTED,
                axum::Json(serde_json::json!({
                    "status": "queued",
                    "job_id": job_id.to_string(),
                })),
            )
                .into_response()
        }
        Err(_) => crate::gateway_error::GatewayError::from(
            crate::auth::AdmissionFailure::RateLimitedConcurrent,
        )
        .into_response(),
    }
}

pub fn cors_middleware(cors_config: &CorsConfig) -> CorsLayer {
    if !cors_config.enabled {
        return CorsLayer::new();
    }

    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        for origin in &cors_config.allowed_origins {
            if let Ok(origin) = origin.parse::<http::header::HeaderValue>() {
                cors = cors.allow_origin(origin);
            }
        }
    }

    cors = cors.allow_methods(Any).allow_headers(Any);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(max_age);
    }

    cors
}
