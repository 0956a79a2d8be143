//! # Gateway Error Types Module
//!
//! This module defines the comprehensive error types for the Ultrafast Gateway,
//! providing standardized error handling and HTTP response mapping for all
//! gateway operations.
//!
//! ## Overview
//!
//! The error system provides:
//! - **Standardized Error Types**: Consistent error patterns across the gateway
//! - **HTTP Response Mapping**: Automatic conversion to appropriate HTTP status codes
//! - **Error Context**: Rich error information for debugging and monitoring
//! - **Error Propagation**: Proper error handling throughout the application
//! - **Client-Friendly Messages**: User-friendly error messages
//!
//! ## Error Categories
//!
//! The gateway defines several error categories:
//!
//! ### Client Errors
//! Errors originating from the client SDK:
//! - **Authentication Errors**: Invalid API keys or tokens
//! - **Rate Limit Errors**: Request or token limit violations
//! - **Invalid Request Errors**: Malformed or invalid requests
//! - **Network Errors**: Connection and communication failures
//!
//! ### Provider Errors
//! Errors from AI/LLM providers:
//! - **API Key Errors**: Invalid provider API keys
//! - **Rate Limit Errors**: Provider-specific rate limits
//! - **Quota Errors**: Provider quota exceeded
//! - **Model Errors**: Unsupported or unavailable models
//! - **Service Errors**: Provider service unavailability
//!
//! ### Gateway Errors
//! Internal gateway errors:
//! - **Authentication Errors**: Gateway authentication failures
//! - **Rate Limit Errors**: Gateway rate limiting
//! - **Content Filtering**: Content moderation failures
//! - **Configuration Errors**: Invalid gateway configuration
//! - **Cache Errors**: Caching operation failures
//! - **Plugin Errors**: Plugin execution failures
//!
//! ## HTTP Status Code Mapping
//!
//! Errors are automatically mapped to appropriate HTTP status codes:
//!
//! - **400 Bad Request**: Invalid requests and malformed data
//! - **401 Unauthorized**: Authentication and authorization failures
//! - **429 Too Many Requests**: Rate limit violations
//! - **500 Internal Server Error**: Internal gateway errors
//! - **503 Service Unavailable**: Provider or service unavailability
//!
//! ## Usage
//!
//! ```rust
//! use ultrafast_gateway::gateway_error::GatewayError;
//!
//! // Create specific error types
//! let auth_error = GatewayError::Auth {
//!     message: "Invalid API key".to_string(),
//! };
//!
//! let rate_limit_error = GatewayError::RateLimit {
//!     message: "Rate limit exceeded".to_string(),
//! };
//!
//! // Errors automatically convert to HTTP responses
//! let response = auth_error.into_response();
//! ```
//!
//! ## Error Handling
//!
//! The error system integrates with Axum for automatic HTTP response generation:
//!
//! ```rust
//! use axum::{Json, extract::State};
//! use ultrafast_gateway::gateway_error::GatewayError;
//!
//! async fn handler() -> Result<Json<Value>, GatewayError> {
//!     // Your handler logic here
//!     if some_condition {
//!         return Err(GatewayError::Auth {
//!             message: "Authentication required".to_string(),
//!         });
//!     }
//!     Ok(Json(json!({"status": "success"})))
//! }
//! ```
//!
//! ## Error Context
//!
//! Each error includes context for debugging and monitoring:
//!
//! - **Error Type**: Categorized error type for filtering
//! - **Error Message**: Human-readable error description
//! - **HTTP Status**: Appropriate HTTP status code
//! - **Error Code**: Machine-readable error identifier
//! - **Timestamp**: When the error occurred
//! - **Request ID**: Associated request identifier

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use ultrafast_models_sdk::error::{ClientError, ProviderError};

/// The closed set of error classes a request can terminate in. Every
/// `GatewayError` variant maps to exactly one of these, and every class maps
/// to exactly one HTTP status and wire `type` string — this mapping is the
/// contract clients are written against, not an implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    Auth,
    RateLimitedLocal,
    RateLimitedUpstream,
    Transport,
    Timeout,
    ServerError,
    CircuitOpen,
    ContentFilter,
    Cancelled,
    NoHealthyProvider,
}

impl ErrorClass {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
            ErrorClass::Auth => StatusCode::UNAUTHORIZED,
            ErrorClass::RateLimitedLocal => StatusCode::TOO_MANY_REQUESTS,
            ErrorClass::RateLimitedUpstream => StatusCode::TOO_MANY_REQUESTS,
            ErrorClass::Transport => StatusCode::BAD_GATEWAY,
            ErrorClass::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorClass::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorClass::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::ContentFilter => StatusCode::BAD_REQUEST,
            // 499 (client closed request) has no StatusCode constant; the
            // value is always in the valid 100..=999 range so this never fails.
            ErrorClass::Cancelled => StatusCode::from_u16(499).unwrap(),
            ErrorClass::NoHealthyProvider => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::BadRequest => "bad_request",
            ErrorClass::Auth => "auth",
            ErrorClass::RateLimitedLocal => "rate_limited_local",
            ErrorClass::RateLimitedUpstream => "rate_limited_upstream",
            ErrorClass::Transport => "transport",
            ErrorClass::Timeout => "timeout",
            ErrorClass::ServerError => "server_error",
            ErrorClass::CircuitOpen => "circuit_open",
            ErrorClass::ContentFilter => "content_filter",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::NoHealthyProvider => "no_healthy_provider",
        }
    }

    /// The wire `"type"` string clients are written against — a closed,
    /// OpenAI-compatible vocabulary independent of this gateway's internal
    /// classification names (see [`as_str`](Self::as_str)).
    pub fn wire_type(self) -> &'static str {
        match self {
            ErrorClass::BadRequest | ErrorClass::ContentFilter => "invalid_request_error",
            ErrorClass::Auth => "authentication_error",
            ErrorClass::RateLimitedLocal | ErrorClass::RateLimitedUpstream => "rate_limit_error",
            ErrorClass::Transport
            | ErrorClass::Timeout
            | ErrorClass::ServerError
            | ErrorClass::Cancelled => "api_error",
            ErrorClass::CircuitOpen | ErrorClass::NoHealthyProvider => "overloaded_error",
        }
    }
}

/// Comprehensive error types for the Ultrafast Gateway.
///
/// Each variant is pinned to exactly one [`ErrorClass`] so that the HTTP
/// response shape and status code are a pure function of the error's
/// identity, never of ad-hoc matching at the call site.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Errors originating from the client SDK
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Errors from AI/LLM providers
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Malformed or invalid request body/parameters
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Missing/malformed/unknown API key
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Local per-key sliding-window or concurrency budget exhausted
    #[error("Rate limit exceeded: {message}")]
    RateLimitedLocal { message: String },

    /// Upstream provider reported its own rate limit
    #[error("Upstream rate limit: {message}")]
    RateLimitedUpstream { message: String },

    /// Content moderation rejected the request or response
    #[error("Content filtered: {message}")]
    ContentFiltered { message: String },

    /// Request was cancelled by the client before completion
    #[error("Request cancelled")]
    Cancelled,

    /// No provider in the routing group is currently healthy
    #[error("No healthy provider available")]
    NoHealthyProvider,

    /// A provider's circuit breaker is open
    #[error("Circuit breaker open: {provider}")]
    CircuitOpen { provider: String },

    /// Internal gateway server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// Configuration and setup errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// JSON serialization and deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    fn classify_provider(e: &ProviderError) -> ErrorClass {
        match e {
            ProviderError::InvalidApiKey => ErrorClass::Auth,
            ProviderError::AuthenticationFailed { .. } => ErrorClass::Auth,
            ProviderError::RateLimit => ErrorClass::RateLimitedUpstream,
            ProviderError::QuotaExceeded => ErrorClass::RateLimitedUpstream,
            ProviderError::ModelNotFound { .. } => ErrorClass::BadRequest,
            ProviderError::ValidationError { .. } => ErrorClass::BadRequest,
            ProviderError::ContentFilter { .. } => ErrorClass::ContentFilter,
            ProviderError::Timeout => ErrorClass::Timeout,
            ProviderError::Http(_) => ErrorClass::Transport,
            ProviderError::NetworkError { .. } => ErrorClass::Transport,
            ProviderError::ServiceUnavailable => ErrorClass::NoHealthyProvider,
            ProviderError::RetryableError { .. } => ErrorClass::Transport,
            _ => ErrorClass::ServerError,
        }
    }

    /// Classifies a `ClientError` without requiring ownership, so callers
    /// that still need the error value afterward (e.g. for metrics) don't
    /// have to consume it just to learn its status code.
    pub fn classify_client(e: &ClientError) -> ErrorClass {
        match e {
            ClientError::Authentication { .. } => ErrorClass::Auth,
            ClientError::RateLimit => ErrorClass::RateLimitedLocal,
            ClientError::InvalidRequest { .. } => ErrorClass::BadRequest,
            ClientError::Timeout => ErrorClass::Timeout,
            ClientError::NetworkError { .. } => ErrorClass::Transport,
            ClientError::Http(_) => ErrorClass::Transport,
            ClientError::Provider(inner) => Self::classify_provider(inner),
            _ => ErrorClass::ServerError,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            GatewayError::Client(e) => Self::classify_client(e),
            GatewayError::Provider(e) => Self::classify_provider(e),
            GatewayError::InvalidRequest { .. } => ErrorClass::BadRequest,
            GatewayError::Auth { .. } => ErrorClass::Auth,
            GatewayError::RateLimitedLocal { .. } => ErrorClass::RateLimitedLocal,
            GatewayError::RateLimitedUpstream { .. } => ErrorClass::RateLimitedUpstream,
            GatewayError::ContentFiltered { .. } => ErrorClass::ContentFilter,
            GatewayError::Cancelled => ErrorClass::Cancelled,
            GatewayError::NoHealthyProvider => ErrorClass::NoHealthyProvider,
            GatewayError::CircuitOpen { .. } => ErrorClass::CircuitOpen,
            GatewayError::Internal { .. } => ErrorClass::ServerError,
            GatewayError::Config { .. } => ErrorClass::ServerError,
            GatewayError::Serialization(_) => ErrorClass::ServerError,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let class = self.class();
        let status = class.status();
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": class.wire_type(),
                "param": serde_json::Value::Null,
                "code": class.as_str()
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_type_uses_closed_openai_compatible_vocabulary() {
        assert_eq!(ErrorClass::BadRequest.wire_type(), "invalid_request_error");
        assert_eq!(ErrorClass::ContentFilter.wire_type(), "invalid_request_error");
        assert_eq!(ErrorClass::Auth.wire_type(), "authentication_error");
        assert_eq!(ErrorClass::RateLimitedLocal.wire_type(), "rate_limit_error");
        assert_eq!(ErrorClass::RateLimitedUpstream.wire_type(), "rate_limit_error");
        assert_eq!(ErrorClass::ServerError.wire_type(), "api_error");
        assert_eq!(ErrorClass::CircuitOpen.wire_type(), "overloaded_error");
        assert_eq!(ErrorClass::NoHealthyProvider.wire_type(), "overloaded_error");
    }

    #[test]
    fn response_body_carries_wire_type_not_internal_classification() {
        let response = GatewayError::Auth {
            message: "bad key".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
