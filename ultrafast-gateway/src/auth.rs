//! # Authentication and Admission Module
//!
//! This module provides API-key authentication, JWT validation, and the
//! per-tenant admission budgets (C1/C3): concurrent in-flight requests,
//! requests-per-minute, requests-per-hour, and tokens-per-minute. All state
//! is in-memory, `DashMap`-backed, and check order is fixed: concurrent,
//! then minute, then hour — first failure wins and the failure reason is a
//! typed enum rather than a string, so the error-mapping layer can produce
//! the bit-exact response body without re-parsing anything.
//!
//! ## Authentication Methods
//!
//! ### API Key Authentication
//!
//! Virtual API keys that map to internal user contexts with specific
//! permissions and rate limits.
//!
//! ### JWT Token Authentication
//!
//! JSON Web Tokens for stateless authentication. Tokens carry user
//! information, permissions, and rate limit data.
//!
//! ## Usage
//!
//! ```rust
//! use ultrafast_gateway::auth::{AuthService, RateLimits};
//!
//! let auth_service = AuthService::new(config);
//! let auth_context = auth_service.validate_api_key("sk-...")?;
//!
//! let limits = RateLimits::new(100, 1000, 10000, 16);
//! let _guard = check_admission(&auth_context.user_id, &limits).await?;
//! ```

use crate::config::AuthConfig;
use crate::gateway_error::GatewayError;
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const MINUTE_SECS: u64 = 60;
const HOUR_SECS: u64 = 3600;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Authentication context containing user information and permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub api_key: String,
    pub user_id: String,
    pub permissions: Vec<String>,
    pub rate_limits: RateLimits,
    pub metadata: HashMap<String, String>,
    pub jwt_token: Option<String>,
    pub session_expires_at: Option<SystemTime>,
}

/// The three independent admission budgets for a tenant plus the limits
/// that bound them. `max_concurrent` has no window — it is a ceiling on
/// simultaneously in-flight requests, tracked separately in
/// [`RateLimiter`]'s concurrency map. Unlike the request/token windows, this
/// type carries no live counters: it is the static configuration that
/// travels with an [`AuthContext`] and JWT [`Claims`], not mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimits {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub tokens_per_minute: u32,
    pub max_concurrent: u32,
}

/// Sliding-window rate limiting state for a specific user. Requests are
/// tracked as individual timestamps rather than a fixed-window counter, so a
/// burst straddling a minute/hour boundary is never admitted twice over —
/// the window always covers exactly the trailing `MINUTE_SECS`/`HOUR_SECS`
/// from "now", not from whatever bucket boundary the clock last crossed.
struct RateLimitState {
    limits: RateLimits,
    /// Admitted request timestamps (seconds since epoch), oldest first,
    /// pruned to the trailing hour — a superset of the minute window.
    request_times: VecDeque<u64>,
    /// `(timestamp, tokens)` events backing the per-minute token budget,
    /// pruned to the trailing minute.
    token_events: VecDeque<(u64, u32)>,
    last_updated: SystemTime,
}

/// JWT claims structure for token-based authentication.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    pub permissions: Vec<String>,
    pub rate_limits: RateLimits,
}

/// The reason admission was refused, as a closed enum rather than a string —
/// consumed directly by the error-mapping layer (`gateway_error`) to produce
/// the bit-exact response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionFailure {
    MissingAuthorization,
    InvalidApiKeyFormat,
    InvalidApiKey,
    RateLimitedConcurrent,
    RateLimitedMinute,
    RateLimitedHour,
}

impl AdmissionFailure {
    pub fn message(self) -> &'static str {
        match self {
            AdmissionFailure::MissingAuthorization => "Missing Authorization header",
            AdmissionFailure::InvalidApiKeyFormat => "API key must start with sk- or be a Bearer JWT",
            AdmissionFailure::InvalidApiKey => "Invalid API key",
            AdmissionFailure::RateLimitedConcurrent => "Too many concurrent requests for this key",
            AdmissionFailure::RateLimitedMinute => "Rate limit exceeded: requests per minute",
            AdmissionFailure::RateLimitedHour => "Rate limit exceeded: requests per hour",
        }
    }
}

impl From<AdmissionFailure> for GatewayError {
    fn from(failure: AdmissionFailure) -> Self {
        match failure {
            AdmissionFailure::MissingAuthorization
            | AdmissionFailure::InvalidApiKeyFormat
            | AdmissionFailure::InvalidApiKey => GatewayError::Auth {
                message: failure.message().to_string(),
            },
            AdmissionFailure::RateLimitedConcurrent
            | AdmissionFailure::RateLimitedMinute
            | AdmissionFailure::RateLimitedHour => GatewayError::RateLimitedLocal {
                message: failure.message().to_string(),
            },
        }
    }
}

/// Releases a tenant's concurrency slot exactly once, on whichever
/// termination path runs: success, provider error, or client cancellation
/// (dropping the future drops this guard).
pub struct ConcurrencySlot {
    user_id: String,
}

impl Drop for ConcurrencySlot {
    fn drop(&mut self) {
        get_rate_limiter().release_concurrent(&self.user_id);
    }
}

static RATE_LIMITER: OnceLock<RateLimiter> = OnceLock::new();

fn get_rate_limiter() -> &'static RateLimiter {
    RATE_LIMITER.get_or_init(RateLimiter::new)
}

/// In-memory, `DashMap`-backed admission budget tracker. Concurrency is
/// tracked separately from the minute/hour sliding state because it has no
/// window to reset — only increment-on-admit, decrement-on-release.
pub struct RateLimiter {
    state: DashMap<String, RateLimitState>,
    concurrency: DashMap<String, AtomicU32>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: DashMap::new(),
            concurrency: DashMap::new(),
        }
    }

    fn try_acquire_concurrent(&self, user_id: &str, max_concurrent: u32) -> Result<(), AdmissionFailure> {
        let counter = self
            .concurrency
            .entry(user_id.to_string())
            .or_insert_with(|| AtomicU32::new(0));
        loop {
            let current = counter.load(Ordering::SeqCst);
            if current >= max_concurrent {
                return Err(AdmissionFailure::RateLimitedConcurrent);
            }
            if counter
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    fn release_concurrent(&self, user_id: &str) {
        if let Some(counter) = self.concurrency.get(user_id) {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Ordered check: concurrent, then minute, then hour. The first budget
    /// that is exhausted wins; the request timestamp is only recorded once
    /// every budget up to and including the passing one has been checked, so
    /// a later failure never leaves an earlier window holding a timestamp
    /// for a request that wasn't actually admitted.
    fn check_and_update(
        &self,
        user_id: &str,
        limits: &RateLimits,
    ) -> Result<ConcurrencySlot, AdmissionFailure> {
        self.try_acquire_concurrent(user_id, limits.max_concurrent)?;
        let slot = ConcurrencySlot {
            user_id: user_id.to_string(),
        };

        let now = now_secs();

        let mut entry = self.state.entry(user_id.to_string()).or_insert_with(|| RateLimitState {
            limits: limits.clone(),
            request_times: VecDeque::new(),
            token_events: VecDeque::new(),
            last_updated: SystemTime::now(),
        });

        // The hour window is a superset of the minute window, so pruning to
        // it once covers both checks below.
        while matches!(entry.request_times.front(), Some(&t) if now.saturating_sub(t) >= HOUR_SECS) {
            entry.request_times.pop_front();
        }
        let hour_count = entry.request_times.len() as u32;
        let minute_count = entry
            .request_times
            .iter()
            .rev()
            .take_while(|&&t| now.saturating_sub(t) < MINUTE_SECS)
            .count() as u32;

        if minute_count >= limits.requests_per_minute {
            return Err(AdmissionFailure::RateLimitedMinute);
        }
        if hour_count >= limits.requests_per_hour {
            return Err(AdmissionFailure::RateLimitedHour);
        }

        entry.request_times.push_back(now);
        entry.last_updated = SystemTime::now();

        Ok(slot)
    }

    fn check_and_update_tokens(&self, user_id: &str, tokens: u32) -> Result<(), AdmissionFailure> {
        let mut entry = match self.state.get_mut(user_id) {
            Some(e) => e,
            None => return Ok(()),
        };

        let now = now_secs();
        while matches!(entry.token_events.front(), Some(&(t, _)) if now.saturating_sub(t) >= MINUTE_SECS) {
            entry.token_events.pop_front();
        }
        let used: u32 = entry.token_events.iter().map(|&(_, tok)| tok).sum();
        if used + tokens > entry.limits.tokens_per_minute {
            return Err(AdmissionFailure::RateLimitedMinute);
        }
        entry.token_events.push_back((now, tokens));
        entry.last_updated = SystemTime::now();
        Ok(())
    }

    /// Evicts users idle for at least twice the largest window (the hour
    /// window) — well past the point where their sliding windows would have
    /// drained naturally on the next request, so there is nothing lost by
    /// dropping the entry outright.
    fn cleanup_old_rate_limit_states(&self) {
        let cutoff_time = SystemTime::now() - Duration::from_secs(2 * HOUR_SECS);
        let before = self.state.len();
        self.state.retain(|_, state| state.last_updated > cutoff_time);
        let cleaned = before - self.state.len();
        if cleaned > 0 {
            tracing::info!("Cleaned up {} stale rate limit states", cleaned);
        }
        self.concurrency.retain(|_, count| count.load(Ordering::SeqCst) > 0);
    }
}

impl RateLimits {
    pub fn new(
        requests_per_minute: u32,
        requests_per_hour: u32,
        tokens_per_minute: u32,
        max_concurrent: u32,
    ) -> Self {
        Self {
            requests_per_minute,
            requests_per_hour,
            tokens_per_minute,
            max_concurrent,
        }
    }
}

/// Runs the ordered admission check (concurrent → minute → hour) for a
/// tenant. On success the returned [`ConcurrencySlot`] must be held for the
/// lifetime of the request; dropping it (on any exit path) releases the
/// concurrency slot exactly once.
pub async fn check_admission(
    user_id: &str,
    limits: &RateLimits,
) -> Result<ConcurrencySlot, AdmissionFailure> {
    get_rate_limiter().check_and_update(user_id, limits)
}

/// Accounts for tokens actually consumed by a completed request against the
/// per-minute token budget. Called after usage is known, not at admission
/// time (token counts aren't known until the provider responds).
pub fn record_token_usage(user_id: &str, tokens: u32) -> Result<(), AdmissionFailure> {
    get_rate_limiter().check_and_update_tokens(user_id, tokens)
}

/// Auth service for managing API keys, sessions, and JWTs.
pub struct AuthService {
    config: AuthConfig,
    sessions: DashMap<String, AuthContext>,
    jwt_secret: String,
}

static AUTH_SERVICE: OnceLock<AuthService> = OnceLock::new();

fn get_auth_service() -> &'static AuthService {
    AUTH_SERVICE.get_or_init(AuthService::new_empty)
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let jwt_secret = std::env::var("GATEWAY_JWT_SECRET")
            .unwrap_or_else(|_| "ultrafast-gateway-secret-key".to_string());

        Self {
            config,
            sessions: DashMap::new(),
            jwt_secret,
        }
    }

    pub fn new_empty() -> Self {
        Self::new(AuthConfig {
            enabled: false,
            api_keys: vec![],
            rate_limiting: crate::config::RateLimitConfig {
                requests_per_minute: 60,
                requests_per_hour: 1000,
                tokens_per_minute: 10000,
            },
        })
    }

    /// Replaces the global auth service's configuration. Called once at
    /// start-up; the global instance otherwise behaves as a read-only view
    /// for the lifetime of the process.
    pub fn initialize_global(config: AuthConfig) {
        if AUTH_SERVICE.set(AuthService::new(config)).is_err() {
            tracing::warn!("Auth service already initialized; ignoring re-initialization");
        }
    }

    pub fn validate_api_key(&self, api_key: &str) -> Result<AuthContext, AdmissionFailure> {
        if let Ok(ctx) = self.validate_jwt_token(api_key) {
            return Ok(ctx);
        }

        for api_key_config in &self.config.api_keys {
            if api_key_config.key == api_key && api_key_config.enabled {
                let user_id = api_key
                    .split('-')
                    .next_back()
                    .unwrap_or("unknown")
                    .to_string();

                let rate_limits = api_key_config
                    .rate_limit
                    .clone()
                    .map(|rl| {
                        RateLimits::new(
                            rl.requests_per_minute,
                            rl.requests_per_hour,
                            rl.tokens_per_minute,
                            16,
                        )
                    })
                    .unwrap_or_else(|| RateLimits::new(100, 1000, 10000, 16));

                return Ok(AuthContext {
                    api_key: api_key.to_string(),
                    user_id,
                    permissions: vec!["read".to_string(), "write".to_string()],
                    rate_limits,
                    metadata: api_key_config.metadata.clone(),
                    jwt_token: None,
                    session_expires_at: None,
                });
            }
        }

        Err(AdmissionFailure::InvalidApiKey)
    }

    pub fn validate_jwt_token(&self, token: &str) -> Result<AuthContext, AdmissionFailure> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.algorithms = vec![jsonwebtoken::Algorithm::HS256];

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &validation,
        )
        .map_err(|_| AdmissionFailure::InvalidApiKey)?;

        let claims = token_data.claims;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();

        if claims.exp < now {
            return Err(AdmissionFailure::InvalidApiKey);
        }

        Ok(AuthContext {
            api_key: token.to_string(),
            user_id: claims.sub,
            permissions: claims.permissions,
            rate_limits: claims.rate_limits,
            metadata: HashMap::new(),
            jwt_token: Some(token.to_string()),
            session_expires_at: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(claims.exp)),
        })
    }

    /// Rejects risky setups (e.g. auth enabled with the default JWT secret).
    pub fn sanity_check(&self) -> Result<(), GatewayError> {
        if self.config.enabled && self.jwt_secret == "ultrafast-gateway-secret-key" {
            return Err(GatewayError::Config {
                message: "Insecure GATEWAY_JWT_SECRET; set a strong secret when auth is enabled"
                    .to_string(),
            });
        }
        Ok(())
    }

    pub fn generate_jwt_token(&self, auth_context: &AuthContext) -> Result<String, GatewayError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let exp = now + 3600;

        let claims = Claims {
            sub: auth_context.user_id.clone(),
            exp,
            iat: now,
            permissions: auth_context.permissions.clone(),
            rate_limits: auth_context.rate_limits.clone(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )
        .map_err(|e| GatewayError::Config {
            message: format!("Failed to generate JWT token: {e}"),
        })
    }

    pub fn create_session(&self, auth_context: AuthContext) -> String {
        let session_id = Uuid::new_v4().to_string();
        let mut session = auth_context;
        session.session_expires_at = Some(SystemTime::now() + Duration::from_secs(3600));
        self.sessions.insert(session_id.clone(), session);
        session_id
    }

    pub fn get_session(&self, session_id: &str) -> Option<AuthContext> {
        let session = self.sessions.get(session_id)?.clone();
        match session.session_expires_at {
            Some(expires_at) if SystemTime::now() >= expires_at => {
                self.sessions.remove(session_id);
                None
            }
            _ => Some(session),
        }
    }

    pub fn invalidate_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    fn cleanup_expired_sessions(&self) {
        let now = SystemTime::now();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter_map(|entry| match entry.session_expires_at {
                Some(expires_at) if now >= expires_at => Some(entry.key().clone()),
                _ => None,
            })
            .collect();
        for session_id in &expired {
            self.sessions.remove(session_id);
        }
        if !expired.is_empty() {
            tracing::info!("Cleaned up {} expired sessions", expired.len());
        }
    }

    pub fn check_model_permission(&self, auth_context: &AuthContext, model: &str) -> bool {
        if let Some(allowed_models) = auth_context.metadata.get("allowed_models") {
            if let Ok(models) = serde_json::from_str::<Vec<String>>(allowed_models) {
                return models.contains(&model.to_string());
            }
        }
        auth_context.permissions.contains(&"write".to_string())
    }

    /// Extracts the API key from an HTTP authorization header. Supports
    /// "Bearer" JWTs and raw "sk-" prefixed keys.
    pub fn extract_api_key_from_header(auth_header: Option<&str>) -> Option<String> {
        auth_header.and_then(|header| {
            if let Some(stripped) = header.strip_prefix("Bearer ") {
                Some(stripped.to_string())
            } else if header.starts_with("sk-") {
                Some(header.to_string())
            } else {
                None
            }
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// Initializes the global auth service and starts its background cleanup
/// task. Called once at start-up.
pub fn initialize_auth_service(config: AuthConfig) {
    AuthService::initialize_global(config);
    start_auth_cleanup_task();
}

fn start_auth_cleanup_task() {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1800));
        loop {
            interval.tick().await;
            get_auth_service().cleanup_expired_sessions();
            get_rate_limiter().cleanup_old_rate_limit_states();
            tracing::debug!("Auth background cleanup completed");
        }
    });
}

pub fn validate_api_key_global(api_key: &str) -> Result<AuthContext, AdmissionFailure> {
    get_auth_service().validate_api_key(api_key)
}

pub fn create_session_global(auth_context: AuthContext) -> String {
    get_auth_service().create_session(auth_context)
}

pub fn get_session_global(session_id: &str) -> Option<AuthContext> {
    get_auth_service().get_session(session_id)
}

pub fn invalidate_session_global(session_id: &str) {
    get_auth_service().invalidate_session(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_budget_is_ordered_first() {
        let limits = RateLimits::new(100, 1000, 10000, 1);
        let _slot = check_admission("user-a", &limits).await.unwrap();
        let err = check_admission("user-a", &limits).await.unwrap_err();
        assert_eq!(err, AdmissionFailure::RateLimitedConcurrent);
    }

    #[tokio::test]
    async fn releasing_slot_frees_concurrency() {
        let limits = RateLimits::new(100, 1000, 10000, 1);
        {
            let _slot = check_admission("user-b", &limits).await.unwrap();
        }
        assert!(check_admission("user-b", &limits).await.is_ok());
    }

    #[tokio::test]
    async fn minute_budget_rejects_after_limit() {
        let limits = RateLimits::new(1, 1000, 10000, 10);
        let _slot1 = check_admission("user-c", &limits).await.unwrap();
        let err = check_admission("user-c", &limits).await.unwrap_err();
        assert_eq!(err, AdmissionFailure::RateLimitedMinute);
    }

    #[tokio::test]
    async fn token_budget_rejects_once_minute_window_is_spent() {
        let limits = RateLimits::new(100, 1000, 50, 10);
        let _slot = check_admission("user-d", &limits).await.unwrap();
        record_token_usage("user-d", 40).unwrap();
        let err = record_token_usage("user-d", 20).unwrap_err();
        assert_eq!(err, AdmissionFailure::RateLimitedMinute);
    }

    #[tokio::test]
    async fn hour_budget_is_independent_of_minute_budget() {
        let limits = RateLimits::new(1000, 1, 10000, 10);
        let _slot1 = check_admission("user-e", &limits).await.unwrap();
        let err = check_admission("user-e", &limits).await.unwrap_err();
        assert_eq!(err, AdmissionFailure::RateLimitedHour);
    }

    #[test]
    fn api_key_extraction_supports_bearer_and_sk_prefix() {
        assert_eq!(
            AuthService::extract_api_key_from_header(Some("Bearer abc")),
            Some("abc".to_string())
        );
        assert_eq!(
            AuthService::extract_api_key_from_header(Some("sk-xyz")),
            Some("sk-xyz".to_string())
        );
        assert_eq!(AuthService::extract_api_key_from_header(Some("nope")), None);
    }
}
