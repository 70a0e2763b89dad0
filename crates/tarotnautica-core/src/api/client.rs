//! Authenticated request executor for the Tarotnautica REST API.
//!
//! `ApiClient::execute` is what every screen calls. It attaches the stored
//! access token, runs the request under a timeout, refreshes and retries once
//! on a 401, and counts consecutive failures so that a session the server
//! keeps rejecting is eventually cleared. It never returns an error: every
//! failure comes back as an [`ApiResponse`] with `ok == false`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::response::{NO_SESSION_MESSAGE, SESSION_EXPIRED_MESSAGE};
use super::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use super::{ApiError, ApiResponse};
use crate::auth::{decode, RefreshCoordinator, TokenKind, TokenStore};
use crate::config::{AuthPolicy, Config};
use crate::events::{SessionEvent, SessionEventBus};

/// Method, extra headers and body of a request made through `execute`.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    /// Merged over the default `Authorization`/`Content-Type` headers.
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to serialize body: {}", e)))?;
        self.body = Some(bytes);
        Ok(self)
    }
}

/// Snapshot of the local session, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub logged_in: bool,
    /// `exp` of the stored access token, if it decodes.
    pub access_expires_at: Option<DateTime<Utc>>,
    /// Whether that `exp` has passed; `None` without a readable `exp`.
    pub access_expired: Option<bool>,
    pub consecutive_failures: u32,
}

struct FailureState {
    consecutive_failures: u32,
    last_success_at: Instant,
}

struct Inner {
    base_url: String,
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    refresher: RefreshCoordinator,
    events: SessionEventBus,
    policy: AuthPolicy,
    failures: Mutex<FailureState>,
}

/// API client for Tarotnautica.
/// Clone is cheap and clones share token refresh and failure tracking, so
/// build one per process and hand clones to every caller.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    /// Create a client talking to `config.api_url` over `reqwest`.
    pub fn new(config: &Config, store: Arc<dyn TokenStore>) -> anyhow::Result<Self> {
        let policy = config.policy();
        let transport = ReqwestTransport::new(policy.request_timeout)?;
        Ok(Self::with_transport(
            config.base_url(),
            Arc::new(transport),
            store,
            policy,
        ))
    }

    pub fn with_transport(
        base_url: &str,
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        policy: AuthPolicy,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let refresher = RefreshCoordinator::new(transport.clone(), store.clone(), &base_url, policy);
        Self {
            inner: Arc::new(Inner {
                base_url,
                transport,
                store,
                refresher,
                events: SessionEventBus::new(),
                policy,
                failures: Mutex::new(FailureState {
                    consecutive_failures: 0,
                    last_success_at: Instant::now(),
                }),
            }),
        }
    }

    /// Bus on which `SessionEvent::AuthReset` is announced.
    pub fn events(&self) -> &SessionEventBus {
        &self.inner.events
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.inner.refresher
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.inner.policy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock_failures().consecutive_failures
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.inner.base_url, endpoint)
    }

    pub fn session_status(&self) -> SessionStatus {
        let access = self.inner.store.get(TokenKind::Access);
        let refresh = self.inner.store.get(TokenKind::Refresh);
        let claims = access.as_deref().and_then(decode);
        SessionStatus {
            logged_in: access.is_some() && refresh.is_some(),
            access_expires_at: claims.as_ref().and_then(|c| c.expires_at()),
            access_expired: claims.as_ref().and_then(|c| c.is_expired_at(Utc::now())),
            consecutive_failures: self.consecutive_failures(),
        }
    }

    /// Perform an authenticated request against `endpoint` (a path such as
    /// `/api/perfil/`).
    pub async fn execute(&self, endpoint: &str, options: RequestOptions) -> ApiResponse {
        if self.breaker_tripped() {
            warn!(endpoint, "Too many consecutive authentication failures, resetting session");
            return self.invalidate_session(SESSION_EXPIRED_MESSAGE);
        }

        let access = self.inner.store.get(TokenKind::Access);
        let refresh = self.inner.store.get(TokenKind::Refresh);
        let access = match (access, refresh) {
            (Some(access), Some(_)) => access,
            (None, None) => {
                debug!(endpoint, "No active session");
                return self.invalidate_session(NO_SESSION_MESSAGE);
            }
            // Leftover of an interrupted clear.
            _ => {
                warn!(endpoint, "Only one token stored, treating session as invalid");
                return self.invalidate_session(NO_SESSION_MESSAGE);
            }
        };

        let url = self.url(endpoint);
        let response = match self.send_authorized(&url, &access, &options, false).await {
            Ok(response) => response,
            Err(synthetic) => return synthetic,
        };

        if response.status.is_success() {
            self.record_success();
            return response.into();
        }
        if response.status == StatusCode::UNAUTHORIZED {
            debug!(endpoint, "Access token rejected, refreshing");
            return self.refresh_and_retry(&url, &access, &options).await;
        }

        debug!(endpoint, status = response.status.as_u16(), "Request failed");
        response.into()
    }

    async fn refresh_and_retry(&self, url: &str, rejected: &str, options: &RequestOptions) -> ApiResponse {
        let token = match self.inner.refresher.refresh_for(rejected).await {
            Ok(token) => token,
            // Cleared by a logout or the breaker while the refresh ran; that
            // path already reset the counter and announced it.
            Err(e) if self.inner.store.get(TokenKind::Refresh).is_none() => {
                warn!(url, error = %e, "Token refresh failed after the session was cleared");
                return ApiResponse::session_reset(SESSION_EXPIRED_MESSAGE);
            }
            // The tokens stay; the breaker decides when the session is over.
            Err(e) => {
                error!(url, error = %e, "Token refresh on 401 failed");
                self.record_failure();
                return ApiResponse::unauthorized(SESSION_EXPIRED_MESSAGE);
            }
        };

        match self.send_authorized(url, &token, options, true).await {
            Ok(response) if response.status.is_success() => {
                self.record_success();
                response.into()
            }
            Ok(response) => {
                warn!(url, status = response.status.as_u16(), "Request failed after token refresh");
                self.record_failure();
                response.into()
            }
            Err(synthetic) => {
                self.record_failure();
                synthetic
            }
        }
    }

    /// Send one request with `token`. `Err` carries the synthetic response for
    /// a timeout or transport failure.
    async fn send_authorized(
        &self,
        url: &str,
        token: &str,
        options: &RequestOptions,
        is_retry: bool,
    ) -> Result<HttpResponse, ApiResponse> {
        let request = match Self::build_request(url, token, options, is_retry) {
            Ok(request) => request,
            Err(e) => {
                error!(url, error = %e, "Failed to build request");
                return Err(ApiResponse::network_error());
            }
        };

        match tokio::time::timeout(self.inner.policy.request_timeout, self.inner.transport.send(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                error!(url, error = %e, "Network error");
                Err(ApiResponse::network_error())
            }
            Err(_) => {
                warn!(url, timeout_secs = self.inner.policy.request_timeout.as_secs(), "Request timed out");
                Err(ApiResponse::timeout())
            }
        }
    }

    /// Defaults first, then the caller's headers. On the retry after a
    /// refresh the new token wins over any caller-supplied authorization.
    fn build_request(
        url: &str,
        token: &str,
        options: &RequestOptions,
        is_retry: bool,
    ) -> Result<HttpRequest, header::InvalidHeaderValue> {
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))?;
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, bearer.clone());
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(options.headers.clone());
        if is_retry {
            headers.insert(header::AUTHORIZATION, bearer);
        }

        Ok(HttpRequest {
            method: options.method.clone(),
            url: url.to_string(),
            headers,
            body: options.body.clone(),
        })
    }

    /// Unauthenticated JSON POST (login, registration).
    pub(crate) async fn post_public<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> ApiResponse {
        let url = self.url(endpoint);
        let body = match serde_json::to_vec(body) {
            Ok(body) => body,
            Err(e) => {
                error!(url, error = %e, "Failed to serialize request body");
                return ApiResponse::network_error();
            }
        };
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let request = HttpRequest {
            method: Method::POST,
            url: url.clone(),
            headers,
            body: Some(body),
        };

        match tokio::time::timeout(self.inner.policy.request_timeout, self.inner.transport.send(request)).await {
            Ok(Ok(response)) => response.into(),
            Ok(Err(e)) => {
                error!(url, error = %e, "Network error");
                ApiResponse::network_error()
            }
            Err(_) => {
                warn!(url, "Request timed out");
                ApiResponse::timeout()
            }
        }
    }

    // ===== Session state =====

    /// Apply the idle reset window, then report whether the breaker is open.
    fn breaker_tripped(&self) -> bool {
        let mut failures = self.lock_failures();
        if failures.last_success_at.elapsed() > self.inner.policy.failure_reset_window {
            failures.consecutive_failures = 0;
        }
        failures.consecutive_failures >= self.inner.policy.max_consecutive_failures
    }

    pub(crate) fn record_success(&self) {
        let mut failures = self.lock_failures();
        failures.consecutive_failures = 0;
        failures.last_success_at = Instant::now();
    }

    fn record_failure(&self) {
        let mut failures = self.lock_failures();
        failures.consecutive_failures += 1;
        debug!(consecutive_failures = failures.consecutive_failures, "Authentication failure recorded");
    }

    pub(crate) fn reset_failures(&self) {
        self.lock_failures().consecutive_failures = 0;
    }

    /// Clear the tokens, reset the failure count and announce `AuthReset`.
    fn invalidate_session(&self, message: &str) -> ApiResponse {
        if let Err(e) = self.inner.store.clear() {
            error!(error = %e, "Failed to clear stored tokens");
        }
        self.reset_failures();
        let listeners = self.inner.events.emit(SessionEvent::AuthReset);
        info!(listeners, "Session reset, login required");
        ApiResponse::session_reset(message)
    }

    fn lock_failures(&self) -> MutexGuard<'_, FailureState> {
        self.inner.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tests
// ============================================================================
