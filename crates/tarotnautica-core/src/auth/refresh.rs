//! Single-flight access token refresh.
//!
//! When many requests hit a 401 at once only the first one talks to the
//! refresh endpoint; the rest park on a one-shot channel and receive the same
//! new token. The refresh itself is retried with a linear backoff
//! (`attempt × base delay`) on timeouts, transport errors, non-success
//! statuses and unparsable bodies, all sharing one retry budget.
//!
//! The coordinator never clears tokens. Whether a failed refresh ends the
//! session is decided by the caller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Method;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{TokenKind, TokenStore};
use crate::api::transport::{HttpRequest, Transport, TransportError};
use crate::config::AuthPolicy;
use crate::models::{RefreshRequest, RefreshResult};

/// Path of the refresh endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "/api/token/refresh/";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Refresh endpoint returned status {0}")]
    Rejected(u16),

    #[error("Refresh request timed out")]
    Timeout,

    #[error("Refresh request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("The refresh this request was waiting on failed")]
    Abandoned,
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<String>>,
    last_attempt_at: Option<Instant>,
    last_success: Option<(Instant, String)>,
}

pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    refresh_url: String,
    policy: AuthPolicy,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        base_url: &str,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            transport,
            store,
            refresh_url: format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH),
            policy,
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Obtain a new access token, joining an in-flight refresh if there is one.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let waiter = {
            let mut state = self.lock_state();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            } else {
                state.in_flight = true;
                state.last_attempt_at = Some(Instant::now());
                None
            }
        };

        if let Some(rx) = waiter {
            debug!("Refresh already in flight, waiting for it");
            return rx.await.map_err(|_| RefreshError::Abandoned);
        }

        let mut in_flight = InFlight {
            state: &self.state,
            token: None,
        };
        let result = self.refresh_with_retries().await;
        if let Ok(token) = &result {
            in_flight.token = Some(token.clone());
        }
        drop(in_flight);
        result
    }

    /// Like [`refresh`](Self::refresh), but reuse the stored token when a
    /// refresh that finished within the refresh threshold already replaced
    /// `rejected`.
    pub async fn refresh_for(&self, rejected: &str) -> Result<String, RefreshError> {
        let recent = {
            let state = self.lock_state();
            match &state.last_success {
                Some((at, token))
                    if token != rejected && at.elapsed() < self.policy.refresh_threshold =>
                {
                    Some(token.clone())
                }
                _ => None,
            }
        };

        if let Some(token) = recent {
            if self.store.get(TokenKind::Access).as_deref() == Some(token.as_str()) {
                debug!("Rejected token was already replaced, reusing the refreshed one");
                return Ok(token);
            }
        }
        self.refresh().await
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock_state().in_flight
    }

    /// When the last refresh attempt started, if any.
    pub fn last_refresh_at(&self) -> Option<Instant> {
        self.lock_state().last_attempt_at
    }

    /// No refresh has been attempted within the refresh threshold.
    pub fn is_token_expiring(&self) -> bool {
        match self.last_refresh_at() {
            Some(at) => at.elapsed() > self.policy.refresh_threshold,
            None => true,
        }
    }

    async fn refresh_with_retries(&self) -> Result<String, RefreshError> {
        let refresh = self.store.get(TokenKind::Refresh).ok_or_else(|| {
            warn!("No refresh token available");
            RefreshError::MissingRefreshToken
        })?;

        let max_attempts = self.policy.max_refresh_retries + 1;
        let mut attempt = 0;
        loop {
            match self.request_refresh(&refresh).await {
                Ok(result) => {
                    info!("Access token refreshed");
                    return Ok(self.persist(result));
                }
                Err(e) if attempt < self.policy.max_refresh_retries => {
                    attempt += 1;
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Token refresh failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(attempts = attempt + 1, error = %e, "Token refresh failed");
                    return Err(e);
                }
            }
        }
    }

    async fn request_refresh(&self, refresh: &str) -> Result<RefreshResult, RefreshError> {
        let body = serde_json::to_vec(&RefreshRequest { refresh })
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let request = HttpRequest {
            method: Method::POST,
            url: self.refresh_url.clone(),
            headers,
            body: Some(body),
        };

        let response = tokio::time::timeout(self.policy.refresh_timeout, self.transport.send(request))
            .await
            .map_err(|_| RefreshError::Timeout)??;

        if !response.status.is_success() {
            return Err(RefreshError::Rejected(response.status.as_u16()));
        }
        serde_json::from_slice(&response.body).map_err(|e| RefreshError::InvalidResponse(e.to_string()))
    }

    /// Save the new token(s). A storage failure is logged but does not fail
    /// the refresh: the token is still good for the requests waiting on it.
    fn persist(&self, result: RefreshResult) -> String {
        if let Err(e) = self.store.set(TokenKind::Access, &result.access) {
            warn!(error = %e, "Failed to persist refreshed access token");
        }
        if let Some(rotated) = &result.refresh {
            if let Err(e) = self.store.set(TokenKind::Refresh, rotated) {
                warn!(error = %e, "Failed to persist rotated refresh token");
            }
        }
        result.access
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the in-flight flag for the duration of one refresh.
///
/// Dropping it always clears the flag and drains the waiters, even when the
/// refreshing future is cancelled. Waiters receive `token` if it was set and
/// otherwise see their channel close.
struct InFlight<'a> {
    state: &'a Mutex<RefreshState>,
    token: Option<String>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let waiters = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_flight = false;
            if let Some(token) = &self.token {
                state.last_success = Some((Instant::now(), token.clone()));
            }
            std::mem::take(&mut state.waiters)
        };

        match self.token.take() {
            Some(token) => {
                debug!(waiters = waiters.len(), "Resolving refresh waiters");
                for waiter in waiters {
                    // A waiter that gave up has dropped its receiver.
                    let _ = waiter.send(token.clone());
                }
            }
            None if !waiters.is_empty() => {
                debug!(waiters = waiters.len(), "Dropping refresh waiters after failure");
            }
            None => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
