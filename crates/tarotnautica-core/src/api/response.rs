//! The single response shape handed back to every caller.
//!
//! Real server responses and client-manufactured ("synthetic") ones look the
//! same: `ok`, a numeric `status`, an `auth_reset` flag and a body. Synthetic
//! responses always carry a `{"message": ...}` JSON body. Status is a bare
//! `u16` because the synthetic network-failure status is 0.

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::transport::HttpResponse;
use super::ApiError;

pub(crate) const NO_SESSION_MESSAGE: &str = "No active session";
pub(crate) const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";
pub(crate) const TIMEOUT_MESSAGE: &str = "The request exceeded the maximum allowed time";
pub(crate) const NETWORK_ERROR_MESSAGE: &str = "Network error";

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub ok: bool,
    pub status: u16,
    /// Set when the session is gone and the user must log in again.
    pub auth_reset: bool,
    pub headers: HeaderMap,
    body: Vec<u8>,
}

#[derive(Deserialize)]
struct MessageBody {
    message: Option<String>,
    detail: Option<String>,
    error: Option<String>,
}

impl ApiResponse {
    fn synthetic(status: u16, auth_reset: bool, message: &str) -> Self {
        Self {
            ok: false,
            status,
            auth_reset,
            headers: HeaderMap::new(),
            body: serde_json::json!({ "message": message }).to_string().into_bytes(),
        }
    }

    /// 401 telling the caller to route back to login.
    pub fn session_reset(message: &str) -> Self {
        Self::synthetic(401, true, message)
    }

    /// 401 after a failed refresh that left the session intact.
    pub fn unauthorized(message: &str) -> Self {
        Self::synthetic(401, false, message)
    }

    pub fn timeout() -> Self {
        Self::synthetic(408, false, TIMEOUT_MESSAGE)
    }

    pub fn network_error() -> Self {
        Self::synthetic(0, false, NETWORK_ERROR_MESSAGE)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON body: {}", e)))
    }

    /// The `message`, DRF-style `detail` or `error` field of a JSON body.
    pub fn message(&self) -> Option<String> {
        let body: MessageBody = serde_json::from_slice(&self.body).ok()?;
        body.message.or(body.detail).or(body.error)
    }

    /// Turn a failed response into an `ApiError`, passing successes through.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.ok {
            Ok(self)
        } else if self.auth_reset {
            Err(ApiError::SessionExpired)
        } else {
            let detail = self.message().unwrap_or_else(|| self.text());
            Err(ApiError::from_status(self.status, &detail))
        }
    }
}

impl From<HttpResponse> for ApiResponse {
    fn from(response: HttpResponse) -> Self {
        Self {
            ok: response.status.is_success(),
            status: response.status.as_u16(),
            auth_reset: false,
            headers: response.headers,
            body: response.body,
        }
    }
}
