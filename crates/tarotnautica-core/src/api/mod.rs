//! REST API client module for the Tarotnautica service.
//!
//! This module provides the `ApiClient`, whose `execute` method performs
//! authenticated requests with token refresh, a single retry and a
//! consecutive-failure breaker, and always answers with an `ApiResponse`.
//!
//! The API uses JWT bearer tokens obtained from `/api/token/` and renewed
//! through `/api/token/refresh/`.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod response;
pub mod transport;

pub use client::{ApiClient, RequestOptions, SessionStatus};
pub use error::ApiError;
pub use response::ApiResponse;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
