//! Core library for the Tarotnautica client.
//!
//! Everything a screen needs to talk to the Tarotnautica API lives here:
//!
//! - `api`: the `ApiClient` executor (`execute`), its transport seam, the
//!   uniform `ApiResponse` surface and typed endpoint helpers
//! - `auth`: token storage backends, the token codec and the refresh
//!   coordinator
//! - `events`: the session event bus used to announce forced logouts
//! - `config`: on-disk configuration and the timeout/retry policy

pub mod api;
pub mod auth;
pub mod config;
pub mod events;
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, ApiError, ApiResponse, RequestOptions};
pub use auth::{decode, Claims, RefreshCoordinator, RefreshError, TokenKind, TokenStore};
pub use config::{AuthPolicy, Config, TokenStorage};
pub use events::{SessionEvent, SessionEventBus, Subscription};
