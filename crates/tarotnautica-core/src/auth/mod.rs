//! Authentication module for managing tokens and their renewal.
//!
//! This module provides:
//! - `TokenStore`: persistence for the access/refresh pair (keychain, file
//!   or memory)
//! - `decode`: unverified decoding of an access token's claims
//! - `RefreshCoordinator`: single-flight token refresh with retry/backoff

pub mod credentials;
pub mod refresh;
pub mod token;

pub use credentials::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenKind, TokenStore};
pub use refresh::{RefreshCoordinator, RefreshError, REFRESH_PATH};
pub use token::{decode, Claims};
