//! Token storage backends.
//!
//! Exactly two secrets are persisted: the short-lived `access` token and the
//! `refresh` token used to mint new access tokens. Reads never fail: storage
//! that cannot be read is reported as an absent token, which callers treat as
//! "not logged in".

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::APP_NAME;

/// Token file name in cache directory
const TOKEN_FILE: &str = "tokens.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Stable storage key.
    pub fn key(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Durable home of the access/refresh pair.
pub trait TokenStore: Send + Sync {
    /// Read a token. Unreadable storage is logged and reported as `None`.
    fn get(&self, kind: TokenKind) -> Option<String>;

    fn set(&self, kind: TokenKind, value: &str) -> Result<()>;

    /// Remove both tokens. Implementations may delete them one at a time.
    fn clear(&self) -> Result<()>;

    /// Store a freshly issued pair, access first.
    fn store_pair(&self, access: &str, refresh: &str) -> Result<()> {
        self.set(TokenKind::Access, access)?;
        self.set(TokenKind::Refresh, refresh)
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// Tokens kept in the OS keychain, one entry per token kind.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(APP_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, kind: TokenKind) -> Result<Entry> {
        Entry::new(&self.service, kind.key()).context("Failed to create keyring entry")
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        let entry = match self.entry(kind) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(token = kind.key(), error = %e, "Keyring unavailable");
                return None;
            }
        };
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(token = kind.key(), error = %e, "Failed to read token from keychain");
                None
            }
        }
    }

    fn set(&self, kind: TokenKind, value: &str) -> Result<()> {
        self.entry(kind)?
            .set_password(value)
            .context("Failed to store token in keychain")
    }

    fn clear(&self) -> Result<()> {
        for kind in [TokenKind::Access, TokenKind::Refresh] {
            match self.entry(kind)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => {
                    return Err(e).context("Failed to delete token from keychain");
                }
            }
        }
        debug!("Keychain tokens cleared");
        Ok(())
    }
}

// ============================================================================
// JSON file
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    access: Option<String>,
    refresh: Option<String>,
}

impl TokenFile {
    fn slot(&mut self, kind: TokenKind) -> &mut Option<String> {
        match kind {
            TokenKind::Access => &mut self.access,
            TokenKind::Refresh => &mut self.refresh,
        }
    }
}

/// Tokens kept in a JSON file, for machines without a usable keychain.
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Store the file as `tokens.json` inside `cache_dir`.
    pub fn in_dir(cache_dir: PathBuf) -> Self {
        Self::new(cache_dir.join(TOKEN_FILE))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read(&self) -> Result<TokenFile> {
        if !self.path.exists() {
            return Ok(TokenFile::default());
        }
        let contents = std::fs::read_to_string(&self.path).context("Failed to read token file")?;
        serde_json::from_str(&contents).context("Failed to parse token file")
    }

    fn write(&self, file: &TokenFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(file)?;
        std::fs::write(&self.path, contents).context("Failed to write token file")
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        match self.read() {
            Ok(mut file) => file.slot(kind).take(),
            Err(e) => {
                warn!(token = kind.key(), error = %e, "Token file unreadable");
                None
            }
        }
    }

    fn set(&self, kind: TokenKind, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // A corrupt file is replaced rather than blocking new logins.
        let mut file = self.read().unwrap_or_default();
        *file.slot(kind) = Some(value.to_string());
        self.write(&file)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove token file")?;
        }
        Ok(())
    }
}

// ============================================================================
// In memory
// ============================================================================

/// Process-local storage, used by tests and embedders with their own persistence.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<TokenKind, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        let store = Self::new();
        {
            let mut tokens = store.tokens.write().unwrap_or_else(PoisonError::into_inner);
            tokens.insert(TokenKind::Access, access.to_string());
            tokens.insert(TokenKind::Refresh, refresh.to_string());
        }
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    fn set(&self, kind: TokenKind, value: &str) -> Result<()> {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
