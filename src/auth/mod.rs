//! Credential boundary.
//!
//! The sync core never persists secrets itself; it only asks a
//! `TokenProvider` for the current bearer token before each request.
//! `KeyringTokens` keeps the token in the OS keychain.

use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "draftcache";

/// Keyring username slot the API token lives under.
const TOKEN_USER: &str = "api-token";

pub trait TokenProvider: Send + Sync {
    /// The current bearer token, if any. `None` means the request goes
    /// out unauthenticated (public endpoints still work).
    fn current_token(&self) -> Option<String>;
}

/// Token storage backed by the OS keychain.
pub struct KeyringTokens;

impl KeyringTokens {
    pub fn store_token(token: &str) -> Result<()> {
        let entry =
            Entry::new(SERVICE_NAME, TOKEN_USER).context("Failed to create keyring entry")?;
        entry
            .set_password(token)
            .context("Failed to store token in keychain")?;
        Ok(())
    }

    pub fn clear_token() -> Result<()> {
        let entry =
            Entry::new(SERVICE_NAME, TOKEN_USER).context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete token from keychain")?;
        Ok(())
    }

    pub fn has_token() -> bool {
        Entry::new(SERVICE_NAME, TOKEN_USER)
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }
}

impl TokenProvider for KeyringTokens {
    fn current_token(&self) -> Option<String> {
        Entry::new(SERVICE_NAME, TOKEN_USER)
            .ok()?
            .get_password()
            .ok()
    }
}

/// Fixed token for tests and headless environments.
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn current_token(&self) -> Option<String> {
        self.0.clone()
    }
}
