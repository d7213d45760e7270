//! Secret storage for MoSAPI credentials and session material
//!
//! Credentials (`mosapi_username_<tld>`, `mosapi_password_<tld>`), the TLS
//! client key-pair, and cached session cookies all live in a secret store.
//! [`SecretStore`] is the seam; [`KeyringSecretStore`] uses the operating
//! system's native credential store (Keychain on macOS, Secret Service on
//! Linux, Windows Credential Manager on Windows) and
//! [`InMemorySecretStore`] backs tests and single-process runs.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{MosmonError, Result};

/// Named-secret accessor shared by the client and the session cache.
///
/// Implementations must be safe to call from concurrent worker tasks. All
/// three operations may block on I/O; callers sit on worker threads that
/// are expected to wait on external stores.
pub trait SecretStore: Send + Sync {
    /// Returns the secret stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MosmonError::Secret`] when the secret is absent and
    /// [`MosmonError::Keyring`] (or an implementation-specific kind) when
    /// the backing store fails.
    fn get_secret(&self, name: &str) -> Result<String>;

    /// Returns the secret under `name`, or `None` when absent.
    ///
    /// Unlike [`get_secret`](Self::get_secret) this treats a missing entry
    /// as an ordinary outcome rather than an error.
    fn get_secret_opt(&self, name: &str) -> Result<Option<String>>;

    /// Installs or replaces the secret under `name`.
    fn put_secret(&self, name: &str, value: &str) -> Result<()>;

    /// Removes the secret under `name`. A no-op when absent.
    fn delete_secret(&self, name: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// KeyringSecretStore
// ---------------------------------------------------------------------------

/// [`SecretStore`] backed by the OS native keyring.
///
/// Entries are namespaced `mosmon-<name>` so they never collide with other
/// applications sharing the keyring.
pub struct KeyringSecretStore;

impl KeyringSecretStore {
    /// Builds the keyring service name for a secret.
    fn service_name(name: &str) -> String {
        format!("mosmon-{}", name)
    }

    fn entry(name: &str) -> Result<keyring::Entry> {
        let service = Self::service_name(name);
        Ok(keyring::Entry::new(&service, name).map_err(MosmonError::Keyring)?)
    }
}

impl SecretStore for KeyringSecretStore {
    fn get_secret(&self, name: &str) -> Result<String> {
        match self.get_secret_opt(name)? {
            Some(value) => Ok(value),
            None => Err(MosmonError::Secret(format!("secret not found: {}", name)).into()),
        }
    }

    fn get_secret_opt(&self, name: &str) -> Result<Option<String>> {
        match Self::entry(name)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(MosmonError::Keyring(e).into()),
        }
    }

    fn put_secret(&self, name: &str, value: &str) -> Result<()> {
        Self::entry(name)?
            .set_password(value)
            .map_err(MosmonError::Keyring)?;
        Ok(())
    }

    fn delete_secret(&self, name: &str) -> Result<()> {
        match Self::entry(name)?.delete_password() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(MosmonError::Keyring(e).into()),
        }
    }
}

// ---------------------------------------------------------------------------
// InMemorySecretStore
// ---------------------------------------------------------------------------

/// Mutex-guarded in-memory [`SecretStore`].
///
/// Used by tests and by deployments that inject secrets at startup (for
/// example from environment variables) instead of an external store.
#[derive(Default)]
pub struct InMemorySecretStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated from an iterator of `(name, value)`
    /// pairs. Convenient for test fixtures.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }
}

impl SecretStore for InMemorySecretStore {
    fn get_secret(&self, name: &str) -> Result<String> {
        match self.get_secret_opt(name)? {
            Some(value) => Ok(value),
            None => Err(MosmonError::Secret(format!("secret not found: {}", name)).into()),
        }
    }

    fn get_secret_opt(&self, name: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| MosmonError::Secret("secret store lock poisoned".to_string()))?;
        Ok(entries.get(name).cloned())
    }

    fn put_secret(&self, name: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| MosmonError::Secret("secret store lock poisoned".to_string()))?;
        entries.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn delete_secret(&self, name: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| MosmonError::Secret("secret store lock poisoned".to_string()))?;
        entries.remove(name);
        Ok(())
    }
}

/// Secret name for a TLD's MoSAPI username.
pub fn username_secret(entity_id: &str) -> String {
    format!("mosapi_username_{}", entity_id)
}

/// Secret name for a TLD's MoSAPI password.
pub fn password_secret(entity_id: &str) -> String {
    format!("mosapi_password_{}", entity_id)
}

/// Secret name for a TLD's cached session cookie.
pub fn session_cookie_secret(entity_id: &str) -> String {
    format!("mosapi_session_cookie_{}", entity_id)
}
