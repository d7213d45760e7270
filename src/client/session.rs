//! Cluster-shared session-cookie cache
//!
//! MoSAPI caps concurrent sessions per certificate, so every replica must
//! reuse the same cookie for an entity instead of logging in on its own.
//! [`SessionCache`] is the seam: a mapping from entity id to the current
//! cookie, backed by any strongly-consistent shared store. Two replicas
//! racing on `put` end up with exactly one of the values (last writer
//! wins); `get` never observes a torn value.
//!
//! `get` treats every abnormal condition (store unreachable, entry
//! missing, value empty or whitespace) as an ordinary cache miss. A miss
//! just means the next request logs in first.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::error::Result;
use crate::secrets::{session_cookie_secret, SecretStore};

/// Mapping from entity id to its current session cookie.
pub trait SessionCache: Send + Sync {
    /// Returns the cached cookie, or `None` on any miss condition.
    /// Never errors.
    fn get(&self, entity_id: &str) -> Option<String>;

    /// Atomically installs a new cookie. Readers that start after `put`
    /// returns observe the new value.
    fn put(&self, entity_id: &str, cookie: &str) -> Result<()>;

    /// Removes the entry; equivalent to `put(entity_id, "")`.
    fn clear(&self, entity_id: &str) -> Result<()>;
}

/// Treats empty and whitespace-only stored values as absent.
fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

// ---------------------------------------------------------------------------
// SecretSessionCache
// ---------------------------------------------------------------------------

/// [`SessionCache`] persisted through the shared [`SecretStore`] under
/// `mosapi_session_cookie_<entityId>`.
///
/// This is the production implementation: the secret store is the
/// out-of-process, cluster-visible backing required by the concurrent
/// session cap.
pub struct SecretSessionCache {
    store: Arc<dyn SecretStore>,
}

impl SecretSessionCache {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }
}

impl SessionCache for SecretSessionCache {
    fn get(&self, entity_id: &str) -> Option<String> {
        match self.store.get_secret_opt(&session_cookie_secret(entity_id)) {
            Ok(value) => value.and_then(non_blank),
            Err(e) => {
                // Unreachable store reads as a miss, not an error.
                tracing::warn!("session cache read failed for {}: {:#}", entity_id, e);
                None
            }
        }
    }

    fn put(&self, entity_id: &str, cookie: &str) -> Result<()> {
        self.store
            .put_secret(&session_cookie_secret(entity_id), cookie)
    }

    fn clear(&self, entity_id: &str) -> Result<()> {
        self.store.put_secret(&session_cookie_secret(entity_id), "")
    }
}

// ---------------------------------------------------------------------------
// InMemorySessionCache
// ---------------------------------------------------------------------------

/// Mutex-guarded in-memory [`SessionCache`] for tests and single-process
/// runs.
#[derive(Default)]
pub struct InMemorySessionCache {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionCache for InMemorySessionCache {
    fn get(&self, entity_id: &str) -> Option<String> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(_) => return None,
        };
        entries.get(entity_id).cloned().and_then(non_blank)
    }

    fn put(&self, entity_id: &str, cookie: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(entity_id.to_string(), cookie.to_string());
        Ok(())
    }

    fn clear(&self, entity_id: &str) -> Result<()> {
        self.put(entity_id, "")
    }
}
