//! Shared fixtures for the wiremock-driven integration tests

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use mosmon::client::auth::{MosapiClient, SecretCredentials};
use mosmon::client::session::{InMemorySessionCache, SessionCache};
use mosmon::client::transport::Transport;
use mosmon::client::EntityType;
use mosmon::secrets::{InMemorySecretStore, SecretStore};

/// Secret store pre-seeded with `user` / `pass` credentials for each TLD.
pub fn seeded_secrets(tlds: &[&str]) -> Arc<InMemorySecretStore> {
    let store = InMemorySecretStore::new();
    for tld in tlds {
        store
            .put_secret(&format!("mosapi_username_{}", tld), "user")
            .unwrap();
        store
            .put_secret(&format!("mosapi_password_{}", tld), "pass")
            .unwrap();
    }
    Arc::new(store)
}

/// Base64 of `user:pass`, the Basic credential every test login sends.
pub const BASIC_USER_PASS: &str = "dXNlcjpwYXNz";

/// Client against a mock server with an injected in-memory cache.
pub fn client_with_cache(
    server_uri: &str,
    secrets: Arc<InMemorySecretStore>,
    cache: Arc<InMemorySessionCache>,
) -> Arc<MosapiClient> {
    Arc::new(MosapiClient::new(
        Transport::new(Duration::from_secs(5)).expect("transport"),
        cache as Arc<dyn SessionCache>,
        Arc::new(SecretCredentials::new(secrets)),
        Url::parse(server_uri).expect("valid server uri"),
        EntityType::Registry,
    ))
}
