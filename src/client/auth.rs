//! Authenticated MoSAPI client
//!
//! [`MosapiClient`] presents a uniform request API (`get_json` /
//! `post_json`) and handles authentication under the covers: it reads the
//! shared session cache, logs in on demand, and retries a 401 exactly once
//! after a fresh login. Non-401 statuses are returned verbatim; their
//! interpretation belongs to the resource facades.
//!
//! Any 401 on the shared path is treated as "session expired" without
//! inspecting the body: MoSAPI does not document a discriminating body for
//! expired-versus-never-valid sessions, and the one-shot retry bound keeps
//! a never-valid session from looping.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Method;
use url::Url;

use crate::client::session::SessionCache;
use crate::client::transport::{HttpResponse, Transport};
use crate::error::{as_mosmon_error, MosmonError, Result};
use crate::secrets::{password_secret, username_secret, SecretStore};

/// URL path segment distinguishing registry and registrar entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    /// Registry (`ry`); the entity id is the TLD label.
    Registry,
    /// Registrar (`rr`); the entity id is the registrar id.
    Registrar,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Registry => "ry",
            EntityType::Registrar => "rr",
        }
    }
}

impl FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ry" => Ok(EntityType::Registry),
            "rr" => Ok(EntityType::Registrar),
            other => Err(MosmonError::Config(format!(
                "entityType must be \"ry\" or \"rr\", got \"{}\"",
                other
            ))
            .into()),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lazy per-entity credential lookup.
///
/// Resolution happens at login time, keyed by entity id, so credentials can
/// rotate without restarting the client.
pub trait CredentialSource: Send + Sync {
    fn username(&self, entity_id: &str) -> Result<String>;
    fn password(&self, entity_id: &str) -> Result<String>;
}

/// [`CredentialSource`] reading `mosapi_username_<entityId>` /
/// `mosapi_password_<entityId>` from the secret store.
pub struct SecretCredentials {
    store: Arc<dyn SecretStore>,
}

impl SecretCredentials {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }
}

impl CredentialSource for SecretCredentials {
    fn username(&self, entity_id: &str) -> Result<String> {
        self.store.get_secret(&username_secret(entity_id))
    }

    fn password(&self, entity_id: &str) -> Result<String> {
        self.store.get_secret(&password_secret(entity_id))
    }
}

/// Session-aware MoSAPI HTTP client.
///
/// One instance per operator; shared across worker tasks. The TLS context
/// inside the [`Transport`] is immutable after construction.
pub struct MosapiClient {
    transport: Transport,
    cache: Arc<dyn SessionCache>,
    credentials: Arc<dyn CredentialSource>,
    root_url: Url,
    entity_type: EntityType,
}

impl MosapiClient {
    pub fn new(
        transport: Transport,
        cache: Arc<dyn SessionCache>,
        credentials: Arc<dyn CredentialSource>,
        root_url: Url,
        entity_type: EntityType,
    ) -> Self {
        Self {
            transport,
            cache,
            credentials,
            root_url,
            entity_type,
        }
    }

    /// Builds `<rootUrl>/<entityType>/<entityId>/<path>` with exactly one
    /// slash between every segment pair; `path` may arrive with or without
    /// a leading slash.
    fn endpoint(&self, entity_id: &str, path: &str) -> Result<Url> {
        let root = self.root_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let url = format!("{}/{}/{}/{}", root, self.entity_type, entity_id, path);
        Url::parse(&url).map_err(|e| {
            MosmonError::Config(format!("invalid MoSAPI endpoint {}: {}", url, e)).into()
        })
    }

    /// Like [`endpoint`](Self::endpoint), with percent-encoded (UTF-8)
    /// query parameters appended. Iteration order of the map is not part of
    /// the contract.
    fn endpoint_with_query(
        &self,
        entity_id: &str,
        path: &str,
        query: &HashMap<String, String>,
    ) -> Result<Url> {
        let mut url = self.endpoint(entity_id, path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Logs in and installs the returned session cookie in the shared
    /// cache.
    ///
    /// # Errors
    ///
    /// [`MosmonError::InvalidCredentials`] on 401, [`MosmonError::IpNotAllowed`]
    /// on 403, [`MosmonError::RateLimited`] on 429, [`MosmonError::Api`] on
    /// any other non-200 status or when a 200 arrives without a usable
    /// `Set-Cookie` header (in which case the cache is left untouched).
    pub async fn login(&self, entity_id: &str) -> Result<()> {
        let username = self.credentials.username(entity_id)?;
        let password = self.credentials.password(entity_id)?;
        let basic = BASE64.encode(format!("{}:{}", username, password));

        let url = self.endpoint(entity_id, "login")?;
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Basic {}", basic));

        let response = self
            .transport
            .request(Method::POST, &url, &headers, None)
            .await?;

        match response.status {
            200 => {
                let cookie = response
                    .header("Set-Cookie")
                    .and_then(extract_session_cookie)
                    .ok_or_else(|| {
                        MosmonError::Api(
                            "Login succeeded but server did not return a Set-Cookie header"
                                .to_string(),
                        )
                    })?;
                self.cache.put(entity_id, &cookie)?;
                tracing::info!("logged in to MoSAPI for entity {}", entity_id);
                Ok(())
            }
            401 => Err(MosmonError::InvalidCredentials(entity_id.to_string()).into()),
            403 => Err(MosmonError::IpNotAllowed(entity_id.to_string()).into()),
            429 => Err(MosmonError::RateLimited(format!(
                "login for entity {} hit the concurrent-session cap",
                entity_id
            ))
            .into()),
            other => Err(MosmonError::Api(format!(
                "Login failed with unexpected status code {}",
                other
            ))
            .into()),
        }
    }

    /// Logs out and clears the cache entry for the entity.
    ///
    /// The cache entry is cleared on **every** exit path, including
    /// failures: a cookie the server may have invalidated is worthless,
    /// and the next request simply logs in again.
    pub async fn logout(&self, entity_id: &str) -> Result<()> {
        let result = self.logout_inner(entity_id).await;
        if let Err(e) = self.cache.clear(entity_id) {
            tracing::warn!("failed to clear session cache for {}: {:#}", entity_id, e);
        }
        result
    }

    async fn logout_inner(&self, entity_id: &str) -> Result<()> {
        let url = self.endpoint(entity_id, "logout")?;
        let mut headers = HashMap::new();
        if let Some(cookie) = self.cache.get(entity_id) {
            headers.insert("Cookie".to_string(), cookie);
        }

        let response = self
            .transport
            .request(Method::POST, &url, &headers, None)
            .await?;

        match response.status {
            200 => {
                tracing::info!("logged out of MoSAPI for entity {}", entity_id);
                Ok(())
            }
            401 => {
                // Session already expired server-side; nothing left to end.
                tracing::warn!(
                    "logout for entity {} returned 401; session was already expired",
                    entity_id
                );
                Ok(())
            }
            403 => Err(MosmonError::IpNotAllowed(entity_id.to_string()).into()),
            other => Err(MosmonError::Api(format!(
                "Logout failed with unexpected status code {}",
                other
            ))
            .into()),
        }
    }

    // -----------------------------------------------------------------------
    // Authenticated requests
    // -----------------------------------------------------------------------

    /// Authenticated GET returning the raw response for facade
    /// interpretation.
    pub async fn get_json(
        &self,
        entity_id: &str,
        path: &str,
        query: &HashMap<String, String>,
        headers: &HashMap<String, String>,
    ) -> Result<HttpResponse> {
        let url = self.endpoint_with_query(entity_id, path, query)?;
        self.execute(entity_id, Method::GET, &url, headers, None)
            .await
    }

    /// Authenticated POST returning the raw response for facade
    /// interpretation.
    pub async fn post_json(
        &self,
        entity_id: &str,
        path: &str,
        body: Option<String>,
        headers: &HashMap<String, String>,
    ) -> Result<HttpResponse> {
        let url = self.endpoint(entity_id, path)?;
        let mut headers = headers.clone();
        if body.is_some() {
            headers
                .entry("Content-Type".to_string())
                .or_insert_with(|| "application/json; charset=utf-8".to_string());
        }
        self.execute(entity_id, Method::POST, &url, &headers, body)
            .await
    }

    /// The request-with-retry protocol: try with the cached cookie, log in
    /// on a 401 (or a cold cache), retry exactly once.
    async fn execute(
        &self,
        entity_id: &str,
        method: Method,
        url: &Url,
        headers: &HashMap<String, String>,
        body: Option<String>,
    ) -> Result<HttpResponse> {
        if let Some(cookie) = self.cache.get(entity_id) {
            let mut first_headers = headers.clone();
            first_headers.insert("Cookie".to_string(), cookie);
            let response = self
                .transport
                .request(method.clone(), url, &first_headers, body.clone())
                .await?;
            if response.status != 401 {
                return Ok(response);
            }
            tracing::info!(
                "MoSAPI session for entity {} expired; logging in again",
                entity_id
            );
        }

        if let Err(e) = self.login(entity_id).await {
            let mapped = match as_mosmon_error(&e) {
                Some(MosmonError::RateLimited(_)) => {
                    MosmonError::Api("Try running after some time".to_string())
                }
                _ => MosmonError::Api("Automatic re-login failed".to_string()),
            };
            return Err(e.context(mapped));
        }

        let cookie = self.cache.get(entity_id).ok_or_else(|| {
            MosmonError::Api(format!(
                "Login succeeded but session cache has no cookie for entity {}",
                entity_id
            ))
        })?;

        let mut retry_headers = headers.clone();
        retry_headers.insert("Cookie".to_string(), cookie);
        let response = self
            .transport
            .request(method, url, &retry_headers, body)
            .await?;

        if response.status == 401 {
            return Err(MosmonError::Unauthorized(
                "Authentication failed even after re-login".to_string(),
            )
            .into());
        }
        Ok(response)
    }
}

/// Picks the session token out of a `Set-Cookie` header: the first
/// `;`-separated fragment whose trimmed text starts with `id=`.
fn extract_session_cookie(set_cookie: &str) -> Option<String> {
    set_cookie
        .split(';')
        .map(str::trim)
        .find(|fragment| fragment.starts_with("id="))
        .map(str::to_string)
}
