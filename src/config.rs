//! Configuration management for Mosmon
//!
//! This module handles loading, parsing and validating configuration from
//! a YAML file with CLI overrides. Key names match the deployment
//! configuration they are fed from; the historical synonyms
//! (`mosapiServiceUrl`, `mosapiEntityType`) are accepted as aliases of the
//! primary spellings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::auth::EntityType;
use crate::error::{MosmonError, Result};

/// Main configuration structure for Mosmon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root URL of the MoSAPI deployment.
    #[serde(rename = "mosapiUrl", alias = "mosapiServiceUrl")]
    pub mosapi_url: String,

    /// `ry` for registries, `rr` for registrars.
    #[serde(
        rename = "entityType",
        alias = "mosapiEntityType",
        default = "default_entity_type"
    )]
    pub entity_type: String,

    /// TLD labels to poll, in reporting order.
    #[serde(rename = "mosapiTlds", default)]
    pub tlds: Vec<String>,

    /// Service names for the per-service aggregates.
    #[serde(rename = "mosapiServices", default = "default_services")]
    pub services: Vec<String>,

    /// Worker pool size; bounded by the MoSAPI per-certificate
    /// concurrent-session cap.
    #[serde(rename = "mosapiTldThreadCnt", default = "default_tld_thread_cnt")]
    pub tld_thread_cnt: usize,

    /// Metrics publisher pool size.
    #[serde(
        rename = "mosapiMetricsThreadCnt",
        default = "default_metrics_thread_cnt"
    )]
    pub metrics_thread_cnt: usize,

    /// Recipient of the daily abuse summary; absent disables the mail.
    #[serde(rename = "mosapiAbuseEmailAddress", default)]
    pub abuse_email_address: Option<String>,

    /// Secret-store entry holding the TLS client certificate PEM.
    #[serde(rename = "tlsCertSecret", default = "default_tls_cert_secret")]
    pub tls_cert_secret: String,

    /// Secret-store entry holding the TLS client key PEM.
    #[serde(rename = "tlsKeySecret", default = "default_tls_key_secret")]
    pub tls_key_secret: String,

    /// Per-request HTTP timeout in seconds.
    #[serde(
        rename = "requestTimeoutSeconds",
        default = "default_request_timeout_seconds"
    )]
    pub request_timeout_seconds: u64,

    /// Deadline for one batch operation in seconds; absent means
    /// unbounded.
    #[serde(rename = "batchDeadlineSeconds", default)]
    pub batch_deadline_seconds: Option<u64>,

    /// Threat-match database path; absent uses the platform data
    /// directory.
    #[serde(rename = "threatDbPath", default)]
    pub threat_db_path: Option<String>,
}

fn default_entity_type() -> String {
    "ry".to_string()
}

fn default_services() -> Vec<String> {
    vec!["dns".to_string(), "rdds".to_string()]
}

fn default_tld_thread_cnt() -> usize {
    4
}

fn default_metrics_thread_cnt() -> usize {
    4
}

fn default_tls_cert_secret() -> String {
    "mosapi_tls_client_cert_pem".to_string()
}

fn default_tls_key_secret() -> String {
    "mosapi_tls_client_key_pem".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    60
}

/// Maximum concurrent MoSAPI sessions per client certificate.
pub const MAX_CONCURRENT_SESSIONS: usize = 4;

impl Config {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`MosmonError::Config`] when the file is unreadable and
    /// [`MosmonError::Yaml`] when it does not parse.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MosmonError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&raw).map_err(MosmonError::Yaml)?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.mosapi_url)
            .map_err(|e| MosmonError::Config(format!("invalid mosapiUrl: {}", e)))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(MosmonError::Config(format!(
                "mosapiUrl must be http(s), got {}",
                url.scheme()
            ))
            .into());
        }

        self.entity_type.parse::<EntityType>()?;

        if self.tld_thread_cnt == 0 || self.tld_thread_cnt > MAX_CONCURRENT_SESSIONS {
            return Err(MosmonError::Config(format!(
                "mosapiTldThreadCnt must be between 1 and {}, got {}",
                MAX_CONCURRENT_SESSIONS, self.tld_thread_cnt
            ))
            .into());
        }

        if self.metrics_thread_cnt == 0 {
            return Err(
                MosmonError::Config("mosapiMetricsThreadCnt must be at least 1".to_string())
                    .into(),
            );
        }

        if self.request_timeout_seconds == 0 {
            return Err(
                MosmonError::Config("requestTimeoutSeconds must be at least 1".to_string())
                    .into(),
            );
        }

        Ok(())
    }

    /// The parsed root URL. Call [`validate`](Self::validate) first.
    pub fn root_url(&self) -> Result<Url> {
        Url::parse(&self.mosapi_url)
            .map_err(|e| MosmonError::Config(format!("invalid mosapiUrl: {}", e)).into())
    }

    /// The parsed entity type. Call [`validate`](Self::validate) first.
    pub fn parsed_entity_type(&self) -> Result<EntityType> {
        self.entity_type.parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        self.batch_deadline_seconds.map(Duration::from_secs)
    }
}
