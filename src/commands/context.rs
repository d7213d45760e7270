//! Service-stack assembly
//!
//! Builds the full client stack from configuration: secret store, mTLS
//! transport, shared session cache, authenticated client, resource
//! facades, orchestrator and ingester. Construction-time injection keeps
//! the graph explicit; nothing here is discovered at runtime.

use std::sync::Arc;

use tokio::time::Instant;

use crate::client::auth::{MosapiClient, SecretCredentials};
use crate::client::metrica::{DomainMetricaClient, MetricaApi};
use crate::client::monitoring::{MonitoringApi, ServiceMonitoringClient};
use crate::client::session::SecretSessionCache;
use crate::client::transport::Transport;
use crate::config::Config;
use crate::error::Result;
use crate::ingest::store::ThreatMatchStore;
use crate::ingest::Ingester;
use crate::mailer::LogMailer;
use crate::orchestrator::metrics::{MetricsPublisher, RecorderSink};
use crate::orchestrator::Orchestrator;
use crate::secrets::{KeyringSecretStore, SecretStore};

/// Queued metric batches before the oldest is dropped.
const METRICS_QUEUE_CAPACITY: usize = 64;

/// The assembled service stack shared by all command handlers.
pub struct ServiceContext {
    pub config: Config,
    pub client: Arc<MosapiClient>,
    pub metrica: Arc<dyn MetricaApi>,
    pub orchestrator: Arc<Orchestrator>,
    pub ingester: Arc<Ingester>,
}

impl ServiceContext {
    /// Builds the stack against the OS keyring secret store.
    ///
    /// Must run inside a tokio runtime: the metrics publisher spawns its
    /// worker tasks at construction.
    pub fn build(config: Config) -> Result<Self> {
        let secrets: Arc<dyn SecretStore> = Arc::new(KeyringSecretStore);
        Self::build_with_secrets(config, secrets)
    }

    /// Builds the stack against an injected secret store; the seam unit
    /// and integration tests use.
    pub fn build_with_secrets(config: Config, secrets: Arc<dyn SecretStore>) -> Result<Self> {
        config.validate()?;

        let transport = build_transport(&config, secrets.as_ref())?;
        let cache = Arc::new(SecretSessionCache::new(Arc::clone(&secrets)));
        let credentials = Arc::new(SecretCredentials::new(Arc::clone(&secrets)));

        let client = Arc::new(MosapiClient::new(
            transport,
            cache,
            credentials,
            config.root_url()?,
            config.parsed_entity_type()?,
        ));

        let monitoring: Arc<dyn MonitoringApi> =
            Arc::new(ServiceMonitoringClient::new(Arc::clone(&client)));
        let metrica: Arc<dyn MetricaApi> =
            Arc::new(DomainMetricaClient::new(Arc::clone(&client)));

        let publisher = Arc::new(MetricsPublisher::new(
            Arc::new(RecorderSink),
            config.metrics_thread_cnt,
            METRICS_QUEUE_CAPACITY,
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            monitoring,
            config.tlds.clone(),
            config.services.clone(),
            config.tld_thread_cnt,
            Some(publisher),
        ));

        let store = Arc::new(match &config.threat_db_path {
            Some(path) => ThreatMatchStore::new_with_path(path)?,
            None => ThreatMatchStore::new()?,
        });

        let ingester = Arc::new(Ingester::new(
            Arc::clone(&metrica),
            store,
            Arc::new(LogMailer),
            config.abuse_email_address.clone(),
        ));

        Ok(Self {
            config,
            client,
            metrica,
            orchestrator,
            ingester,
        })
    }

    /// Deadline for one batch operation, when configured.
    pub fn batch_deadline(&self) -> Option<Instant> {
        self.config.batch_deadline().map(|t| Instant::now() + t)
    }
}

/// Builds the transport, with the client identity when both TLS secrets
/// are present. A missing identity only makes sense against mock servers,
/// so it is loudly logged.
fn build_transport(config: &Config, secrets: &dyn SecretStore) -> Result<Transport> {
    let cert = secrets.get_secret_opt(&config.tls_cert_secret)?;
    let key = secrets.get_secret_opt(&config.tls_key_secret)?;

    match (cert, key) {
        (Some(cert), Some(key)) => {
            Transport::with_client_identity(&cert, &key, config.request_timeout())
        }
        _ => {
            tracing::warn!(
                "TLS client identity not found in secret store ({} / {}); \
                 connecting without mutual TLS",
                config.tls_cert_secret,
                config.tls_key_secret
            );
            Transport::new(config.request_timeout())
        }
    }
}
