//! Service-monitoring resource facade
//!
//! Typed wrappers over `v2/monitoring/*`: aggregate TLD state, per-service
//! rolling-week downtime, and per-service alarm flags. Each method calls
//! the authenticated client, deserialises the body, and applies the
//! family's status-code policy, in particular the 404 sentinels for
//! services MoSAPI does not monitor on a TLD.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::client::auth::MosapiClient;
use crate::client::types::{ErrorEnvelope, ServiceAlarm, ServiceDowntime, TldServiceState};
use crate::error::{MosmonError, Result};

/// Interface of the monitoring resource family.
///
/// The orchestrator depends on this trait rather than on the concrete
/// client, so tests can inject canned states and failures.
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    /// Aggregate monitoring state of a TLD.
    async fn service_state(&self, tld: &str) -> Result<TldServiceState>;

    /// Rolling-week downtime for one TLD × service.
    async fn downtime(&self, tld: &str, service: &str) -> Result<ServiceDowntime>;

    /// Alarm flag for one TLD × service.
    async fn alarmed(&self, tld: &str, service: &str) -> Result<ServiceAlarm>;
}

/// Maps a non-success MoSAPI response onto an error kind, reading the
/// `{resultCode, message}` envelope when the body carries one.
pub(crate) fn envelope_error(status: u16, body: &str, what: &str) -> MosmonError {
    let envelope: Option<ErrorEnvelope> = serde_json::from_str(body).ok();
    match (status, envelope) {
        (404, Some(env)) => MosmonError::NotFound(format!("{}: {}", what, env.message)),
        (404, None) => MosmonError::NotFound(what.to_string()),
        (400, Some(env)) => MosmonError::BadRequest {
            result_code: env.result_code,
            message: env.message,
        },
        (status, Some(env)) => MosmonError::Api(format!(
            "{} failed with status {} (resultCode {}): {}",
            what, status, env.result_code, env.message
        )),
        (status, None) => MosmonError::Api(format!(
            "{} failed with unexpected status code {}",
            what, status
        )),
    }
}

/// Deserialises a 200 body, folding schema mismatches into
/// [`MosmonError::Parse`].
pub(crate) fn parse_body<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| MosmonError::Parse(format!("{}: {}", what, e)).into())
}

/// Facade over the `v2/monitoring` resource family.
pub struct ServiceMonitoringClient {
    client: Arc<MosapiClient>,
}

impl ServiceMonitoringClient {
    pub fn new(client: Arc<MosapiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MonitoringApi for ServiceMonitoringClient {
    /// Fetches the aggregate monitoring state of a TLD
    /// (`GET v2/monitoring/state`).
    async fn service_state(&self, tld: &str) -> Result<TldServiceState> {
        let what = format!("monitoring state for {}", tld);
        let response = self
            .client
            .get_json(tld, "v2/monitoring/state", &HashMap::new(), &HashMap::new())
            .await?;
        if response.status == 200 {
            parse_body(&response.body, &what)
        } else {
            Err(envelope_error(response.status, &response.body, &what).into())
        }
    }

    /// Fetches rolling-week downtime for one service
    /// (`GET v2/monitoring/<service>/downtime`).
    ///
    /// A 404 means MoSAPI does not monitor this service for the TLD and
    /// materialises as the disabled sentinel, not an error.
    async fn downtime(&self, tld: &str, service: &str) -> Result<ServiceDowntime> {
        let what = format!("{} downtime for {}", service, tld);
        let path = format!("v2/monitoring/{}/downtime", service);
        let response = self
            .client
            .get_json(tld, &path, &HashMap::new(), &HashMap::new())
            .await?;
        match response.status {
            200 => parse_body(&response.body, &what),
            404 => {
                tracing::debug!("{}: monitoring disabled (404)", what);
                Ok(ServiceDowntime::disabled())
            }
            status => Err(envelope_error(status, &response.body, &what).into()),
        }
    }

    /// Fetches the alarm flag for one service
    /// (`GET v2/monitoring/<service>/alarmed`).
    ///
    /// A 404 materialises as `alarmed = Disabled`.
    async fn alarmed(&self, tld: &str, service: &str) -> Result<ServiceAlarm> {
        let what = format!("{} alarm for {}", service, tld);
        let path = format!("v2/monitoring/{}/alarmed", service);
        let response = self
            .client
            .get_json(tld, &path, &HashMap::new(), &HashMap::new())
            .await?;
        match response.status {
            200 => parse_body(&response.body, &what),
            404 => {
                tracing::debug!("{}: monitoring disabled (404)", what);
                Ok(ServiceAlarm::disabled())
            }
            status => Err(envelope_error(status, &response.body, &what).into()),
        }
    }
}
