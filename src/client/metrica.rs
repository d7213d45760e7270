//! METRICA domain-abuse resource facade
//!
//! Typed wrappers over `v2/metrica/*`: the latest daily report, a dated
//! report, and the list of available report dates. Reports can be large,
//! so every request advertises `Accept-Encoding: gzip, deflate`; the
//! transport performs the decompression.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::client::auth::MosapiClient;
use crate::client::monitoring::{envelope_error, parse_body};
use crate::client::types::{DomainListEntry, DomainLists, ErrorEnvelope, MetricaReport};
use crate::error::{MosmonError, Result};

/// Wire format for METRICA dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Interface of the METRICA resource family.
///
/// The ingester depends on this trait rather than on the concrete client,
/// so tests can serve canned reports.
#[async_trait]
pub trait MetricaApi: Send + Sync {
    /// The most recent daily report for a TLD.
    async fn latest(&self, tld: &str) -> Result<MetricaReport>;

    /// The report for a specific day.
    async fn for_date(&self, tld: &str, date: NaiveDate) -> Result<MetricaReport>;

    /// Report dates available in an optional date range.
    async fn list_available(
        &self,
        tld: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DomainListEntry>>;
}

fn accept_gzip() -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("Accept-Encoding".to_string(), "gzip, deflate".to_string());
    headers
}

/// Facade over the `v2/metrica` resource family.
pub struct DomainMetricaClient {
    client: Arc<MosapiClient>,
}

impl DomainMetricaClient {
    pub fn new(client: Arc<MosapiClient>) -> Self {
        Self { client }
    }

    async fn fetch_report(
        &self,
        tld: &str,
        path: String,
        which: &str,
    ) -> Result<MetricaReport> {
        let what = format!("METRICA report ({}) for {}", which, tld);
        let response = self
            .client
            .get_json(tld, &path, &HashMap::new(), &accept_gzip())
            .await?;
        match response.status {
            200 => parse_body(&response.body, &what),
            404 => Err(MosmonError::NotFound(what).into()),
            status => Err(envelope_error(status, &response.body, &what).into()),
        }
    }
}

#[async_trait]
impl MetricaApi for DomainMetricaClient {
    /// Fetches the most recent daily report
    /// (`GET v2/metrica/domainList/latest`).
    ///
    /// # Errors
    ///
    /// [`MosmonError::NotFound`] when the TLD has no report at all.
    async fn latest(&self, tld: &str) -> Result<MetricaReport> {
        self.fetch_report(tld, "v2/metrica/domainList/latest".to_string(), "latest")
            .await
    }

    /// Fetches the report for a specific day
    /// (`GET v2/metrica/domainList/<YYYY-MM-DD>`).
    ///
    /// # Errors
    ///
    /// [`MosmonError::NotFound`] when no report exists for that day.
    async fn for_date(&self, tld: &str, date: NaiveDate) -> Result<MetricaReport> {
        let formatted = date.format(DATE_FORMAT).to_string();
        let path = format!("v2/metrica/domainList/{}", formatted);
        self.fetch_report(tld, path, &formatted).await
    }

    /// Lists the report dates available in an optional date range
    /// (`GET v2/metrica/domainLists?startDate=&endDate=`).
    ///
    /// # Errors
    ///
    /// A 400 carries a date-validation envelope: resultCode 2012 means the
    /// range is inverted, 2013/2014 mean a malformed date. The returned
    /// [`MosmonError::BadRequest`] message carries the local interpretation
    /// followed by the server's own message.
    async fn list_available(
        &self,
        tld: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DomainListEntry>> {
        let what = format!("METRICA report list for {}", tld);
        let mut query = HashMap::new();
        if let Some(start) = start_date {
            query.insert(
                "startDate".to_string(),
                start.format(DATE_FORMAT).to_string(),
            );
        }
        if let Some(end) = end_date {
            query.insert("endDate".to_string(), end.format(DATE_FORMAT).to_string());
        }

        let response = self
            .client
            .get_json(tld, "v2/metrica/domainLists", &query, &accept_gzip())
            .await?;
        match response.status {
            200 => {
                let lists: DomainLists = parse_body(&response.body, &what)?;
                Ok(lists.domain_lists)
            }
            400 => Err(date_envelope_error(&response.body, &what).into()),
            status => Err(envelope_error(status, &response.body, &what).into()),
        }
    }
}

/// Interprets the 400 envelope of the list endpoint: the date-validation
/// result codes get a stable, human-readable prefix in front of the
/// server message.
fn date_envelope_error(body: &str, what: &str) -> MosmonError {
    let envelope: Option<ErrorEnvelope> = serde_json::from_str(body).ok();
    match envelope {
        Some(env) => {
            let interpretation = match env.result_code.as_str() {
                "2012" => "Date order is invalid",
                "2013" | "2014" => "Date syntax is invalid",
                _ => {
                    return MosmonError::BadRequest {
                        result_code: env.result_code,
                        message: env.message,
                    }
                }
            };
            MosmonError::BadRequest {
                result_code: env.result_code,
                message: format!("{}: {}", interpretation, env.message),
            }
        }
        None => MosmonError::Api(format!("{} failed with status 400", what)),
    }
}
