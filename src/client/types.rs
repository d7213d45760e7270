//! Wire-format value objects for MoSAPI responses
//!
//! Field names follow the MoSAPI JSON schema exactly; serde renames map
//! them onto Rust naming. All value objects live for the duration of one
//! request.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Aggregate monitoring state for one TLD (`GET v2/monitoring/state`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TldServiceState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub last_update_api_database: Option<i64>,
    pub tld: String,
    /// Aggregate status: `Up`, `Down`, or an `UP-inconclusive-*` variant.
    pub status: String,
    /// Per-service state keyed by service name (`dns`, `rdds`, ...).
    #[serde(default)]
    pub tested_services: BTreeMap<String, ServiceStatus>,
}

/// Per-service monitoring state inside [`TldServiceState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub status: String,
    /// Fraction of the contractual downtime budget consumed, in [0, 100].
    #[serde(default)]
    pub emergency_threshold: f64,
    #[serde(default)]
    pub incidents: Vec<IncidentSummary>,
}

/// One incident attached to a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSummary {
    #[serde(rename = "incidentID")]
    pub incident_id: String,
    /// Unix seconds.
    pub start_time: i64,
    #[serde(default)]
    pub false_positive: bool,
    pub state: IncidentState,
    #[serde(default)]
    pub end_time: Option<i64>,
}

/// Incident lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentState {
    Active,
    Resolved,
}

/// Rolling-week downtime for one TLD × service
/// (`GET v2/monitoring/<service>/downtime`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDowntime {
    pub version: u32,
    #[serde(default)]
    pub last_update_api_database: Option<i64>,
    /// Downtime minutes in the rolling week.
    #[serde(default)]
    pub downtime: u64,
    /// Not on the wire: set when the endpoint answered 404, meaning MoSAPI
    /// does not monitor this service for the TLD.
    #[serde(default)]
    pub disabled_monitoring: bool,
}

impl ServiceDowntime {
    /// The sentinel materialised from a 404: monitoring disabled, zero
    /// downtime.
    pub fn disabled() -> Self {
        Self {
            version: 2,
            last_update_api_database: None,
            downtime: 0,
            disabled_monitoring: true,
        }
    }
}

/// Alarm state for one TLD × service
/// (`GET v2/monitoring/<service>/alarmed`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAlarm {
    pub version: u32,
    #[serde(default)]
    pub last_update_api_database: Option<i64>,
    pub alarmed: Alarmed,
}

impl ServiceAlarm {
    /// The sentinel materialised from a 404: monitoring disabled.
    pub fn disabled() -> Self {
        Self {
            version: 2,
            last_update_api_database: None,
            alarmed: Alarmed::Disabled,
        }
    }
}

/// Alarm tri-state as MoSAPI spells it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alarmed {
    Yes,
    No,
    Disabled,
}

/// Daily METRICA domain-abuse report
/// (`GET v2/metrica/domainList/latest` or `GET v2/metrica/domainList/<date>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricaReport {
    #[serde(default)]
    pub version: u32,
    pub tld: String,
    /// `YYYY-MM-DD`; the report's check date.
    pub domain_list_date: String,
    #[serde(default)]
    pub unique_abuse_domains: u64,
    #[serde(default)]
    pub threats: Vec<ThreatData>,
}

/// Per-threat-type counts and affected domains inside a METRICA report.
///
/// `count` is −1 when the threat type is not monitored for the TLD;
/// `domains` may be a proper subset of `count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatData {
    pub threat_type: ThreatType,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Abuse threat classes reported by METRICA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThreatType {
    Spam,
    Phishing,
    BotnetCc,
    Malware,
}

impl ThreatType {
    /// Wire spelling, also used as the persisted `threat_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::Spam => "spam",
            ThreatType::Phishing => "phishing",
            ThreatType::BotnetCc => "botnetCc",
            ThreatType::Malware => "malware",
        }
    }
}

impl std::fmt::Display for ThreatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response of `GET v2/metrica/domainLists`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainLists {
    #[serde(default)]
    pub domain_lists: Vec<DomainListEntry>,
}

/// One available report in a [`DomainLists`] response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainListEntry {
    pub domain_list_date: String,
    #[serde(default)]
    pub domain_list_generation_date: Option<String>,
}

/// MoSAPI error envelope attached to 4xx bodies.
///
/// `resultCode` arrives as a number or a string depending on the endpoint;
/// it is normalised to a string here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    #[serde(deserialize_with = "de_result_code")]
    pub result_code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn de_result_code<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Num(i64),
        Str(String),
    }
    Ok(match Code::deserialize(deserializer)? {
        Code::Num(n) => n.to_string(),
        Code::Str(s) => s,
    })
}

/// Orchestrator output for one TLD's state poll.
///
/// `active_incidents` is `Some` only when the aggregate status is `Down`
/// (case-insensitive); the option distinguishes "absent" from "empty".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStateSummary {
    pub tld: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_incidents: Option<BTreeMap<String, ServiceIncidents>>,
}

/// Threshold and incidents reproduced verbatim for a down TLD's service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIncidents {
    pub emergency_threshold: f64,
    pub incidents: Vec<IncidentSummary>,
}

/// Aggregate status a summary carries when the per-TLD fetch failed.
pub const STATUS_ERROR: &str = "ERROR";
