//! Bounded fan-out over TLDs and services
//!
//! A single logical call ("state of all TLDs", "downtime for all TLDs ×
//! services") fans across a worker pool whose size equals the MoSAPI
//! per-certificate concurrent-session cap. Per-TLD failures are isolated:
//! they are logged and replaced by sentinels, and the batch as a whole
//! never fails. The output always preserves input order, not completion
//! order.

pub mod metrics;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::client::monitoring::MonitoringApi;
use crate::client::types::{
    ServiceAlarm, ServiceDowntime, ServiceIncidents, ServiceStateSummary, TldServiceState,
    STATUS_ERROR,
};
use crate::error::{MosmonError, Result};
use crate::orchestrator::metrics::{state_metric_points, MetricsPublisher};

/// Fan-out driver for the configured TLD and service sets.
pub struct Orchestrator {
    monitoring: Arc<dyn MonitoringApi>,
    tlds: Vec<String>,
    services: Vec<String>,
    pool_size: usize,
    publisher: Option<Arc<MetricsPublisher>>,
}

impl Orchestrator {
    /// # Arguments
    ///
    /// * `monitoring` - The monitoring facade.
    /// * `tlds` - TLDs to poll, in the order results are reported.
    /// * `services` - Service names for the per-service aggregates.
    /// * `pool_size` - Maximum in-flight MoSAPI requests; must not exceed
    ///   the per-certificate concurrent-session cap.
    /// * `publisher` - Optional fire-and-forget metrics pipeline.
    pub fn new(
        monitoring: Arc<dyn MonitoringApi>,
        tlds: Vec<String>,
        services: Vec<String>,
        pool_size: usize,
        publisher: Option<Arc<MetricsPublisher>>,
    ) -> Self {
        Self {
            monitoring,
            tlds,
            services,
            pool_size: pool_size.max(1),
            publisher,
        }
    }

    /// TLDs this orchestrator polls.
    pub fn tlds(&self) -> &[String] {
        &self.tlds
    }

    /// Runs `task` for every item with bounded concurrency, returning one
    /// result per item in input order.
    ///
    /// The deadline is checked as each task starts: tasks already running
    /// complete normally, tasks reached after the deadline yield an error
    /// without issuing requests.
    async fn fan_out<T, F, Fut>(
        &self,
        items: &[String],
        deadline: Option<Instant>,
        task: F,
    ) -> Vec<Result<T>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let task = &task;
        stream::iter(items.to_vec())
            .map(|item| async move {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return Err(MosmonError::Api(format!(
                            "deadline exceeded before task for {} started",
                            item
                        ))
                        .into());
                    }
                }
                task(item).await
            })
            .buffered(self.pool_size)
            .collect()
            .await
    }

    /// Polls the monitoring state of every configured TLD.
    ///
    /// Returns exactly one summary per TLD, in input order. A failed TLD
    /// yields the `ERROR` sentinel with absent incidents. Each successful
    /// fetch also publishes its time-series points asynchronously.
    pub async fn poll_service_states(
        &self,
        deadline: Option<Instant>,
    ) -> Vec<ServiceStateSummary> {
        let monitoring = Arc::clone(&self.monitoring);
        let results = self
            .fan_out(&self.tlds, deadline, move |tld| {
                let monitoring = Arc::clone(&monitoring);
                async move { monitoring.service_state(&tld).await }
            })
            .await;

        self.tlds
            .iter()
            .zip(results)
            .map(|(tld, result)| match result {
                Ok(state) => {
                    if let Some(publisher) = &self.publisher {
                        publisher.submit(state_metric_points(&state));
                    }
                    summarize_state(tld, state)
                }
                Err(e) => {
                    tracing::warn!("state poll failed for {}: {:#}", tld, e);
                    ServiceStateSummary {
                        tld: tld.clone(),
                        status: STATUS_ERROR.to_string(),
                        active_incidents: None,
                    }
                }
            })
            .collect()
    }

    /// Collects rolling-week downtime for every TLD × service.
    ///
    /// Only the TLD axis is parallel; services are fetched sequentially
    /// inside one worker slot. A TLD whose collection fails is absent from
    /// the aggregate.
    pub async fn collect_downtime(
        &self,
        deadline: Option<Instant>,
    ) -> BTreeMap<String, BTreeMap<String, ServiceDowntime>> {
        let monitoring = Arc::clone(&self.monitoring);
        let services = self.services.clone();
        let results = self
            .fan_out(&self.tlds, deadline, move |tld| {
                let monitoring = Arc::clone(&monitoring);
                let services = services.clone();
                async move {
                    let mut per_service = BTreeMap::new();
                    for service in &services {
                        let downtime = monitoring.downtime(&tld, service).await?;
                        per_service.insert(service.clone(), downtime);
                    }
                    Ok(per_service)
                }
            })
            .await;

        self.assemble("downtime", results)
    }

    /// Collects the alarm flag for every TLD × service; same shape as
    /// [`collect_downtime`](Self::collect_downtime).
    pub async fn collect_alarms(
        &self,
        deadline: Option<Instant>,
    ) -> BTreeMap<String, BTreeMap<String, ServiceAlarm>> {
        let monitoring = Arc::clone(&self.monitoring);
        let services = self.services.clone();
        let results = self
            .fan_out(&self.tlds, deadline, move |tld| {
                let monitoring = Arc::clone(&monitoring);
                let services = services.clone();
                async move {
                    let mut per_service = BTreeMap::new();
                    for service in &services {
                        let alarm = monitoring.alarmed(&tld, service).await?;
                        per_service.insert(service.clone(), alarm);
                    }
                    Ok(per_service)
                }
            })
            .await;

        self.assemble("alarm", results)
    }

    fn assemble<T>(
        &self,
        what: &str,
        results: Vec<Result<BTreeMap<String, T>>>,
    ) -> BTreeMap<String, BTreeMap<String, T>> {
        let mut aggregate = BTreeMap::new();
        for (tld, result) in self.tlds.iter().zip(results) {
            match result {
                Ok(per_service) => {
                    aggregate.insert(tld.clone(), per_service);
                }
                Err(e) => {
                    tracing::warn!("{} collection failed for {}: {:#}", what, tld, e);
                }
            }
        }
        aggregate
    }
}

/// Builds the summary reported for one TLD.
///
/// When the aggregate status is `Down` (case-insensitive) the summary
/// carries every service with a non-empty incident list, threshold and
/// incidents reproduced verbatim; otherwise the incident map is absent.
fn summarize_state(tld: &str, state: TldServiceState) -> ServiceStateSummary {
    let active_incidents = if state.status.eq_ignore_ascii_case("down") {
        Some(
            state
                .tested_services
                .into_iter()
                .filter(|(_, service)| !service.incidents.is_empty())
                .map(|(name, service)| {
                    (
                        name,
                        ServiceIncidents {
                            emergency_threshold: service.emergency_threshold,
                            incidents: service.incidents,
                        },
                    )
                })
                .collect(),
        )
    } else {
        None
    };

    ServiceStateSummary {
        tld: tld.to_string(),
        status: state.status,
        active_incidents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::{Alarmed, IncidentState, IncidentSummary, ServiceStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Canned monitoring facade that fails for TLDs listed in `failing`
    /// and tracks the peak number of concurrent calls.
    struct FakeMonitoring {
        failing: Vec<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl FakeMonitoring {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay: Duration::from_millis(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        async fn track<T>(&self, value: T) -> T {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            value
        }
    }

    fn down_state(tld: &str) -> TldServiceState {
        let mut services = BTreeMap::new();
        services.insert(
            "DNS".to_string(),
            ServiceStatus {
                status: "Down".to_string(),
                emergency_threshold: 20.0,
                incidents: vec![IncidentSummary {
                    incident_id: "1422475201.579".to_string(),
                    start_time: 1422475201,
                    false_positive: false,
                    state: IncidentState::Active,
                    end_time: None,
                }],
            },
        );
        services.insert(
            "RDDS".to_string(),
            ServiceStatus {
                status: "Up".to_string(),
                emergency_threshold: 0.0,
                incidents: vec![],
            },
        );
        TldServiceState {
            version: 1,
            last_update_api_database: None,
            tld: tld.to_string(),
            status: "Down".to_string(),
            tested_services: services,
        }
    }

    fn up_state(tld: &str) -> TldServiceState {
        TldServiceState {
            version: 1,
            last_update_api_database: None,
            tld: tld.to_string(),
            status: "Up".to_string(),
            tested_services: BTreeMap::new(),
        }
    }

    #[async_trait]
    impl MonitoringApi for FakeMonitoring {
        async fn service_state(&self, tld: &str) -> Result<TldServiceState> {
            if self.failing.iter().any(|f| f == tld) {
                return self
                    .track(Err(
                        MosmonError::Transport(format!("boom for {}", tld)).into()
                    ))
                    .await;
            }
            if tld == "downtld" {
                self.track(Ok(down_state(tld))).await
            } else {
                self.track(Ok(up_state(tld))).await
            }
        }

        async fn downtime(&self, tld: &str, service: &str) -> Result<ServiceDowntime> {
            if self.failing.iter().any(|f| f == tld) {
                return Err(MosmonError::Transport(format!("boom for {}", tld)).into());
            }
            let _ = service;
            self.track(Ok(ServiceDowntime {
                version: 2,
                last_update_api_database: None,
                downtime: 42,
                disabled_monitoring: false,
            }))
            .await
        }

        async fn alarmed(&self, tld: &str, service: &str) -> Result<ServiceAlarm> {
            if self.failing.iter().any(|f| f == tld) {
                return Err(MosmonError::Transport(format!("boom for {}", tld)).into());
            }
            let _ = service;
            self.track(Ok(ServiceAlarm {
                version: 2,
                last_update_api_database: None,
                alarmed: Alarmed::No,
            }))
            .await
        }
    }

    fn orchestrator(monitoring: Arc<FakeMonitoring>, tlds: &[&str]) -> Orchestrator {
        Orchestrator::new(
            monitoring,
            tlds.iter().map(|s| s.to_string()).collect(),
            vec!["dns".to_string(), "rdds".to_string()],
            4,
            None,
        )
    }

    #[tokio::test]
    async fn test_poll_preserves_input_order_and_length() {
        let monitoring = Arc::new(FakeMonitoring::new(&[]));
        let orch = orchestrator(monitoring, &["alpha", "beta", "gamma"]);
        let summaries = orch.poll_service_states(None).await;
        let tlds: Vec<&str> = summaries.iter().map(|s| s.tld.as_str()).collect();
        assert_eq!(tlds, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_poll_isolates_per_tld_failures() {
        let monitoring = Arc::new(FakeMonitoring::new(&["bad"]));
        let orch = orchestrator(monitoring, &["good", "bad"]);
        let summaries = orch.poll_service_states(None).await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].tld, "good");
        assert_eq!(summaries[0].status, "Up");
        assert_eq!(summaries[1].tld, "bad");
        assert_eq!(summaries[1].status, STATUS_ERROR);
        assert!(summaries[1].active_incidents.is_none());
    }

    #[tokio::test]
    async fn test_down_tld_reports_active_incidents() {
        let monitoring = Arc::new(FakeMonitoring::new(&[]));
        let orch = orchestrator(monitoring, &["downtld"]);
        let summaries = orch.poll_service_states(None).await;
        let incidents = summaries[0]
            .active_incidents
            .as_ref()
            .expect("down TLD must carry incidents");
        // Only services with a non-empty incident list appear.
        assert_eq!(incidents.len(), 1);
        let dns = &incidents["DNS"];
        assert_eq!(dns.emergency_threshold, 20.0);
        assert_eq!(dns.incidents[0].incident_id, "1422475201.579");
    }

    #[tokio::test]
    async fn test_up_tld_has_absent_incidents() {
        let monitoring = Arc::new(FakeMonitoring::new(&[]));
        let orch = orchestrator(monitoring, &["alpha"]);
        let summaries = orch.poll_service_states(None).await;
        assert!(summaries[0].active_incidents.is_none());
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_pool_size() {
        let monitoring =
            Arc::new(FakeMonitoring::new(&[]).with_delay(Duration::from_millis(20)));
        let tlds: Vec<String> = (0..12).map(|i| format!("tld{}", i)).collect();
        let orch = Orchestrator::new(
            monitoring.clone(),
            tlds,
            vec!["dns".to_string()],
            4,
            None,
        );
        orch.poll_service_states(None).await;
        assert!(
            monitoring.peak.load(Ordering::SeqCst) <= 4,
            "peak concurrency {} exceeded the pool size",
            monitoring.peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_expired_deadline_yields_sentinels_without_requests() {
        let monitoring = Arc::new(FakeMonitoring::new(&[]));
        let orch = orchestrator(monitoring.clone(), &["alpha", "beta"]);
        let past = Instant::now() - Duration::from_secs(1);
        let summaries = orch.poll_service_states(Some(past)).await;
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.status == STATUS_ERROR));
        assert_eq!(monitoring.peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_collect_downtime_drops_failed_tlds() {
        let monitoring = Arc::new(FakeMonitoring::new(&["bad"]));
        let orch = orchestrator(monitoring, &["good", "bad"]);
        let aggregate = orch.collect_downtime(None).await;
        assert_eq!(aggregate.len(), 1);
        let good = &aggregate["good"];
        assert_eq!(good.len(), 2);
        assert_eq!(good["dns"].downtime, 42);
    }

    #[tokio::test]
    async fn test_collect_alarms_covers_all_services() {
        let monitoring = Arc::new(FakeMonitoring::new(&[]));
        let orch = orchestrator(monitoring, &["alpha"]);
        let aggregate = orch.collect_alarms(None).await;
        assert_eq!(aggregate["alpha"]["dns"].alarmed, Alarmed::No);
        assert_eq!(aggregate["alpha"]["rdds"].alarmed, Alarmed::No);
    }

    #[test]
    fn test_summarize_is_case_insensitive_on_down() {
        let mut state = down_state("x");
        state.status = "DOWN".to_string();
        let summary = summarize_state("x", state);
        assert!(summary.active_incidents.is_some());
    }
}
