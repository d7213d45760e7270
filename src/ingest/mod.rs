//! METRICA catch-up ingestion
//!
//! Per TLD, each run discovers which daily reports are missing from local
//! storage and fetches them idempotently: the greatest ingested check date
//! decides between "fetch the latest report" (cold start), "list the
//! missing range and fetch each day", and "already up to date". One TLD's
//! failure never affects the others, but a failure inside a TLD's run
//! aborts that TLD's remaining dates. Days are processed strictly in
//! order so the stored maximum stays an honest high-water mark.

pub mod store;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::client::metrica::{MetricaApi, DATE_FORMAT};
use crate::client::types::MetricaReport;
use crate::error::{as_mosmon_error, MosmonError, Result};
use crate::ingest::store::ThreatMatchStore;
use crate::mailer::{abuse_report_html, abuse_report_subject, Mailer};

/// Outcome of one TLD's ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TldIngest {
    pub tld: String,
    /// Number of daily reports persisted, or the error message for a
    /// failed run.
    pub result: std::result::Result<usize, String>,
}

/// Catch-up ingester for daily METRICA reports.
pub struct Ingester {
    metrica: Arc<dyn MetricaApi>,
    store: Arc<ThreatMatchStore>,
    mailer: Arc<dyn Mailer>,
    abuse_recipient: Option<String>,
    today_override: Option<NaiveDate>,
}

impl Ingester {
    pub fn new(
        metrica: Arc<dyn MetricaApi>,
        store: Arc<ThreatMatchStore>,
        mailer: Arc<dyn Mailer>,
        abuse_recipient: Option<String>,
    ) -> Self {
        Self {
            metrica,
            store,
            mailer,
            abuse_recipient,
            today_override: None,
        }
    }

    /// Pins "today" to a fixed date. Catch-up ranges end at today (UTC);
    /// tests need that endpoint deterministic.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today_override = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today_override
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Runs catch-up for every TLD, isolating per-TLD failures.
    pub async fn run_all(&self, tlds: &[String]) -> Vec<TldIngest> {
        let mut outcomes = Vec::with_capacity(tlds.len());
        for tld in tlds {
            let result = match self.run_tld(tld).await {
                Ok(count) => Ok(count),
                Err(e) => {
                    tracing::warn!("METRICA ingestion failed for {}: {:#}", tld, e);
                    Err(format!("{:#}", e))
                }
            };
            outcomes.push(TldIngest {
                tld: tld.clone(),
                result,
            });
        }
        outcomes
    }

    /// Runs catch-up for one TLD and returns the number of reports
    /// persisted.
    pub async fn run_tld(&self, tld: &str) -> Result<usize> {
        match self.store.max_check_date(tld)? {
            None => self.ingest_latest(tld).await,
            Some(max_date) => self.ingest_range(tld, max_date).await,
        }
    }

    /// Re-ingests a single day, replacing whatever is stored for it.
    /// Returns the number of threat matches persisted.
    pub async fn run_date(&self, tld: &str, day: NaiveDate) -> Result<usize> {
        let report = self.metrica.for_date(tld, day).await?;
        self.process_report(tld, &report)
    }

    /// Cold start: no report has ever been ingested, so the latest one
    /// seeds the high-water mark.
    async fn ingest_latest(&self, tld: &str) -> Result<usize> {
        let report = match self.metrica.latest(tld).await {
            Ok(report) => report,
            Err(e) if matches!(as_mosmon_error(&e), Some(MosmonError::NotFound(_))) => {
                tracing::info!("no METRICA report published yet for {}", tld);
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        self.process_report(tld, &report)?;
        Ok(1)
    }

    /// Catch-up: fetch every report between the day after the stored
    /// maximum and today (UTC), oldest first.
    async fn ingest_range(&self, tld: &str, max_date: NaiveDate) -> Result<usize> {
        let start = max_date.succ_opt().ok_or_else(|| {
            MosmonError::Storage(format!("check_date overflow after {}", max_date))
        })?;
        let end = self.today();
        if start > end {
            tracing::debug!("{} is already up to date (through {})", tld, max_date);
            return Ok(0);
        }

        let entries = self
            .metrica
            .list_available(tld, Some(start), Some(end))
            .await?;

        let mut dates = Vec::with_capacity(entries.len());
        for entry in &entries {
            let date =
                NaiveDate::parse_from_str(&entry.domain_list_date, DATE_FORMAT).map_err(|e| {
                    MosmonError::Parse(format!(
                        "unparseable domainListDate {}: {}",
                        entry.domain_list_date, e
                    ))
                })?;
            dates.push(date);
        }
        dates.sort_unstable();

        let mut processed = 0;
        for date in dates {
            let report = self.metrica.for_date(tld, date).await?;
            self.process_report(tld, &report)?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Persists one report atomically and fires the abuse notification.
    ///
    /// Threat entries with an empty domain list (headline-only summaries,
    /// or `count = -1` for unmonitored types) contribute no rows.
    fn process_report(&self, tld: &str, report: &MetricaReport) -> Result<usize> {
        let check_date =
            NaiveDate::parse_from_str(&report.domain_list_date, DATE_FORMAT).map_err(|e| {
                MosmonError::Parse(format!(
                    "unparseable domainListDate {}: {}",
                    report.domain_list_date, e
                ))
            })?;

        let mut rows = Vec::new();
        for threat in &report.threats {
            if threat.domains.is_empty() {
                tracing::debug!(
                    "skipping {} entry without domains for {}/{} (count {})",
                    threat.threat_type,
                    tld,
                    report.domain_list_date,
                    threat.count
                );
                continue;
            }
            for domain in &threat.domains {
                rows.push((domain.clone(), threat.threat_type.as_str().to_string()));
            }
        }

        let inserted = rows.len();
        self.store.replace_day(tld, check_date, &rows)?;
        tracing::info!(
            "ingested METRICA report for {}/{}: {} threat matches",
            tld,
            report.domain_list_date,
            inserted
        );

        self.notify_abuse(report);
        Ok(inserted)
    }

    /// Sends the daily abuse summary when a recipient is configured and
    /// the report has abusive domains. Mail failures never fail
    /// ingestion.
    fn notify_abuse(&self, report: &MetricaReport) {
        let Some(recipient) = &self.abuse_recipient else {
            return;
        };
        if report.unique_abuse_domains == 0 {
            return;
        }
        let subject = abuse_report_subject(report);
        let body = abuse_report_html(report);
        if let Err(e) = self.mailer.send(&subject, &body, recipient) {
            tracing::warn!(
                "failed to send abuse report for {}/{}: {:#}",
                report.tld,
                report.domain_list_date,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::{DomainListEntry, ThreatData, ThreatType};
    use crate::mailer::LogMailer;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn report(tld: &str, day: &str, domains: &[&str]) -> MetricaReport {
        MetricaReport {
            version: 1,
            tld: tld.to_string(),
            domain_list_date: day.to_string(),
            unique_abuse_domains: domains.len() as u64,
            threats: vec![
                ThreatData {
                    threat_type: ThreatType::Malware,
                    count: domains.len() as i64,
                    domains: domains.iter().map(|d| d.to_string()).collect(),
                },
                ThreatData {
                    threat_type: ThreatType::Spam,
                    count: -1,
                    domains: vec![],
                },
            ],
        }
    }

    /// Canned METRICA facade: per-TLD latest and dated reports, plus the
    /// date list the list endpoint should advertise.
    #[derive(Default)]
    struct FakeMetrica {
        latest: HashMap<String, MetricaReport>,
        dated: HashMap<(String, String), MetricaReport>,
        available: HashMap<String, Vec<String>>,
        list_calls: Mutex<Vec<(String, Option<NaiveDate>, Option<NaiveDate>)>>,
    }

    #[async_trait]
    impl MetricaApi for FakeMetrica {
        async fn latest(&self, tld: &str) -> Result<MetricaReport> {
            self.latest.get(tld).cloned().ok_or_else(|| {
                MosmonError::NotFound(format!("METRICA report (latest) for {}", tld)).into()
            })
        }

        async fn for_date(&self, tld: &str, day: NaiveDate) -> Result<MetricaReport> {
            let key = (tld.to_string(), day.format(DATE_FORMAT).to_string());
            self.dated.get(&key).cloned().ok_or_else(|| {
                MosmonError::NotFound(format!("METRICA report ({}) for {}", key.1, tld)).into()
            })
        }

        async fn list_available(
            &self,
            tld: &str,
            start_date: Option<NaiveDate>,
            end_date: Option<NaiveDate>,
        ) -> Result<Vec<DomainListEntry>> {
            self.list_calls
                .lock()
                .unwrap()
                .push((tld.to_string(), start_date, end_date));
            // Dates inside the requested range, deliberately reversed to
            // exercise the ordering requirement.
            let mut entries: Vec<DomainListEntry> = self
                .available
                .get(tld)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|k| {
                    let d = date(k);
                    start_date.map_or(true, |s| d >= s) && end_date.map_or(true, |e| d <= e)
                })
                .map(|k| DomainListEntry {
                    domain_list_date: k,
                    domain_list_generation_date: None,
                })
                .collect();
            entries.reverse();
            Ok(entries)
        }
    }

    fn ingester(
        metrica: FakeMetrica,
        today: &str,
    ) -> (Ingester, Arc<FakeMetrica>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store =
            Arc::new(ThreatMatchStore::new_with_path(dir.path().join("threats.db")).unwrap());
        let metrica = Arc::new(metrica);
        let ingester = Ingester::new(metrica.clone(), store, Arc::new(LogMailer), None)
            .with_today(date(today));
        (ingester, metrica, dir)
    }

    #[tokio::test]
    async fn test_cold_start_ingests_latest_report() {
        let metrica = FakeMetrica {
            latest: HashMap::from([(
                "test".to_string(),
                report("test", "2025-01-02", &["a.test", "b.test"]),
            )]),
            ..Default::default()
        };
        let (ingester, _metrica, _dir) = ingester(metrica, "2025-01-03");

        let processed = ingester.run_tld("test").await.unwrap();
        assert_eq!(processed, 1);

        let rows = ingester
            .store
            .rows_for_day("test", date("2025-01-02"))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            ingester.store.max_check_date("test").unwrap(),
            Some(date("2025-01-02"))
        );
    }

    #[tokio::test]
    async fn test_cold_start_without_any_report_is_ok() {
        let (ingester, _metrica, _dir) = ingester(FakeMetrica::default(), "2025-01-03");
        let processed = ingester.run_tld("test").await.unwrap();
        assert_eq!(processed, 0);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let metrica = FakeMetrica {
            latest: HashMap::from([(
                "test".to_string(),
                report("test", "2025-01-02", &["a.test", "b.test"]),
            )]),
            ..Default::default()
        };
        let (ingester, _metrica, _dir) = ingester(metrica, "2025-01-02");

        ingester.run_tld("test").await.unwrap();
        let first = ingester
            .store
            .rows_for_day("test", date("2025-01-02"))
            .unwrap();

        // Second run: max date is 2025-01-02, today is 2025-01-02, so the
        // range is empty and nothing changes.
        let processed = ingester.run_tld("test").await.unwrap();
        assert_eq!(processed, 0);
        let second = ingester
            .store
            .rows_for_day("test", date("2025-01-02"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_catch_up_processes_range_in_date_order() {
        let mut dated = HashMap::new();
        dated.insert(
            ("test".to_string(), "2025-01-03".to_string()),
            report("test", "2025-01-03", &["c.test"]),
        );
        dated.insert(
            ("test".to_string(), "2025-01-04".to_string()),
            report("test", "2025-01-04", &["d.test"]),
        );
        let metrica = FakeMetrica {
            dated,
            available: HashMap::from([(
                "test".to_string(),
                vec!["2025-01-03".to_string(), "2025-01-04".to_string()],
            )]),
            ..Default::default()
        };
        let (ingester, _metrica, _dir) = ingester(metrica, "2025-01-04");

        // Seed the high-water mark.
        ingester
            .store
            .replace_day(
                "test",
                date("2025-01-02"),
                &[("a.test".to_string(), "malware".to_string())],
            )
            .unwrap();

        let processed = ingester.run_tld("test").await.unwrap();
        assert_eq!(processed, 2);
        assert_eq!(
            ingester.store.max_check_date("test").unwrap(),
            Some(date("2025-01-04"))
        );
        assert_eq!(
            ingester
                .store
                .rows_for_day("test", date("2025-01-03"))
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_catch_up_requests_day_after_max_through_today() {
        let (ingester, metrica, _dir) = ingester(FakeMetrica::default(), "2025-01-10");
        ingester
            .store
            .replace_day(
                "test",
                date("2025-01-05"),
                &[("a.test".to_string(), "spam".to_string())],
            )
            .unwrap();

        ingester.run_tld("test").await.unwrap();

        let calls = metrica.list_calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                "test".to_string(),
                Some(date("2025-01-06")),
                Some(date("2025-01-10"))
            )]
        );
    }

    #[tokio::test]
    async fn test_up_to_date_tld_skips_the_list_call() {
        let (ingester, metrica, _dir) = ingester(FakeMetrica::default(), "2025-01-05");
        ingester
            .store
            .replace_day(
                "test",
                date("2025-01-05"),
                &[("a.test".to_string(), "spam".to_string())],
            )
            .unwrap();

        let processed = ingester.run_tld("test").await.unwrap();
        assert_eq!(processed, 0);
        assert!(metrica.list_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_threats_without_domains_produce_no_rows() {
        let mut r = report("test", "2025-01-02", &[]);
        r.threats[0].domains.clear();
        r.threats[0].count = 5;
        let metrica = FakeMetrica {
            latest: HashMap::from([("test".to_string(), r)]),
            ..Default::default()
        };
        let (ingester, _metrica, _dir) = ingester(metrica, "2025-01-02");

        ingester.run_tld("test").await.unwrap();
        assert!(ingester
            .store
            .rows_for_day("test", date("2025-01-02"))
            .unwrap()
            .is_empty());
        assert_eq!(
            ingester.store.max_check_date("test").unwrap(),
            None,
            "a day with zero rows leaves no stored maximum"
        );
    }

    #[tokio::test]
    async fn test_run_all_isolates_failures() {
        // `bad` advertises a report date whose dated fetch then fails;
        // `good` cold-starts from its latest report.
        let metrica = FakeMetrica {
            latest: HashMap::from([(
                "good".to_string(),
                report("good", "2025-01-02", &["a.good"]),
            )]),
            available: HashMap::from([("bad".to_string(), vec!["2025-01-02".to_string()])]),
            ..Default::default()
        };
        let (ingester, _metrica, _dir) = ingester(metrica, "2025-01-03");
        ingester
            .store
            .replace_day(
                "bad",
                date("2025-01-01"),
                &[("z.bad".to_string(), "spam".to_string())],
            )
            .unwrap();

        let outcomes = ingester
            .run_all(&["bad".to_string(), "good".to_string()])
            .await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].tld, "bad");
        assert!(outcomes[0].result.is_err());
        assert_eq!(outcomes[1].tld, "good");
        assert_eq!(outcomes[1].result, Ok(1));

        // bad's stored rows are untouched by the failed run.
        assert_eq!(
            ingester.store.max_check_date("bad").unwrap(),
            Some(date("2025-01-01"))
        );
    }
}
