//! Outbound mail seam
//!
//! Delivery is an external collaborator; this module only defines the
//! interface, the HTML composition for the daily abuse summary, and a
//! log-only implementation for deployments without a configured delivery
//! service.

use crate::client::types::MetricaReport;
use crate::error::Result;

/// Email delivery interface.
pub trait Mailer: Send + Sync {
    fn send(&self, subject: &str, html_body: &str, recipient: &str) -> Result<()>;
}

/// [`Mailer`] that records the message in the log instead of delivering
/// it.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, subject: &str, html_body: &str, recipient: &str) -> Result<()> {
        tracing::info!(
            "mail (log only) to {}: {} ({} bytes of HTML)",
            recipient,
            subject,
            html_body.len()
        );
        Ok(())
    }
}

/// Subject line for a daily abuse report.
pub fn abuse_report_subject(report: &MetricaReport) -> String {
    format!(
        "MoSAPI abuse report for .{} on {}",
        report.tld, report.domain_list_date
    )
}

/// HTML summary of a daily abuse report: headline count plus one section
/// per monitored threat type.
pub fn abuse_report_html(report: &MetricaReport) -> String {
    let mut html = String::new();
    html.push_str(&format!(
        "<h2>Abuse report for .{} ({})</h2>\n",
        escape(&report.tld),
        escape(&report.domain_list_date)
    ));
    html.push_str(&format!(
        "<p>Unique abusive domains: <b>{}</b></p>\n",
        report.unique_abuse_domains
    ));

    for threat in &report.threats {
        if threat.count < 0 {
            html.push_str(&format!(
                "<p>{}: not monitored</p>\n",
                escape(threat.threat_type.as_str())
            ));
            continue;
        }
        html.push_str(&format!(
            "<h3>{} ({})</h3>\n",
            escape(threat.threat_type.as_str()),
            threat.count
        ));
        if !threat.domains.is_empty() {
            html.push_str("<ul>\n");
            for domain in &threat.domains {
                html.push_str(&format!("<li>{}</li>\n", escape(domain)));
            }
            html.push_str("</ul>\n");
        }
    }

    html
}

/// Minimal HTML escaping for interpolated report fields.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
