//! `poll` and `downtime` subcommands: batch reads over the configured
//! TLD set

use colored::Colorize;
use prettytable::{row, Table};

use crate::client::types::STATUS_ERROR;
use crate::commands::context::ServiceContext;
use crate::error::Result;

/// Polls the monitoring state of every configured TLD and prints it.
pub async fn run_poll(ctx: &ServiceContext, json: bool) -> Result<()> {
    let summaries = ctx
        .orchestrator
        .poll_service_states(ctx.batch_deadline())
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["TLD", "STATUS", "SERVICES WITH INCIDENTS"]);
    for summary in &summaries {
        let status = if summary.status == STATUS_ERROR {
            summary.status.red().to_string()
        } else if summary.status.eq_ignore_ascii_case("down") {
            summary.status.yellow().to_string()
        } else {
            summary.status.clone()
        };
        let incidents = match &summary.active_incidents {
            Some(map) => map.keys().cloned().collect::<Vec<_>>().join(", "),
            None => "-".to_string(),
        };
        table.add_row(row![summary.tld, status, incidents]);
    }
    table.printstd();
    Ok(())
}

/// Collects rolling-week downtime for every TLD and service and prints
/// it.
pub async fn run_downtime(ctx: &ServiceContext, json: bool) -> Result<()> {
    let aggregate = ctx
        .orchestrator
        .collect_downtime(ctx.batch_deadline())
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&aggregate)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["TLD", "SERVICE", "DOWNTIME (MIN)", "MONITORING"]);
    for (tld, services) in &aggregate {
        for (service, downtime) in services {
            let monitoring = if downtime.disabled_monitoring {
                "disabled".dimmed().to_string()
            } else {
                "active".to_string()
            };
            table.add_row(row![tld, service, downtime.downtime, monitoring]);
        }
    }
    table.printstd();
    Ok(())
}
