//! `ingest` subcommand: METRICA catch-up

use anyhow::anyhow;
use colored::Colorize;

use crate::commands::context::ServiceContext;
use crate::error::Result;

/// Runs METRICA catch-up for one TLD or the whole configured set.
///
/// Per-TLD failures are reported but do not stop the run; the command
/// exits non-zero when any TLD failed.
pub async fn run_ingest(ctx: &ServiceContext, tld: Option<String>) -> Result<()> {
    let tlds = match tld {
        Some(tld) => vec![tld],
        None => ctx.config.tlds.clone(),
    };
    if tlds.is_empty() {
        return Err(anyhow!("no TLDs configured (mosapiTlds) and none given"));
    }

    let outcomes = ctx.ingester.run_all(&tlds).await;

    let mut failures = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(reports) => {
                println!(
                    "{} {}: {} report(s) ingested",
                    "ok:".green().bold(),
                    outcome.tld,
                    reports
                );
            }
            Err(message) => {
                failures += 1;
                eprintln!("{} {}: {}", "error:".red().bold(), outcome.tld, message);
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!(
            "METRICA ingestion failed for {} of {} TLD(s)",
            failures,
            outcomes.len()
        ));
    }
    Ok(())
}
