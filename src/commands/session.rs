//! `start` and `stop` subcommands: explicit session management

use colored::Colorize;

use crate::commands::context::ServiceContext;
use crate::error::Result;

/// Opens a MoSAPI session for one TLD.
pub async fn run_start(ctx: &ServiceContext, tld: &str) -> Result<()> {
    ctx.client.login(tld).await?;
    println!("{} session opened for {}", "ok:".green().bold(), tld);
    Ok(())
}

/// Ends the MoSAPI session for one TLD.
pub async fn run_stop(ctx: &ServiceContext, tld: &str) -> Result<()> {
    ctx.client.logout(tld).await?;
    println!("{} session closed for {}", "ok:".green().bold(), tld);
    Ok(())
}
