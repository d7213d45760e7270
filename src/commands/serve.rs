//! `serve` subcommand: HTTP actions for the host scheduler

use std::net::SocketAddr;
use std::sync::Arc;

use crate::actions::{self, AppState};
use crate::commands::context::ServiceContext;
use crate::error::Result;

/// Serves the action router until interrupted.
pub async fn run_serve(ctx: ServiceContext, listen: SocketAddr) -> Result<()> {
    let state = AppState {
        orchestrator: Arc::clone(&ctx.orchestrator),
        ingester: Arc::clone(&ctx.ingester),
        metrica: Arc::clone(&ctx.metrica),
        batch_timeout: ctx.config.batch_deadline(),
    };
    actions::serve(listen, state).await
}
