//! Mosmon - MoSAPI monitoring client
//!
//! Main entry point for the Mosmon command-line interface.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mosmon::cli::{Cli, Commands};
use mosmon::commands;
use mosmon::commands::context::ServiceContext;
use mosmon::config::Config;
use mosmon::orchestrator::metrics::init_metrics_exporter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);
    init_metrics_exporter();

    let config = Config::load(&cli.config)?;
    config.validate()?;

    let ctx = ServiceContext::build(config)?;

    match cli.command {
        Commands::Start { tld } => {
            tracing::info!("opening MoSAPI session for {}", tld);
            commands::session::run_start(&ctx, &tld).await
        }
        Commands::Stop { tld } => {
            tracing::info!("closing MoSAPI session for {}", tld);
            commands::session::run_stop(&ctx, &tld).await
        }
        Commands::Poll { json } => {
            tracing::info!("polling monitoring state");
            commands::poll::run_poll(&ctx, json).await
        }
        Commands::Downtime { json } => {
            tracing::info!("collecting downtime");
            commands::poll::run_downtime(&ctx, json).await
        }
        Commands::Ingest { tld } => {
            tracing::info!("running METRICA catch-up");
            commands::ingest::run_ingest(&ctx, tld).await
        }
        Commands::Serve { listen } => {
            tracing::info!("starting action server on {}", listen);
            commands::serve::run_serve(ctx, listen).await
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "mosmon=debug" } else { "mosmon=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
