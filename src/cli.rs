//! Command-line interface definition for Mosmon
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for session management, state polling, METRICA
//! ingestion, and the action server.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;

/// Mosmon - MoSAPI monitoring client
///
/// Polls ICANN's MoSAPI for per-TLD monitoring state and ingests daily
/// METRICA abuse reports.
#[derive(Parser, Debug, Clone)]
#[command(name = "mosmon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml", env = "MOSMON_CONFIG")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Mosmon
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Open a MoSAPI session for a TLD (login)
    Start {
        /// TLD label (no leading dot)
        #[arg(long)]
        tld: String,
    },

    /// End the MoSAPI session for a TLD (logout)
    Stop {
        /// TLD label (no leading dot)
        #[arg(long)]
        tld: String,
    },

    /// Poll the monitoring state of every configured TLD
    Poll {
        /// Print the raw JSON summaries instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Collect rolling-week downtime for every TLD and service
    Downtime {
        /// Print the raw JSON aggregate instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Catch up on METRICA abuse reports
    Ingest {
        /// Restrict the run to one TLD
        #[arg(long)]
        tld: Option<String>,
    },

    /// Serve the HTTP actions for the host scheduler
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8072")]
        listen: SocketAddr,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
