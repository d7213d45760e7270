//! Mosmon - MoSAPI monitoring client library
//!
//! This library implements the client side of ICANN's MoSAPI: a
//! TLS-client-authenticated transport, a cluster-shared session-cookie
//! cache, a request API with automatic one-shot re-login, typed resource
//! facades, a bounded fan-out orchestrator over the configured TLDs, and
//! a catch-up ingester for daily METRICA abuse reports.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `client`: transport, session cache, authenticated client and the
//!   typed resource facades
//! - `orchestrator`: bounded fan-out over TLDs × services plus the
//!   fire-and-forget metrics pipeline
//! - `ingest`: METRICA catch-up ingestion and threat-match persistence
//! - `actions`: HTTP endpoints for the host scheduler
//! - `secrets` / `mailer`: external-collaborator seams
//! - `config` / `cli` / `commands` / `error`: the usual plumbing

pub mod actions;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod ingest;
pub mod mailer;
pub mod orchestrator;
pub mod secrets;

// Re-export commonly used types
pub use client::{
    DomainMetricaClient, EntityType, MetricaApi, MonitoringApi, MosapiClient,
    ServiceMonitoringClient, SessionCache, Transport,
};
pub use config::Config;
pub use error::{MosmonError, Result};
pub use ingest::Ingester;
pub use orchestrator::Orchestrator;
