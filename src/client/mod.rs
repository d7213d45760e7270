//! MoSAPI client stack
//!
//! Layered bottom-up: [`transport`] makes raw mTLS HTTP calls, [`session`]
//! shares cookies across replicas, [`auth`] runs the login/retry protocol,
//! and [`monitoring`] / [`metrica`] expose the typed resource families the
//! orchestrator and ingester consume.

pub mod auth;
pub mod metrica;
pub mod monitoring;
pub mod session;
pub mod transport;
pub mod types;

pub use auth::{CredentialSource, EntityType, MosapiClient, SecretCredentials};
pub use metrica::{DomainMetricaClient, MetricaApi};
pub use monitoring::{MonitoringApi, ServiceMonitoringClient};
pub use session::{InMemorySessionCache, SecretSessionCache, SessionCache};
pub use transport::{HttpResponse, Transport};
