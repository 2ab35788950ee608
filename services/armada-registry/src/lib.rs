//! # Armada Registry
//!
//! A standalone service that agents register with at startup. It polls each
//! registrant's `/health` endpoint in the background, marks agents unhealthy
//! after repeated failures and drops them after more.
//!
//! The library side exposes the registry state ([`AgentRegistry`]), the HTTP
//! router, a lifecycle wrapper ([`RegistryService`]) and a typed client
//! ([`RegistryClient`]) so that tests and other tools can embed or talk to a
//! registry without going through the binary.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod service;

pub use api::router;
pub use client::{RegistryClient, RegistryClientError};
pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use registry::{
    AgentRegistration, AgentRegistry, HealthPolicy, RegisteredAgent, RegistryStats, SearchQuery,
    SweepSummary,
};
pub use service::{run_health_checks, RegistryService};
