//! Aerospike Provider - declarative management of Aerospike security and
//! runtime configuration
//!
//! Exposes Aerospike users, roles and namespace/service configuration as
//! declarative resources, reconciled against a running cluster over its
//! admin and info protocols.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              CLI (plan/apply/destroy/import)     REST API (serve)         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │         Orchestrator (declaration + state file)                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │   Provider: resource registry, diagnostics, schemas, plan step           │
//! │  ┌────────┐ ┌────────┐ ┌──────────────────┐ ┌──────────────────────┐    │
//! │  │  user  │ │  role  │ │ namespace config │ │   service config     │    │
//! │  └────────┘ └────────┘ └──────────────────┘ └──────────────────────┘    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │   ClusterClient port (metered)                                           │
//! │  ┌─────────────────────────────────┐  ┌──────────────────────────────┐  │
//! │  │ Aerospike client (pooled, TLS)  │  │ In-memory cluster            │  │
//! │  └─────────────────────────────────┘  └──────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`]: Provider block, environment overrides and defaults
//! - [`controlplane`]: Cluster adapters, orchestrator and REST API
//! - [`domain`]: Core domain types, the cluster port, info and capability helpers
//! - [`provider`]: Resource contract, diagnostics and the resource registry
//! - [`resources`]: The resource reconcilers
//! - [`metrics`]: Command counters
//! - [`error`]: Error types and handling

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod resources;

// Re-export commonly used types
pub use config::{ConnectionSettings, ProviderConfig, TlsConfig};

pub use controlplane::{
    AerospikeClient, ApiServer, ApiServerConfig, ApplySummary, BackendFactory, Declaration,
    MemoryCluster, Orchestrator, Plan, StateFile,
};

pub use domain::ports::{ClusterClient, ClusterClientRef};
pub use domain::{Capability, Privilege, PrivilegeCode, ResultCode, SetDiff};

pub use error::{Error, Result};

pub use provider::{Diagnostic, Diagnostics, PlanAction, Provider, Resource, ResourceHandler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
