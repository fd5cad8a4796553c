//! Control Plane Module
//!
//! Cluster adapters, the declaration/state orchestrator and the REST API
//! that drive the resource reconcilers.

pub mod orchestrator;
pub mod api;
pub mod backends;

pub use orchestrator::*;
pub use api::*;
pub use backends::*;
