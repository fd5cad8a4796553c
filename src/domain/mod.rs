//! Domain layer - Core administrative model and port definitions
//!
//! This module defines the cluster port that adapters implement, the
//! administrative object model, and the small pieces of decision logic
//! (set diffs, info error detection, capability gating) the reconcilers use.

pub mod capability;
pub mod diff;
pub mod info;
pub mod model;
pub mod ports;

pub use capability::{require_capability, supports_capability, Capability};
pub use diff::SetDiff;
pub use info::send_info_command;
pub use model::*;
pub use ports::*;
