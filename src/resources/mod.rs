//! Resource reconcilers
//!
//! One module per managed resource type. Each reconciler receives the shared
//! cluster handle at construction time.

pub mod commands;
pub mod config_namespace;
pub mod config_service;
pub mod namespace_config;
pub mod role;
pub mod user;

pub use config_namespace::{ConfigNamespaceModel, ConfigNamespaceResource, XdrConfig};
pub use config_service::{ConfigServiceModel, ConfigServiceResource};
pub use namespace_config::{NamespaceConfigModel, NamespaceConfigResource};
pub use role::{RoleModel, RoleResource};
pub use user::{UserModel, UserResource};
