//! Domain Ports - Core trait definitions for the provider
//!
//! These traits define the boundary between the reconcilers and the cluster.
//! Adapters implement them over the Aerospike client or in memory.

use crate::domain::model::{Privilege, RoleInfo, UserInfo};
use crate::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

/// Parsed info response: command name to value, in response order
pub type InfoResponse = IndexMap<String, String>;

// =============================================================================
// Cluster Client Port
// =============================================================================

/// Port for administrative access to a cluster
///
/// Every call is a fresh round trip; implementations do not cache.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Seed address used for diagnostics
    fn endpoint(&self) -> String;

    /// Issue one info command to any reachable node and return the raw
    /// response lines. Error markers in the values are not interpreted here.
    async fn request_info(&self, command: &str) -> Result<InfoResponse>;

    /// Whether the namespace exists, decided by a dummy-key read whose
    /// result code is `INVALID_NAMESPACE` only when it does not.
    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    async fn create_user(&self, user: &str, password: &str, roles: &[String]) -> Result<()>;

    async fn drop_user(&self, user: &str) -> Result<()>;

    async fn change_password(&self, user: &str, password: &str) -> Result<()>;

    async fn grant_roles(&self, user: &str, roles: &[String]) -> Result<()>;

    async fn revoke_roles(&self, user: &str, roles: &[String]) -> Result<()>;

    async fn query_user(&self, user: &str) -> Result<UserInfo>;

    // -------------------------------------------------------------------------
    // Roles
    // -------------------------------------------------------------------------

    async fn create_role(&self, role: &RoleInfo) -> Result<()>;

    async fn drop_role(&self, role: &str) -> Result<()>;

    async fn grant_privileges(&self, role: &str, privileges: &[Privilege]) -> Result<()>;

    async fn revoke_privileges(&self, role: &str, privileges: &[Privilege]) -> Result<()>;

    /// Replace the whitelist; an empty list removes it
    async fn set_whitelist(&self, role: &str, whitelist: &[String]) -> Result<()>;

    async fn set_quotas(&self, role: &str, read_quota: u32, write_quota: u32) -> Result<()>;

    async fn query_role(&self, role: &str) -> Result<RoleInfo>;
}

pub type ClusterClientRef = Arc<dyn ClusterClient>;
