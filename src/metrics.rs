//! Provider metrics
//!
//! Counts the admin and info commands issued against the cluster and the
//! ones that failed. Exposed in Prometheus text format by the HTTP transport.

use crate::domain::model::{Privilege, RoleInfo, UserInfo};
use crate::domain::ports::{ClusterClient, ClusterClientRef, InfoResponse};
use crate::error::{Error, Result};
use async_trait::async_trait;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metric set owned by one provider instance
pub struct ProviderMetrics {
    registry: Registry,
    commands: IntCounterVec,
    failures: IntCounterVec,
}

impl ProviderMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let commands = IntCounterVec::new(
            Opts::new(
                "aerospike_provider_commands_total",
                "Commands issued against the cluster",
            ),
            &["protocol", "command"],
        )
        .expect("static metric definition");
        let failures = IntCounterVec::new(
            Opts::new(
                "aerospike_provider_command_failures_total",
                "Commands that returned an error",
            ),
            &["protocol", "command"],
        )
        .expect("static metric definition");

        let _ = registry.register(Box::new(commands.clone()));
        let _ = registry.register(Box::new(failures.clone()));

        Self {
            registry,
            commands,
            failures,
        }
    }

    fn record(&self, protocol: &str, command: &str, failed: bool) {
        self.commands.with_label_values(&[protocol, command]).inc();
        if failed {
            self.failures.with_label_values(&[protocol, command]).inc();
        }
    }

    /// Number of commands issued for a protocol/command pair
    pub fn command_count(&self, protocol: &str, command: &str) -> u64 {
        self.commands.with_label_values(&[protocol, command]).get()
    }

    pub fn failure_count(&self, protocol: &str, command: &str) -> u64 {
        self.failures.with_label_values(&[protocol, command]).get()
    }

    /// Prometheus text exposition
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("metrics encoding failed: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Info command label: the verb before the first `:`
fn info_verb(command: &str) -> &str {
    command.split(':').next().unwrap_or(command)
}

// =============================================================================
// Metered Client
// =============================================================================

/// Cluster client decorator recording every call in [`ProviderMetrics`]
pub struct MeteredClient {
    inner: ClusterClientRef,
    metrics: Arc<ProviderMetrics>,
}

impl MeteredClient {
    pub fn new(inner: ClusterClientRef, metrics: Arc<ProviderMetrics>) -> Self {
        Self { inner, metrics }
    }

    fn admin<T>(&self, command: &str, result: Result<T>) -> Result<T> {
        self.metrics.record("admin", command, result.is_err());
        result
    }
}

#[async_trait]
impl ClusterClient for MeteredClient {
    fn endpoint(&self) -> String {
        self.inner.endpoint()
    }

    async fn request_info(&self, command: &str) -> Result<InfoResponse> {
        let result = self.inner.request_info(command).await;
        let failed = match &result {
            Ok(response) => crate::domain::info::check_response(command, response).is_err(),
            Err(_) => true,
        };
        self.metrics.record("info", info_verb(command), failed);
        result
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let result = self.inner.namespace_exists(namespace).await;
        self.metrics.record("message", "read", result.is_err());
        result
    }

    async fn create_user(&self, user: &str, password: &str, roles: &[String]) -> Result<()> {
        let result = self.inner.create_user(user, password, roles).await;
        self.admin("create_user", result)
    }

    async fn drop_user(&self, user: &str) -> Result<()> {
        let result = self.inner.drop_user(user).await;
        self.admin("drop_user", result)
    }

    async fn change_password(&self, user: &str, password: &str) -> Result<()> {
        let result = self.inner.change_password(user, password).await;
        self.admin("change_password", result)
    }

    async fn grant_roles(&self, user: &str, roles: &[String]) -> Result<()> {
        let result = self.inner.grant_roles(user, roles).await;
        self.admin("grant_roles", result)
    }

    async fn revoke_roles(&self, user: &str, roles: &[String]) -> Result<()> {
        let result = self.inner.revoke_roles(user, roles).await;
        self.admin("revoke_roles", result)
    }

    async fn query_user(&self, user: &str) -> Result<UserInfo> {
        let result = self.inner.query_user(user).await;
        self.admin("query_user", result)
    }

    async fn create_role(&self, role: &RoleInfo) -> Result<()> {
        let result = self.inner.create_role(role).await;
        self.admin("create_role", result)
    }

    async fn drop_role(&self, role: &str) -> Result<()> {
        let result = self.inner.drop_role(role).await;
        self.admin("drop_role", result)
    }

    async fn grant_privileges(&self, role: &str, privileges: &[Privilege]) -> Result<()> {
        let result = self.inner.grant_privileges(role, privileges).await;
        self.admin("grant_privileges", result)
    }

    async fn revoke_privileges(&self, role: &str, privileges: &[Privilege]) -> Result<()> {
        let result = self.inner.revoke_privileges(role, privileges).await;
        self.admin("revoke_privileges", result)
    }

    async fn set_whitelist(&self, role: &str, whitelist: &[String]) -> Result<()> {
        let result = self.inner.set_whitelist(role, whitelist).await;
        self.admin("set_whitelist", result)
    }

    async fn set_quotas(&self, role: &str, read_quota: u32, write_quota: u32) -> Result<()> {
        let result = self.inner.set_quotas(role, read_quota, write_quota).await;
        self.admin("set_quotas", result)
    }

    async fn query_role(&self, role: &str) -> Result<RoleInfo> {
        let result = self.inner.query_role(role).await;
        self.admin("query_role", result)
    }
}
