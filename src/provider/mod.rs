//! Provider - configuration, resource registry and the resource contract
//!
//! The provider owns the one shared cluster handle and hands it to every
//! reconciler at construction time.

pub mod diagnostics;
pub mod resource;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use resource::{
    Handler, HandlerResult, PlanAction, PlannedChange, Resource, ResourceHandler, ResourceSchema,
};

use crate::config::ProviderConfig;
use crate::controlplane::backends::AerospikeClient;
use crate::domain::ports::{ClusterClient, ClusterClientRef};
use crate::error::{Error, Result};
use crate::metrics::{MeteredClient, ProviderMetrics};
use crate::resources::{
    ConfigNamespaceResource, ConfigServiceResource, NamespaceConfigResource, RoleResource,
    UserResource,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Type name prefix of every resource
pub const PROVIDER_TYPE_NAME: &str = "aerospike";

/// A configured provider
pub struct Provider {
    client: ClusterClientRef,
    resources: BTreeMap<String, Arc<dyn ResourceHandler>>,
    metrics: Arc<ProviderMetrics>,
}

impl Provider {
    /// Resolve the configuration and open the shared cluster connection
    pub async fn configure(config: &ProviderConfig) -> Result<Self> {
        let settings = config.resolve()?;
        let client = AerospikeClient::connect(settings).await?;
        info!(endpoint = %client.endpoint(), "provider configured");
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Build a provider over an already open client
    pub fn with_client(client: ClusterClientRef) -> Self {
        let metrics = Arc::new(ProviderMetrics::new());
        let client: ClusterClientRef = Arc::new(MeteredClient::new(client, metrics.clone()));

        let handlers: Vec<Arc<dyn ResourceHandler>> = vec![
            Arc::new(Handler::new(UserResource::new(client.clone()))),
            Arc::new(Handler::new(RoleResource::new(client.clone()))),
            Arc::new(Handler::new(ConfigNamespaceResource::new(client.clone()))),
            Arc::new(Handler::new(NamespaceConfigResource::new(client.clone()))),
            Arc::new(Handler::new(ConfigServiceResource::new(client.clone()))),
        ];

        let resources = handlers
            .into_iter()
            .map(|handler| (handler.type_name(), handler))
            .collect();

        Self {
            client,
            resources,
            metrics,
        }
    }

    /// Handler for a full type name such as `aerospike_user`
    pub fn resource(&self, type_name: &str) -> Result<Arc<dyn ResourceHandler>> {
        self.resources
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::UnknownResourceType(type_name.to_string()))
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn schemas(&self) -> Vec<ResourceSchema> {
        self.resources.values().map(|h| h.schema()).collect()
    }

    pub fn client(&self) -> &ClusterClientRef {
        &self.client
    }

    pub fn metrics(&self) -> &Arc<ProviderMetrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::MemoryCluster;

    #[test]
    fn test_registered_resource_types() {
        let provider = Provider::with_client(Arc::new(MemoryCluster::new()));
        let types: Vec<&str> = provider.resource_types().collect();
        assert_eq!(
            types,
            vec![
                "aerospike_config_namespace",
                "aerospike_config_service",
                "aerospike_namespace_config",
                "aerospike_role",
                "aerospike_user",
            ]
        );
        assert!(matches!(
            provider.resource("aerospike_index"),
            Err(Error::UnknownResourceType(_))
        ));
    }

    #[test]
    fn test_schema_marks_password_sensitive() {
        let provider = Provider::with_client(Arc::new(MemoryCluster::new()));
        let user = provider.resource("aerospike_user").unwrap().schema();
        assert_eq!(user.identity_attribute.as_deref(), Some("user_name"));
        assert_eq!(user.sensitive_attributes, vec!["password".to_string()]);
    }
}
