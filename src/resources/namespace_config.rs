//! `aerospike_namespace_config` reconciler
//!
//! Older flat form of the namespace configuration resource, kept for
//! existing declarations. It also carries the service-wide migration thread
//! count under its historical (misspelled) attribute name.

use crate::domain::ports::ClusterClientRef;
use crate::error::Result;
use crate::provider::{Diagnostic, Diagnostics, Resource};
use crate::resources::commands::{self, CommandLog, INFO_COMMANDS};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, trace, warn};

/// Aerospike namespace configuration (flat form)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NamespaceConfigModel {
    /// Namespace name
    pub namespace: String,

    /// Default TTL for sets in the namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_set_ttl: Option<BTreeMap<String, String>>,

    /// The XDR datacenter to use for the namespace. Must be specified with
    /// xdr_include or xdr_exclude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xdr_datacenter: Option<String>,

    /// Sets to include in XDR. Don't use along with xdr_exclude
    #[serde(default)]
    pub xdr_include: Vec<String>,

    /// Sets to exclude from XDR. Don't use along with xdr_include
    #[serde(default)]
    pub xdr_exclude: Vec<String>,

    /// The number of migration threads to use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migartion_threads: Option<u32>,

    /// An output only list of asinfo compatible commands that were run
    #[serde(default)]
    pub info_commands: Vec<String>,
}

pub struct NamespaceConfigResource {
    client: ClusterClientRef,
}

impl NamespaceConfigResource {
    pub fn new(client: ClusterClientRef) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resource for NamespaceConfigResource {
    type Model = NamespaceConfigModel;

    fn type_suffix(&self) -> &'static str {
        "namespace_config"
    }

    fn description(&self) -> &'static str {
        "Aerospike Namespace Configuration"
    }

    fn identity_attribute(&self) -> Option<&'static str> {
        Some("namespace")
    }

    fn computed_attributes(&self) -> &'static [&'static str] {
        &[INFO_COMMANDS]
    }

    fn validate(&self, model: &NamespaceConfigModel) -> Diagnostics {
        let mut diags = Diagnostics::new();
        commands::check_token(&mut diags, "namespace", &model.namespace);
        if let Some(ttls) = &model.default_set_ttl {
            commands::check_ttls(&mut diags, ttls);
        }
        for set in &model.xdr_include {
            commands::check_token(&mut diags, "xdr_include", set);
        }
        for set in &model.xdr_exclude {
            commands::check_token(&mut diags, "xdr_exclude", set);
        }

        let has_sets = !model.xdr_include.is_empty() || !model.xdr_exclude.is_empty();
        if !model.xdr_include.is_empty() && !model.xdr_exclude.is_empty() {
            diags.push(
                Diagnostic::error(
                    "Invalid resource configuration",
                    "xdr_include and xdr_exclude cannot both be set",
                )
                .at("xdr_include"),
            );
        }
        match &model.xdr_datacenter {
            Some(dc) => {
                commands::check_token(&mut diags, "xdr_datacenter", dc);
                if !has_sets {
                    diags.push(
                        Diagnostic::error(
                            "Invalid resource configuration",
                            "xdr_datacenter must be specified with xdr_include or xdr_exclude",
                        )
                        .at("xdr_datacenter"),
                    );
                }
            }
            None if has_sets => diags.push(
                Diagnostic::error(
                    "Invalid resource configuration",
                    "xdr_include and xdr_exclude require xdr_datacenter",
                )
                .at("xdr_datacenter"),
            ),
            None => {}
        }
        diags
    }

    fn plan(&self, prior: Option<&NamespaceConfigModel>, proposed: NamespaceConfigModel) -> NamespaceConfigModel {
        NamespaceConfigModel {
            info_commands: prior.map(|p| p.info_commands.clone()).unwrap_or_default(),
            ..proposed
        }
    }

    fn requires_replace(&self, prior: &NamespaceConfigModel, planned: &NamespaceConfigModel) -> bool {
        prior.namespace != planned.namespace
    }

    async fn create(&self, planned: NamespaceConfigModel) -> Result<NamespaceConfigModel> {
        let namespace = planned.namespace.as_str();
        let mut log = CommandLog::new(self.client.as_ref());

        if let Some(ttls) = &planned.default_set_ttl {
            log.default_set_ttls(namespace, ttls).await?;
        }

        if let Some(dc) = &planned.xdr_datacenter {
            if !planned.xdr_exclude.is_empty() {
                log.xdr_sets(dc, namespace, false, &planned.xdr_exclude).await?;
            }
            if !planned.xdr_include.is_empty() {
                log.xdr_sets(dc, namespace, true, &planned.xdr_include).await?;
            }
        }

        if let Some(threads) = planned.migartion_threads {
            log.send(commands::migrate_threads_command(threads)).await?;
        }

        let info_commands = log.into_commands();
        info!(%namespace, commands = info_commands.len(), "applied namespace config");
        Ok(NamespaceConfigModel {
            info_commands,
            ..planned
        })
    }

    async fn read(&self, state: NamespaceConfigModel) -> Result<Option<NamespaceConfigModel>> {
        trace!(namespace = %state.namespace, "read namespace config");
        Ok(Some(state))
    }

    async fn update(
        &self,
        prior: NamespaceConfigModel,
        planned: NamespaceConfigModel,
    ) -> Result<NamespaceConfigModel> {
        warn!(
            namespace = %planned.namespace,
            "namespace config changes are not applied to the cluster until the resource is recreated"
        );
        Ok(NamespaceConfigModel {
            info_commands: prior.info_commands,
            ..planned
        })
    }

    async fn delete(&self, state: NamespaceConfigModel) -> Result<()> {
        warn!(
            namespace = %state.namespace,
            "removed namespace config from state; the cluster keeps the applied settings"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::MemoryCluster;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryCluster>, NamespaceConfigResource) {
        let cluster = Arc::new(MemoryCluster::new());
        let resource = NamespaceConfigResource::new(cluster.clone());
        (cluster, resource)
    }

    #[tokio::test]
    async fn test_command_order() {
        let (cluster, resource) = setup();
        let planned = NamespaceConfigModel {
            namespace: "test".into(),
            default_set_ttl: Some([("s1".to_string(), "100".to_string())].into()),
            xdr_datacenter: Some("dc1".into()),
            xdr_exclude: vec!["tmp".into(), "cache".into()],
            migartion_threads: Some(2),
            ..Default::default()
        };
        let created = resource.create(planned).await.unwrap();
        assert_eq!(
            created.info_commands,
            vec![
                "set-config:context=namespace;id=test;set=s1;default-ttl=100",
                "set-config:context=xdr;dc=dc1;namespace=test;ship-only-specified-sets=false",
                "set-config:context=xdr;dc=dc1;namespace=test;ignore-set=tmp,cache",
                "set-config:context=service;migrate-threads=2",
            ]
        );
        assert_eq!(cluster.applied_config(), created.info_commands);
    }

    #[tokio::test]
    async fn test_empty_declaration_issues_nothing() {
        let (cluster, resource) = setup();
        let created = resource
            .create(NamespaceConfigModel {
                namespace: "test".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(created.info_commands.is_empty());
        assert!(cluster.calls().is_empty());
    }

    #[test]
    fn test_xdr_validation() {
        let (_cluster, resource) = setup();
        let base = NamespaceConfigModel {
            namespace: "test".into(),
            ..Default::default()
        };
        assert!(resource.validate(&base).is_empty());

        let orphan_sets = NamespaceConfigModel {
            xdr_include: vec!["a".into()],
            ..base.clone()
        };
        assert!(resource.validate(&orphan_sets).has_error());

        let lonely_dc = NamespaceConfigModel {
            xdr_datacenter: Some("dc1".into()),
            ..base.clone()
        };
        assert!(resource.validate(&lonely_dc).has_error());

        let both = NamespaceConfigModel {
            xdr_datacenter: Some("dc1".into()),
            xdr_include: vec!["a".into()],
            xdr_exclude: vec!["b".into()],
            ..base
        };
        assert!(resource.validate(&both).has_error());
    }
}
