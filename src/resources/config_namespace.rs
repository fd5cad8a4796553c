//! `aerospike_config_namespace` reconciler
//!
//! Applies per-set default TTLs and XDR shipping settings to a namespace.
//! The commands are issued once at create time; there is no read-back and no
//! inverse on delete.

use crate::domain::ports::ClusterClientRef;
use crate::error::Result;
use crate::provider::{Diagnostic, Diagnostics, Resource};
use crate::resources::commands::{self, CommandLog, INFO_COMMANDS};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, trace, warn};

/// Aerospike namespace configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigNamespaceModel {
    /// Namespace name
    pub namespace: String,

    /// Default TTL for sets in the namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_set_ttl: Option<BTreeMap<String, String>>,

    /// XDR shipping configuration of the namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xdr_config: Option<XdrConfig>,

    /// An output only list of asinfo compatible commands that were run
    #[serde(default)]
    pub info_commands: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct XdrConfig {
    /// The XDR datacenter to use for the namespace
    pub datacenter: String,

    /// If true, only the sets in include_sets are shipped. If false, all sets
    /// except those in exclude_sets are shipped
    pub ship_only_specified_sets: bool,

    /// Sets to include in XDR. Don't use along with exclude_sets
    #[serde(default)]
    pub include_sets: Vec<String>,

    /// Sets to exclude from XDR. Don't use along with include_sets
    #[serde(default)]
    pub exclude_sets: Vec<String>,
}

impl XdrConfig {
    fn validate(&self, diags: &mut Diagnostics) {
        commands::check_token(diags, "xdr_config.datacenter", &self.datacenter);
        for set in self.include_sets.iter().chain(&self.exclude_sets) {
            commands::check_token(diags, "xdr_config", set);
        }

        let detail = if !self.include_sets.is_empty() && !self.exclude_sets.is_empty() {
            Some("include_sets and exclude_sets cannot both be set")
        } else if !self.include_sets.is_empty() && !self.ship_only_specified_sets {
            Some("include_sets requires ship_only_specified_sets = true")
        } else if !self.exclude_sets.is_empty() && self.ship_only_specified_sets {
            Some("exclude_sets requires ship_only_specified_sets = false")
        } else {
            None
        };
        if let Some(detail) = detail {
            diags.push(Diagnostic::error("Invalid resource configuration", detail).at("xdr_config"));
        }
    }

    /// Sets the shipping mode applies to
    fn sets(&self) -> &[String] {
        if self.ship_only_specified_sets {
            &self.include_sets
        } else {
            &self.exclude_sets
        }
    }
}

pub struct ConfigNamespaceResource {
    client: ClusterClientRef,
}

impl ConfigNamespaceResource {
    pub fn new(client: ClusterClientRef) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resource for ConfigNamespaceResource {
    type Model = ConfigNamespaceModel;

    fn type_suffix(&self) -> &'static str {
        "config_namespace"
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

    fn validate(&self, model: &ConfigNamespaceModel) -> Diagnostics {
        let mut diags = Diagnostics::new();
        commands::check_token(&mut diags, "namespace", &model.namespace);
        if let Some(ttls) = &model.default_set_ttl {
            commands::check_ttls(&mut diags, ttls);
        }
        if let Some(xdr) = &model.xdr_config {
            xdr.validate(&mut diags);
        }
        diags
    }

    fn plan(&self, prior: Option<&ConfigNamespaceModel>, proposed: ConfigNamespaceModel) -> ConfigNamespaceModel {
        ConfigNamespaceModel {
            info_commands: prior.map(|p| p.info_commands.clone()).unwrap_or_default(),
            ..proposed
        }
    }

    fn requires_replace(&self, prior: &ConfigNamespaceModel, planned: &ConfigNamespaceModel) -> bool {
        prior.namespace != planned.namespace
    }

    async fn create(&self, planned: ConfigNamespaceModel) -> Result<ConfigNamespaceModel> {
        let namespace = planned.namespace.as_str();
        let mut log = CommandLog::new(self.client.as_ref());

        if let Some(ttls) = &planned.default_set_ttl {
            log.default_set_ttls(namespace, ttls).await?;
        }
        if let Some(xdr) = &planned.xdr_config {
            log.xdr_sets(&xdr.datacenter, namespace, xdr.ship_only_specified_sets, xdr.sets())
                .await?;
        }

        let info_commands = log.into_commands();
        info!(%namespace, commands = info_commands.len(), "applied namespace config");
        Ok(ConfigNamespaceModel {
            info_commands,
            ..planned
        })
    }

    async fn read(&self, state: ConfigNamespaceModel) -> Result<Option<ConfigNamespaceModel>> {
        trace!(namespace = %state.namespace, "read namespace config");
        Ok(Some(state))
    }

    async fn update(
        &self,
        prior: ConfigNamespaceModel,
        planned: ConfigNamespaceModel,
    ) -> Result<ConfigNamespaceModel> {
        warn!(
            namespace = %planned.namespace,
            "namespace config changes are not applied to the cluster until the resource is recreated"
        );
        Ok(ConfigNamespaceModel {
            info_commands: prior.info_commands,
            ..planned
        })
    }

    async fn delete(&self, state: ConfigNamespaceModel) -> Result<()> {
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
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn ttls(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn setup(cluster: MemoryCluster) -> (Arc<MemoryCluster>, ConfigNamespaceResource) {
        let cluster = Arc::new(cluster);
        let resource = ConfigNamespaceResource::new(cluster.clone());
        (cluster, resource)
    }

    #[tokio::test]
    async fn test_create_issues_ttl_and_xdr_commands() {
        let (cluster, resource) = setup(MemoryCluster::new());
        let planned = ConfigNamespaceModel {
            namespace: "test".into(),
            default_set_ttl: ttls(&[("set1", "3600"), ("set2", "60")]),
            xdr_config: Some(XdrConfig {
                datacenter: "dc2".into(),
                ship_only_specified_sets: true,
                include_sets: vec!["set1".into(), "set2".into()],
                exclude_sets: vec![],
            }),
            info_commands: vec![],
        };

        let created = resource.create(planned).await.unwrap();
        let expected = vec![
            "set-config:context=namespace;id=test;set=set1;default-ttl=3600",
            "set-config:context=namespace;id=test;set=set2;default-ttl=60",
            "set-config:context=xdr;dc=dc2;namespace=test;ship-only-specified-sets=true",
            "set-config:context=xdr;dc=dc2;namespace=test;ship-set=set1,set2",
        ];
        assert_eq!(created.info_commands, expected);
        assert_eq!(cluster.applied_config(), expected);
    }

    #[tokio::test]
    async fn test_exclude_sets_use_ignore_set() {
        let (_cluster, resource) = setup(MemoryCluster::new());
        let planned = ConfigNamespaceModel {
            namespace: "test".into(),
            xdr_config: Some(XdrConfig {
                datacenter: "dc2".into(),
                ship_only_specified_sets: false,
                include_sets: vec![],
                exclude_sets: vec!["tmp".into()],
            }),
            ..Default::default()
        };
        let created = resource.create(planned).await.unwrap();
        assert_eq!(
            created.info_commands.last().map(String::as_str),
            Some("set-config:context=xdr;dc=dc2;namespace=test;ignore-set=tmp")
        );
    }

    #[tokio::test]
    async fn test_ttl_requires_server_7() {
        let (cluster, resource) = setup(MemoryCluster::new().with_build("6.4.0.2"));
        let planned = ConfigNamespaceModel {
            namespace: "test".into(),
            default_set_ttl: ttls(&[("set1", "3600")]),
            ..Default::default()
        };
        let err = resource.create(planned).await.unwrap_err();
        assert_matches!(err, Error::UnsupportedServerVersion { required: 7, .. });
        assert!(cluster.applied_config().is_empty());
    }

    #[tokio::test]
    async fn test_info_error_surfaces_command() {
        let (_cluster, resource) = setup(MemoryCluster::new());
        let planned = ConfigNamespaceModel {
            namespace: "nosuchns".into(),
            default_set_ttl: ttls(&[("set1", "3600")]),
            ..Default::default()
        };
        let err = resource.create(planned).await.unwrap_err();
        let diag = err.diagnostic();
        assert_eq!(diag.summary, "Error in request");
        assert!(diag.detail.contains("id=nosuchns"));
    }

    #[tokio::test]
    async fn test_update_and_delete_issue_nothing() {
        let (cluster, resource) = setup(MemoryCluster::new());
        let prior = resource
            .create(ConfigNamespaceModel {
                namespace: "test".into(),
                default_set_ttl: ttls(&[("set1", "3600")]),
                ..Default::default()
            })
            .await
            .unwrap();
        cluster.clear_calls();

        let planned = ConfigNamespaceModel {
            default_set_ttl: ttls(&[("set1", "7200")]),
            ..prior.clone()
        };
        let updated = resource.update(prior.clone(), planned).await.unwrap();
        assert_eq!(updated.info_commands, prior.info_commands);
        resource.delete(updated).await.unwrap();
        assert!(cluster.calls().is_empty());
    }

    #[test]
    fn test_plan_keeps_prior_commands() {
        let (_cluster, resource) = setup(MemoryCluster::new());
        let prior = ConfigNamespaceModel {
            namespace: "test".into(),
            info_commands: vec!["cmd".into()],
            ..Default::default()
        };
        let proposed = ConfigNamespaceModel {
            namespace: "test".into(),
            ..Default::default()
        };
        assert_eq!(resource.plan(Some(&prior), proposed.clone()), prior);
        assert!(resource.plan(None, proposed).info_commands.is_empty());
    }

    #[test]
    fn test_xdr_validation() {
        let (_cluster, resource) = setup(MemoryCluster::new());
        let both = ConfigNamespaceModel {
            namespace: "test".into(),
            xdr_config: Some(XdrConfig {
                datacenter: "dc".into(),
                ship_only_specified_sets: true,
                include_sets: vec!["a".into()],
                exclude_sets: vec!["b".into()],
            }),
            ..Default::default()
        };
        assert!(resource.validate(&both).has_error());

        let mismatched = ConfigNamespaceModel {
            xdr_config: Some(XdrConfig {
                datacenter: "dc".into(),
                ship_only_specified_sets: false,
                include_sets: vec!["a".into()],
                exclude_sets: vec![],
            }),
            ..both.clone()
        };
        assert!(resource.validate(&mismatched).has_error());
    }
}
