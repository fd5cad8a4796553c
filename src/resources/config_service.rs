//! `aerospike_config_service` reconciler

use crate::domain::ports::ClusterClientRef;
use crate::error::Result;
use crate::provider::{Diagnostic, Diagnostics, Resource};
use crate::resources::commands::{self, CommandLog, INFO_COMMANDS};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Aerospike service configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigServiceModel {
    /// The number of migration threads to use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migartion_threads: Option<u32>,

    /// An output only list of asinfo compatible commands that were run
    #[serde(default)]
    pub info_commands: Vec<String>,
}

pub struct ConfigServiceResource {
    client: ClusterClientRef,
}

impl ConfigServiceResource {
    pub fn new(client: ClusterClientRef) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resource for ConfigServiceResource {
    type Model = ConfigServiceModel;

    fn type_suffix(&self) -> &'static str {
        "config_service"
    }

    fn description(&self) -> &'static str {
        "Aerospike Service Configuration"
    }

    fn identity_attribute(&self) -> Option<&'static str> {
        None
    }

    fn computed_attributes(&self) -> &'static [&'static str] {
        &[INFO_COMMANDS]
    }

    fn validate(&self, model: &ConfigServiceModel) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if model.migartion_threads.is_none() {
            diags.push(Diagnostic::warning(
                "Empty service configuration",
                "no service settings are declared; nothing will be applied",
            ));
        }
        diags
    }

    fn plan(&self, prior: Option<&ConfigServiceModel>, proposed: ConfigServiceModel) -> ConfigServiceModel {
        ConfigServiceModel {
            info_commands: prior.map(|p| p.info_commands.clone()).unwrap_or_default(),
            ..proposed
        }
    }

    fn requires_replace(&self, _prior: &ConfigServiceModel, _planned: &ConfigServiceModel) -> bool {
        false
    }

    async fn create(&self, planned: ConfigServiceModel) -> Result<ConfigServiceModel> {
        let mut log = CommandLog::new(self.client.as_ref());
        if let Some(threads) = planned.migartion_threads {
            log.send(commands::migrate_threads_command(threads)).await?;
        }

        let info_commands = log.into_commands();
        info!(commands = info_commands.len(), "applied service config");
        Ok(ConfigServiceModel {
            info_commands,
            ..planned
        })
    }

    async fn read(&self, state: ConfigServiceModel) -> Result<Option<ConfigServiceModel>> {
        Ok(Some(state))
    }

    async fn update(
        &self,
        prior: ConfigServiceModel,
        planned: ConfigServiceModel,
    ) -> Result<ConfigServiceModel> {
        warn!("service config changes are not applied to the cluster until the resource is recreated");
        Ok(ConfigServiceModel {
            info_commands: prior.info_commands,
            ..planned
        })
    }

    async fn delete(&self, _state: ConfigServiceModel) -> Result<()> {
        warn!("removed service config from state; the cluster keeps the applied settings");
        Ok(())
    }
}
