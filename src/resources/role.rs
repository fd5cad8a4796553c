//! `aerospike_role` reconciler

use crate::domain::diff::SetDiff;
use crate::domain::model::{Privilege, ResultCode, RoleInfo};
use crate::domain::ports::ClusterClientRef;
use crate::error::{Error, Result};
use crate::provider::{Diagnostic, Diagnostics, Resource};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use tracing::{debug, info, trace};

/// Declared and stored state of a role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RoleModel {
    /// Role name
    pub role_name: String,

    /// Privilege set, comprised from {privilege, namespace, set} objects.
    /// Namespace and set are optional
    #[serde(default)]
    pub privileges: BTreeSet<Privilege>,

    /// A list of IP addresses allowed to connect
    #[serde(default)]
    pub white_list: Vec<String>,

    /// Read quota to apply to the role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_quota: Option<u32>,

    /// Write quota to apply to the role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_quota: Option<u32>,
}

impl RoleModel {
    fn to_role_info(&self) -> RoleInfo {
        RoleInfo {
            name: self.role_name.clone(),
            privileges: self.privileges.iter().cloned().collect(),
            whitelist: self.white_list.clone(),
            read_quota: self.read_quota.unwrap_or(0),
            write_quota: self.write_quota.unwrap_or(0),
        }
    }
}

/// A zero quota is the server's "no quota"
fn quota(value: u32) -> Option<u32> {
    (value > 0).then_some(value)
}

/// An address or CIDR range
fn valid_whitelist_entry(entry: &str) -> bool {
    match entry.split_once('/') {
        Some((addr, prefix)) => {
            let max = match addr.parse::<IpAddr>() {
                Ok(IpAddr::V4(_)) => 32,
                Ok(IpAddr::V6(_)) => 128,
                Err(_) => return false,
            };
            prefix.parse::<u8>().map(|p| p <= max).unwrap_or(false)
        }
        None => entry.parse::<IpAddr>().is_ok(),
    }
}

pub struct RoleResource {
    client: ClusterClientRef,
}

impl RoleResource {
    pub fn new(client: ClusterClientRef) -> Self {
        Self { client }
    }

    /// Fail unless every namespace the privileges are scoped to exists
    async fn check_namespaces<'a, I>(&self, privileges: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Privilege>,
    {
        let mut probed = BTreeSet::new();
        for privilege in privileges {
            let Some(namespace) = privilege.namespace.as_deref() else {
                continue;
            };
            if !probed.insert(namespace) {
                continue;
            }
            if !self.client.namespace_exists(namespace).await? {
                return Err(Error::NamespaceNotFound {
                    namespace: namespace.to_string(),
                    privilege: privilege.to_string(),
                });
            }
        }
        Ok(())
    }

    fn quota_error(role: &str) -> impl Fn(Error) -> Error + '_ {
        move |err| {
            if err.matches(ResultCode::QuotasNotEnabled) {
                Error::QuotasNotEnabled {
                    role: role.to_string(),
                }
            } else {
                err
            }
        }
    }
}

#[async_trait]
impl Resource for RoleResource {
    type Model = RoleModel;

    fn type_suffix(&self) -> &'static str {
        "role"
    }

    fn description(&self) -> &'static str {
        "Aerospike role"
    }

    fn identity_attribute(&self) -> Option<&'static str> {
        Some("role_name")
    }

    fn validate(&self, model: &RoleModel) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if model.role_name.is_empty() {
            diags.push(
                Diagnostic::error("Invalid resource configuration", "role_name must not be empty")
                    .at("role_name"),
            );
        }
        for privilege in &model.privileges {
            if let Err(reason) = privilege.clone().normalized().validate() {
                diags.push(Diagnostic::error("Invalid privilege", reason).at("privileges"));
            }
        }
        for entry in &model.white_list {
            if !valid_whitelist_entry(entry) {
                diags.push(
                    Diagnostic::error(
                        "Invalid resource configuration",
                        format!("'{}' is not an IP address or CIDR range", entry),
                    )
                    .at("white_list"),
                );
            }
        }
        diags
    }

    fn plan(&self, _prior: Option<&RoleModel>, proposed: RoleModel) -> RoleModel {
        RoleModel {
            privileges: proposed
                .privileges
                .into_iter()
                .map(Privilege::normalized)
                .collect(),
            read_quota: proposed.read_quota.and_then(quota),
            write_quota: proposed.write_quota.and_then(quota),
            ..proposed
        }
    }

    fn requires_replace(&self, prior: &RoleModel, planned: &RoleModel) -> bool {
        prior.role_name != planned.role_name
    }

    async fn create(&self, planned: RoleModel) -> Result<RoleModel> {
        self.check_namespaces(&planned.privileges).await?;

        let name = planned.role_name.clone();
        self.client
            .create_role(&planned.to_role_info())
            .await
            .map_err(|err| {
                if err.matches(ResultCode::RoleAlreadyExists) {
                    Error::ResourceExists {
                        kind: "role".into(),
                        name: name.clone(),
                    }
                } else {
                    Self::quota_error(&name)(err)
                }
            })?;

        info!(role = %name, privileges = planned.privileges.len(), "created role");
        Ok(planned)
    }

    async fn read(&self, state: RoleModel) -> Result<Option<RoleModel>> {
        let role = match self.client.query_role(&state.role_name).await {
            Ok(role) => role,
            Err(e) if e.matches(ResultCode::InvalidRole) => {
                trace!(role = %state.role_name, "role does not exist");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        trace!(role = %state.role_name, ?role, "read role");

        Ok(Some(RoleModel {
            role_name: state.role_name,
            privileges: role.privileges.into_iter().map(Privilege::normalized).collect(),
            white_list: role.whitelist,
            read_quota: quota(role.read_quota),
            write_quota: quota(role.write_quota),
        }))
    }

    async fn update(&self, prior: RoleModel, planned: RoleModel) -> Result<RoleModel> {
        let name = &planned.role_name;

        let diff = SetDiff::between(&prior.privileges, &planned.privileges);
        if !diff.is_empty() {
            debug!(role = %name, grant = diff.grant.len(), revoke = diff.revoke.len(), "privilege diff");
        }
        if !diff.grant.is_empty() {
            self.check_namespaces(&diff.grant).await?;
            self.client.grant_privileges(name, &diff.grant).await?;
        }
        if !diff.revoke.is_empty() {
            self.client.revoke_privileges(name, &diff.revoke).await?;
        }

        if planned.white_list != prior.white_list {
            self.client.set_whitelist(name, &planned.white_list).await?;
            info!(role = %name, white_list = ?planned.white_list, "replaced whitelist");
        }

        if planned.read_quota != prior.read_quota || planned.write_quota != prior.write_quota {
            self.client
                .set_quotas(
                    name,
                    planned.read_quota.unwrap_or(0),
                    planned.write_quota.unwrap_or(0),
                )
                .await
                .map_err(Self::quota_error(name))?;
            info!(role = %name, "replaced quotas");
        }

        Ok(planned)
    }

    async fn delete(&self, state: RoleModel) -> Result<()> {
        match self.client.drop_role(&state.role_name).await {
            Ok(()) => info!(role = %state.role_name, "dropped role"),
            Err(e) if e.matches(ResultCode::InvalidRole) => {
                debug!(role = %state.role_name, "role already gone")
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}
