//! Aerospike Cluster Adapter
//!
//! Implements the cluster port over the Aerospike client. The client owns
//! the cluster view, node connection pools and authentication; this adapter
//! only translates arguments, replies and errors.

pub mod policy;

use self::policy::{
    admin_policy, client_policy, connect_error, from_client_privilege, is_unknown_namespace,
    request_error, seed_host, to_client_privilege,
};
use crate::config::ConnectionSettings;
use crate::domain::model::{Privilege, ResultCode, RoleInfo, UserInfo};
use crate::domain::ports::{ClusterClient, InfoResponse};
use crate::error::{Error, Result};
use ::aerospike::{AdminPolicy, Bins, Client, Key, ReadPolicy, Value};
use async_trait::async_trait;
use tracing::{debug, info};

/// Server-side timeout of the namespace probe read, in milliseconds
const PROBE_TIMEOUT_MS: u32 = 1000;

/// Set and key of the record the namespace probe reads
const PROBE_SET: &str = "";
const PROBE_KEY: &str = "aerospike-provider-probe";

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

/// Cluster client backed by the Aerospike client library
pub struct AerospikeClient {
    settings: ConnectionSettings,
    admin: AdminPolicy,
    client: Client,
}

impl AerospikeClient {
    /// Load TLS roots, connect to the seed node and log in. No retries.
    pub async fn connect(settings: ConnectionSettings) -> Result<Self> {
        let policy = client_policy(&settings)?;
        let hosts = vec![seed_host(&settings)];

        let client = tokio::time::timeout(settings.connect_timeout, Client::new(&policy, &hosts))
            .await
            .map_err(|_| Error::ConnectTimeout {
                host: settings.host.clone(),
                timeout: settings.connect_timeout,
            })?
            .map_err(|e| connect_error(&settings, e))?;

        info!(
            endpoint = %settings.address(),
            user = %settings.user,
            tls = settings.tls.is_some(),
            nodes = client.nodes().len(),
            "connected to Aerospike"
        );
        Ok(Self {
            admin: admin_policy(&settings),
            settings,
            client,
        })
    }

    fn failed(&self, operation: &'static str) -> impl FnOnce(::aerospike::Error) -> Error + '_ {
        move |err| request_error(&self.settings.address(), operation, err)
    }

    fn privileges(privileges: &[Privilege]) -> Result<Vec<::aerospike::Privilege>> {
        privileges.iter().map(to_client_privilege).collect()
    }
}

#[async_trait]
impl ClusterClient for AerospikeClient {
    fn endpoint(&self) -> String {
        self.settings.address()
    }

    async fn request_info(&self, command: &str) -> Result<InfoResponse> {
        let node = self
            .client
            .nodes()
            .into_iter()
            .next()
            .ok_or_else(|| Error::Connection {
                host: self.settings.address(),
                reason: "no active cluster nodes".into(),
            })?;
        let response = node
            .info(&self.admin, &[command])
            .await
            .map_err(self.failed("info"))?;
        debug!(node = %node.name(), command, "info command sent");
        Ok(response.into_iter().collect())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let key = Key::new(namespace, PROBE_SET, Value::from(PROBE_KEY))
            .map_err(|e| Error::Validation(e.to_string()))?;
        let mut policy = ReadPolicy::default();
        policy.base_policy.total_timeout = PROBE_TIMEOUT_MS;
        policy.base_policy.max_retries = 0;

        let exists = match self.client.get(&policy, &key, Bins::None).await {
            Ok(_) => true,
            Err(err) if is_unknown_namespace(&err) => false,
            Err(::aerospike::Error::ServerError(code, ..)) => {
                debug!(namespace, %code, "namespace probe answered");
                true
            }
            Err(err) => return Err(request_error(&self.endpoint(), "namespace probe", err)),
        };
        debug!(namespace, exists, "namespace probe");
        Ok(exists)
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    async fn create_user(&self, user: &str, password: &str, roles: &[String]) -> Result<()> {
        self.client
            .create_user(&self.admin, user, password, &as_strs(roles))
            .await
            .map_err(self.failed("create user"))
    }

    async fn drop_user(&self, user: &str) -> Result<()> {
        self.client
            .drop_user(&self.admin, user)
            .await
            .map_err(self.failed("drop user"))
    }

    /// The client changes the connected user's own password with the old
    /// credential and keeps it for later logins; other users get a reset.
    async fn change_password(&self, user: &str, password: &str) -> Result<()> {
        self.client
            .change_password(&self.admin, user, password)
            .await
            .map_err(self.failed("change password"))
    }

    async fn grant_roles(&self, user: &str, roles: &[String]) -> Result<()> {
        self.client
            .grant_roles(&self.admin, user, &as_strs(roles))
            .await
            .map_err(self.failed("grant roles"))
    }

    async fn revoke_roles(&self, user: &str, roles: &[String]) -> Result<()> {
        self.client
            .revoke_roles(&self.admin, user, &as_strs(roles))
            .await
            .map_err(self.failed("revoke roles"))
    }

    async fn query_user(&self, user: &str) -> Result<UserInfo> {
        let users = self
            .client
            .query_users(&self.admin, Some(user))
            .await
            .map_err(self.failed("query user"))?;
        users
            .into_iter()
            .find(|found| found.user == user)
            .map(|found| UserInfo {
                user: found.user,
                roles: found.roles,
                conns_in_use: found.conns_in_use,
            })
            .ok_or_else(|| Error::server(ResultCode::InvalidUser, "query user"))
    }

    // -------------------------------------------------------------------------
    // Roles
    // -------------------------------------------------------------------------

    async fn create_role(&self, role: &RoleInfo) -> Result<()> {
        let privileges = Self::privileges(&role.privileges)?;
        self.client
            .create_role(
                &self.admin,
                &role.name,
                &privileges,
                &as_strs(&role.whitelist),
                role.read_quota,
                role.write_quota,
            )
            .await
            .map_err(self.failed("create role"))
    }

    async fn drop_role(&self, role: &str) -> Result<()> {
        self.client
            .drop_role(&self.admin, role)
            .await
            .map_err(self.failed("drop role"))
    }

    async fn grant_privileges(&self, role: &str, privileges: &[Privilege]) -> Result<()> {
        let privileges = Self::privileges(privileges)?;
        self.client
            .grant_privileges(&self.admin, role, &privileges)
            .await
            .map_err(self.failed("grant privileges"))
    }

    async fn revoke_privileges(&self, role: &str, privileges: &[Privilege]) -> Result<()> {
        let privileges = Self::privileges(privileges)?;
        self.client
            .revoke_privileges(&self.admin, role, &privileges)
            .await
            .map_err(self.failed("revoke privileges"))
    }

    async fn set_whitelist(&self, role: &str, whitelist: &[String]) -> Result<()> {
        self.client
            .set_allowlist(&self.admin, role, &as_strs(whitelist))
            .await
            .map_err(self.failed("set whitelist"))
    }

    async fn set_quotas(&self, role: &str, read_quota: u32, write_quota: u32) -> Result<()> {
        self.client
            .set_quotas(&self.admin, role, read_quota, write_quota)
            .await
            .map_err(self.failed("set quotas"))
    }

    async fn query_role(&self, role: &str) -> Result<RoleInfo> {
        let roles = self
            .client
            .query_roles(&self.admin, Some(role))
            .await
            .map_err(self.failed("query role"))?;
        let found = roles
            .into_iter()
            .find(|found| found.name == role)
            .ok_or_else(|| Error::server(ResultCode::InvalidRole, "query role"))?;

        Ok(RoleInfo {
            name: found.name,
            privileges: found
                .privileges
                .into_iter()
                .map(from_client_privilege)
                .collect::<Result<_>>()?,
            whitelist: found.allowlist,
            read_quota: found.read_quota,
            write_quota: found.write_quota,
        })
    }
}
