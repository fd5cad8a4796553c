//! In-memory Cluster Adapter
//!
//! An in-process cluster honouring the same result codes as a real server.
//! Used by tests, benches and the `--in-memory` dry-run mode. Every call is
//! recorded in a journal so callers can assert exactly which commands a
//! reconcile issued.

use crate::domain::info::ERROR_MARKER;
use crate::domain::model::{Privilege, PrivilegeCode, ResultCode, RoleInfo, UserInfo};
use crate::domain::ports::{ClusterClient, InfoResponse};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const DEFAULT_BUILD: &str = "7.0.0.0";
const DEFAULT_NAMESPACES: [&str; 2] = ["aerospike", "test"];

// =============================================================================
// Call Journal
// =============================================================================

/// One call received by the in-memory cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    Info(String),
    NamespaceProbe(String),
    CreateUser { user: String, roles: Vec<String> },
    DropUser(String),
    ChangePassword(String),
    GrantRoles { user: String, roles: Vec<String> },
    RevokeRoles { user: String, roles: Vec<String> },
    QueryUser(String),
    CreateRole(String),
    DropRole(String),
    GrantPrivileges { role: String, privileges: Vec<Privilege> },
    RevokePrivileges { role: String, privileges: Vec<Privilege> },
    SetWhitelist { role: String, whitelist: Vec<String> },
    SetQuotas { role: String, read_quota: u32, write_quota: u32 },
    QueryRole(String),
}

impl ClusterCall {
    /// Whether the call changes cluster state
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            ClusterCall::QueryUser(_)
                | ClusterCall::QueryRole(_)
                | ClusterCall::NamespaceProbe(_)
        ) && !matches!(self, ClusterCall::Info(cmd) if !cmd.starts_with("set-config"))
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone)]
struct StoredUser {
    password: String,
    roles: BTreeSet<String>,
}

#[derive(Debug)]
struct ClusterState {
    build: String,
    namespaces: BTreeSet<String>,
    quotas_enabled: bool,
    users: BTreeMap<String, StoredUser>,
    roles: BTreeMap<String, RoleInfo>,
    applied_config: Vec<String>,
    calls: Vec<ClusterCall>,
}

/// In-memory implementation of the cluster port
pub struct MemoryCluster {
    state: RwLock<ClusterState>,
}

impl MemoryCluster {
    /// A cluster running build 7.0 with namespaces `aerospike` and `test`
    /// and quotas enabled
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ClusterState {
                build: DEFAULT_BUILD.to_string(),
                namespaces: DEFAULT_NAMESPACES.iter().map(|s| s.to_string()).collect(),
                quotas_enabled: true,
                users: BTreeMap::new(),
                roles: BTreeMap::new(),
                applied_config: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_build(self, build: &str) -> Self {
        self.state.write().build = build.to_string();
        self
    }

    pub fn with_namespace(self, namespace: &str) -> Self {
        self.state.write().namespaces.insert(namespace.to_string());
        self
    }

    pub fn with_quotas_enabled(self, enabled: bool) -> Self {
        self.state.write().quotas_enabled = enabled;
        self
    }

    /// Seed a user without journaling
    pub fn with_user(self, user: &str, password: &str, roles: &[&str]) -> Self {
        self.state.write().users.insert(
            user.to_string(),
            StoredUser {
                password: password.to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        self
    }

    /// Seed a role without journaling
    pub fn with_role(self, role: RoleInfo) -> Self {
        self.state.write().roles.insert(role.name.clone(), role);
        self
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.state.read().calls.clone()
    }

    /// State-changing calls received so far
    pub fn mutations(&self) -> Vec<ClusterCall> {
        self.calls().into_iter().filter(ClusterCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state.write().calls.clear();
    }

    /// `set-config` commands accepted so far
    pub fn applied_config(&self) -> Vec<String> {
        self.state.read().applied_config.clone()
    }

    pub fn user(&self, user: &str) -> Option<UserInfo> {
        self.state.read().users.get(user).map(|u| UserInfo {
            user: user.to_string(),
            roles: u.roles.iter().cloned().collect(),
            conns_in_use: 0,
        })
    }

    pub fn password_matches(&self, user: &str, password: &str) -> bool {
        self.state
            .read()
            .users
            .get(user)
            .map(|u| u.password == password)
            .unwrap_or(false)
    }

    pub fn role(&self, role: &str) -> Option<RoleInfo> {
        self.state.read().roles.get(role).cloned()
    }

    fn record(&self, call: ClusterCall) {
        debug!(?call, "in-memory cluster call");
        self.state.write().calls.push(call);
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Roles every server defines, one per privilege kind
fn is_predefined_role(role: &str) -> bool {
    PrivilegeCode::ALL.iter().any(|p| p.as_str() == role)
}

fn role_known(state: &ClusterState, role: &str) -> bool {
    is_predefined_role(role) || state.roles.contains_key(role)
}

fn check_roles(state: &ClusterState, roles: &[String], operation: &str) -> Result<()> {
    match roles.iter().find(|r| !role_known(state, r)) {
        Some(_) => Err(Error::server(ResultCode::InvalidRole, operation)),
        None => Ok(()),
    }
}

fn check_privileges(privileges: &[Privilege], operation: &str) -> Result<()> {
    if privileges.iter().any(|p| p.validate().is_err()) {
        return Err(Error::server(ResultCode::InvalidPrivilege, operation));
    }
    Ok(())
}

// =============================================================================
// Info Commands
// =============================================================================

fn parse_params(params: &str) -> BTreeMap<&str, &str> {
    params
        .split(';')
        .filter_map(|kv| kv.split_once('='))
        .collect()
}

/// Value the server answers a `set-config` command with
fn set_config_reply(state: &ClusterState, params: &str) -> String {
    let params = parse_params(params);
    let error = |reason: &str| format!("{}::{}", ERROR_MARKER, reason);

    match params.get("context").copied() {
        Some("service") => match params.get("migrate-threads") {
            Some(n) if n.parse::<u32>().is_ok() => "ok".into(),
            Some(_) => error("bad-value"),
            None => error("missing-parameter"),
        },
        Some("namespace") => match params.get("id") {
            Some(ns) if state.namespaces.contains(*ns) => {
                if params.contains_key("set")
                    && params.get("default-ttl").map(|t| !t.is_empty()) != Some(true)
                {
                    return error("missing-default-ttl");
                }
                "ok".into()
            }
            Some(_) => error("namespace-not-found"),
            None => error("missing-id"),
        },
        Some("xdr") => match (params.get("dc"), params.get("namespace")) {
            (Some(_), Some(ns)) if state.namespaces.contains(*ns) => "ok".into(),
            (Some(_), Some(_)) => error("namespace-not-found"),
            _ => error("missing-parameter"),
        },
        _ => error("unknown-context"),
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    fn endpoint(&self) -> String {
        "memory".to_string()
    }

    async fn request_info(&self, command: &str) -> Result<InfoResponse> {
        self.record(ClusterCall::Info(command.to_string()));
        let mut state = self.state.write();

        let value = match command.split_once(':') {
            None if command == "build" => state.build.clone(),
            None if command == "namespaces" => {
                state.namespaces.iter().cloned().collect::<Vec<_>>().join(";")
            }
            Some(("set-config", params)) => {
                let reply = set_config_reply(&state, params);
                if !reply.contains(ERROR_MARKER) {
                    state.applied_config.push(command.to_string());
                }
                reply
            }
            _ => format!("{}::unrecognized-command", ERROR_MARKER),
        };

        let mut response = InfoResponse::new();
        response.insert(command.to_string(), value);
        Ok(response)
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        self.record(ClusterCall::NamespaceProbe(namespace.to_string()));
        Ok(self.state.read().namespaces.contains(namespace))
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    async fn create_user(&self, user: &str, password: &str, roles: &[String]) -> Result<()> {
        self.record(ClusterCall::CreateUser {
            user: user.to_string(),
            roles: roles.to_vec(),
        });
        let mut state = self.state.write();
        if state.users.contains_key(user) {
            return Err(Error::server(ResultCode::UserAlreadyExists, "create user"));
        }
        if password.is_empty() {
            return Err(Error::server(ResultCode::InvalidPassword, "create user"));
        }
        check_roles(&state, roles, "create user")?;
        state.users.insert(
            user.to_string(),
            StoredUser {
                password: password.to_string(),
                roles: roles.iter().cloned().collect(),
            },
        );
        Ok(())
    }

    async fn drop_user(&self, user: &str) -> Result<()> {
        self.record(ClusterCall::DropUser(user.to_string()));
        match self.state.write().users.remove(user) {
            Some(_) => Ok(()),
            None => Err(Error::server(ResultCode::InvalidUser, "drop user")),
        }
    }

    async fn change_password(&self, user: &str, password: &str) -> Result<()> {
        self.record(ClusterCall::ChangePassword(user.to_string()));
        let mut state = self.state.write();
        let stored = state
            .users
            .get_mut(user)
            .ok_or_else(|| Error::server(ResultCode::InvalidUser, "change password"))?;
        if password.is_empty() {
            return Err(Error::server(ResultCode::InvalidPassword, "change password"));
        }
        stored.password = password.to_string();
        Ok(())
    }

    async fn grant_roles(&self, user: &str, roles: &[String]) -> Result<()> {
        self.record(ClusterCall::GrantRoles {
            user: user.to_string(),
            roles: roles.to_vec(),
        });
        let mut state = self.state.write();
        check_roles(&state, roles, "grant roles")?;
        let stored = state
            .users
            .get_mut(user)
            .ok_or_else(|| Error::server(ResultCode::InvalidUser, "grant roles"))?;
        stored.roles.extend(roles.iter().cloned());
        Ok(())
    }

    async fn revoke_roles(&self, user: &str, roles: &[String]) -> Result<()> {
        self.record(ClusterCall::RevokeRoles {
            user: user.to_string(),
            roles: roles.to_vec(),
        });
        let mut state = self.state.write();
        let stored = state
            .users
            .get_mut(user)
            .ok_or_else(|| Error::server(ResultCode::InvalidUser, "revoke roles"))?;
        for role in roles {
            stored.roles.remove(role);
        }
        Ok(())
    }

    async fn query_user(&self, user: &str) -> Result<UserInfo> {
        self.record(ClusterCall::QueryUser(user.to_string()));
        let state = self.state.read();
        let stored = state
            .users
            .get(user)
            .ok_or_else(|| Error::server(ResultCode::InvalidUser, "query user"))?;

        // A user without roles is reported with a single empty role name
        let roles = if stored.roles.is_empty() {
            vec![String::new()]
        } else {
            stored.roles.iter().cloned().collect()
        };
        Ok(UserInfo {
            user: user.to_string(),
            roles,
            conns_in_use: 0,
        })
    }

    // -------------------------------------------------------------------------
    // Roles
    // -------------------------------------------------------------------------

    async fn create_role(&self, role: &RoleInfo) -> Result<()> {
        self.record(ClusterCall::CreateRole(role.name.clone()));
        let mut state = self.state.write();
        if role_known(&state, &role.name) {
            return Err(Error::server(ResultCode::RoleAlreadyExists, "create role"));
        }
        check_privileges(&role.privileges, "create role")?;
        if (role.read_quota > 0 || role.write_quota > 0) && !state.quotas_enabled {
            return Err(Error::server(ResultCode::QuotasNotEnabled, "create role"));
        }
        state.roles.insert(role.name.clone(), role.clone());
        Ok(())
    }

    async fn drop_role(&self, role: &str) -> Result<()> {
        self.record(ClusterCall::DropRole(role.to_string()));
        let mut state = self.state.write();
        if state.roles.remove(role).is_none() {
            return Err(Error::server(ResultCode::InvalidRole, "drop role"));
        }
        for user in state.users.values_mut() {
            user.roles.remove(role);
        }
        Ok(())
    }

    async fn grant_privileges(&self, role: &str, privileges: &[Privilege]) -> Result<()> {
        self.record(ClusterCall::GrantPrivileges {
            role: role.to_string(),
            privileges: privileges.to_vec(),
        });
        check_privileges(privileges, "grant privileges")?;
        let mut state = self.state.write();
        let stored = state
            .roles
            .get_mut(role)
            .ok_or_else(|| Error::server(ResultCode::InvalidRole, "grant privileges"))?;
        for privilege in privileges {
            if !stored.privileges.contains(privilege) {
                stored.privileges.push(privilege.clone());
            }
        }
        Ok(())
    }

    async fn revoke_privileges(&self, role: &str, privileges: &[Privilege]) -> Result<()> {
        self.record(ClusterCall::RevokePrivileges {
            role: role.to_string(),
            privileges: privileges.to_vec(),
        });
        let mut state = self.state.write();
        let stored = state
            .roles
            .get_mut(role)
            .ok_or_else(|| Error::server(ResultCode::InvalidRole, "revoke privileges"))?;
        stored.privileges.retain(|p| !privileges.contains(p));
        Ok(())
    }

    async fn set_whitelist(&self, role: &str, whitelist: &[String]) -> Result<()> {
        self.record(ClusterCall::SetWhitelist {
            role: role.to_string(),
            whitelist: whitelist.to_vec(),
        });
        let mut state = self.state.write();
        let stored = state
            .roles
            .get_mut(role)
            .ok_or_else(|| Error::server(ResultCode::InvalidRole, "set whitelist"))?;
        stored.whitelist = whitelist.to_vec();
        Ok(())
    }

    async fn set_quotas(&self, role: &str, read_quota: u32, write_quota: u32) -> Result<()> {
        self.record(ClusterCall::SetQuotas {
            role: role.to_string(),
            read_quota,
            write_quota,
        });
        let mut state = self.state.write();
        if !state.quotas_enabled {
            return Err(Error::server(ResultCode::QuotasNotEnabled, "set quotas"));
        }
        let stored = state
            .roles
            .get_mut(role)
            .ok_or_else(|| Error::server(ResultCode::InvalidRole, "set quotas"))?;
        stored.read_quota = read_quota;
        stored.write_quota = write_quota;
        Ok(())
    }

    async fn query_role(&self, role: &str) -> Result<RoleInfo> {
        self.record(ClusterCall::QueryRole(role.to_string()));
        self.state
            .read()
            .roles
            .get(role)
            .cloned()
            .ok_or_else(|| Error::server(ResultCode::InvalidRole, "query role"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_user_lifecycle_result_codes() {
        let cluster = MemoryCluster::new();
        cluster
            .create_user("alice", "pw", &["read".to_string()])
            .await
            .unwrap();

        let dup = cluster.create_user("alice", "pw", &[]).await.unwrap_err();
        assert!(dup.matches(ResultCode::UserAlreadyExists));

        let unknown_role = cluster
            .grant_roles("alice", &["no-such-role".to_string()])
            .await
            .unwrap_err();
        assert!(unknown_role.matches(ResultCode::InvalidRole));

        cluster.drop_user("alice").await.unwrap();
        let gone = cluster.query_user("alice").await.unwrap_err();
        assert!(gone.matches(ResultCode::InvalidUser));
    }

    #[tokio::test]
    async fn test_user_without_roles_reports_empty_name() {
        let cluster = MemoryCluster::new().with_user("bob", "pw", &[]);
        let info = cluster.query_user("bob").await.unwrap();
        assert_eq!(info.roles, vec![String::new()]);
    }

    #[tokio::test]
    async fn test_quotas_disabled() {
        let cluster = MemoryCluster::new().with_quotas_enabled(false);
        let role = RoleInfo {
            name: "limited".into(),
            read_quota: 10,
            ..Default::default()
        };
        let err = cluster.create_role(&role).await.unwrap_err();
        assert!(err.matches(ResultCode::QuotasNotEnabled));
        assert!(cluster.role("limited").is_none());
    }

    #[tokio::test]
    async fn test_predefined_role_cannot_be_created() {
        let cluster = MemoryCluster::new();
        let role = RoleInfo {
            name: "read-write".into(),
            ..Default::default()
        };
        let err = cluster.create_role(&role).await.unwrap_err();
        assert!(err.matches(ResultCode::RoleAlreadyExists));
    }

    #[tokio::test]
    async fn test_info_replies() {
        let cluster = MemoryCluster::new().with_build("6.4.0.2");
        let build = cluster.request_info("build").await.unwrap();
        assert_eq!(build["build"], "6.4.0.2");

        let cmd = "set-config:context=namespace;id=missing;set=s;default-ttl=10";
        let reply = cluster.request_info(cmd).await.unwrap();
        assert!(reply[cmd].contains(ERROR_MARKER));

        let cmd = "set-config:context=service;migrate-threads=2";
        let reply = cluster.request_info(cmd).await.unwrap();
        assert_eq!(reply[cmd], "ok");
        assert_eq!(cluster.applied_config(), vec![cmd.to_string()]);
    }

    #[tokio::test]
    async fn test_journal_separates_mutations() {
        let cluster = MemoryCluster::new();
        cluster.request_info("build").await.unwrap();
        cluster.namespace_exists("test").await.unwrap();
        cluster.create_user("carol", "pw", &[]).await.unwrap();
        assert_eq!(cluster.calls().len(), 3);
        assert_eq!(
            cluster.mutations(),
            vec![ClusterCall::CreateUser {
                user: "carol".into(),
                roles: vec![],
            }]
        );
    }
}
