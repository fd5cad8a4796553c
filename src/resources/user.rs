//! `aerospike_user` reconciler

use crate::domain::diff::SetDiff;
use crate::domain::model::ResultCode;
use crate::domain::ports::ClusterClientRef;
use crate::error::{Error, Result};
use crate::provider::{Diagnostic, Diagnostics, Resource};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, trace};

/// Declared and stored state of a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UserModel {
    /// User name. This attribute is the unique identifier for the user and is
    /// used for importing
    pub user_name: String,

    /// Password
    #[serde(default)]
    pub password: String,

    /// Roles that should be granted to the user
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

pub struct UserResource {
    client: ClusterClientRef,
}

impl UserResource {
    pub fn new(client: ClusterClientRef) -> Self {
        Self { client }
    }
}

/// Role names as reported by a user query; a lone empty name means none
fn reported_roles(roles: Vec<String>) -> BTreeSet<String> {
    if roles.len() == 1 && roles[0].is_empty() {
        return BTreeSet::new();
    }
    roles.into_iter().collect()
}

#[async_trait]
impl Resource for UserResource {
    type Model = UserModel;

    fn type_suffix(&self) -> &'static str {
        "user"
    }

    fn description(&self) -> &'static str {
        "Aerospike user"
    }

    fn identity_attribute(&self) -> Option<&'static str> {
        Some("user_name")
    }

    fn sensitive_attributes(&self) -> &'static [&'static str] {
        &["password"]
    }

    fn validate(&self, model: &UserModel) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if model.user_name.is_empty() {
            diags.push(
                Diagnostic::error("Invalid resource configuration", "user_name must not be empty")
                    .at("user_name"),
            );
        }
        if model.password.is_empty() {
            diags.push(
                Diagnostic::error("Invalid resource configuration", "password must not be empty")
                    .at("password"),
            );
        }
        if model.roles.iter().any(String::is_empty) {
            diags.push(
                Diagnostic::error("Invalid resource configuration", "role names must not be empty")
                    .at("roles"),
            );
        }
        diags
    }

    fn requires_replace(&self, prior: &UserModel, planned: &UserModel) -> bool {
        prior.user_name != planned.user_name
    }

    async fn create(&self, planned: UserModel) -> Result<UserModel> {
        let roles: Vec<String> = planned.roles.iter().cloned().collect();
        self.client
            .create_user(&planned.user_name, &planned.password, &roles)
            .await
            .map_err(|err| match err {
                e if e.matches(ResultCode::UserAlreadyExists) => Error::ResourceExists {
                    kind: "user".into(),
                    name: planned.user_name.clone(),
                },
                e => e,
            })?;

        info!(user = %planned.user_name, roles = ?roles, "created user");
        Ok(planned)
    }

    async fn read(&self, state: UserModel) -> Result<Option<UserModel>> {
        let user = match self.client.query_user(&state.user_name).await {
            Ok(user) => user,
            Err(e) if e.matches(ResultCode::InvalidUser) => {
                trace!(user = %state.user_name, "user does not exist");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let roles = reported_roles(user.roles);
        trace!(user = %state.user_name, roles = ?roles, "read user");

        // the password is never returned by the server
        Ok(Some(UserModel { roles, ..state }))
    }

    async fn update(&self, prior: UserModel, planned: UserModel) -> Result<UserModel> {
        let name = &planned.user_name;

        if planned.password != prior.password {
            self.client.change_password(name, &planned.password).await?;
            info!(user = %name, "changed password");
        }

        let diff = SetDiff::between(&prior.roles, &planned.roles);
        if !diff.is_empty() {
            debug!(user = %name, grant = ?diff.grant, revoke = ?diff.revoke, "role diff");
        }
        if !diff.grant.is_empty() {
            self.client.grant_roles(name, &diff.grant).await?;
        }
        if !diff.revoke.is_empty() {
            self.client.revoke_roles(name, &diff.revoke).await?;
        }

        Ok(planned)
    }

    async fn delete(&self, state: UserModel) -> Result<()> {
        match self.client.drop_user(&state.user_name).await {
            Ok(()) => info!(user = %state.user_name, "dropped user"),
            Err(e) if e.matches(ResultCode::InvalidUser) => {
                debug!(user = %state.user_name, "user already gone")
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::{ClusterCall, MemoryCluster};
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn user(name: &str, password: &str, roles: &[&str]) -> UserModel {
        UserModel {
            user_name: name.into(),
            password: password.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn setup() -> (Arc<MemoryCluster>, UserResource) {
        let cluster = Arc::new(MemoryCluster::new());
        let resource = UserResource::new(cluster.clone());
        (cluster, resource)
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let (cluster, resource) = setup();
        let created = resource
            .create(user("user1", "pw", &["read", "write"]))
            .await
            .unwrap();
        assert!(cluster.password_matches("user1", "pw"));

        let read = resource.read(created.clone()).await.unwrap().unwrap();
        assert_eq!(read, created);
    }

    #[tokio::test]
    async fn test_read_user_without_roles() {
        let (_cluster, resource) = setup();
        resource.create(user("user1", "pw", &[])).await.unwrap();
        let read = resource.read(user("user1", "pw", &[])).await.unwrap().unwrap();
        assert!(read.roles.is_empty());
    }

    #[tokio::test]
    async fn test_create_existing_user() {
        let cluster = Arc::new(MemoryCluster::new().with_user("user1", "pw", &[]));
        let resource = UserResource::new(cluster.clone());
        let err = resource.create(user("user1", "pw", &[])).await.unwrap_err();
        assert_matches!(err, Error::ResourceExists { .. });
        assert_eq!(err.diagnostic().summary, "Resource already exists");
    }

    #[tokio::test]
    async fn test_password_rotation_only_changes_password() {
        let (cluster, resource) = setup();
        let prior = resource.create(user("user1", "old", &["read"])).await.unwrap();
        cluster.clear_calls();

        resource
            .update(prior, user("user1", "new", &["read"]))
            .await
            .unwrap();
        assert_eq!(
            cluster.mutations(),
            vec![ClusterCall::ChangePassword("user1".into())]
        );
        assert!(cluster.password_matches("user1", "new"));
    }

    #[tokio::test]
    async fn test_role_diff() {
        let (cluster, resource) = setup();
        let prior = resource
            .create(user("user1", "pw", &["read", "write"]))
            .await
            .unwrap();
        cluster.clear_calls();

        resource
            .update(prior, user("user1", "pw", &["write", "truncate"]))
            .await
            .unwrap();
        assert_eq!(
            cluster.mutations(),
            vec![
                ClusterCall::GrantRoles {
                    user: "user1".into(),
                    roles: vec!["truncate".into()],
                },
                ClusterCall::RevokeRoles {
                    user: "user1".into(),
                    roles: vec!["read".into()],
                },
            ]
        );
        let stored = cluster.user("user1").unwrap();
        assert_eq!(stored.roles, vec!["truncate".to_string(), "write".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_user_reads_absent_and_deletes_cleanly() {
        let (_cluster, resource) = setup();
        let ghost = user("ghost", "pw", &[]);
        assert!(resource.read(ghost.clone()).await.unwrap().is_none());
        resource.delete(ghost.clone()).await.unwrap();
        resource.delete(ghost).await.unwrap();
    }

    #[test]
    fn test_validation() {
        let (_cluster, resource) = setup();
        assert!(resource.validate(&user("u", "pw", &["read"])).is_empty());
        let diags = resource.validate(&user("", "", &[""]));
        assert_eq!(diags.len(), 3);
        assert!(diags.has_error());
    }

    #[test]
    fn test_import_skeleton() {
        let (_cluster, resource) = setup();
        let model = resource.import("user1").unwrap();
        assert_eq!(model.user_name, "user1");
        assert!(model.password.is_empty());
    }
}
