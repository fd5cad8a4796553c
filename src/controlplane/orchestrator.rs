//! Orchestrator - declaration and state driven reconciliation
//!
//! Coordinates the provider operations across all declared resources:
//! - Refresh of the stored state against the cluster
//! - Plan computation (create, update, replace, delete)
//! - Apply with state persisted after every step
//! - Destroy and import

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::provider::{Diagnostics, HandlerResult, PlanAction, Provider, ResourceHandler};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Current state file format version
pub const STATE_VERSION: u32 = 1;

// =============================================================================
// Declaration
// =============================================================================

/// Desired state as written by the user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Declaration {
    /// Provider block; falls back to environment and defaults when absent
    #[serde(default)]
    pub provider: Option<ProviderConfig>,

    #[serde(default)]
    pub resources: Vec<DeclaredResource>,
}

/// One declared resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default = "empty_object")]
    pub attributes: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl DeclaredResource {
    pub fn address(&self) -> String {
        address(&self.resource_type, &self.name)
    }
}

impl Declaration {
    pub fn parse(text: &str) -> Result<Self> {
        let declaration: Declaration = serde_yaml::from_str(text)?;
        declaration.check_addresses()?;
        Ok(declaration)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    fn check_addresses(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for resource in &self.resources {
            if resource.name.is_empty() {
                return Err(Error::Validation(format!(
                    "{} resource without a name",
                    resource.resource_type
                )));
            }
            if !seen.insert(resource.address()) {
                return Err(Error::Validation(format!(
                    "duplicate resource {}",
                    resource.address()
                )));
            }
        }
        Ok(())
    }
}

fn address(resource_type: &str, name: &str) -> String {
    format!("{}.{}", resource_type, name)
}

// =============================================================================
// State File
// =============================================================================

/// Stored state of one managed object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub attributes: Value,
}

impl StateEntry {
    pub fn address(&self) -> String {
        address(&self.resource_type, &self.name)
    }
}

/// Persisted state of every managed object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    #[serde(default)]
    pub last_applied: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub resources: Vec<StateEntry>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            last_applied: None,
            resources: Vec::new(),
        }
    }
}

impl StateFile {
    /// Load the state, or an empty one when the file does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let state: StateFile = serde_json::from_str(&text)?;
        if state.version > STATE_VERSION {
            return Err(Error::Configuration(format!(
                "state file {} has version {}, this build reads up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }
        Ok(state)
    }

    /// Write the state through a temporary file and an atomic rename
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.serial += 1;
        self.last_applied = Some(chrono::Utc::now());

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), serial = self.serial, "saved state");
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&StateEntry> {
        self.resources.iter().find(|e| e.address() == address)
    }

    /// Insert or replace the entry at the same address
    pub fn upsert(&mut self, entry: StateEntry) {
        let address = entry.address();
        match self.resources.iter_mut().find(|e| e.address() == address) {
            Some(existing) => *existing = entry,
            None => self.resources.push(entry),
        }
    }

    pub fn remove(&mut self, address: &str) -> Option<StateEntry> {
        let index = self.resources.iter().position(|e| e.address() == address)?;
        Some(self.resources.remove(index))
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Planned change to one object
#[derive(Debug, Clone)]
pub struct ResourceChange {
    pub resource_type: String,
    pub name: String,
    pub action: PlanAction,
    pub prior: Option<Value>,
    pub planned: Option<Value>,
}

impl ResourceChange {
    pub fn address(&self) -> String {
        address(&self.resource_type, &self.name)
    }
}

/// Ordered set of changes computed against refreshed state
#[derive(Debug, Clone)]
pub struct Plan {
    /// Deletes first, then declared resources in declaration order
    pub changes: Vec<ResourceChange>,
    /// State after refresh; apply starts from here
    pub state: StateFile,
    /// Non-fatal diagnostics gathered while planning
    pub warnings: Diagnostics,
}

impl Plan {
    /// Whether applying the plan would change anything
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| c.action != PlanAction::NoOp)
    }

    pub fn count(&self, action: PlanAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    pub fn action_of(&self, address: &str) -> Option<PlanAction> {
        self.changes
            .iter()
            .find(|c| c.address() == address)
            .map(|c| c.action)
    }
}

/// Counts of what an apply did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub added: usize,
    pub changed: usize,
    pub destroyed: usize,
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resources: {} added, {} changed, {} destroyed.",
            self.added, self.changed, self.destroyed
        )
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives the provider over a declaration and a state file
pub struct Orchestrator {
    provider: Arc<Provider>,
    state_path: PathBuf,
}

impl Orchestrator {
    pub fn new(provider: Arc<Provider>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            state_path: state_path.into(),
        }
    }

    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn load_state(&self) -> Result<StateFile> {
        StateFile::load(&self.state_path)
    }

    fn handler(&self, resource_type: &str) -> HandlerResult<Arc<dyn ResourceHandler>> {
        Ok(self.provider.resource(resource_type)?)
    }

    /// Read every stored object back from the cluster. Objects that no longer
    /// exist are dropped from the returned state.
    async fn refreshed(&self, mut state: StateFile) -> HandlerResult<StateFile> {
        let mut refreshed = Vec::with_capacity(state.resources.len());
        for entry in state.resources.drain(..) {
            let handler = self.handler(&entry.resource_type)?;
            match handler.read(entry.attributes.clone()).await? {
                Some(attributes) => refreshed.push(StateEntry { attributes, ..entry }),
                None => warn!(address = %entry.address(), "object is gone from the cluster, removing from state"),
            }
        }
        state.resources = refreshed;
        Ok(state)
    }

    /// Refresh the stored state and persist it
    pub async fn refresh(&self) -> HandlerResult<StateFile> {
        let state = self.load_state()?;
        let mut state = self.refreshed(state).await?;
        state.save(&self.state_path)?;
        Ok(state)
    }

    /// Compute the changes that bring the cluster to `declaration`
    pub async fn plan(&self, declaration: &Declaration) -> HandlerResult<Plan> {
        let state = self.refreshed(self.load_state()?).await?;

        let mut diags = Diagnostics::new();
        let mut changes = Vec::new();

        let declared: BTreeSet<String> = declaration
            .resources
            .iter()
            .map(DeclaredResource::address)
            .collect();
        for entry in state.resources.iter().rev() {
            if !declared.contains(&entry.address()) {
                changes.push(ResourceChange {
                    resource_type: entry.resource_type.clone(),
                    name: entry.name.clone(),
                    action: PlanAction::Delete,
                    prior: Some(entry.attributes.clone()),
                    planned: None,
                });
            }
        }

        for resource in &declaration.resources {
            let handler = match self.handler(&resource.resource_type) {
                Ok(handler) => handler,
                Err(d) => {
                    diags.extend(d);
                    continue;
                }
            };
            let prior = state.get(&resource.address()).map(|e| e.attributes.clone());

            let validation = handler.validate(&resource.attributes);
            if validation.has_error() {
                diags.extend(validation);
                continue;
            }
            diags.extend(validation);

            match handler.plan(prior.as_ref(), resource.attributes.clone()) {
                Ok(change) => changes.push(ResourceChange {
                    resource_type: resource.resource_type.clone(),
                    name: resource.name.clone(),
                    action: change.action,
                    prior,
                    planned: Some(change.planned_state),
                }),
                Err(d) => diags.extend(d),
            }
        }

        if diags.has_error() {
            return Err(diags);
        }

        let plan = Plan {
            changes,
            state,
            warnings: diags,
        };
        info!(
            create = plan.count(PlanAction::Create),
            update = plan.count(PlanAction::Update),
            replace = plan.count(PlanAction::Replace),
            delete = plan.count(PlanAction::Delete),
            "plan computed"
        );
        Ok(plan)
    }

    /// Execute a plan in order, saving state after each successful step.
    /// Stops at the first failure; completed steps stay recorded.
    pub async fn apply(&self, plan: Plan) -> HandlerResult<ApplySummary> {
        let mut state = plan.state;
        let mut summary = ApplySummary::default();

        for change in plan.changes {
            if change.action == PlanAction::NoOp {
                continue;
            }
            let address = change.address();
            let handler = self.handler(&change.resource_type)?;
            info!(%address, action = %change.action, "applying");

            match (change.action, change.prior, change.planned) {
                (PlanAction::Delete, Some(prior), _) => {
                    handler.delete(prior).await?;
                    state.remove(&address);
                    state.save(&self.state_path)?;
                    summary.destroyed += 1;
                }
                (PlanAction::Replace, Some(prior), Some(planned)) => {
                    handler.delete(prior).await?;
                    state.remove(&address);
                    state.save(&self.state_path)?;
                    summary.destroyed += 1;

                    let created = handler.create(planned).await?;
                    self.store(&mut state, &change.resource_type, &change.name, created)?;
                    summary.added += 1;
                }
                (PlanAction::Create, _, Some(planned)) => {
                    let created = handler.create(planned).await?;
                    self.store(&mut state, &change.resource_type, &change.name, created)?;
                    summary.added += 1;
                }
                (PlanAction::Update, Some(prior), Some(planned)) => {
                    let updated = handler.update(prior, planned).await?;
                    self.store(&mut state, &change.resource_type, &change.name, updated)?;
                    summary.changed += 1;
                }
                (action, _, _) => {
                    return Err(Error::Internal(format!(
                        "malformed {} change for {}",
                        action, address
                    ))
                    .into())
                }
            }
        }

        if summary == ApplySummary::default() {
            state.save(&self.state_path)?;
        }
        info!(%summary, "apply complete");
        Ok(summary)
    }

    fn store(
        &self,
        state: &mut StateFile,
        resource_type: &str,
        name: &str,
        attributes: Value,
    ) -> Result<()> {
        state.upsert(StateEntry {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            attributes,
        });
        state.save(&self.state_path)
    }

    /// Plan that deletes every stored object, newest first
    pub async fn plan_destroy(&self) -> HandlerResult<Plan> {
        self.plan(&Declaration::default()).await
    }

    /// Delete every stored object
    pub async fn destroy(&self) -> HandlerResult<ApplySummary> {
        let plan = self.plan_destroy().await?;
        self.apply(plan).await
    }

    /// Bring an existing object under management at `resource_type.name`
    pub async fn import(&self, resource_type: &str, name: &str, id: &str) -> HandlerResult<Value> {
        let mut state = self.load_state()?;
        let address = address(resource_type, name);
        if state.get(&address).is_some() {
            return Err(Error::Validation(format!("{} is already managed", address)).into());
        }

        let handler = self.handler(resource_type)?;
        let skeleton = handler.import(id)?;
        let attributes = handler
            .read(skeleton)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: resource_type.to_string(),
                name: id.to_string(),
            })?;

        self.store(&mut state, resource_type, name, attributes.clone())?;
        info!(%address, %id, "imported");
        Ok(attributes)
    }

    /// Human readable rendering of a plan with sensitive values masked
    pub fn describe(&self, plan: &Plan) -> String {
        let mut out = String::new();
        for change in &plan.changes {
            if change.action == PlanAction::NoOp {
                continue;
            }
            let marker = match change.action {
                PlanAction::Create => "+",
                PlanAction::Update => "~",
                PlanAction::Replace => "-/+",
                PlanAction::Delete => "-",
                PlanAction::NoOp => " ",
            };
            out.push_str(&format!("{} {} ({})\n", marker, change.address(), change.action));

            let shown = change.planned.as_ref().or(change.prior.as_ref());
            if let (Some(value), Ok(handler)) = (shown, self.handler(&change.resource_type)) {
                let redacted = handler.redact(value);
                if let Ok(text) = serde_json::to_string_pretty(&redacted) {
                    for line in text.lines() {
                        out.push_str("    ");
                        out.push_str(line);
                        out.push('\n');
                    }
                }
            }
        }
        out.push_str(&format!(
            "Plan: {} to add, {} to change, {} to destroy.\n",
            plan.count(PlanAction::Create) + plan.count(PlanAction::Replace),
            plan.count(PlanAction::Update),
            plan.count(PlanAction::Delete) + plan.count(PlanAction::Replace),
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::{ClusterCall, MemoryCluster};
    use crate::domain::ports::ClusterClient;
    use serde_json::json;

    const DECLARATION: &str = r#"
resources:
  - type: aerospike_role
    name: reader
    attributes:
      role_name: reader
      privileges:
        - privilege: read
          namespace: test
  - type: aerospike_user
    name: app
    attributes:
      user_name: app
      password: s3cret
      roles: [reader]
"#;

    fn setup() -> (Arc<MemoryCluster>, Orchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(MemoryCluster::new());
        let provider = Arc::new(Provider::with_client(cluster.clone()));
        let orchestrator = Orchestrator::new(provider, dir.path().join("state.json"));
        (cluster, orchestrator, dir)
    }

    #[test]
    fn test_declaration_parse() {
        let declaration = Declaration::parse(DECLARATION).unwrap();
        assert!(declaration.provider.is_none());
        assert_eq!(declaration.resources.len(), 2);
        assert_eq!(declaration.resources[1].address(), "aerospike_user.app");

        let duplicate = "resources:\n  - {type: aerospike_user, name: a}\n  - {type: aerospike_user, name: a}\n";
        assert!(matches!(Declaration::parse(duplicate), Err(Error::Validation(_))));
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        assert_eq!(StateFile::load(&path).unwrap(), StateFile::default());

        let mut state = StateFile::default();
        state.upsert(StateEntry {
            resource_type: "aerospike_user".into(),
            name: "a".into(),
            attributes: json!({"user_name": "a"}),
        });
        state.save(&path).unwrap();
        state.save(&path).unwrap();

        let loaded = StateFile::load(&path).unwrap();
        assert_eq!(loaded.serial, 2);
        assert!(loaded.last_applied.is_some());
        assert_eq!(loaded.resources.len(), 1);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_plan_apply_converges() {
        let (cluster, orchestrator, _dir) = setup();
        let declaration = Declaration::parse(DECLARATION).unwrap();

        let plan = orchestrator.plan(&declaration).await.unwrap();
        assert_eq!(plan.count(PlanAction::Create), 2);
        let summary = orchestrator.apply(plan).await.unwrap();
        assert_eq!(summary.added, 2);
        assert!(cluster.role("reader").is_some());
        assert!(cluster.password_matches("app", "s3cret"));

        let again = orchestrator.plan(&declaration).await.unwrap();
        assert!(!again.has_changes());
    }

    #[tokio::test]
    async fn test_plan_actions() {
        let (_cluster, orchestrator, _dir) = setup();
        let declaration = Declaration::parse(DECLARATION).unwrap();
        let plan = orchestrator.plan(&declaration).await.unwrap();
        orchestrator.apply(plan).await.unwrap();

        let mut changed = declaration.clone();
        changed.resources[1].attributes["roles"] = json!(["reader", "write"]);
        changed.resources[0].attributes["role_name"] = json!("reader2");
        let plan = orchestrator.plan(&changed).await.unwrap();
        assert_eq!(plan.action_of("aerospike_role.reader"), Some(PlanAction::Replace));
        assert_eq!(plan.action_of("aerospike_user.app"), Some(PlanAction::Update));

        let removed = Declaration {
            provider: None,
            resources: vec![declaration.resources[0].clone()],
        };
        let plan = orchestrator.plan(&removed).await.unwrap();
        assert_eq!(plan.action_of("aerospike_user.app"), Some(PlanAction::Delete));
        assert_eq!(plan.changes[0].action, PlanAction::Delete);
    }

    #[tokio::test]
    async fn test_out_of_band_delete_plans_create() {
        let (cluster, orchestrator, _dir) = setup();
        let declaration = Declaration::parse(DECLARATION).unwrap();
        let plan = orchestrator.plan(&declaration).await.unwrap();
        orchestrator.apply(plan).await.unwrap();

        cluster.drop_user("app").await.unwrap();
        let plan = orchestrator.plan(&declaration).await.unwrap();
        assert_eq!(plan.action_of("aerospike_user.app"), Some(PlanAction::Create));
    }

    #[tokio::test]
    async fn test_apply_stops_at_first_error() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(MemoryCluster::new().with_user("app", "other", &[]));
        let provider = Arc::new(Provider::with_client(cluster.clone()));
        let orchestrator = Orchestrator::new(provider, dir.path().join("state.json"));

        let declaration = Declaration::parse(DECLARATION).unwrap();
        let plan = orchestrator.plan(&declaration).await.unwrap();
        let diags = orchestrator.apply(plan).await.unwrap_err();
        assert!(diags.iter().any(|d| d.summary == "Resource already exists"));

        let state = orchestrator.load_state().unwrap();
        assert_eq!(state.resources.len(), 1);
        assert!(state.get("aerospike_role.reader").is_some());
    }

    #[tokio::test]
    async fn test_validation_errors_fail_plan() {
        let (cluster, orchestrator, _dir) = setup();
        let declaration = Declaration::parse(
            "resources:\n  - type: aerospike_user\n    name: bad\n    attributes: {user_name: bad, password: \"\"}\n  - type: aerospike_index\n    name: x\n",
        )
        .unwrap();
        let diags = orchestrator.plan(&declaration).await.unwrap_err();
        assert_eq!(diags.len(), 2);
        assert!(cluster.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let (cluster, orchestrator, _dir) = setup();
        let plan = orchestrator
            .plan(&Declaration::parse(DECLARATION).unwrap())
            .await
            .unwrap();
        orchestrator.apply(plan).await.unwrap();
        cluster.clear_calls();

        let summary = orchestrator.destroy().await.unwrap();
        assert_eq!(summary.destroyed, 2);
        assert!(orchestrator.load_state().unwrap().resources.is_empty());
        // newest first: the user goes before the role it holds
        assert_eq!(
            cluster.mutations(),
            vec![
                ClusterCall::DropUser("app".into()),
                ClusterCall::DropRole("reader".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_import() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(MemoryCluster::new().with_user("legacy", "pw", &["read"]));
        let provider = Arc::new(Provider::with_client(cluster));
        let orchestrator = Orchestrator::new(provider, dir.path().join("state.json"));

        let attributes = orchestrator
            .import("aerospike_user", "legacy", "legacy")
            .await
            .unwrap();
        assert_eq!(attributes["roles"], json!(["read"]));
        assert!(orchestrator
            .load_state()
            .unwrap()
            .get("aerospike_user.legacy")
            .is_some());

        let missing = orchestrator.import("aerospike_user", "ghost", "ghost").await;
        assert!(missing.is_err());
        let singleton = orchestrator.import("aerospike_config_service", "svc", "svc").await;
        assert!(singleton.is_err());
    }

    #[tokio::test]
    async fn test_describe_masks_password() {
        let (_cluster, orchestrator, _dir) = setup();
        let plan = orchestrator
            .plan(&Declaration::parse(DECLARATION).unwrap())
            .await
            .unwrap();
        let text = orchestrator.describe(&plan);
        assert!(text.contains("+ aerospike_user.app (create)"));
        assert!(!text.contains("s3cret"));
        assert!(text.contains("Plan: 2 to add, 0 to change, 0 to destroy."));
    }
}
