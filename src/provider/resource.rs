//! Resource contract
//!
//! Reconcilers implement [`Resource`] over a typed model. The orchestrator and
//! the HTTP transport drive them through the type-erased [`ResourceHandler`],
//! which speaks `serde_json::Value` state and reports failures as
//! diagnostics.

use crate::error::{Error, Result};
use crate::provider::{Diagnostics, PROVIDER_TYPE_NAME};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Result of a handler call; failures carry their diagnostics
pub type HandlerResult<T> = std::result::Result<T, Diagnostics>;

// =============================================================================
// Typed Resource
// =============================================================================

/// A managed object type
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// State/config model of one object
    type Model: Serialize + DeserializeOwned + JsonSchema + Clone + PartialEq + Send + Sync;

    /// Suffix appended to the provider type name, e.g. `user`
    fn type_suffix(&self) -> &'static str;

    /// Human readable description used in the schema
    fn description(&self) -> &'static str;

    /// Attribute that identifies an object; the import id is stored here.
    /// Singleton objects have none and cannot be imported.
    fn identity_attribute(&self) -> Option<&'static str>;

    /// Attributes only ever set by the provider
    fn computed_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Attributes never shown in plans or logs
    fn sensitive_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Static checks on a declared model
    fn validate(&self, _model: &Self::Model) -> Diagnostics {
        Diagnostics::new()
    }

    /// Planned state from the prior state and the declared model. The default
    /// takes the declaration as is.
    fn plan(&self, _prior: Option<&Self::Model>, proposed: Self::Model) -> Self::Model {
        proposed
    }

    /// Whether moving from `prior` to `planned` needs delete-then-create
    fn requires_replace(&self, prior: &Self::Model, planned: &Self::Model) -> bool;

    async fn create(&self, planned: Self::Model) -> Result<Self::Model>;

    /// Refresh from the cluster; `None` means the object no longer exists
    async fn read(&self, state: Self::Model) -> Result<Option<Self::Model>>;

    async fn update(&self, prior: Self::Model, planned: Self::Model) -> Result<Self::Model>;

    async fn delete(&self, state: Self::Model) -> Result<()>;

    /// Skeleton model holding only the identity, to be completed by `read`
    fn import(&self, id: &str) -> Result<Self::Model> {
        let attribute = self.identity_attribute().ok_or_else(|| {
            Error::Validation(format!("{} objects cannot be imported", self.type_suffix()))
        })?;
        if id.is_empty() {
            return Err(Error::Validation("import id must not be empty".into()));
        }
        let mut object = serde_json::Map::new();
        object.insert(attribute.to_string(), Value::String(id.to_string()));
        Ok(serde_json::from_value(Value::Object(object))?)
    }
}

// =============================================================================
// Plan Types
// =============================================================================

/// What applying a planned change will do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Create,
    Update,
    Replace,
    Delete,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanAction::Create => write!(f, "create"),
            PlanAction::Update => write!(f, "update in-place"),
            PlanAction::Replace => write!(f, "replace"),
            PlanAction::Delete => write!(f, "destroy"),
            PlanAction::NoOp => write!(f, "no changes"),
        }
    }
}

/// Planned state together with the action it implies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub action: PlanAction,
    pub planned_state: Value,
}

/// Schema description of one resource type
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSchema {
    pub type_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_attribute: Option<String>,
    pub computed_attributes: Vec<String>,
    pub sensitive_attributes: Vec<String>,
    pub attributes: schemars::schema::RootSchema,
}

// =============================================================================
// Type-erased Handler
// =============================================================================

/// Object-safe view of a [`Resource`] over JSON state
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn type_name(&self) -> String;

    fn schema(&self) -> ResourceSchema;

    fn validate(&self, config: &Value) -> Diagnostics;

    fn plan(&self, prior: Option<&Value>, proposed: Value) -> HandlerResult<PlannedChange>;

    async fn create(&self, planned: Value) -> HandlerResult<Value>;

    async fn read(&self, state: Value) -> HandlerResult<Option<Value>>;

    async fn update(&self, prior: Value, planned: Value) -> HandlerResult<Value>;

    async fn delete(&self, state: Value) -> HandlerResult<()>;

    fn import(&self, id: &str) -> HandlerResult<Value>;

    /// Copy of `state` with sensitive attributes masked
    fn redact(&self, state: &Value) -> Value;
}

/// Adapter exposing a typed resource as a [`ResourceHandler`]
pub struct Handler<R: Resource> {
    resource: R,
}

impl<R: Resource> Handler<R> {
    pub fn new(resource: R) -> Self {
        Self { resource }
    }

    fn decode(value: Value) -> HandlerResult<R::Model> {
        serde_json::from_value(value).map_err(|e| Error::from(e).into())
    }

    fn encode(model: &R::Model) -> HandlerResult<Value> {
        serde_json::to_value(model).map_err(|e| Error::from(e).into())
    }
}

#[async_trait]
impl<R: Resource> ResourceHandler for Handler<R> {
    fn type_name(&self) -> String {
        format!("{}_{}", PROVIDER_TYPE_NAME, self.resource.type_suffix())
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema {
            type_name: self.type_name(),
            description: self.resource.description().to_string(),
            identity_attribute: self.resource.identity_attribute().map(str::to_string),
            computed_attributes: to_strings(self.resource.computed_attributes()),
            sensitive_attributes: to_strings(self.resource.sensitive_attributes()),
            attributes: schemars::schema_for!(R::Model),
        }
    }

    fn validate(&self, config: &Value) -> Diagnostics {
        match Self::decode(config.clone()) {
            Ok(model) => self.resource.validate(&model),
            Err(diags) => diags,
        }
    }

    fn plan(&self, prior: Option<&Value>, proposed: Value) -> HandlerResult<PlannedChange> {
        let proposed = Self::decode(proposed)?;
        let diags = self.resource.validate(&proposed);
        if diags.has_error() {
            return Err(diags);
        }

        let prior = prior.cloned().map(Self::decode).transpose()?;
        let planned = self.resource.plan(prior.as_ref(), proposed);

        let action = match &prior {
            None => PlanAction::Create,
            Some(prior) if self.resource.requires_replace(prior, &planned) => PlanAction::Replace,
            Some(prior) if *prior == planned => PlanAction::NoOp,
            Some(_) => PlanAction::Update,
        };
        debug!(resource = %self.type_name(), %action, "planned");

        Ok(PlannedChange {
            action,
            planned_state: Self::encode(&planned)?,
        })
    }

    async fn create(&self, planned: Value) -> HandlerResult<Value> {
        let planned = Self::decode(planned)?;
        let created = self.resource.create(planned).await?;
        Self::encode(&created)
    }

    async fn read(&self, state: Value) -> HandlerResult<Option<Value>> {
        let state = Self::decode(state)?;
        match self.resource.read(state).await? {
            Some(model) => Ok(Some(Self::encode(&model)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, prior: Value, planned: Value) -> HandlerResult<Value> {
        let prior = Self::decode(prior)?;
        let planned = Self::decode(planned)?;
        let updated = self.resource.update(prior, planned).await?;
        Self::encode(&updated)
    }

    async fn delete(&self, state: Value) -> HandlerResult<()> {
        let state = Self::decode(state)?;
        self.resource.delete(state).await?;
        Ok(())
    }

    fn import(&self, id: &str) -> HandlerResult<Value> {
        let model = self.resource.import(id)?;
        Self::encode(&model)
    }

    fn redact(&self, state: &Value) -> Value {
        let mut redacted = state.clone();
        if let Value::Object(map) = &mut redacted {
            for attr in self.resource.sensitive_attributes() {
                if let Some(value) = map.get_mut(*attr) {
                    if !value.is_null() {
                        *value = Value::String("(sensitive value)".into());
                    }
                }
            }
        }
        redacted
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
