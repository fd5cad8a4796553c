//! REST API Handlers
//!
//! Exposes the per-resource provider operations (validate, plan, create,
//! read, update, delete, import) as JSON endpoints, plus schema, health and
//! metrics.

use crate::domain::capability::server_major_version;
use crate::error::Error;
use crate::provider::{Diagnostics, PlanAction, Provider, ResourceHandler, ResourceSchema};
use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub config: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    #[serde(default)]
    pub prior_state: Option<Value>,
    pub proposed_state: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub planned_state: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    pub current_state: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub prior_state: Value,
    pub planned_state: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub prior_state: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub id: String,
}

/// Result of any resource operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<PlanAction>,
    /// New state; null after a delete or when the object is gone
    pub state: Option<Value>,
    pub diagnostics: Diagnostics,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub diagnostics: Diagnostics,
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    provider: Arc<Provider>,
}

impl RestRouter {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            provider: self.provider,
        };

        Router::new()
            .route("/v1/schema", get(get_schema))
            .route("/v1/resources/:type/validate", post(validate_resource))
            .route("/v1/resources/:type/plan", post(plan_resource))
            .route("/v1/resources/:type/create", post(create_resource))
            .route("/v1/resources/:type/read", post(read_resource))
            .route("/v1/resources/:type/update", post(update_resource))
            .route("/v1/resources/:type/delete", post(delete_resource))
            .route("/v1/resources/:type/import", post(import_resource))
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics))
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    provider: Arc<Provider>,
}

impl AppState {
    fn handler(&self, resource_type: &str) -> Result<Arc<dyn ResourceHandler>, Response> {
        self.provider
            .resource(resource_type)
            .map_err(|e| failure(StatusCode::NOT_FOUND, "unknown_resource_type", e.into()))
    }
}

fn failure(status: StatusCode, error: &str, diagnostics: Diagnostics) -> Response {
    (
        status,
        Json(ApiErrorResponse {
            error: error.to_string(),
            diagnostics,
        }),
    )
        .into_response()
}

fn operation_failed(diagnostics: Diagnostics) -> Response {
    warn!(diagnostics = diagnostics.len(), "resource operation failed");
    failure(StatusCode::UNPROCESSABLE_ENTITY, "operation_failed", diagnostics)
}

fn respond(state: Option<Value>) -> Response {
    (
        StatusCode::OK,
        Json(ResourceResponse {
            state,
            ..Default::default()
        }),
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

async fn get_schema(State(state): State<AppState>) -> Json<Vec<ResourceSchema>> {
    Json(state.provider.schemas())
}

async fn validate_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    Json(request): Json<ValidateRequest>,
) -> Response {
    let handler = match state.handler(&resource_type) {
        Ok(h) => h,
        Err(response) => return response,
    };
    let diagnostics = handler.validate(&request.config);
    let status = if diagnostics.has_error() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(ResourceResponse {
            diagnostics,
            ..Default::default()
        }),
    )
        .into_response()
}

async fn plan_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    Json(request): Json<PlanRequest>,
) -> Response {
    let handler = match state.handler(&resource_type) {
        Ok(h) => h,
        Err(response) => return response,
    };
    match handler.plan(request.prior_state.as_ref(), request.proposed_state) {
        Ok(change) => {
            debug!(%resource_type, action = %change.action, "planned via api");
            (
                StatusCode::OK,
                Json(ResourceResponse {
                    action: Some(change.action),
                    state: Some(change.planned_state),
                    diagnostics: Diagnostics::new(),
                }),
            )
                .into_response()
        }
        Err(diags) => operation_failed(diags),
    }
}

async fn create_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    Json(request): Json<CreateRequest>,
) -> Response {
    let handler = match state.handler(&resource_type) {
        Ok(h) => h,
        Err(response) => return response,
    };
    match handler.create(request.planned_state).await {
        Ok(new_state) => respond(Some(new_state)),
        Err(diags) => operation_failed(diags),
    }
}

async fn read_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    Json(request): Json<ReadRequest>,
) -> Response {
    let handler = match state.handler(&resource_type) {
        Ok(h) => h,
        Err(response) => return response,
    };
    match handler.read(request.current_state).await {
        Ok(new_state) => respond(new_state),
        Err(diags) => operation_failed(diags),
    }
}

async fn update_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    Json(request): Json<UpdateRequest>,
) -> Response {
    let handler = match state.handler(&resource_type) {
        Ok(h) => h,
        Err(response) => return response,
    };
    match handler.update(request.prior_state, request.planned_state).await {
        Ok(new_state) => respond(Some(new_state)),
        Err(diags) => operation_failed(diags),
    }
}

async fn delete_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    Json(request): Json<DeleteRequest>,
) -> Response {
    let handler = match state.handler(&resource_type) {
        Ok(h) => h,
        Err(response) => return response,
    };
    match handler.delete(request.prior_state).await {
        Ok(()) => respond(None),
        Err(diags) => operation_failed(diags),
    }
}

async fn import_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    Json(request): Json<ImportRequest>,
) -> Response {
    let handler = match state.handler(&resource_type) {
        Ok(h) => h,
        Err(response) => return response,
    };
    let skeleton = match handler.import(&request.id) {
        Ok(skeleton) => skeleton,
        Err(diags) => return operation_failed(diags),
    };
    match handler.read(skeleton).await {
        Ok(Some(imported)) => respond(Some(imported)),
        Ok(None) => failure(
            StatusCode::NOT_FOUND,
            "not_found",
            Error::ResourceNotFound {
                kind: resource_type,
                name: request.id,
            }
            .into(),
        ),
        Err(diags) => operation_failed(diags),
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check; the cluster must answer a build query
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match server_major_version(state.provider.client().as_ref()).await {
        Ok(_) => (StatusCode::OK, "ready".to_string()),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.provider.metrics().render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, "metrics_failed", e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::MemoryCluster;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn router() -> (Arc<MemoryCluster>, Router) {
        let cluster = Arc::new(MemoryCluster::new());
        let provider = Arc::new(Provider::with_client(cluster.clone()));
        (cluster, RestRouter::new(provider).build())
    }

    async fn post_json(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_create_and_read_user() {
        let (cluster, router) = router();
        let user = json!({"user_name": "api", "password": "pw", "roles": ["read"]});

        let (status, body) = post_json(
            router.clone(),
            "/v1/resources/aerospike_user/create",
            json!({"plannedState": user}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["user_name"], "api");
        assert!(cluster.user("api").is_some());

        let (status, body) = post_json(
            router,
            "/v1/resources/aerospike_user/read",
            json!({"currentState": user}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["roles"], json!(["read"]));
    }

    #[tokio::test]
    async fn test_plan_reports_action() {
        let (_cluster, router) = router();
        let (status, body) = post_json(
            router,
            "/v1/resources/aerospike_role/plan",
            json!({
                "priorState": {"role_name": "r1"},
                "proposedState": {"role_name": "r2"},
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"], "replace");
    }

    #[tokio::test]
    async fn test_failures_carry_diagnostics() {
        let (_cluster, router) = router();
        let (status, body) = post_json(
            router.clone(),
            "/v1/resources/aerospike_user/validate",
            json!({"config": {"user_name": "", "password": "pw"}}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["diagnostics"][0]["attribute"], "user_name");

        let (status, body) = post_json(
            router,
            "/v1/resources/aerospike_index/create",
            json!({"plannedState": {}}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_resource_type");
    }

    #[tokio::test]
    async fn test_import_missing_user() {
        let (_cluster, router) = router();
        let (status, body) = post_json(
            router,
            "/v1/resources/aerospike_user/import",
            json!({"id": "ghost"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["diagnostics"][0]["summary"], "Resource not found");
    }

    #[tokio::test]
    async fn test_health_ready_metrics() {
        let (_cluster, router) = router();
        for uri in ["/health", "/ready", "/metrics"] {
            let response = router
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        }

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("aerospike_provider_commands_total"));
    }
}
