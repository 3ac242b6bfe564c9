//! HTTP surface over the core services
//!
//! Authentication happens upstream; the trusted actor id arrives in the
//! `x-actor-id` header.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Entitlement, GrantSpec, ModuleDefinition, ModuleGrant};
use crate::workflow::{Taxonomy, TransitionPayload, WorkflowItem, WorkflowStatus};
use crate::AppState;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Actor id taken from the trusted identity header
pub struct ActorId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let value = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| AppError::BadRequest(format!("Missing {} header", ACTOR_HEADER)))?;
        let id = value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<Uuid>().ok())
            .ok_or_else(|| AppError::BadRequest(format!("Invalid {} header", ACTOR_HEADER)))?;
        Ok(ActorId(id))
    }
}

#[derive(Debug, Deserialize)]
pub struct AccessRequest {
    pub target_actor_id: Uuid,
    pub module_key: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub tenant_id: Uuid,
    pub module_key: String,
    pub taxonomy: Taxonomy,
    #[serde(default = "empty_details")]
    pub details: serde_json::Value,
}

fn empty_details() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub target_status: WorkflowStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DefineModuleRequest {
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub default_category: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/entitlements", get(entitlements))
        .route("/access", post(grant_access).delete(revoke_access))
        .route("/workflow-items", post(create_item))
        .route("/workflow-items/:id", get(get_item).delete(delete_item))
        .route("/workflow-items/:id/transition", post(transition))
        .route("/modules", post(define_module))
        .route("/modules/:key", delete(remove_module))
        .route("/tenants/:id/grants/:key", put(set_grant))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn entitlements(
    State(state): State<Arc<AppState>>,
    ActorId(actor_id): ActorId,
) -> Result<Json<Vec<Entitlement>>> {
    let entitlements = state.entitlements.resolve_or_empty(actor_id).await?;
    Ok(Json(entitlements))
}

async fn grant_access(
    State(state): State<Arc<AppState>>,
    ActorId(actor_id): ActorId,
    Json(req): Json<AccessRequest>,
) -> Result<StatusCode> {
    state
        .delegation
        .grant_user_access(actor_id, req.target_actor_id, &req.module_key)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revoke_access(
    State(state): State<Arc<AppState>>,
    ActorId(actor_id): ActorId,
    Json(req): Json<AccessRequest>,
) -> Result<StatusCode> {
    state
        .delegation
        .revoke_user_access(actor_id, req.target_actor_id, &req.module_key)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_item(
    State(state): State<Arc<AppState>>,
    ActorId(actor_id): ActorId,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<WorkflowItem>)> {
    let item = state
        .workflow
        .create_item(actor_id, req.tenant_id, &req.module_key, req.taxonomy, req.details)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_item(
    State(state): State<Arc<AppState>>,
    ActorId(actor_id): ActorId,
    Path(item_id): Path<Uuid>,
) -> Result<Json<WorkflowItem>> {
    let item = state.workflow.get_item(actor_id, item_id).await?;
    Ok(Json(item))
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    ActorId(actor_id): ActorId,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.workflow.delete_item(actor_id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn transition(
    State(state): State<Arc<AppState>>,
    ActorId(actor_id): ActorId,
    Path(item_id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<WorkflowItem>> {
    let payload = TransitionPayload { reason: req.reason };
    let item = state
        .workflow
        .transition(actor_id, item_id, req.target_status, payload)
        .await?;
    Ok(Json(item))
}

async fn define_module(
    State(state): State<Arc<AppState>>,
    ActorId(actor_id): ActorId,
    Json(req): Json<DefineModuleRequest>,
) -> Result<(StatusCode, Json<ModuleDefinition>)> {
    let definition = state
        .admin
        .define_module(
            actor_id,
            &req.key,
            &req.display_name,
            req.default_category.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

async fn remove_module(
    State(state): State<Arc<AppState>>,
    ActorId(actor_id): ActorId,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    state.admin.remove_module(actor_id, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_grant(
    State(state): State<Arc<AppState>>,
    ActorId(actor_id): ActorId,
    Path((tenant_id, module_key)): Path<(Uuid, String)>,
    Json(spec): Json<GrantSpec>,
) -> Result<Json<ModuleGrant>> {
    let grant = state
        .admin
        .set_module_grant(actor_id, tenant_id, &module_key, spec)
        .await?;
    Ok(Json(grant))
}
