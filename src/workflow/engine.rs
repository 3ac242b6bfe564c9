//! Workflow engine: creation, role-gated transitions and audit stamping

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::item::{TransitionPayload, TransitionStamp, WorkflowItem};
use super::taxonomy::{Taxonomy, WorkflowStatus};
use crate::entitlement::EntitlementResolver;
use crate::error::{AppError, Result};
use crate::identity::{resolve_actor, ActorProfile};
use crate::store::Store;

/// Events emitted by the workflow engine after a committed change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// An item reached a new status
    Transition {
        item_id: Uuid,
        new_status: WorkflowStatus,
        recipients: Vec<Uuid>,
    },
}

/// Engine for creating and transitioning workflow items
pub struct WorkflowEngine {
    store: Store,
    entitlements: Arc<EntitlementResolver>,
    event_tx: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowEngine {
    pub fn new(store: Store, entitlements: Arc<EntitlementResolver>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            store,
            entitlements,
            event_tx,
        }
    }

    /// Subscribe to workflow events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    /// Create an item in its taxonomy's initial status.
    ///
    /// The creator must belong to `tenant_id` and be entitled to `module_key`.
    pub async fn create_item(
        &self,
        creator_id: Uuid,
        tenant_id: Uuid,
        module_key: &str,
        taxonomy: Taxonomy,
        details: serde_json::Value,
    ) -> Result<WorkflowItem> {
        let creator = resolve_actor(&self.store, creator_id).await?;
        self.ensure_access(&creator, tenant_id, module_key).await?;

        let item = WorkflowItem::new(tenant_id, module_key, taxonomy, creator_id, details);
        self.store.insert_workflow_item(&item).await?;

        tracing::info!(
            item_id = %item.id,
            creator_id = %creator_id,
            %tenant_id,
            module_key,
            taxonomy = taxonomy.as_str(),
            "created workflow item"
        );
        Ok(item)
    }

    /// Read an item, subject to the same visibility rule as creation
    pub async fn get_item(&self, actor_id: Uuid, item_id: Uuid) -> Result<WorkflowItem> {
        let actor = resolve_actor(&self.store, actor_id).await?;
        let item = self.store.get_workflow_item(item_id).await?;
        self.ensure_access(&actor, item.tenant_id, &item.module_key)
            .await?;
        Ok(item)
    }

    /// Move an item to `target`.
    ///
    /// Only managers of the item's tenant (or system admins) entitled to its
    /// module may decide. The status check and the write are one
    /// compare-and-set, so of two racing calls exactly one succeeds; the other
    /// gets `InvalidTransition` and the item keeps the winner's audit stamp.
    pub async fn transition(
        &self,
        actor_id: Uuid,
        item_id: Uuid,
        target: WorkflowStatus,
        payload: TransitionPayload,
    ) -> Result<WorkflowItem> {
        let actor = resolve_actor(&self.store, actor_id).await?;
        let item = self.store.get_workflow_item(item_id).await?;

        self.ensure_access(&actor, item.tenant_id, &item.module_key)
            .await?;
        if !actor.manages_tenant(item.tenant_id) {
            return Err(AppError::denied("only managers may decide workflow items"));
        }

        if !item.taxonomy.allows(item.status, target) {
            tracing::debug!(
                item_id = %item_id,
                current = %item.status,
                target = %target,
                "transition not in table"
            );
            return Err(AppError::InvalidTransition {
                current: item.status,
            });
        }

        let stamp = TransitionStamp::new(item.status, target, actor_id, payload);
        if !self.store.apply_transition(item_id, &stamp).await? {
            // Lost the race: report what the winner left behind
            let current = self.store.get_workflow_item(item_id).await?.status;
            tracing::debug!(item_id = %item_id, %current, "concurrent transition won");
            return Err(AppError::InvalidTransition { current });
        }

        let updated = WorkflowItem {
            status: stamp.to,
            resolved_by: Some(stamp.actor_id),
            resolved_at: Some(stamp.at),
            rejection_reason: stamp.rejection_reason.clone(),
            ..item
        };

        tracing::info!(
            item_id = %item_id,
            actor_id = %actor_id,
            from = %stamp.from,
            to = %stamp.to,
            "workflow transition"
        );

        let _ = self.event_tx.send(WorkflowEvent::Transition {
            item_id,
            new_status: updated.status,
            recipients: recipients(&updated, actor_id),
        });

        Ok(updated)
    }

    /// Hard delete; requires tenant-manager authority
    pub async fn delete_item(&self, actor_id: Uuid, item_id: Uuid) -> Result<()> {
        let actor = resolve_actor(&self.store, actor_id).await?;
        let item = self.store.get_workflow_item(item_id).await?;

        if !actor.manages_tenant(item.tenant_id) {
            return Err(AppError::denied("only managers may delete workflow items"));
        }

        if !self.store.delete_workflow_item(item_id).await? {
            return Err(AppError::NotFound(format!(
                "Workflow item {} not found",
                item_id
            )));
        }

        tracing::info!(item_id = %item_id, actor_id = %actor_id, "deleted workflow item");
        Ok(())
    }

    async fn ensure_access(
        &self,
        actor: &ActorProfile,
        tenant_id: Uuid,
        module_key: &str,
    ) -> Result<()> {
        if !actor.belongs_to(tenant_id) {
            return Err(AppError::denied("actor is outside the item's tenant"));
        }
        if !self.entitlements.is_entitled(actor, module_key).await? {
            return Err(AppError::denied("actor is not entitled to module"));
        }
        Ok(())
    }
}

/// The creator hears about decisions on their item, unless they made it
fn recipients(item: &WorkflowItem, actor_id: Uuid) -> Vec<Uuid> {
    if item.creator_id == actor_id {
        Vec::new()
    } else {
        vec![item.creator_id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::DelegationLayer;
    use crate::models::{GrantSpec, Role};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Duration;

    struct Fixture {
        store: Store,
        engine: Arc<WorkflowEngine>,
        tenant: Uuid,
        manager: Uuid,
        employee: Uuid,
    }

    async fn setup() -> Fixture {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        let store = Store::new(pool);
        store.migrate().await.expect("Failed to run migrations");

        let tenant = store.create_tenant("Acme").await.unwrap();
        let manager = store
            .create_actor(Role::CompanyManager, Some(tenant.id), true)
            .await
            .unwrap();
        let employee = store
            .create_actor(Role::Employee, Some(tenant.id), true)
            .await
            .unwrap();
        for key in ["inspections", "actions"] {
            store.create_module_definition(key, key, None).await.unwrap();
            store
                .upsert_module_grant(tenant.id, key, &GrantSpec::indefinite())
                .await
                .unwrap();
        }

        let entitlements = Arc::new(EntitlementResolver::new(
            store.clone(),
            Duration::from_secs(60),
        ));
        let delegation = DelegationLayer::new(store.clone(), entitlements.clone());
        for key in ["inspections", "actions"] {
            delegation
                .grant_user_access(manager.id, employee.id, key)
                .await
                .unwrap();
        }

        let engine = Arc::new(WorkflowEngine::new(store.clone(), entitlements));
        Fixture {
            store,
            engine,
            tenant: tenant.id,
            manager: manager.id,
            employee: employee.id,
        }
    }

    async fn pending_item(f: &Fixture) -> WorkflowItem {
        f.engine
            .create_item(
                f.employee,
                f.tenant,
                "inspections",
                Taxonomy::Review,
                serde_json::json!({"form": "hazmat"}),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_employee_creates_pending_item() {
        let f = setup().await;
        let item = pending_item(&f).await;
        assert_eq!(item.status, WorkflowStatus::Pending);
        assert_eq!(item.creator_id, f.employee);
    }

    #[tokio::test]
    async fn test_create_requires_module_entitlement() {
        let f = setup().await;
        f.store
            .create_module_definition("permits", "Permits", None)
            .await
            .unwrap();
        let result = f
            .engine
            .create_item(
                f.employee,
                f.tenant,
                "permits",
                Taxonomy::Review,
                serde_json::json!({}),
            )
            .await;
        assert!(matches!(result.unwrap_err(), AppError::PolicyViolation));
    }

    #[tokio::test]
    async fn test_create_in_foreign_tenant_is_rejected() {
        let f = setup().await;
        let other = f.store.create_tenant("Other").await.unwrap();
        let result = f
            .engine
            .create_item(
                f.manager,
                other.id,
                "inspections",
                Taxonomy::Review,
                serde_json::json!({}),
            )
            .await;
        assert!(matches!(result.unwrap_err(), AppError::PolicyViolation));
    }

    #[tokio::test]
    async fn test_creator_cannot_self_approve() {
        let f = setup().await;
        let item = pending_item(&f).await;

        let result = f
            .engine
            .transition(
                f.employee,
                item.id,
                WorkflowStatus::Approved,
                TransitionPayload::default(),
            )
            .await;
        assert!(matches!(result.unwrap_err(), AppError::PolicyViolation));

        let approved = f
            .engine
            .transition(
                f.manager,
                item.id,
                WorkflowStatus::Approved,
                TransitionPayload::default(),
            )
            .await
            .unwrap();
        assert_eq!(approved.status, WorkflowStatus::Approved);
        assert_eq!(approved.approver_id(), Some(f.manager));
        assert!(approved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_second_transition_is_invalid_and_keeps_stamp() {
        let f = setup().await;
        let item = pending_item(&f).await;

        f.engine
            .transition(
                f.manager,
                item.id,
                WorkflowStatus::Approved,
                TransitionPayload::default(),
            )
            .await
            .unwrap();
        let first = f.store.get_workflow_item(item.id).await.unwrap();

        let result = f
            .engine
            .transition(
                f.manager,
                item.id,
                WorkflowStatus::Approved,
                TransitionPayload::default(),
            )
            .await;
        match result.unwrap_err() {
            AppError::InvalidTransition { current } => {
                assert_eq!(current, WorkflowStatus::Approved)
            }
            other => panic!("Expected InvalidTransition, got {:?}", other),
        }

        let after = f.store.get_workflow_item(item.id).await.unwrap();
        assert_eq!(after.resolved_by, first.resolved_by);
        assert_eq!(after.resolved_at, first.resolved_at);
    }

    #[tokio::test]
    async fn test_reject_with_and_without_reason() {
        let f = setup().await;

        let item = pending_item(&f).await;
        let rejected = f
            .engine
            .transition(
                f.manager,
                item.id,
                WorkflowStatus::Rejected,
                TransitionPayload::with_reason("Missing gas test results"),
            )
            .await
            .unwrap();
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("Missing gas test results")
        );

        let item = pending_item(&f).await;
        let rejected = f
            .engine
            .transition(
                f.manager,
                item.id,
                WorkflowStatus::Rejected,
                TransitionPayload::default(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, WorkflowStatus::Rejected);
        assert!(rejected.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn test_cross_taxonomy_target_is_invalid() {
        let f = setup().await;
        let item = pending_item(&f).await;
        let result = f
            .engine
            .transition(
                f.manager,
                item.id,
                WorkflowStatus::Closed,
                TransitionPayload::default(),
            )
            .await;
        assert!(matches!(
            result.unwrap_err(),
            AppError::InvalidTransition {
                current: WorkflowStatus::Pending
            }
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_close_has_no_reopen() {
        let f = setup().await;
        let item = f
            .engine
            .create_item(
                f.employee,
                f.tenant,
                "actions",
                Taxonomy::Lifecycle,
                serde_json::json!({"title": "Fix valve"}),
            )
            .await
            .unwrap();
        assert_eq!(item.status, WorkflowStatus::Open);

        let closed = f
            .engine
            .transition(
                f.manager,
                item.id,
                WorkflowStatus::Closed,
                TransitionPayload::default(),
            )
            .await
            .unwrap();
        assert_eq!(closed.closer_id(), Some(f.manager));

        let result = f
            .engine
            .transition(
                f.manager,
                item.id,
                WorkflowStatus::Open,
                TransitionPayload::default(),
            )
            .await;
        assert!(matches!(
            result.unwrap_err(),
            AppError::InvalidTransition {
                current: WorkflowStatus::Closed
            }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_approve_and_reject() {
        let f = setup().await;
        let admin = f
            .store
            .create_actor(Role::SystemAdmin, None, true)
            .await
            .unwrap();
        let item = pending_item(&f).await;

        let approve = f.engine.transition(
            f.manager,
            item.id,
            WorkflowStatus::Approved,
            TransitionPayload::default(),
        );
        let reject = f.engine.transition(
            admin.id,
            item.id,
            WorkflowStatus::Rejected,
            TransitionPayload::with_reason("duplicate"),
        );
        let (a, r) = tokio::join!(approve, reject);

        assert_eq!(a.is_ok() as u8 + r.is_ok() as u8, 1);
        let winner = if a.is_ok() { f.manager } else { admin.id };
        let loser = if a.is_ok() { r } else { a };
        assert!(matches!(
            loser.unwrap_err(),
            AppError::InvalidTransition { .. }
        ));

        let stored = f.store.get_workflow_item(item.id).await.unwrap();
        assert!(stored.status.is_terminal());
        assert_eq!(stored.resolved_by, Some(winner));
        assert!(stored.resolved_at.is_some());
        assert_eq!(
            stored.rejection_reason.is_some(),
            stored.status == WorkflowStatus::Rejected
        );
        if stored.status == WorkflowStatus::Rejected {
            assert_eq!(stored.rejection_reason.as_deref(), Some("duplicate"));
            assert_eq!(winner, admin.id);
        } else {
            assert_eq!(winner, f.manager);
        }
    }

    #[tokio::test]
    async fn test_transition_emits_event() {
        let f = setup().await;
        let mut rx = f.engine.subscribe();
        let item = pending_item(&f).await;

        f.engine
            .transition(
                f.manager,
                item.id,
                WorkflowStatus::Approved,
                TransitionPayload::default(),
            )
            .await
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            WorkflowEvent::Transition {
                item_id: item.id,
                new_status: WorkflowStatus::Approved,
                recipients: vec![f.employee],
            }
        );
    }

    #[tokio::test]
    async fn test_failed_transition_emits_nothing() {
        let f = setup().await;
        let mut rx = f.engine.subscribe();
        let item = pending_item(&f).await;

        let _ = f
            .engine
            .transition(
                f.employee,
                item.id,
                WorkflowStatus::Approved,
                TransitionPayload::default(),
            )
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_event_serialization() {
        let event = WorkflowEvent::Transition {
            item_id: Uuid::nil(),
            new_status: WorkflowStatus::Closed,
            recipients: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "transition");
        assert_eq!(json["new_status"], "closed");
    }

    #[tokio::test]
    async fn test_delete_requires_manager() {
        let f = setup().await;
        let item = pending_item(&f).await;

        let result = f.engine.delete_item(f.employee, item.id).await;
        assert!(matches!(result.unwrap_err(), AppError::PolicyViolation));

        f.engine.delete_item(f.manager, item.id).await.unwrap();
        let result = f.engine.get_item(f.manager, item.id).await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_transition_unknown_item() {
        let f = setup().await;
        let result = f
            .engine
            .transition(
                f.manager,
                Uuid::new_v4(),
                WorkflowStatus::Approved,
                TransitionPayload::default(),
            )
            .await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_inactive_actor_propagates() {
        let f = setup().await;
        let item = pending_item(&f).await;
        f.store.set_actor_active(f.manager, false).await.unwrap();

        let result = f
            .engine
            .transition(
                f.manager,
                item.id,
                WorkflowStatus::Approved,
                TransitionPayload::default(),
            )
            .await;
        assert!(matches!(result.unwrap_err(), AppError::Inactive));
    }
}
