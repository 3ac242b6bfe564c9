//! Catalog, grant and tenancy administration

use std::sync::Arc;

use uuid::Uuid;

use crate::entitlement::EntitlementResolver;
use crate::error::{AppError, Result};
use crate::identity::{resolve_actor, ActorProfile};
use crate::models::{GrantSpec, ModuleDefinition, ModuleGrant, Role, Subcontractor};
use crate::store::Store;

pub struct Administration {
    store: Store,
    entitlements: Arc<EntitlementResolver>,
}

impl Administration {
    pub fn new(store: Store, entitlements: Arc<EntitlementResolver>) -> Self {
        Self {
            store,
            entitlements,
        }
    }

    /// Add a module to the global catalog
    pub async fn define_module(
        &self,
        actor_id: Uuid,
        key: &str,
        display_name: &str,
        default_category: Option<&str>,
    ) -> Result<ModuleDefinition> {
        self.require_admin(actor_id).await?;

        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::BadRequest("Module key must not be empty".into()));
        }
        if self.store.get_module_definition(key).await?.is_some() {
            return Err(AppError::BadRequest(format!("Module {} already exists", key)));
        }

        let definition = self
            .store
            .create_module_definition(key, display_name, default_category)
            .await?;
        self.entitlements.invalidate_all().await;

        tracing::info!(actor_id = %actor_id, module_key = key, "defined module");
        Ok(definition)
    }

    /// Drop a module with all of its grants and per-user rows
    pub async fn remove_module(&self, actor_id: Uuid, key: &str) -> Result<()> {
        self.require_admin(actor_id).await?;

        if !self.store.delete_module_definition(key).await? {
            return Err(AppError::NotFound(format!("Module {} not found", key)));
        }
        self.entitlements.invalidate_all().await;

        tracing::info!(actor_id = %actor_id, module_key = key, "removed module");
        Ok(())
    }

    /// Create or replace a tenant's grant for `module_key`
    pub async fn set_module_grant(
        &self,
        actor_id: Uuid,
        tenant_id: Uuid,
        module_key: &str,
        spec: GrantSpec,
    ) -> Result<ModuleGrant> {
        let actor = resolve_actor(&self.store, actor_id).await?;
        if !actor.manages_tenant(tenant_id) {
            return Err(AppError::denied("actor does not manage tenant"));
        }

        // Surfaces NotFound for unknown tenants
        self.store.get_tenant(tenant_id).await?;
        if self.store.get_module_definition(module_key).await?.is_none() {
            return Err(AppError::NotFound(format!("Module {} not found", module_key)));
        }
        let grant = self
            .store
            .upsert_module_grant(tenant_id, module_key, &spec)
            .await?;
        self.entitlements.invalidate_all().await;

        tracing::info!(
            actor_id = %actor_id,
            %tenant_id,
            module_key,
            is_active = grant.is_active,
            indefinite = grant.indefinite,
            "set module grant"
        );
        Ok(grant)
    }

    /// Attach a subcontractor to `parent_tenant_id`, managed by `linked_actor_id`
    pub async fn register_subcontractor(
        &self,
        actor_id: Uuid,
        parent_tenant_id: Uuid,
        linked_actor_id: Uuid,
        name: &str,
    ) -> Result<Subcontractor> {
        let actor = resolve_actor(&self.store, actor_id).await?;
        if !actor.manages_tenant(parent_tenant_id) {
            return Err(AppError::denied("actor does not manage parent tenant"));
        }

        self.store.get_tenant(parent_tenant_id).await?;
        let linked = self.store.get_actor(linked_actor_id).await?;
        if linked.role != Role::SubcontractorManager {
            return Err(AppError::BadRequest(format!(
                "Actor {} is not a subcontractor manager",
                linked_actor_id
            )));
        }
        if linked.tenant_id != Some(parent_tenant_id) {
            return Err(AppError::denied("linked actor belongs to another tenant"));
        }
        if self
            .store
            .find_subcontractor_by_actor(linked_actor_id)
            .await?
            .is_some()
        {
            return Err(AppError::BadRequest(format!(
                "Actor {} already manages a subcontractor",
                linked_actor_id
            )));
        }

        let subcontractor = self
            .store
            .create_subcontractor(parent_tenant_id, linked_actor_id, name)
            .await?;
        self.entitlements.invalidate(linked_actor_id).await;

        tracing::info!(
            actor_id = %actor_id,
            subcontractor_id = %subcontractor.id,
            %parent_tenant_id,
            "registered subcontractor"
        );
        Ok(subcontractor)
    }

    pub async fn set_subcontractor_active(
        &self,
        actor_id: Uuid,
        subcontractor_id: Uuid,
        active: bool,
    ) -> Result<()> {
        let actor = resolve_actor(&self.store, actor_id).await?;
        let subcontractor = self.store.get_subcontractor(subcontractor_id).await?;
        if !actor.manages_tenant(subcontractor.parent_tenant_id) {
            return Err(AppError::denied("actor does not manage parent tenant"));
        }

        self.store
            .set_subcontractor_active(subcontractor_id, active)
            .await?;
        self.entitlements
            .invalidate(subcontractor.linked_actor_id)
            .await;

        tracing::info!(
            actor_id = %actor_id,
            %subcontractor_id,
            active,
            "set subcontractor active"
        );
        Ok(())
    }

    pub async fn set_tenant_active(&self, actor_id: Uuid, tenant_id: Uuid, active: bool) -> Result<()> {
        self.require_admin(actor_id).await?;

        self.store.set_tenant_active(tenant_id, active).await?;
        self.entitlements.invalidate_all().await;

        tracing::info!(actor_id = %actor_id, %tenant_id, active, "set tenant active");
        Ok(())
    }

    async fn require_admin(&self, actor_id: Uuid) -> Result<ActorProfile> {
        let actor = resolve_actor(&self.store, actor_id).await?;
        if actor.role != Role::SystemAdmin {
            return Err(AppError::denied("system admin required"));
        }
        Ok(actor)
    }
}
