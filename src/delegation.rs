//! Delegation of per-user module access
//!
//! Per-user access rows are layered on top of a tenant's module grants. A
//! subcontractor manager is granted access within its parent tenant, so its
//! visible set can never exceed the parent's effective grants.

use std::sync::Arc;

use uuid::Uuid;

use crate::entitlement::EntitlementResolver;
use crate::error::{AppError, Result};
use crate::identity::{resolve_actor, ActorProfile};
use crate::models::UserModuleAccess;
use crate::store::Store;

/// Grants and revokes per-user module access
pub struct DelegationLayer {
    store: Store,
    entitlements: Arc<EntitlementResolver>,
}

impl DelegationLayer {
    pub fn new(store: Store, entitlements: Arc<EntitlementResolver>) -> Self {
        Self {
            store,
            entitlements,
        }
    }

    /// Give `target_actor_id` access to `module_key` within its effective tenant.
    ///
    /// The module must hold a currently effective grant at that tenant, even
    /// when the granter is a system admin. Granting an existing row is a no-op.
    pub async fn grant_user_access(
        &self,
        granter_id: Uuid,
        target_actor_id: Uuid,
        module_key: &str,
    ) -> Result<()> {
        let (granter, tenant_id) = self.authorize(granter_id, target_actor_id).await?;

        if !self
            .entitlements
            .tenant_has_effective_grant(tenant_id, module_key)
            .await?
        {
            return Err(AppError::denied("module has no effective grant at tenant"));
        }

        self.store
            .insert_user_access(tenant_id, target_actor_id, module_key, granter.actor_id)
            .await?;
        self.entitlements.invalidate(target_actor_id).await;

        tracing::info!(
            granter_id = %granter_id,
            target_actor_id = %target_actor_id,
            %tenant_id,
            module_key,
            "granted user access"
        );
        Ok(())
    }

    /// Remove access. Revoking a row that does not exist is not an error.
    pub async fn revoke_user_access(
        &self,
        granter_id: Uuid,
        target_actor_id: Uuid,
        module_key: &str,
    ) -> Result<()> {
        let (_, tenant_id) = self.authorize(granter_id, target_actor_id).await?;

        let removed = self
            .store
            .delete_user_access(tenant_id, target_actor_id, module_key)
            .await?;
        self.entitlements.invalidate(target_actor_id).await;

        tracing::info!(
            granter_id = %granter_id,
            target_actor_id = %target_actor_id,
            %tenant_id,
            module_key,
            removed,
            "revoked user access"
        );
        Ok(())
    }

    /// Per-user access rows of a tenant, visible to its managers and admins
    pub async fn list_user_access(
        &self,
        requester_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<UserModuleAccess>> {
        let requester = resolve_actor(&self.store, requester_id).await?;
        if !requester.manages_tenant(tenant_id) {
            return Err(AppError::denied("requester does not manage tenant"));
        }
        self.store.list_user_access_for_tenant(tenant_id).await
    }

    /// Check granter authority over the target and return the tenant the
    /// access row is scoped to.
    async fn authorize(
        &self,
        granter_id: Uuid,
        target_actor_id: Uuid,
    ) -> Result<(ActorProfile, Uuid)> {
        let granter = resolve_actor(&self.store, granter_id).await?;
        let target = match resolve_actor(&self.store, target_actor_id).await {
            Ok(target) => target,
            // Deactivated targets can still have their rows managed
            Err(AppError::Inactive) => return self.authorize_inactive(granter, target_actor_id).await,
            Err(e) => return Err(e),
        };

        if !target.role.needs_user_access() {
            return Err(AppError::denied("target role does not take per-user access"));
        }

        let tenant_id = target
            .effective_tenant_id
            .ok_or_else(|| AppError::denied("target has no tenant"))?;

        if !granter.manages_tenant(tenant_id) {
            return Err(AppError::denied("granter does not manage target tenant"));
        }

        Ok((granter, tenant_id))
    }

    async fn authorize_inactive(
        &self,
        granter: ActorProfile,
        target_actor_id: Uuid,
    ) -> Result<(ActorProfile, Uuid)> {
        let target = self.store.get_actor(target_actor_id).await?;
        if !target.role.needs_user_access() {
            return Err(AppError::denied("target role does not take per-user access"));
        }
        let tenant_id = match self.store.find_subcontractor_by_actor(target_actor_id).await? {
            Some(sub) => sub.parent_tenant_id,
            None => target
                .tenant_id
                .ok_or_else(|| AppError::denied("target has no tenant"))?,
        };
        if !granter.manages_tenant(tenant_id) {
            return Err(AppError::denied("granter does not manage target tenant"));
        }
        Ok((granter, tenant_id))
    }
}
