//! Identity and tenancy resolution
//!
//! Turns a trusted actor id into the role and tenant placement that every
//! policy decision is made against. Subcontractor managers are resolved to
//! their parent tenant, since subcontractors hold no grants of their own.

use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Role;
use crate::store::Store;

/// Resolved view of an actor for policy decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorProfile {
    pub actor_id: Uuid,
    pub role: Role,
    /// Tenant stored on the actor's profile
    pub home_tenant_id: Option<Uuid>,
    /// Tenant whose grants apply; the parent tenant for subcontractor managers
    pub effective_tenant_id: Option<Uuid>,
    /// Set for subcontractor managers
    pub subcontractor_id: Option<Uuid>,
    pub is_active: bool,
    pub profile_complete: bool,
}

impl ActorProfile {
    /// Whether the actor acts for `tenant_id` with tenant-manager authority
    pub fn manages_tenant(&self, tenant_id: Uuid) -> bool {
        match self.role {
            Role::SystemAdmin => true,
            Role::CompanyManager => self.effective_tenant_id == Some(tenant_id),
            _ => false,
        }
    }

    pub fn belongs_to(&self, tenant_id: Uuid) -> bool {
        self.role == Role::SystemAdmin || self.effective_tenant_id == Some(tenant_id)
    }
}

/// Resolve `actor_id` to its profile.
///
/// Fails with `NotFound` for unknown actors (or a subcontractor manager with
/// no subcontractor record) and `Inactive` when the actor, its tenant or its
/// subcontractor has been deactivated, or when a subcontractor manager's
/// subcontractor hangs off a tenant other than their home tenant.
pub async fn resolve_actor(store: &Store, actor_id: Uuid) -> Result<ActorProfile> {
    let actor = store.get_actor(actor_id).await?;
    if !actor.is_active {
        tracing::debug!(%actor_id, "actor is inactive");
        return Err(AppError::Inactive);
    }

    let (effective_tenant_id, subcontractor_id) = match actor.role {
        Role::SystemAdmin => (None, None),
        Role::SubcontractorManager => {
            let sub = store
                .find_subcontractor_by_actor(actor_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("No subcontractor linked to actor {}", actor_id))
                })?;
            if !sub.is_active {
                tracing::debug!(%actor_id, subcontractor_id = %sub.id, "subcontractor is inactive");
                return Err(AppError::Inactive);
            }
            // A subcontractor never carries its manager out of their home tenant
            if actor.tenant_id != Some(sub.parent_tenant_id) {
                tracing::warn!(
                    %actor_id,
                    subcontractor_id = %sub.id,
                    "subcontractor parent differs from actor's home tenant"
                );
                return Err(AppError::Inactive);
            }
            (Some(sub.parent_tenant_id), Some(sub.id))
        }
        Role::CompanyManager | Role::Employee => {
            let tenant_id = actor.tenant_id.ok_or_else(|| {
                AppError::Internal(format!("Actor {} has no home tenant", actor_id))
            })?;
            (Some(tenant_id), None)
        }
    };

    if let Some(tenant_id) = effective_tenant_id {
        let tenant = store.get_tenant(tenant_id).await?;
        if !tenant.is_active {
            tracing::debug!(%actor_id, %tenant_id, "tenant is inactive");
            return Err(AppError::Inactive);
        }
    }

    Ok(ActorProfile {
        actor_id,
        role: actor.role,
        home_tenant_id: actor.tenant_id,
        effective_tenant_id,
        subcontractor_id,
        is_active: actor.is_active,
        profile_complete: actor.profile_complete,
    })
}
