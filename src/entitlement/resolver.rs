//! Role-parameterized entitlement resolver

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::cache::EntitlementCache;
use crate::error::{AppError, Result};
use crate::identity::{resolve_actor, ActorProfile};
use crate::models::{Entitlement, ModuleDefinition, ModuleGrant, Role, DEFAULT_CATEGORY};
use crate::store::Store;

/// Category precedence: grant override, then definition default, then "General".
/// Blank values count as absent.
pub fn resolve_category(category_override: Option<&str>, default_category: Option<&str>) -> String {
    category_override
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .or_else(|| default_category.map(str::trim).filter(|c| !c.is_empty()))
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string()
}

/// Compute an entitlement set from already-loaded data.
///
/// `definitions` must be in insertion order. `user_access` restricts the
/// result to the given keys and is only consulted for roles that need
/// per-user access. The result is grouped by category (sorted
/// lexicographically) and keeps definition order within each category.
pub fn compute_entitlements(
    role: Role,
    definitions: &[ModuleDefinition],
    grants: &[ModuleGrant],
    user_access: &HashSet<String>,
    now: DateTime<Utc>,
) -> Vec<Entitlement> {
    let mut entitlements: Vec<Entitlement> = match role {
        Role::SystemAdmin => definitions
            .iter()
            .map(|def| Entitlement {
                module_key: def.key.clone(),
                display_name: def.display_name.clone(),
                category: resolve_category(None, def.default_category.as_deref()),
            })
            .collect(),
        Role::CompanyManager | Role::Employee | Role::SubcontractorManager => {
            let effective: HashMap<&str, &ModuleGrant> = grants
                .iter()
                .filter(|g| g.is_effective(now))
                .map(|g| (g.module_key.as_str(), g))
                .collect();

            definitions
                .iter()
                .filter_map(|def| {
                    let grant = effective.get(def.key.as_str())?;
                    if role.needs_user_access() && !user_access.contains(&def.key) {
                        return None;
                    }
                    Some(Entitlement {
                        module_key: def.key.clone(),
                        display_name: def.display_name.clone(),
                        category: resolve_category(
                            grant.category_override.as_deref(),
                            def.default_category.as_deref(),
                        ),
                    })
                })
                .collect()
        }
    };

    // Stable sort keeps definition order inside each category
    entitlements.sort_by(|a, b| a.category.cmp(&b.category));
    entitlements
}

/// Resolves entitlements for actors, caching results per actor
pub struct EntitlementResolver {
    store: Store,
    cache: EntitlementCache,
}

impl EntitlementResolver {
    pub fn new(store: Store, ttl: Duration) -> Self {
        Self {
            store,
            cache: EntitlementCache::new(ttl),
        }
    }

    pub fn staleness_bound(&self) -> Duration {
        self.cache.ttl()
    }

    /// Resolve the entitlement set of `actor_id`.
    ///
    /// Identity failures (`NotFound`, `Inactive`) propagate unchanged.
    pub async fn resolve_entitlements(&self, actor_id: Uuid) -> Result<Vec<Entitlement>> {
        let profile = resolve_actor(&self.store, actor_id).await?;
        self.entitlements_for(&profile).await
    }

    /// Like [`resolve_entitlements`](Self::resolve_entitlements) but maps an
    /// inactive actor or tenant to an empty set.
    pub async fn resolve_or_empty(&self, actor_id: Uuid) -> Result<Vec<Entitlement>> {
        match self.resolve_entitlements(actor_id).await {
            Err(AppError::Inactive) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Entitlements for an already-resolved profile, served from cache when fresh
    pub async fn entitlements_for(&self, profile: &ActorProfile) -> Result<Vec<Entitlement>> {
        if let Some(cached) = self.cache.get(profile.actor_id).await {
            return Ok(cached);
        }

        let generation = self.cache.generation();
        let entitlements = self.compute(profile, Utc::now()).await?;
        tracing::debug!(
            actor_id = %profile.actor_id,
            role = %profile.role,
            modules = entitlements.len(),
            "resolved entitlements"
        );
        self.cache
            .insert(profile.actor_id, generation, entitlements.clone())
            .await;
        Ok(entitlements)
    }

    /// Whether the profile can reach `module_key`
    pub async fn is_entitled(&self, profile: &ActorProfile, module_key: &str) -> Result<bool> {
        let entitlements = self.entitlements_for(profile).await?;
        Ok(entitlements.iter().any(|e| e.module_key == module_key))
    }

    /// Whether `tenant_id` holds a currently effective grant for `module_key`.
    /// Always read from the store.
    pub async fn tenant_has_effective_grant(&self, tenant_id: Uuid, module_key: &str) -> Result<bool> {
        let grant = self.store.get_module_grant(tenant_id, module_key).await?;
        Ok(grant.map(|g| g.is_effective(Utc::now())).unwrap_or(false))
    }

    pub async fn invalidate(&self, actor_id: Uuid) {
        self.cache.invalidate(actor_id).await;
    }

    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all().await;
    }

    async fn compute(&self, profile: &ActorProfile, now: DateTime<Utc>) -> Result<Vec<Entitlement>> {
        if profile.role == Role::SystemAdmin {
            let definitions = self.store.list_module_definitions().await?;
            return Ok(compute_entitlements(
                profile.role,
                &definitions,
                &[],
                &HashSet::new(),
                now,
            ));
        }

        let tenant_id = profile.effective_tenant_id.ok_or_else(|| {
            AppError::Internal(format!("Actor {} has no effective tenant", profile.actor_id))
        })?;

        let (definitions, grants) = futures::try_join!(
            self.store.list_module_definitions(),
            self.store.list_module_grants(tenant_id),
        )?;

        let user_access: HashSet<String> = if profile.role.needs_user_access() {
            self.store
                .list_user_access_for_actor(tenant_id, profile.actor_id)
                .await?
                .into_iter()
                .map(|row| row.module_key)
                .collect()
        } else {
            HashSet::new()
        };

        Ok(compute_entitlements(
            profile.role,
            &definitions,
            &grants,
            &user_access,
            now,
        ))
    }
}
