//! Database store for tenants, grants and workflow items

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    Actor, GrantSpec, ModuleDefinition, ModuleGrant, Role, Subcontractor, Tenant,
    UserModuleAccess,
};
use crate::workflow::{TransitionStamp, WorkflowItem};

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))
    }

    // Tenant operations

    pub async fn create_tenant(&self, name: &str) -> Result<Tenant> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, is_active, created_at)
            VALUES (?, ?, 1, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Tenant {
            id,
            name: name.to_string(),
            is_active: true,
            created_at: now,
        })
    }

    pub async fn get_tenant(&self, id: Uuid) -> Result<Tenant> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT id, name, is_active, created_at
            FROM tenants
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tenant {} not found", id)))?;

        row.try_into()
    }

    pub async fn set_tenant_active(&self, id: Uuid, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE tenants SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Tenant {} not found", id)));
        }
        Ok(())
    }

    // Actor operations

    pub async fn create_actor(
        &self,
        role: Role,
        tenant_id: Option<Uuid>,
        profile_complete: bool,
    ) -> Result<Actor> {
        if role != Role::SystemAdmin && tenant_id.is_none() {
            return Err(AppError::BadRequest(format!(
                "A {} must belong to a tenant",
                role
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO actors (id, role, tenant_id, is_active, profile_complete, created_at)
            VALUES (?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(role.as_str())
        .bind(tenant_id.map(|t| t.to_string()))
        .bind(profile_complete)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Actor {
            id,
            role,
            tenant_id,
            is_active: true,
            profile_complete,
            created_at: now,
        })
    }

    pub async fn get_actor(&self, id: Uuid) -> Result<Actor> {
        let row = sqlx::query_as::<_, ActorRow>(
            r#"
            SELECT id, role, tenant_id, is_active, profile_complete, created_at
            FROM actors
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Actor {} not found", id)))?;

        row.try_into()
    }

    pub async fn set_actor_active(&self, id: Uuid, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE actors SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Actor {} not found", id)));
        }
        Ok(())
    }

    // Subcontractor operations

    pub async fn create_subcontractor(
        &self,
        parent_tenant_id: Uuid,
        linked_actor_id: Uuid,
        name: &str,
    ) -> Result<Subcontractor> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO subcontractors (id, parent_tenant_id, linked_actor_id, name, is_active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(parent_tenant_id.to_string())
        .bind(linked_actor_id.to_string())
        .bind(name)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Subcontractor {
            id,
            parent_tenant_id,
            linked_actor_id,
            name: name.to_string(),
            is_active: true,
            created_at: now,
        })
    }

    pub async fn get_subcontractor(&self, id: Uuid) -> Result<Subcontractor> {
        let row = sqlx::query_as::<_, SubcontractorRow>(
            r#"
            SELECT id, parent_tenant_id, linked_actor_id, name, is_active, created_at
            FROM subcontractors
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Subcontractor {} not found", id)))?;

        row.try_into()
    }

    /// The subcontractor managed by `actor_id`, if any
    pub async fn find_subcontractor_by_actor(&self, actor_id: Uuid) -> Result<Option<Subcontractor>> {
        let row = sqlx::query_as::<_, SubcontractorRow>(
            r#"
            SELECT id, parent_tenant_id, linked_actor_id, name, is_active, created_at
            FROM subcontractors
            WHERE linked_actor_id = ?
            "#,
        )
        .bind(actor_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    pub async fn set_subcontractor_active(&self, id: Uuid, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE subcontractors SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Subcontractor {} not found", id)));
        }
        Ok(())
    }

    // Module catalog operations

    pub async fn create_module_definition(
        &self,
        key: &str,
        display_name: &str,
        default_category: Option<&str>,
    ) -> Result<ModuleDefinition> {
        let result = sqlx::query(
            r#"
            INSERT INTO module_definitions (key, display_name, default_category)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(key)
        .bind(display_name)
        .bind(default_category)
        .execute(&self.pool)
        .await?;

        Ok(ModuleDefinition {
            key: key.to_string(),
            display_name: display_name.to_string(),
            default_category: default_category.map(str::to_string),
            position: result.last_insert_rowid(),
        })
    }

    pub async fn get_module_definition(&self, key: &str) -> Result<Option<ModuleDefinition>> {
        let row = sqlx::query_as::<_, ModuleDefinitionRow>(
            r#"
            SELECT position, key, display_name, default_category
            FROM module_definitions
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// All definitions in insertion order
    pub async fn list_module_definitions(&self) -> Result<Vec<ModuleDefinition>> {
        let rows = sqlx::query_as::<_, ModuleDefinitionRow>(
            r#"
            SELECT position, key, display_name, default_category
            FROM module_definitions
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Remove a definition along with every grant and access row for it
    pub async fn delete_module_definition(&self, key: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_module_access WHERE module_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM module_grants WHERE module_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM module_definitions WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // Grant operations

    pub async fn upsert_module_grant(
        &self,
        tenant_id: Uuid,
        module_key: &str,
        spec: &GrantSpec,
    ) -> Result<ModuleGrant> {
        sqlx::query(
            r#"
            INSERT INTO module_grants (tenant_id, module_key, is_active, category_override, indefinite, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tenant_id, module_key) DO UPDATE SET
                is_active = excluded.is_active,
                category_override = excluded.category_override,
                indefinite = excluded.indefinite,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(module_key)
        .bind(spec.is_active)
        .bind(spec.category_override.as_deref())
        .bind(spec.indefinite)
        .bind(spec.expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(ModuleGrant {
            tenant_id,
            module_key: module_key.to_string(),
            is_active: spec.is_active,
            category_override: spec.category_override.clone(),
            indefinite: spec.indefinite,
            expires_at: spec.expires_at,
        })
    }

    pub async fn get_module_grant(
        &self,
        tenant_id: Uuid,
        module_key: &str,
    ) -> Result<Option<ModuleGrant>> {
        let row = sqlx::query_as::<_, ModuleGrantRow>(
            r#"
            SELECT tenant_id, module_key, is_active, category_override, indefinite, expires_at
            FROM module_grants
            WHERE tenant_id = ? AND module_key = ?
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(module_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    pub async fn list_module_grants(&self, tenant_id: Uuid) -> Result<Vec<ModuleGrant>> {
        let rows = sqlx::query_as::<_, ModuleGrantRow>(
            r#"
            SELECT tenant_id, module_key, is_active, category_override, indefinite, expires_at
            FROM module_grants
            WHERE tenant_id = ?
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Per-user access operations

    /// Insert an access row; an existing row is left untouched
    pub async fn insert_user_access(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        module_key: &str,
        granted_by: Uuid,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO user_module_access (tenant_id, actor_id, module_key, granted_by, granted_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(actor_id.to_string())
        .bind(module_key)
        .bind(granted_by.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns whether a row was removed
    pub async fn delete_user_access(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        module_key: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_module_access
            WHERE tenant_id = ? AND actor_id = ? AND module_key = ?
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(actor_id.to_string())
        .bind(module_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_user_access_for_actor(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<UserModuleAccess>> {
        let rows = sqlx::query_as::<_, UserModuleAccessRow>(
            r#"
            SELECT tenant_id, actor_id, module_key, granted_by, granted_at
            FROM user_module_access
            WHERE tenant_id = ? AND actor_id = ?
            ORDER BY granted_at ASC
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(actor_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn list_user_access_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<UserModuleAccess>> {
        let rows = sqlx::query_as::<_, UserModuleAccessRow>(
            r#"
            SELECT tenant_id, actor_id, module_key, granted_by, granted_at
            FROM user_module_access
            WHERE tenant_id = ?
            ORDER BY granted_at ASC
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Workflow item operations

    pub async fn insert_workflow_item(&self, item: &WorkflowItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_items (id, tenant_id, module_key, taxonomy, creator_id, status, details, resolved_by, resolved_at, rejection_reason, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.tenant_id.to_string())
        .bind(&item.module_key)
        .bind(item.taxonomy.as_str())
        .bind(item.creator_id.to_string())
        .bind(item.status.as_str())
        .bind(item.details.to_string())
        .bind(item.resolved_by.map(|u| u.to_string()))
        .bind(item.resolved_at)
        .bind(item.rejection_reason.as_deref())
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_workflow_item(&self, id: Uuid) -> Result<WorkflowItem> {
        let row = sqlx::query_as::<_, WorkflowItemRow>(
            r#"
            SELECT id, tenant_id, module_key, taxonomy, creator_id, status, details, resolved_by, resolved_at, rejection_reason, created_at
            FROM workflow_items
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Workflow item {} not found", id)))?;

        row.try_into()
    }

    /// Compare-and-set: writes status and audit stamp together, only if the
    /// item is still in `stamp.from`. Returns whether the write happened.
    pub async fn apply_transition(&self, item_id: Uuid, stamp: &TransitionStamp) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_items
            SET status = ?, resolved_by = ?, resolved_at = ?, rejection_reason = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(stamp.to.as_str())
        .bind(stamp.actor_id.to_string())
        .bind(stamp.at)
        .bind(stamp.rejection_reason.as_deref())
        .bind(item_id.to_string())
        .bind(stamp.from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Hard delete; returns whether a row was removed
    pub async fn delete_workflow_item(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflow_items WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// Internal row types for sqlx

fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| AppError::Internal(format!("Invalid {} UUID: {}", field, e)))
}

#[derive(sqlx::FromRow)]
struct TenantRow {
    id: String,
    name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = AppError;

    fn try_from(row: TenantRow) -> Result<Self> {
        Ok(Tenant {
            id: parse_uuid(&row.id, "tenant")?,
            name: row.name,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ActorRow {
    id: String,
    role: String,
    tenant_id: Option<String>,
    is_active: bool,
    profile_complete: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActorRow> for Actor {
    type Error = AppError;

    fn try_from(row: ActorRow) -> Result<Self> {
        Ok(Actor {
            id: parse_uuid(&row.id, "actor")?,
            role: row
                .role
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid role: {}", e)))?,
            tenant_id: row
                .tenant_id
                .as_deref()
                .map(|s| parse_uuid(s, "tenant_id"))
                .transpose()?,
            is_active: row.is_active,
            profile_complete: row.profile_complete,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubcontractorRow {
    id: String,
    parent_tenant_id: String,
    linked_actor_id: String,
    name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<SubcontractorRow> for Subcontractor {
    type Error = AppError;

    fn try_from(row: SubcontractorRow) -> Result<Self> {
        Ok(Subcontractor {
            id: parse_uuid(&row.id, "subcontractor")?,
            parent_tenant_id: parse_uuid(&row.parent_tenant_id, "parent_tenant_id")?,
            linked_actor_id: parse_uuid(&row.linked_actor_id, "linked_actor_id")?,
            name: row.name,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ModuleDefinitionRow {
    position: i64,
    key: String,
    display_name: String,
    default_category: Option<String>,
}

impl From<ModuleDefinitionRow> for ModuleDefinition {
    fn from(row: ModuleDefinitionRow) -> Self {
        ModuleDefinition {
            key: row.key,
            display_name: row.display_name,
            default_category: row.default_category,
            position: row.position,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ModuleGrantRow {
    tenant_id: String,
    module_key: String,
    is_active: bool,
    category_override: Option<String>,
    indefinite: bool,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<ModuleGrantRow> for ModuleGrant {
    type Error = AppError;

    fn try_from(row: ModuleGrantRow) -> Result<Self> {
        Ok(ModuleGrant {
            tenant_id: parse_uuid(&row.tenant_id, "tenant_id")?,
            module_key: row.module_key,
            is_active: row.is_active,
            category_override: row.category_override,
            indefinite: row.indefinite,
            expires_at: row.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserModuleAccessRow {
    tenant_id: String,
    actor_id: String,
    module_key: String,
    granted_by: String,
    granted_at: DateTime<Utc>,
}

impl TryFrom<UserModuleAccessRow> for UserModuleAccess {
    type Error = AppError;

    fn try_from(row: UserModuleAccessRow) -> Result<Self> {
        Ok(UserModuleAccess {
            tenant_id: parse_uuid(&row.tenant_id, "tenant_id")?,
            actor_id: parse_uuid(&row.actor_id, "actor_id")?,
            module_key: row.module_key,
            granted_by: parse_uuid(&row.granted_by, "granted_by")?,
            granted_at: row.granted_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowItemRow {
    id: String,
    tenant_id: String,
    module_key: String,
    taxonomy: String,
    creator_id: String,
    status: String,
    details: String,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<WorkflowItemRow> for WorkflowItem {
    type Error = AppError;

    fn try_from(row: WorkflowItemRow) -> Result<Self> {
        Ok(WorkflowItem {
            id: parse_uuid(&row.id, "item")?,
            tenant_id: parse_uuid(&row.tenant_id, "tenant_id")?,
            module_key: row.module_key,
            taxonomy: row
                .taxonomy
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid taxonomy: {}", e)))?,
            creator_id: parse_uuid(&row.creator_id, "creator_id")?,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            details: serde_json::from_str(&row.details)
                .map_err(|e| AppError::Internal(format!("Invalid details: {}", e)))?,
            resolved_by: row
                .resolved_by
                .as_deref()
                .map(|s| parse_uuid(s, "resolved_by"))
                .transpose()?,
            resolved_at: row.resolved_at,
            rejection_reason: row.rejection_reason,
            created_at: row.created_at,
        })
    }
}
