//! Data models for actors, tenants and module grants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fallback category when neither the grant nor the definition names one
pub const DEFAULT_CATEGORY: &str = "General";

/// Role held by an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SystemAdmin,
    CompanyManager,
    SubcontractorManager,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SystemAdmin => "system_admin",
            Role::CompanyManager => "company_manager",
            Role::SubcontractorManager => "subcontractor_manager",
            Role::Employee => "employee",
        }
    }

    /// Roles allowed to decide workflow items and manage grants
    pub fn is_manager(&self) -> bool {
        matches!(self, Role::SystemAdmin | Role::CompanyManager)
    }

    /// Roles whose entitlements are restricted to per-user access rows
    pub fn needs_user_access(&self) -> bool {
        matches!(self, Role::Employee | Role::SubcontractorManager)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system_admin" => Ok(Role::SystemAdmin),
            "company_manager" => Ok(Role::CompanyManager),
            "subcontractor_manager" => Ok(Role::SubcontractorManager),
            "employee" => Ok(Role::Employee),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    /// Home tenant; `None` only for system admins
    pub tenant_id: Option<Uuid>,
    pub is_active: bool,
    /// Legal identifiers present on the profile
    pub profile_complete: bool,
    pub created_at: DateTime<Utc>,
}

/// A company account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A delegated organization attached to a parent tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subcontractor {
    pub id: Uuid,
    pub parent_tenant_id: Uuid,
    /// The subcontractor's manager
    pub linked_actor_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A named capability unit in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub key: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_category: Option<String>,
    /// Insertion order, used for stable listing
    pub position: i64,
}

/// A tenant's activation of a module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleGrant {
    pub tenant_id: Uuid,
    pub module_key: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_override: Option<String>,
    pub indefinite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ModuleGrant {
    /// Active and not expired at `now`
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.indefinite {
            return true;
        }
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at >= now,
        }
    }
}

/// Desired state of a module grant, as submitted by an administrator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrantSpec {
    pub is_active: bool,
    #[serde(default)]
    pub category_override: Option<String>,
    #[serde(default)]
    pub indefinite: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl GrantSpec {
    /// An active grant that never expires
    pub fn indefinite() -> Self {
        Self {
            is_active: true,
            indefinite: true,
            ..Default::default()
        }
    }

    /// An active grant valid until `expires_at`
    pub fn until(expires_at: DateTime<Utc>) -> Self {
        Self {
            is_active: true,
            expires_at: Some(expires_at),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category_override = Some(category.into());
        self
    }
}

/// A per-user access row layered on a tenant's grants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserModuleAccess {
    pub tenant_id: Uuid,
    pub actor_id: Uuid,
    pub module_key: String,
    pub granted_by: Uuid,
    pub granted_at: DateTime<Utc>,
}

/// One resolved entry of an actor's entitlement set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub module_key: String,
    pub display_name: String,
    pub category: String,
}
