//! siteops - entitlement and approval-workflow core for multi-tenant
//! industrial site operations

pub mod admin;
pub mod api;
pub mod config;
pub mod delegation;
pub mod entitlement;
pub mod error;
pub mod identity;
pub mod models;
pub mod notify;
pub mod store;
pub mod workflow;

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::admin::Administration;
use crate::delegation::DelegationLayer;
use crate::entitlement::EntitlementResolver;
use crate::store::Store;
use crate::workflow::WorkflowEngine;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub entitlements: Arc<EntitlementResolver>,
    pub delegation: DelegationLayer,
    pub workflow: WorkflowEngine,
    pub admin: Administration,
}

impl AppState {
    /// Wire the services over one pool; `entitlement_ttl` bounds cache staleness
    pub fn new(pool: SqlitePool, entitlement_ttl: Duration) -> Arc<Self> {
        let store = Store::new(pool);
        let entitlements = Arc::new(EntitlementResolver::new(store.clone(), entitlement_ttl));

        Arc::new(Self {
            delegation: DelegationLayer::new(store.clone(), entitlements.clone()),
            workflow: WorkflowEngine::new(store.clone(), entitlements.clone()),
            admin: Administration::new(store.clone(), entitlements.clone()),
            entitlements,
            store,
        })
    }
}
