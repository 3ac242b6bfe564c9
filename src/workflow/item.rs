//! Workflow items shared by inspection forms, permits and corrective actions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::taxonomy::{Taxonomy, WorkflowStatus};

/// An item progressing through a review or lifecycle taxonomy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowItem {
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Module the item belongs to (e.g. "work-permits")
    pub module_key: String,
    pub taxonomy: Taxonomy,
    pub creator_id: Uuid,
    pub status: WorkflowStatus,
    /// Caller-owned payload; file references by id or URL only
    pub details: serde_json::Value,
    /// Approver, rejecter or closer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowItem {
    /// Create a new item in its taxonomy's initial status
    pub fn new(
        tenant_id: Uuid,
        module_key: impl Into<String>,
        taxonomy: Taxonomy,
        creator_id: Uuid,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            module_key: module_key.into(),
            taxonomy,
            creator_id,
            status: taxonomy.initial_status(),
            details,
            resolved_by: None,
            resolved_at: None,
            rejection_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn approver_id(&self) -> Option<Uuid> {
        match self.status {
            WorkflowStatus::Approved | WorkflowStatus::Rejected => self.resolved_by,
            _ => None,
        }
    }

    pub fn closer_id(&self) -> Option<Uuid> {
        match self.status {
            WorkflowStatus::Closed => self.resolved_by,
            _ => None,
        }
    }
}

/// Extra data accompanying a transition request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionPayload {
    /// Only recorded for `rejected`; optional
    #[serde(default)]
    pub reason: Option<String>,
}

impl TransitionPayload {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

/// The audit stamp written together with a status change
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionStamp {
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
    pub actor_id: Uuid,
    pub at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
}

impl TransitionStamp {
    pub fn new(
        from: WorkflowStatus,
        to: WorkflowStatus,
        actor_id: Uuid,
        payload: TransitionPayload,
    ) -> Self {
        let rejection_reason = match to {
            WorkflowStatus::Rejected => payload
                .reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            _ => None,
        };
        Self {
            from,
            to,
            actor_id,
            at: Utc::now(),
            rejection_reason,
        }
    }
}
