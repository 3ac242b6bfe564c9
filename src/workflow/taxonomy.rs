//! Status taxonomies and their transition tables
//!
//! Review items (inspection forms, permits) move `pending -> approved|rejected`.
//! Lifecycle items (corrective actions) move `open -> closed`. Terminal states
//! have no outgoing edges.

use serde::{Deserialize, Serialize};

/// Which state machine a workflow item follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Taxonomy {
    Review,
    Lifecycle,
}

impl Taxonomy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Taxonomy::Review => "review",
            Taxonomy::Lifecycle => "lifecycle",
        }
    }

    /// Status a freshly created item starts in
    pub fn initial_status(&self) -> WorkflowStatus {
        match self {
            Taxonomy::Review => WorkflowStatus::Pending,
            Taxonomy::Lifecycle => WorkflowStatus::Open,
        }
    }

    /// Legal `(from, to)` edges
    pub fn transitions(&self) -> &'static [(WorkflowStatus, WorkflowStatus)] {
        match self {
            Taxonomy::Review => &[
                (WorkflowStatus::Pending, WorkflowStatus::Approved),
                (WorkflowStatus::Pending, WorkflowStatus::Rejected),
            ],
            Taxonomy::Lifecycle => &[(WorkflowStatus::Open, WorkflowStatus::Closed)],
        }
    }

    pub fn allows(&self, from: WorkflowStatus, to: WorkflowStatus) -> bool {
        self.transitions()
            .iter()
            .any(|&(f, t)| f == from && t == to)
    }

    /// Whether `status` belongs to this taxonomy at all
    pub fn contains(&self, status: WorkflowStatus) -> bool {
        status == self.initial_status()
            || self.transitions().iter().any(|&(_, t)| t == status)
    }
}

impl std::str::FromStr for Taxonomy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "review" => Ok(Taxonomy::Review),
            "lifecycle" => Ok(Taxonomy::Lifecycle),
            _ => Err(format!("Invalid taxonomy: {}", s)),
        }
    }
}

/// Status of a workflow item, across both taxonomies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Approved,
    Rejected,
    Open,
    Closed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Approved => "approved",
            WorkflowStatus::Rejected => "rejected",
            WorkflowStatus::Open => "open",
            WorkflowStatus::Closed => "closed",
        }
    }

    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Approved | WorkflowStatus::Rejected | WorkflowStatus::Closed
        )
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "approved" => Ok(WorkflowStatus::Approved),
            "rejected" => Ok(WorkflowStatus::Rejected),
            "open" => Ok(WorkflowStatus::Open),
            "closed" => Ok(WorkflowStatus::Closed),
            _ => Err(format!("Invalid workflow status: {}", s)),
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
