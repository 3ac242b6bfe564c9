//! Approval workflow engine
//!
//! One engine drives every workflow-bearing resource. Inspection forms and
//! permits follow the review taxonomy, corrective actions the lifecycle
//! taxonomy.

pub mod engine;
pub mod item;
pub mod taxonomy;

pub use engine::{WorkflowEngine, WorkflowEvent};
pub use item::{TransitionPayload, TransitionStamp, WorkflowItem};
pub use taxonomy::{Taxonomy, WorkflowStatus};
