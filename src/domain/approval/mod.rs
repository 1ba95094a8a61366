//! Approval workflow domain module
//!
//! A generic multi-step approval (order approvals and the like). Unlike the
//! return workflow, the aggregate keeps a `current_step` cursor and records
//! the terminal outcome on the parent: rejecting any step rejects the whole
//! approval.

mod entity;
pub mod repository;

pub use entity::{
    ApprovalStatus, ApprovalStep, ApprovalStepDefinition, ApprovalStepStatus, ApprovalWorkflow,
    ApprovalWorkflowId,
};
pub use repository::ApprovalWorkflowRepository;

#[cfg(test)]
pub use repository::MockApprovalWorkflowRepository;
