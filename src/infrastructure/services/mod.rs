//! Infrastructure services

mod approval_workflow_service;
mod request_locks;
mod return_workflow_service;

pub use approval_workflow_service::{
    ApprovalWorkflowService, ApprovalWorkflowServiceTrait, CreateApprovalRequest,
};
pub use request_locks::RequestLocks;
pub use return_workflow_service::{
    ActionOutcome, ReturnWorkflowService, ReturnWorkflowServiceConfig, ReturnWorkflowServiceTrait,
    WorkflowInstanceView,
};
