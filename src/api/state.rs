//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::services::{ApprovalWorkflowServiceTrait, ReturnWorkflowServiceTrait};

/// Application state containing shared services using dynamic dispatch
#[derive(Clone, Debug)]
pub struct AppState {
    pub workflow_service: Arc<dyn ReturnWorkflowServiceTrait>,
    pub approval_service: Arc<dyn ApprovalWorkflowServiceTrait>,
}

impl AppState {
    /// Create new application state with provided services
    pub fn new(
        workflow_service: Arc<dyn ReturnWorkflowServiceTrait>,
        approval_service: Arc<dyn ApprovalWorkflowServiceTrait>,
    ) -> Self {
        Self {
            workflow_service,
            approval_service,
        }
    }
}
