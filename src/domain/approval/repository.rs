//! Approval workflow repository trait

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::entity::{ApprovalWorkflow, ApprovalWorkflowId};
use crate::domain::DomainError;

/// Repository trait for approval workflow persistence
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApprovalWorkflowRepository: Send + Sync {
    /// Get an approval workflow by ID
    async fn get(&self, id: &ApprovalWorkflowId) -> Result<Option<ApprovalWorkflow>, DomainError>;

    /// List all approval workflows, oldest first
    async fn list(&self) -> Result<Vec<ApprovalWorkflow>, DomainError>;

    /// List approval workflows of one type, oldest first
    async fn list_by_type(&self, workflow_type: &str) -> Result<Vec<ApprovalWorkflow>, DomainError>;

    /// Create a new approval workflow
    async fn create(&self, workflow: ApprovalWorkflow) -> Result<ApprovalWorkflow, DomainError>;

    /// Persist a modified workflow, failing with `Conflict` if it changed meanwhile
    async fn update(&self, workflow: ApprovalWorkflow) -> Result<ApprovalWorkflow, DomainError>;
}
