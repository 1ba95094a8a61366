//! Workflow step repository trait

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::entity::{NewWorkflowStep, RequestKey, StepId, WorkflowStep};
use crate::domain::DomainError;

/// Row-level persistence for workflow steps
///
/// Lookups by request only return active rows, ordered by `sequence`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkflowStepRepository: Send + Sync {
    /// Get a step by ID, active or not
    async fn get_step(&self, id: &StepId) -> Result<Option<WorkflowStep>, DomainError>;

    /// All active steps of a workflow instance; empty when none exist
    async fn get_workflow_steps(&self, key: &RequestKey) -> Result<Vec<WorkflowStep>, DomainError>;

    /// The active step with the given name, if any
    async fn get_workflow_step_by_step(
        &self,
        key: &RequestKey,
        step: &str,
    ) -> Result<Option<WorkflowStep>, DomainError>;

    /// Insert one step; appended after the last step unless a sequence is given
    async fn add_workflow_step(
        &self,
        key: &RequestKey,
        step: NewWorkflowStep,
        user_id: i64,
    ) -> Result<WorkflowStep, DomainError>;

    /// Insert several steps atomically
    async fn add_workflow_steps(
        &self,
        key: &RequestKey,
        steps: Vec<NewWorkflowStep>,
        user_id: i64,
    ) -> Result<Vec<WorkflowStep>, DomainError>;

    /// Persist a modified step, failing with `Conflict` if it changed meanwhile
    async fn update_workflow_step(&self, step: WorkflowStep) -> Result<WorkflowStep, DomainError>;

    /// Flag every active step inactive and insert `steps` in their place, as
    /// one atomic write. Returns the superseded count and the new steps.
    async fn replace_workflow_steps(
        &self,
        key: &RequestKey,
        steps: Vec<NewWorkflowStep>,
        user_id: i64,
    ) -> Result<(usize, Vec<WorkflowStep>), DomainError>;
}
