//! Approval workflow service - generic multi-step approvals

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use super::request_locks::RequestLocks;
use crate::domain::approval::{
    ApprovalStepDefinition, ApprovalWorkflow, ApprovalWorkflowId, ApprovalWorkflowRepository,
};
use crate::domain::error::DomainError;

/// Request to open a new approval
#[derive(Debug, Clone)]
pub struct CreateApprovalRequest {
    pub workflow_type: String,
    pub reference_type: String,
    pub reference_number: String,
    pub remarks: Option<String>,
    pub steps: Vec<ApprovalStepDefinition>,
}

impl CreateApprovalRequest {
    pub fn new(
        workflow_type: impl Into<String>,
        reference_type: impl Into<String>,
        reference_number: impl Into<String>,
    ) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            reference_type: reference_type.into(),
            reference_number: reference_number.into(),
            remarks: None,
            steps: Vec::new(),
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    pub fn with_step(mut self, step: ApprovalStepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_steps(mut self, steps: Vec<ApprovalStepDefinition>) -> Self {
        self.steps = steps;
        self
    }
}

/// Trait for the approval service (for dynamic dispatch in AppState)
#[async_trait]
pub trait ApprovalWorkflowServiceTrait: Send + Sync + Debug {
    async fn create(
        &self,
        request: CreateApprovalRequest,
        requested_by: i64,
    ) -> Result<ApprovalWorkflow, DomainError>;

    async fn get(&self, id: &str) -> Result<Option<ApprovalWorkflow>, DomainError>;

    /// All approvals, optionally of one type
    async fn list(&self, workflow_type: Option<String>) -> Result<Vec<ApprovalWorkflow>, DomainError>;

    /// Open approvals whose current step the user (or role) may act on
    async fn list_pending_for(
        &self,
        user_id: i64,
        role: Option<String>,
    ) -> Result<Vec<ApprovalWorkflow>, DomainError>;

    async fn approve_workflow_step(
        &self,
        id: &str,
        user_id: i64,
        step_number: Option<u32>,
        comments: Option<String>,
    ) -> Result<ApprovalWorkflow, DomainError>;

    async fn reject_workflow_step(
        &self,
        id: &str,
        user_id: i64,
        rejection_reason: &str,
        step_number: Option<u32>,
    ) -> Result<ApprovalWorkflow, DomainError>;

    async fn skip_workflow_step(
        &self,
        id: &str,
        user_id: i64,
        step_number: Option<u32>,
        comments: Option<String>,
    ) -> Result<ApprovalWorkflow, DomainError>;

    async fn cancel(
        &self,
        id: &str,
        user_id: i64,
        reason: Option<String>,
    ) -> Result<ApprovalWorkflow, DomainError>;
}

/// Approval service implementation
#[derive(Debug)]
pub struct ApprovalWorkflowService<R: ApprovalWorkflowRepository> {
    repository: Arc<R>,
    locks: RequestLocks,
}

impl<R: ApprovalWorkflowRepository> ApprovalWorkflowService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            locks: RequestLocks::new(),
        }
    }

    fn parse_id(&self, id: &str) -> Result<ApprovalWorkflowId, DomainError> {
        ApprovalWorkflowId::new(id)
    }

    async fn get_required(&self, id: &ApprovalWorkflowId) -> Result<ApprovalWorkflow, DomainError> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Approval workflow '{}' not found", id)))
    }

    /// Load, mutate and persist one workflow under its lock
    async fn mutate<F>(&self, id: &str, action: F) -> Result<ApprovalWorkflow, DomainError>
    where
        F: FnOnce(&mut ApprovalWorkflow) -> Result<(), DomainError> + Send,
    {
        let id = self.parse_id(id)?;
        let _guard = self.locks.acquire(id.as_str()).await?;

        let mut workflow = self.get_required(&id).await?;
        action(&mut workflow)?;

        self.repository.update(workflow).await
    }
}

#[async_trait]
impl<R: ApprovalWorkflowRepository + Debug + 'static> ApprovalWorkflowServiceTrait
    for ApprovalWorkflowService<R>
{
    #[instrument(skip(self, request), fields(workflow_type = %request.workflow_type))]
    async fn create(
        &self,
        request: CreateApprovalRequest,
        requested_by: i64,
    ) -> Result<ApprovalWorkflow, DomainError> {
        let mut workflow = ApprovalWorkflow::new(
            request.workflow_type,
            request.reference_type,
            request.reference_number,
            requested_by,
            request.steps,
        )?;

        if let Some(remarks) = request.remarks {
            workflow = workflow.with_remarks(remarks);
        }

        let created = self.repository.create(workflow).await?;
        info!(
            approval_id = %created.id(),
            total_steps = created.total_steps(),
            "Created approval workflow"
        );

        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<ApprovalWorkflow>, DomainError> {
        let id = self.parse_id(id)?;
        self.repository.get(&id).await
    }

    async fn list(&self, workflow_type: Option<String>) -> Result<Vec<ApprovalWorkflow>, DomainError> {
        match workflow_type {
            Some(workflow_type) => self.repository.list_by_type(&workflow_type).await,
            None => self.repository.list().await,
        }
    }

    async fn list_pending_for(
        &self,
        user_id: i64,
        role: Option<String>,
    ) -> Result<Vec<ApprovalWorkflow>, DomainError> {
        Ok(self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|w| w.is_pending_for(user_id, role.as_deref()))
            .collect())
    }

    #[instrument(skip(self, comments))]
    async fn approve_workflow_step(
        &self,
        id: &str,
        user_id: i64,
        step_number: Option<u32>,
        comments: Option<String>,
    ) -> Result<ApprovalWorkflow, DomainError> {
        let updated = self
            .mutate(id, |w| w.approve(user_id, step_number, comments).map(|_| ()))
            .await?;

        info!(
            approval_id = %id,
            status = %updated.status(),
            current_step = updated.current_step(),
            "Approved step"
        );
        Ok(updated)
    }

    #[instrument(skip(self, rejection_reason))]
    async fn reject_workflow_step(
        &self,
        id: &str,
        user_id: i64,
        rejection_reason: &str,
        step_number: Option<u32>,
    ) -> Result<ApprovalWorkflow, DomainError> {
        let reason = rejection_reason.trim().to_string();

        let updated = self
            .mutate(id, move |w| w.reject(user_id, &reason, step_number).map(|_| ()))
            .await?;

        info!(approval_id = %id, "Rejected approval workflow");
        Ok(updated)
    }

    #[instrument(skip(self, comments))]
    async fn skip_workflow_step(
        &self,
        id: &str,
        user_id: i64,
        step_number: Option<u32>,
        comments: Option<String>,
    ) -> Result<ApprovalWorkflow, DomainError> {
        let updated = self
            .mutate(id, |w| w.skip(user_id, step_number, comments).map(|_| ()))
            .await?;

        info!(approval_id = %id, current_step = updated.current_step(), "Skipped step");
        Ok(updated)
    }

    #[instrument(skip(self, reason))]
    async fn cancel(
        &self,
        id: &str,
        user_id: i64,
        reason: Option<String>,
    ) -> Result<ApprovalWorkflow, DomainError> {
        let updated = self.mutate(id, |w| w.cancel(reason)).await?;

        info!(approval_id = %id, user_id, "Cancelled approval workflow");
        Ok(updated)
    }
}
