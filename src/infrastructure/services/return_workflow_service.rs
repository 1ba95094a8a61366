//! Return workflow engine
//!
//! Drives the step state machine of a return request: instantiation from a
//! template, one-step advancement, fast-forwarding, rejection and ad-hoc
//! edits. Every read-modify-write runs under the instance's lock.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::request_locks::RequestLocks;
use crate::domain::error::DomainError;
use crate::domain::workflow::{
    NewWorkflowStep, RequestKey, StepId, StepStatus, TemplateRegistry, WorkflowOutcome,
    WorkflowStep, WorkflowStepRepository, WorkflowTemplate, DEFAULT_TEMPLATE_ID, REJECTED_STEP,
    RETURN_REQUEST_TYPE,
};

/// Return workflow service configuration
#[derive(Debug, Clone)]
pub struct ReturnWorkflowServiceConfig {
    /// Template used when the caller does not name one
    pub default_template: String,
    /// `request_type` stamped on every step row
    pub request_type: String,
}

impl Default for ReturnWorkflowServiceConfig {
    fn default() -> Self {
        Self {
            default_template: DEFAULT_TEMPLATE_ID.to_string(),
            request_type: RETURN_REQUEST_TYPE.to_string(),
        }
    }
}

/// Steps of one instance together with the derived outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowInstanceView {
    pub request_type: String,
    pub request_id: i64,
    pub steps: Vec<WorkflowStep>,
    pub outcome: WorkflowOutcome,
}

/// Result of a dispatched workflow action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub step: Option<WorkflowStep>,
    pub message: String,
}

/// Trait for the return workflow engine (for dynamic dispatch in AppState)
#[async_trait]
pub trait ReturnWorkflowServiceTrait: Send + Sync + Debug {
    /// All known templates
    fn list_templates(&self) -> Vec<WorkflowTemplate>;

    /// Look up a template by id
    fn get_template(&self, template_id: &str) -> Result<WorkflowTemplate, DomainError>;

    /// Active steps of an instance, ordered by sequence
    async fn get_workflow_steps(&self, request_id: i64) -> Result<Vec<WorkflowStep>, DomainError>;

    /// Steps plus derived outcome
    async fn get_workflow(&self, request_id: i64) -> Result<WorkflowInstanceView, DomainError>;

    /// Instantiate a template for a request that has no workflow yet
    async fn create_initial_workflow(
        &self,
        request_id: i64,
        user_id: i64,
        template_id: Option<String>,
    ) -> Result<Vec<WorkflowStep>, DomainError>;

    /// Supersede the current instance with a fresh one
    async fn reinitialize_workflow(
        &self,
        request_id: i64,
        user_id: i64,
        template_id: Option<String>,
    ) -> Result<Vec<WorkflowStep>, DomainError>;

    /// Complete the first open step; `None` once nothing is left
    async fn execute_next_workflow_step(
        &self,
        request_id: i64,
        user_id: i64,
        remarks: Option<String>,
    ) -> Result<Option<WorkflowStep>, DomainError>;

    /// Advance until no open step remains, creating the instance if needed
    async fn execute_full_workflow_flow(
        &self,
        request_id: i64,
        user_id: i64,
        template_id: Option<String>,
    ) -> Result<Vec<WorkflowStep>, DomainError>;

    /// Close the instance with a rejection step
    async fn reject_return_request(
        &self,
        request_id: i64,
        user_id: i64,
        rejection_reason: &str,
    ) -> Result<WorkflowStep, DomainError>;

    /// Set the status of one step by id
    async fn update_workflow_step(
        &self,
        step_id: &str,
        status: &str,
        remarks: Option<String>,
        action_by: Option<i64>,
        user_id: i64,
    ) -> Result<WorkflowStep, DomainError>;

    /// Append an ad-hoc step after the last one
    async fn add_workflow_step(
        &self,
        request_id: i64,
        step: &str,
        status: &str,
        remarks: Option<String>,
        action_by: Option<i64>,
        user_id: i64,
    ) -> Result<WorkflowStep, DomainError>;

    /// Dispatch a named action: `approve`/`next`, `reject`, or a step status
    async fn apply_action(
        &self,
        request_id: i64,
        action: &str,
        remarks: Option<String>,
        action_by: Option<i64>,
        user_id: i64,
    ) -> Result<ActionOutcome, DomainError>;
}

/// Return workflow engine implementation
#[derive(Debug)]
pub struct ReturnWorkflowService<R: WorkflowStepRepository> {
    repository: Arc<R>,
    templates: Arc<TemplateRegistry>,
    locks: RequestLocks,
    config: ReturnWorkflowServiceConfig,
}

impl<R: WorkflowStepRepository> ReturnWorkflowService<R> {
    /// Create a service with the built-in templates and default configuration
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_config(
            repository,
            Arc::new(TemplateRegistry::builtin()),
            ReturnWorkflowServiceConfig::default(),
        )
    }

    /// Create with custom templates and configuration
    pub fn with_config(
        repository: Arc<R>,
        templates: Arc<TemplateRegistry>,
        config: ReturnWorkflowServiceConfig,
    ) -> Self {
        Self {
            repository,
            templates,
            locks: RequestLocks::new(),
            config,
        }
    }

    fn key(&self, request_id: i64) -> RequestKey {
        RequestKey::new(self.config.request_type.clone(), request_id)
    }

    fn resolve_template(&self, template_id: Option<&str>) -> Result<&WorkflowTemplate, DomainError> {
        self.templates
            .resolve(template_id.unwrap_or(&self.config.default_template))
    }

    fn ensure_not_rejected(key: &RequestKey, steps: &[WorkflowStep]) -> Result<(), DomainError> {
        if let WorkflowOutcome::Rejected { .. } = WorkflowOutcome::from_steps(steps) {
            return Err(DomainError::conflict(format!(
                "Workflow for {} has been rejected",
                key
            )));
        }

        Ok(())
    }

    /// At most one active step may be in progress; `except` is the step being changed
    fn ensure_no_other_in_progress(
        key: &RequestKey,
        steps: &[WorkflowStep],
        except: Option<&StepId>,
    ) -> Result<(), DomainError> {
        if let Some(active) = steps
            .iter()
            .find(|s| s.status() == StepStatus::InProgress && Some(s.id()) != except)
        {
            return Err(DomainError::conflict(format!(
                "Step '{}' of {} is already in progress",
                active.step(),
                key
            )));
        }

        Ok(())
    }

    /// Insert a template's steps; caller holds the instance lock
    async fn instantiate(
        &self,
        key: &RequestKey,
        user_id: i64,
        template_id: Option<&str>,
    ) -> Result<Vec<WorkflowStep>, DomainError> {
        let template = self.resolve_template(template_id)?;

        if !self.repository.get_workflow_steps(key).await?.is_empty() {
            return Err(DomainError::conflict(format!(
                "Workflow for {} already exists",
                key
            )));
        }

        let steps = self
            .repository
            .add_workflow_steps(key, template.instantiate(), user_id)
            .await?;

        info!(
            request = %key,
            template_id = %template.id(),
            step_count = steps.len(),
            "Created workflow"
        );

        Ok(steps)
    }

    /// Complete the first open step and promote its successor; caller holds the lock
    async fn advance(
        &self,
        key: &RequestKey,
        user_id: i64,
        remarks: Option<String>,
    ) -> Result<Option<WorkflowStep>, DomainError> {
        let steps = self.repository.get_workflow_steps(key).await?;
        Self::ensure_not_rejected(key, &steps)?;

        let Some(index) = steps.iter().position(|s| s.status().is_open()) else {
            debug!(request = %key, "No open step left");
            return Ok(None);
        };

        let mut current = steps[index].clone();
        current.apply_status(StepStatus::Completed, remarks, Some(user_id), user_id)?;
        let completed = self.repository.update_workflow_step(current).await?;

        self.promote_next(&steps, index, user_id).await?;

        info!(
            request = %key,
            step = %completed.step(),
            sequence = completed.sequence(),
            "Completed workflow step"
        );

        Ok(Some(completed))
    }

    /// After `steps[closed]` was closed, flip the first pending step behind it to
    /// in_progress unless another step already is
    async fn promote_next(
        &self,
        steps: &[WorkflowStep],
        closed: usize,
        user_id: i64,
    ) -> Result<(), DomainError> {
        let others_in_progress = steps
            .iter()
            .enumerate()
            .any(|(i, s)| i != closed && s.status() == StepStatus::InProgress);

        if others_in_progress {
            return Ok(());
        }

        if let Some(next) = steps[closed + 1..]
            .iter()
            .find(|s| s.status() == StepStatus::Pending)
        {
            let mut next = next.clone();
            next.apply_status(StepStatus::InProgress, None, None, user_id)?;
            self.repository.update_workflow_step(next).await?;
        }

        Ok(())
    }

    async fn reject_locked(
        &self,
        key: &RequestKey,
        user_id: i64,
        reason: &str,
    ) -> Result<WorkflowStep, DomainError> {
        let steps = self.repository.get_workflow_steps(key).await?;

        if steps.is_empty() {
            return Err(DomainError::not_found(format!("No workflow found for {}", key)));
        }

        if WorkflowOutcome::from_steps(&steps) == WorkflowOutcome::Completed {
            return Err(DomainError::conflict(format!(
                "Workflow for {} is already completed",
                key
            )));
        }

        let rejection = match steps.iter().find(|s| s.step() == REJECTED_STEP) {
            Some(existing) => {
                let mut existing = existing.clone();
                existing.record_rejection(reason, user_id)?;
                self.repository.update_workflow_step(existing).await?
            }
            None => {
                self.repository
                    .add_workflow_step(
                        key,
                        NewWorkflowStep::new(REJECTED_STEP, StepStatus::Rejected)
                            .with_remarks(reason)
                            .with_action_by(Some(user_id)),
                        user_id,
                    )
                    .await?
            }
        };

        info!(request = %key, user_id, "Rejected return request");
        Ok(rejection)
    }

    /// Apply a status to the first open step; caller holds the lock
    async fn set_current_status(
        &self,
        key: &RequestKey,
        status: StepStatus,
        remarks: Option<String>,
        action_by: Option<i64>,
        user_id: i64,
    ) -> Result<WorkflowStep, DomainError> {
        let steps = self.repository.get_workflow_steps(key).await?;
        Self::ensure_not_rejected(key, &steps)?;

        let index = steps
            .iter()
            .position(|s| s.status().is_open())
            .ok_or_else(|| DomainError::conflict(format!("Workflow for {} has no open step", key)))?;

        let mut current = steps[index].clone();
        let remarks = status_remarks(status, remarks)?;
        current.apply_status(status, remarks, action_by.or(Some(user_id)), user_id)?;

        if status == StepStatus::InProgress {
            Self::ensure_no_other_in_progress(key, &steps, Some(current.id()))?;
        }
        let updated = self.repository.update_workflow_step(current).await?;

        if matches!(status, StepStatus::Completed | StepStatus::Skipped) {
            self.promote_next(&steps, index, user_id).await?;
        }

        Ok(updated)
    }
}

/// A rejection needs a non-blank reason
fn require_reason(reason: Option<&str>) -> Result<&str, DomainError> {
    match reason.map(str::trim) {
        Some(reason) if !reason.is_empty() => Ok(reason),
        _ => Err(DomainError::validation("Rejection reason is required")),
    }
}

/// Remarks to store with a status change; mandatory when the status is `rejected`
fn status_remarks(
    status: StepStatus,
    remarks: Option<String>,
) -> Result<Option<String>, DomainError> {
    if status == StepStatus::Rejected {
        return Ok(Some(require_reason(remarks.as_deref())?.to_string()));
    }

    Ok(remarks)
}

#[async_trait]
impl<R: WorkflowStepRepository + Debug + 'static> ReturnWorkflowServiceTrait
    for ReturnWorkflowService<R>
{
    fn list_templates(&self) -> Vec<WorkflowTemplate> {
        self.templates.list().to_vec()
    }

    fn get_template(&self, template_id: &str) -> Result<WorkflowTemplate, DomainError> {
        self.templates.resolve(template_id).cloned()
    }

    async fn get_workflow_steps(&self, request_id: i64) -> Result<Vec<WorkflowStep>, DomainError> {
        self.repository.get_workflow_steps(&self.key(request_id)).await
    }

    async fn get_workflow(&self, request_id: i64) -> Result<WorkflowInstanceView, DomainError> {
        let key = self.key(request_id);
        let steps = self.repository.get_workflow_steps(&key).await?;
        let outcome = WorkflowOutcome::from_steps(&steps);

        Ok(WorkflowInstanceView {
            request_type: key.request_type,
            request_id,
            steps,
            outcome,
        })
    }

    #[instrument(skip(self))]
    async fn create_initial_workflow(
        &self,
        request_id: i64,
        user_id: i64,
        template_id: Option<String>,
    ) -> Result<Vec<WorkflowStep>, DomainError> {
        let key = self.key(request_id);
        let _guard = self.locks.acquire(&key.to_string()).await?;

        self.instantiate(&key, user_id, template_id.as_deref()).await
    }

    #[instrument(skip(self))]
    async fn reinitialize_workflow(
        &self,
        request_id: i64,
        user_id: i64,
        template_id: Option<String>,
    ) -> Result<Vec<WorkflowStep>, DomainError> {
        let key = self.key(request_id);
        let template = self.resolve_template(template_id.as_deref())?;

        let _guard = self.locks.acquire(&key.to_string()).await?;

        let (superseded, steps) = self
            .repository
            .replace_workflow_steps(&key, template.instantiate(), user_id)
            .await?;

        info!(
            request = %key,
            template_id = %template.id(),
            superseded,
            step_count = steps.len(),
            "Reinitialized workflow"
        );

        Ok(steps)
    }

    #[instrument(skip(self, remarks))]
    async fn execute_next_workflow_step(
        &self,
        request_id: i64,
        user_id: i64,
        remarks: Option<String>,
    ) -> Result<Option<WorkflowStep>, DomainError> {
        let key = self.key(request_id);
        let _guard = self.locks.acquire(&key.to_string()).await?;

        self.advance(&key, user_id, remarks).await
    }

    #[instrument(skip(self))]
    async fn execute_full_workflow_flow(
        &self,
        request_id: i64,
        user_id: i64,
        template_id: Option<String>,
    ) -> Result<Vec<WorkflowStep>, DomainError> {
        let key = self.key(request_id);
        let _guard = self.locks.acquire(&key.to_string()).await?;

        if self.repository.get_workflow_steps(&key).await?.is_empty() {
            self.instantiate(&key, user_id, template_id.as_deref()).await?;
        }

        let mut advanced = 0usize;

        loop {
            match self.advance(&key, user_id, None).await {
                Ok(Some(_)) => advanced += 1,
                Ok(None) => break,
                Err(e) => {
                    warn!(request = %key, advanced, error = %e, "Full workflow flow interrupted");
                    return Err(e);
                }
            }
        }

        info!(request = %key, advanced, "Full workflow flow finished");
        self.repository.get_workflow_steps(&key).await
    }

    #[instrument(skip(self, rejection_reason))]
    async fn reject_return_request(
        &self,
        request_id: i64,
        user_id: i64,
        rejection_reason: &str,
    ) -> Result<WorkflowStep, DomainError> {
        let reason = require_reason(Some(rejection_reason))?;
        let key = self.key(request_id);
        let _guard = self.locks.acquire(&key.to_string()).await?;

        self.reject_locked(&key, user_id, reason).await
    }

    #[instrument(skip(self, remarks))]
    async fn update_workflow_step(
        &self,
        step_id: &str,
        status: &str,
        remarks: Option<String>,
        action_by: Option<i64>,
        user_id: i64,
    ) -> Result<WorkflowStep, DomainError> {
        let status: StepStatus = status.parse()?;
        let id = StepId::new(step_id)?;

        let not_found = || DomainError::not_found(format!("Workflow step '{}' not found", step_id));

        let key = self
            .repository
            .get_step(&id)
            .await?
            .filter(|s| s.is_active())
            .ok_or_else(not_found)?
            .request_key();

        let _guard = self.locks.acquire(&key.to_string()).await?;

        let steps = self.repository.get_workflow_steps(&key).await?;

        if WorkflowOutcome::from_steps(&steps).is_terminal() {
            return Err(DomainError::conflict(format!(
                "Workflow for {} is closed",
                key
            )));
        }

        let index = steps
            .iter()
            .position(|s| s.id() == &id)
            .ok_or_else(not_found)?;

        let action_by = match status {
            StepStatus::Rejected => action_by.or(Some(user_id)),
            _ => action_by,
        };
        let remarks = status_remarks(status, remarks)?;

        let mut step = steps[index].clone();
        let was_open = step.status().is_open();
        step.apply_status(status, remarks, action_by, user_id)?;

        if status == StepStatus::InProgress {
            Self::ensure_no_other_in_progress(&key, &steps, Some(&id))?;
        }

        let updated = self.repository.update_workflow_step(step).await?;

        if was_open && matches!(status, StepStatus::Completed | StepStatus::Skipped) {
            self.promote_next(&steps, index, user_id).await?;
        }

        info!(request = %key, step = %updated.step(), status = %status, "Updated workflow step");
        Ok(updated)
    }

    #[instrument(skip(self, remarks))]
    async fn add_workflow_step(
        &self,
        request_id: i64,
        step: &str,
        status: &str,
        remarks: Option<String>,
        action_by: Option<i64>,
        user_id: i64,
    ) -> Result<WorkflowStep, DomainError> {
        let status: StepStatus = status.parse()?;
        let name = step.trim();

        if name.is_empty() {
            return Err(DomainError::validation("Step name cannot be empty"));
        }

        let remarks = status_remarks(status, remarks)?;
        let action_by = match status {
            StepStatus::Rejected => action_by.or(Some(user_id)),
            _ => action_by,
        };

        let key = self.key(request_id);
        let _guard = self.locks.acquire(&key.to_string()).await?;

        if status == StepStatus::InProgress {
            let steps = self.repository.get_workflow_steps(&key).await?;
            Self::ensure_no_other_in_progress(&key, &steps, None)?;
        }

        let mut input = NewWorkflowStep::new(name, status).with_action_by(action_by);
        input.remarks = remarks;

        let created = self
            .repository
            .add_workflow_step(&key, input, user_id)
            .await?;

        info!(request = %key, step = %created.step(), sequence = created.sequence(), "Added workflow step");
        Ok(created)
    }

    #[instrument(skip(self, remarks))]
    async fn apply_action(
        &self,
        request_id: i64,
        action: &str,
        remarks: Option<String>,
        action_by: Option<i64>,
        user_id: i64,
    ) -> Result<ActionOutcome, DomainError> {
        let action = action.trim().to_lowercase();
        let key = self.key(request_id);

        match action.as_str() {
            "approve" | "next" => {
                let step = self
                    .execute_next_workflow_step(request_id, action_by.unwrap_or(user_id), remarks)
                    .await?;

                let message = match &step {
                    Some(step) => format!("Step '{}' completed", step.step()),
                    None => "Workflow already complete".to_string(),
                };

                Ok(ActionOutcome { step, message })
            }
            "reject" => {
                let reason = remarks.unwrap_or_default();
                let step = self
                    .reject_return_request(request_id, action_by.unwrap_or(user_id), &reason)
                    .await?;

                Ok(ActionOutcome {
                    step: Some(step),
                    message: "Return request rejected".to_string(),
                })
            }
            other => {
                let status: StepStatus = other.parse().map_err(|_| {
                    DomainError::validation(format!(
                        "Unknown action '{}': expected approve, next, reject or a step status",
                        other
                    ))
                })?;

                let _guard = self.locks.acquire(&key.to_string()).await?;
                let step = self
                    .set_current_status(&key, status, remarks, action_by, user_id)
                    .await?;

                Ok(ActionOutcome {
                    message: format!("Step '{}' marked {}", step.step(), status),
                    step: Some(step),
                })
            }
        }
    }
}
