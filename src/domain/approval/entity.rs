//! Approval workflow aggregate

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Regex pattern for valid approval workflow IDs: apw-{uuid}
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^apw-[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$").unwrap()
});

/// Validated approval workflow identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApprovalWorkflowId(String);

impl ApprovalWorkflowId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();

        if !ID_PATTERN.is_match(&id) {
            return Err(DomainError::invalid_id(format!(
                "Invalid approval workflow ID '{}': must be in format apw-{{uuid}}",
                id
            )));
        }

        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(format!("apw-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ApprovalWorkflowId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ApprovalWorkflowId> for String {
    fn from(id: ApprovalWorkflowId) -> Self {
        id.0
    }
}

impl fmt::Display for ApprovalWorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for ApprovalWorkflowId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Status of the approval as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// No step has been actioned yet
    #[default]
    Pending,
    /// Some steps approved, more to go
    InProgress,
    Approved,
    Rejected,
    Cancelled,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status of one approval step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStepStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Skipped,
}

/// Definition of a step supplied when an approval is requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStepDefinition {
    pub step_name: String,
    pub assigned_role: Option<String>,
    pub assigned_user_id: Option<i64>,
    pub is_required: bool,
}

impl ApprovalStepDefinition {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            assigned_role: None,
            assigned_user_id: None,
            is_required: true,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.assigned_role = Some(role.into());
        self
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.assigned_user_id = Some(user_id);
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }
}

/// One step of an approval workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub step_number: u32,
    pub step_name: String,
    pub assigned_role: Option<String>,
    pub assigned_user_id: Option<i64>,
    pub is_required: bool,
    pub status: ApprovalStepStatus,
    pub action_by: Option<i64>,
    pub action_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

impl ApprovalStep {
    fn from_definition(step_number: u32, definition: ApprovalStepDefinition) -> Self {
        Self {
            step_number,
            step_name: definition.step_name,
            assigned_role: definition.assigned_role,
            assigned_user_id: definition.assigned_user_id,
            is_required: definition.is_required,
            status: ApprovalStepStatus::Pending,
            action_by: None,
            action_at: None,
            comments: None,
        }
    }

    /// Routing check: a step with no assignee can be actioned by anyone
    pub fn is_assigned_to(&self, user_id: i64, role: Option<&str>) -> bool {
        match (&self.assigned_user_id, &self.assigned_role) {
            (None, None) => true,
            (user, assigned_role) => {
                *user == Some(user_id)
                    || matches!((assigned_role, role), (Some(a), Some(r)) if a == r)
            }
        }
    }

    fn record(
        &mut self,
        status: ApprovalStepStatus,
        user_id: i64,
        comments: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.action_by = Some(user_id);
        self.action_at = Some(at);
        self.comments = comments;
    }
}

/// Generic multi-step approval with a current-step cursor
///
/// `current_step` is 1-based; once it passes `total_steps` the workflow is
/// approved. All mutations go through methods that refuse to touch a
/// terminal workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    id: ApprovalWorkflowId,
    workflow_type: String,
    reference_type: String,
    reference_number: String,
    requested_by: i64,
    status: ApprovalStatus,
    current_step: u32,
    total_steps: u32,
    steps: Vec<ApprovalStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remarks: Option<String>,
    final_approved_by: Option<i64>,
    final_approved_at: Option<DateTime<Utc>>,
    rejected_by: Option<i64>,
    rejected_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl ApprovalWorkflow {
    /// Create a pending approval positioned on its first step
    pub fn new(
        workflow_type: impl Into<String>,
        reference_type: impl Into<String>,
        reference_number: impl Into<String>,
        requested_by: i64,
        steps: Vec<ApprovalStepDefinition>,
    ) -> Result<Self, DomainError> {
        let workflow_type = workflow_type.into();

        if workflow_type.trim().is_empty() {
            return Err(DomainError::validation("workflow_type cannot be empty"));
        }

        if steps.is_empty() {
            return Err(DomainError::validation(
                "Approval workflow must have at least one step",
            ));
        }

        let mut seen = HashSet::new();

        for step in &steps {
            if step.step_name.trim().is_empty() {
                return Err(DomainError::validation("Step name cannot be empty"));
            }

            if !seen.insert(step.step_name.clone()) {
                return Err(DomainError::validation(format!(
                    "Duplicate step name: '{}'",
                    step.step_name
                )));
            }
        }

        let now = Utc::now();
        let steps: Vec<ApprovalStep> = steps
            .into_iter()
            .zip(1u32..)
            .map(|(definition, number)| ApprovalStep::from_definition(number, definition))
            .collect();

        Ok(Self {
            id: ApprovalWorkflowId::generate(),
            workflow_type,
            reference_type: reference_type.into(),
            reference_number: reference_number.into(),
            requested_by,
            status: ApprovalStatus::Pending,
            current_step: 1,
            total_steps: steps.len() as u32,
            steps,
            remarks: None,
            final_approved_by: None,
            final_approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    // Getters

    pub fn id(&self) -> &ApprovalWorkflowId {
        &self.id
    }

    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    pub fn reference_type(&self) -> &str {
        &self.reference_type
    }

    pub fn reference_number(&self) -> &str {
        &self.reference_number
    }

    pub fn requested_by(&self) -> i64 {
        self.requested_by
    }

    pub fn status(&self) -> ApprovalStatus {
        self.status
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    pub fn steps(&self) -> &[ApprovalStep] {
        &self.steps
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn final_approved_by(&self) -> Option<i64> {
        self.final_approved_by
    }

    pub fn final_approved_at(&self) -> Option<DateTime<Utc>> {
        self.final_approved_at
    }

    pub fn rejected_by(&self) -> Option<i64> {
        self.rejected_by
    }

    pub fn rejected_at(&self) -> Option<DateTime<Utc>> {
        self.rejected_at
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The step the cursor points at, `None` once the workflow moved past it
    pub fn current(&self) -> Option<&ApprovalStep> {
        self.steps.get(self.current_step.checked_sub(1)? as usize)
    }

    /// Whether the given approver may act on the current step right now
    pub fn is_pending_for(&self, user_id: i64, role: Option<&str>) -> bool {
        !self.status.is_terminal()
            && self
                .current()
                .is_some_and(|step| step.is_assigned_to(user_id, role))
    }

    // State transitions

    /// Approve the current step and advance the cursor
    pub fn approve(
        &mut self,
        user_id: i64,
        step_number: Option<u32>,
        comments: Option<String>,
    ) -> Result<&ApprovalStep, DomainError> {
        let index = self.resolve_step(step_number)?;
        let now = Utc::now();

        self.steps[index].record(ApprovalStepStatus::Approved, user_id, comments, now);
        self.advance(user_id, now);
        Ok(&self.steps[index])
    }

    /// Skip the current step, allowed only when it is not required
    pub fn skip(
        &mut self,
        user_id: i64,
        step_number: Option<u32>,
        comments: Option<String>,
    ) -> Result<&ApprovalStep, DomainError> {
        let index = self.resolve_step(step_number)?;

        if self.steps[index].is_required {
            return Err(DomainError::validation(format!(
                "Step '{}' is required and cannot be skipped",
                self.steps[index].step_name
            )));
        }

        let now = Utc::now();
        self.steps[index].record(ApprovalStepStatus::Skipped, user_id, comments, now);
        self.advance(user_id, now);
        Ok(&self.steps[index])
    }

    /// Reject the current step; rejection always closes the whole workflow
    pub fn reject(
        &mut self,
        user_id: i64,
        reason: &str,
        step_number: Option<u32>,
    ) -> Result<&ApprovalStep, DomainError> {
        if reason.trim().is_empty() {
            return Err(DomainError::validation("Rejection reason is required"));
        }

        let index = self.resolve_step(step_number)?;
        let now = Utc::now();

        self.steps[index].record(
            ApprovalStepStatus::Rejected,
            user_id,
            Some(reason.to_string()),
            now,
        );
        self.status = ApprovalStatus::Rejected;
        self.rejected_by = Some(user_id);
        self.rejected_at = Some(now);
        self.rejection_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(&self.steps[index])
    }

    /// Withdraw a workflow that has not reached a decision
    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        self.ensure_open()?;

        self.status = ApprovalStatus::Cancelled;

        if reason.is_some() {
            self.remarks = reason;
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::conflict(format!(
                "Approval workflow '{}' is already {}",
                self.id, self.status
            )));
        }

        Ok(())
    }

    /// Map an optional explicit step number onto the current step's index
    fn resolve_step(&self, step_number: Option<u32>) -> Result<usize, DomainError> {
        self.ensure_open()?;

        let number = step_number.unwrap_or(self.current_step);

        if number == 0 || number > self.total_steps {
            return Err(DomainError::not_found(format!(
                "Step {} not found in approval workflow '{}'",
                number, self.id
            )));
        }

        if number != self.current_step {
            return Err(DomainError::validation(format!(
                "Step {} is not the current step (current step is {})",
                number, self.current_step
            )));
        }

        Ok((number - 1) as usize)
    }

    fn advance(&mut self, user_id: i64, now: DateTime<Utc>) {
        self.current_step += 1;

        if self.current_step > self.total_steps {
            self.status = ApprovalStatus::Approved;
            self.final_approved_by = Some(user_id);
            self.final_approved_at = Some(now);
        } else {
            self.status = ApprovalStatus::InProgress;
        }

        self.updated_at = now;
    }
}

impl StorageEntity for ApprovalWorkflow {
    type Key = ApprovalWorkflowId;

    fn key(&self) -> &Self::Key {
        &self.id
    }

    fn partition(&self) -> Option<String> {
        Some(self.workflow_type.clone())
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_step() -> ApprovalWorkflow {
        ApprovalWorkflow::new(
            "order_approval",
            "sales_order",
            "SO-1001",
            10,
            vec![
                ApprovalStepDefinition::new("supervisor").with_role("supervisor"),
                ApprovalStepDefinition::new("credit_check").with_user(55).optional(),
                ApprovalStepDefinition::new("director").with_role("director"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_workflow() {
        let wf = three_step();

        assert!(wf.id().as_str().starts_with("apw-"));
        assert_eq!(wf.status(), ApprovalStatus::Pending);
        assert_eq!(wf.current_step(), 1);
        assert_eq!(wf.total_steps(), 3);
        assert_eq!(wf.steps()[2].step_number, 3);
        assert_eq!(wf.current().unwrap().step_name, "supervisor");
        assert_eq!(wf.partition().as_deref(), Some("order_approval"));
    }

    #[test]
    fn test_new_validation() {
        let err = ApprovalWorkflow::new("t", "r", "1", 1, vec![]).unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        let err = ApprovalWorkflow::new(
            "t",
            "r",
            "1",
            1,
            vec![ApprovalStepDefinition::new("a"), ApprovalStepDefinition::new("a")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate step name"));

        let err =
            ApprovalWorkflow::new(" ", "r", "1", 1, vec![ApprovalStepDefinition::new("a")])
                .unwrap_err();
        assert!(err.to_string().contains("workflow_type"));
    }

    #[test]
    fn test_approved_exactly_on_last_step() {
        let mut wf = three_step();

        wf.approve(1, None, Some("looks fine".into())).unwrap();
        assert_eq!(wf.status(), ApprovalStatus::InProgress);
        assert_eq!(wf.current_step(), 2);
        assert!(wf.final_approved_by().is_none());

        wf.approve(2, Some(2), None).unwrap();
        assert_eq!(wf.status(), ApprovalStatus::InProgress);

        let step = wf.approve(3, None, None).unwrap();
        assert_eq!(step.status, ApprovalStepStatus::Approved);
        assert_eq!(wf.status(), ApprovalStatus::Approved);
        assert_eq!(wf.current_step(), 4);
        assert_eq!(wf.final_approved_by(), Some(3));
        assert!(wf.final_approved_at().is_some());
        assert!(wf.current().is_none());
    }

    #[test]
    fn test_explicit_step_must_be_current() {
        let mut wf = three_step();

        let err = wf.approve(1, Some(3), None).unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        let err = wf.approve(1, Some(9), None).unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert_eq!(wf.current_step(), 1);
    }

    #[test]
    fn test_reject_is_terminal_from_any_position() {
        let mut wf = three_step();
        wf.approve(1, None, None).unwrap();

        let step = wf.reject(7, "credit limit exceeded", None).unwrap();
        assert_eq!(step.status, ApprovalStepStatus::Rejected);
        assert_eq!(step.step_number, 2);

        assert_eq!(wf.status(), ApprovalStatus::Rejected);
        assert_eq!(wf.rejected_by(), Some(7));
        assert_eq!(wf.rejection_reason(), Some("credit limit exceeded"));
        assert!(wf.rejected_at().is_some());

        assert!(wf.approve(1, None, None).unwrap_err().is_conflict());
        assert!(wf.reject(1, "again", None).unwrap_err().is_conflict());
        assert!(wf.cancel(None).unwrap_err().is_conflict());
    }

    #[test]
    fn test_reject_requires_reason() {
        let mut wf = three_step();

        let err = wf.reject(7, "  ", None).unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
        assert_eq!(wf.status(), ApprovalStatus::Pending);
    }

    #[test]
    fn test_skip_only_optional_steps() {
        let mut wf = three_step();

        let err = wf.skip(1, None, None).unwrap_err();
        assert!(err.to_string().contains("required"));

        wf.approve(1, None, None).unwrap();
        let step = wf.skip(1, None, Some("under limit".into())).unwrap();
        assert_eq!(step.status, ApprovalStepStatus::Skipped);
        assert_eq!(wf.current_step(), 3);
    }

    #[test]
    fn test_cancel() {
        let mut wf = three_step();

        wf.cancel(Some("order withdrawn".into())).unwrap();

        assert_eq!(wf.status(), ApprovalStatus::Cancelled);
        assert_eq!(wf.remarks(), Some("order withdrawn"));
        assert!(wf.approve(1, None, None).unwrap_err().is_conflict());
    }

    #[test]
    fn test_routing() {
        let mut wf = three_step();

        assert!(wf.is_pending_for(99, Some("supervisor")));
        assert!(!wf.is_pending_for(99, Some("director")));
        assert!(!wf.is_pending_for(55, None));

        wf.approve(1, None, None).unwrap();
        assert!(wf.is_pending_for(55, None));
        assert!(!wf.is_pending_for(99, Some("supervisor")));

        let open = ApprovalStep::from_definition(1, ApprovalStepDefinition::new("anyone"));
        assert!(open.is_assigned_to(1, None));
    }
}
