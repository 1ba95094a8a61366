//! Workflow step entity

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Request type used by return requests
pub const RETURN_REQUEST_TYPE: &str = "return_request";

/// Step name used for the terminal rejection row
pub const REJECTED_STEP: &str = "rejected";

/// Regex pattern for valid step IDs: wfs-{uuid}
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^wfs-[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$").unwrap()
});

/// Validated workflow step identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepId(String);

impl StepId {
    /// Create a new validated step ID
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();

        if !ID_PATTERN.is_match(&id) {
            return Err(DomainError::invalid_id(format!(
                "Invalid step ID '{}': must be in format wfs-{{uuid}}",
                id
            )));
        }

        Ok(Self(id))
    }

    /// Generate a new step ID with UUID
    pub fn generate() -> Self {
        Self(format!("wfs-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StepId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StepId> for String {
    fn from(id: StepId) -> Self {
        id.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for StepId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifies one workflow instance: the owning entity class plus its id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub request_type: String,
    pub request_id: i64,
}

impl RequestKey {
    pub fn new(request_type: impl Into<String>, request_id: i64) -> Self {
        Self {
            request_type: request_type.into(),
            request_id,
        }
    }

    /// Key for a return request workflow
    pub fn return_request(request_id: i64) -> Self {
        Self::new(RETURN_REQUEST_TYPE, request_id)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.request_type, self.request_id)
    }
}

/// Lifecycle state of a single step instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Rejected,
    Skipped,
}

impl StepStatus {
    pub const ALL: [StepStatus; 5] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Rejected,
        Self::Skipped,
    ];

    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Skipped)
    }

    /// Whether the step still has to be actioned
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// Check if this status can transition to another status
    ///
    /// Re-asserting the current status is allowed so remarks can be amended.
    pub fn can_transition_to(&self, target: StepStatus) -> bool {
        if *self == target {
            return true;
        }

        match (self, target) {
            (Self::Pending, Self::InProgress) => true,
            (Self::Pending, Self::Completed) => true,
            (Self::Pending, Self::Rejected) => true,
            (Self::Pending, Self::Skipped) => true,

            (Self::InProgress, Self::Completed) => true,
            (Self::InProgress, Self::Rejected) => true,

            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();

        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "Invalid status '{}': expected one of pending, in_progress, completed, rejected, skipped",
                    s
                ))
            })
    }
}

/// Serializes the soft-delete flag the way the relational schema stores it
mod yes_no {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "Y" } else { "N" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "Y" => Ok(true),
            "N" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected 'Y' or 'N', got '{}'",
                other
            ))),
        }
    }
}

/// Input for inserting a step row
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkflowStep {
    pub step: String,
    pub status: StepStatus,
    /// Explicit position; appended after the last step when `None`
    pub sequence: Option<u32>,
    pub remarks: Option<String>,
    pub action_by: Option<i64>,
}

impl NewWorkflowStep {
    pub fn new(step: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step: step.into(),
            status,
            sequence: None,
            remarks: None,
            action_by: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    pub fn with_action_by(mut self, action_by: Option<i64>) -> Self {
        self.action_by = action_by;
        self
    }
}

/// One step instance of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    id: StepId,
    request_type: String,
    request_id: i64,
    sequence: u32,
    step: String,
    status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    remarks: Option<String>,
    action_by: Option<i64>,
    action_date: Option<DateTime<Utc>>,
    #[serde(with = "yes_no")]
    is_active: bool,
    created_at: DateTime<Utc>,
    created_by: i64,
    updated_at: DateTime<Utc>,
    updated_by: Option<i64>,
    version: u64,
}

impl WorkflowStep {
    /// Create a fresh step row at the given position
    ///
    /// A step created already actioned (anything but pending) is stamped with
    /// the creation time as its action date.
    pub fn new(key: &RequestKey, input: NewWorkflowStep, sequence: u32, created_by: i64) -> Self {
        let now = Utc::now();
        let action_date = (input.status != StepStatus::Pending).then_some(now);

        Self {
            id: StepId::generate(),
            request_type: key.request_type.clone(),
            request_id: key.request_id,
            sequence,
            step: input.step,
            status: input.status,
            remarks: input.remarks,
            action_by: input.action_by,
            action_date,
            is_active: true,
            created_at: now,
            created_by,
            updated_at: now,
            updated_by: None,
            version: 1,
        }
    }

    // Getters

    pub fn id(&self) -> &StepId {
        &self.id
    }

    pub fn request_key(&self) -> RequestKey {
        RequestKey::new(self.request_type.clone(), self.request_id)
    }

    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    pub fn request_id(&self) -> i64 {
        self.request_id
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn action_by(&self) -> Option<i64> {
        self.action_by
    }

    pub fn action_date(&self) -> Option<DateTime<Utc>> {
        self.action_date
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> i64 {
        self.created_by
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn updated_by(&self) -> Option<i64> {
        self.updated_by
    }

    /// Whether this row is the terminal rejection marker
    pub fn is_rejection(&self) -> bool {
        self.status == StepStatus::Rejected
    }

    // State transitions

    /// Move the step to `status`, recording remarks and actor
    ///
    /// `action_date` is refreshed whenever the status actually changes.
    pub fn apply_status(
        &mut self,
        status: StepStatus,
        remarks: Option<String>,
        action_by: Option<i64>,
        user_id: i64,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(status) {
            return Err(DomainError::validation(format!(
                "Step '{}' cannot move from {} to {}",
                self.step, self.status, status
            )));
        }

        let now = Utc::now();

        if self.status != status {
            self.status = status;
            self.action_date = Some(now);
        }

        if remarks.is_some() {
            self.remarks = remarks;
        }

        if action_by.is_some() {
            self.action_by = action_by;
        }

        self.updated_at = now;
        self.updated_by = Some(user_id);
        Ok(())
    }

    /// Mark the step rejected, restamping actor and date even if it already was
    pub fn record_rejection(
        &mut self,
        reason: impl Into<String>,
        user_id: i64,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(StepStatus::Rejected) {
            return Err(DomainError::validation(format!(
                "Step '{}' cannot move from {} to rejected",
                self.step, self.status
            )));
        }

        let now = Utc::now();
        self.status = StepStatus::Rejected;
        self.remarks = Some(reason.into());
        self.action_by = Some(user_id);
        self.action_date = Some(now);
        self.updated_at = now;
        self.updated_by = Some(user_id);
        Ok(())
    }

    /// Flag the row as superseded
    pub fn deactivate(&mut self, user_id: i64) {
        self.is_active = false;
        self.updated_at = Utc::now();
        self.updated_by = Some(user_id);
    }
}

impl StorageEntity for WorkflowStep {
    type Key = StepId;

    fn key(&self) -> &Self::Key {
        &self.id
    }

    fn partition(&self) -> Option<String> {
        Some(self.request_key().to_string())
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

    fn pending_step(name: &str) -> WorkflowStep {
        WorkflowStep::new(
            &RequestKey::return_request(42),
            NewWorkflowStep::new(name, StepStatus::Pending),
            1,
            7,
        )
    }

    #[test]
    fn test_step_id_generate_and_validate() {
        let id = StepId::generate();
        assert!(id.as_str().starts_with("wfs-"));
        assert!(StepId::new(id.as_str()).is_ok());

        let err = StepId::new("step-1").unwrap_err();
        assert!(matches!(err, DomainError::InvalidId { .. }));
    }

    #[test]
    fn test_request_key_display() {
        assert_eq!(RequestKey::return_request(42).to_string(), "return_request:42");
        assert_eq!(RequestKey::new("order", 9).to_string(), "order:9");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("pending".parse::<StepStatus>().unwrap(), StepStatus::Pending);
        assert_eq!("In_Progress".parse::<StepStatus>().unwrap(), StepStatus::InProgress);
        assert_eq!("skipped".parse::<StepStatus>().unwrap(), StepStatus::Skipped);

        let err = "done".parse::<StepStatus>().unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[test]
    fn test_status_transitions() {
        use StepStatus::*;

        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Skipped));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Rejected));

        assert!(!InProgress.can_transition_to(Skipped));
        assert!(!InProgress.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Rejected.can_transition_to(Completed));
        assert!(!Skipped.can_transition_to(Pending));

        assert!(Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_new_step_defaults() {
        let step = pending_step("submitted");

        assert_eq!(step.request_type(), RETURN_REQUEST_TYPE);
        assert_eq!(step.request_id(), 42);
        assert_eq!(step.sequence(), 1);
        assert_eq!(step.status(), StepStatus::Pending);
        assert!(step.action_by().is_none());
        assert!(step.action_date().is_none());
        assert!(step.is_active());
        assert_eq!(step.created_by(), 7);
        assert_eq!(step.version(), 1);
        assert_eq!(step.partition().as_deref(), Some("return_request:42"));
    }

    #[test]
    fn test_new_actioned_step_has_action_date() {
        let step = WorkflowStep::new(
            &RequestKey::return_request(42),
            NewWorkflowStep::new(REJECTED_STEP, StepStatus::Rejected)
                .with_remarks("damaged")
                .with_action_by(Some(7)),
            6,
            7,
        );

        assert!(step.is_rejection());
        assert!(step.action_date().is_some());
        assert_eq!(step.remarks(), Some("damaged"));
    }

    #[test]
    fn test_apply_status_sets_action_date() {
        let mut step = pending_step("submitted");

        step.apply_status(StepStatus::Completed, Some("ok".into()), Some(9), 9)
            .unwrap();

        assert_eq!(step.status(), StepStatus::Completed);
        assert_eq!(step.remarks(), Some("ok"));
        assert_eq!(step.action_by(), Some(9));
        assert_eq!(step.updated_by(), Some(9));
        assert!(step.action_date().is_some());
    }

    #[test]
    fn test_apply_status_rejects_illegal_transition() {
        let mut step = pending_step("submitted");
        step.apply_status(StepStatus::Completed, None, None, 1).unwrap();

        let err = step
            .apply_status(StepStatus::InProgress, None, None, 1)
            .unwrap_err();

        assert!(err.to_string().contains("cannot move from completed to in_progress"));
        assert_eq!(step.status(), StepStatus::Completed);
    }

    #[test]
    fn test_same_status_keeps_action_date() {
        let mut step = pending_step("submitted");

        step.apply_status(StepStatus::Pending, Some("note".into()), None, 3)
            .unwrap();

        assert!(step.action_date().is_none());
        assert_eq!(step.remarks(), Some("note"));
    }

    #[test]
    fn test_record_rejection_restamps() {
        let mut step = WorkflowStep::new(
            &RequestKey::return_request(42),
            NewWorkflowStep::new(REJECTED_STEP, StepStatus::Rejected).with_remarks("first"),
            4,
            7,
        );
        let first_date = step.action_date();

        step.record_rejection("second", 9).unwrap();

        assert_eq!(step.status(), StepStatus::Rejected);
        assert_eq!(step.remarks(), Some("second"));
        assert_eq!(step.action_by(), Some(9));
        assert!(step.action_date() >= first_date);

        let mut done = pending_step("submitted");
        done.apply_status(StepStatus::Completed, None, None, 1).unwrap();
        assert!(done.record_rejection("late", 1).is_err());
    }

    #[test]
    fn test_is_active_serializes_as_flag() {
        let mut step = pending_step("submitted");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["is_active"], "Y");
        assert_eq!(json["status"], "pending");

        step.deactivate(3);
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["is_active"], "N");

        let restored: WorkflowStep = serde_json::from_value(json).unwrap();
        assert!(!restored.is_active());
    }
}
