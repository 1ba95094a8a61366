//! Aggregate state of a workflow instance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::WorkflowStep;

/// Where a workflow instance stands, derived from its step rows
///
/// The step rows stay the audit log; this is the single answer callers should
/// branch on instead of inspecting sibling statuses themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    /// No active steps exist for the request
    NotStarted,

    /// At least one step is still open
    InProgress { current_step: String, sequence: u32 },

    /// Every step reached a terminal status without a rejection
    Completed,

    /// A step was rejected; the whole workflow is closed
    Rejected {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        by: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        at: Option<DateTime<Utc>>,
    },
}

impl WorkflowOutcome {
    /// Derive the outcome from an instance's steps, in any order
    pub fn from_steps(steps: &[WorkflowStep]) -> Self {
        let active: Vec<&WorkflowStep> = steps.iter().filter(|s| s.is_active()).collect();

        if active.is_empty() {
            return Self::NotStarted;
        }

        if let Some(rejection) = active
            .iter()
            .filter(|s| s.is_rejection())
            .max_by_key(|s| s.sequence())
        {
            return Self::Rejected {
                reason: rejection.remarks().map(String::from),
                by: rejection.action_by(),
                at: rejection.action_date(),
            };
        }

        match active
            .iter()
            .filter(|s| s.status().is_open())
            .min_by_key(|s| s.sequence())
        {
            Some(current) => Self::InProgress {
                current_step: current.step().to_string(),
                sequence: current.sequence(),
            },
            None => Self::Completed,
        }
    }

    /// Completed and rejected workflows accept no further actions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::{NewWorkflowStep, RequestKey, StepStatus};

    fn step(name: &str, sequence: u32, status: StepStatus) -> WorkflowStep {
        WorkflowStep::new(
            &RequestKey::return_request(1),
            NewWorkflowStep::new(name, status),
            sequence,
            1,
        )
    }

    #[test]
    fn test_not_started() {
        assert_eq!(WorkflowOutcome::from_steps(&[]), WorkflowOutcome::NotStarted);

        let mut inactive = step("submitted", 1, StepStatus::Pending);
        inactive.deactivate(1);
        assert_eq!(
            WorkflowOutcome::from_steps(&[inactive]),
            WorkflowOutcome::NotStarted
        );
    }

    #[test]
    fn test_in_progress_points_at_first_open_step() {
        let steps = vec![
            step("manager_review", 2, StepStatus::Pending),
            step("submitted", 1, StepStatus::Completed),
            step("completed", 3, StepStatus::Pending),
        ];

        assert_eq!(
            WorkflowOutcome::from_steps(&steps),
            WorkflowOutcome::InProgress {
                current_step: "manager_review".into(),
                sequence: 2
            }
        );
    }

    #[test]
    fn test_completed_when_nothing_open() {
        let steps = vec![
            step("submitted", 1, StepStatus::Completed),
            step("warehouse_check", 2, StepStatus::Skipped),
        ];

        let outcome = WorkflowOutcome::from_steps(&steps);
        assert_eq!(outcome, WorkflowOutcome::Completed);
        assert!(outcome.is_terminal());
    }

    #[test]
    fn test_rejection_wins_over_open_steps() {
        let rejection = WorkflowStep::new(
            &RequestKey::return_request(1),
            NewWorkflowStep::new("rejected", StepStatus::Rejected)
                .with_remarks("damaged by customer")
                .with_action_by(Some(7)),
            3,
            7,
        );
        let steps = vec![
            step("submitted", 1, StepStatus::InProgress),
            step("completed", 2, StepStatus::Pending),
            rejection,
        ];

        match WorkflowOutcome::from_steps(&steps) {
            WorkflowOutcome::Rejected { reason, by, at } => {
                assert_eq!(reason.as_deref(), Some("damaged by customer"));
                assert_eq!(by, Some(7));
                assert!(at.is_some());
            }
            other => panic!("Expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_serializes_with_state_tag() {
        let json = serde_json::to_value(WorkflowOutcome::Completed).unwrap();
        assert_eq!(json["state"], "completed");

        let json = serde_json::to_value(WorkflowOutcome::InProgress {
            current_step: "submitted".into(),
            sequence: 1,
        })
        .unwrap();
        assert_eq!(json["state"], "in_progress");
        assert_eq!(json["current_step"], "submitted");
    }
}
