//! Workflow templates
//!
//! A template is the static, named definition of the step names and their
//! initial statuses used to instantiate a new workflow instance.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::entity::{NewWorkflowStep, StepStatus};
use crate::domain::DomainError;

/// Template used when the caller does not name one
pub const DEFAULT_TEMPLATE_ID: &str = "standard_return";

/// Maximum length for template IDs
pub const MAX_TEMPLATE_ID_LENGTH: usize = 50;

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").unwrap());

/// Validate a template ID string
pub fn validate_template_id(id: &str) -> Result<(), DomainError> {
    if id.is_empty() {
        return Err(DomainError::invalid_id("Template ID cannot be empty"));
    }

    if id.len() > MAX_TEMPLATE_ID_LENGTH {
        return Err(DomainError::invalid_id(format!(
            "Template ID exceeds maximum length of {} characters",
            MAX_TEMPLATE_ID_LENGTH
        )));
    }

    if !ID_PATTERN.is_match(id) {
        return Err(DomainError::invalid_id(format!(
            "Invalid template ID '{}': must be lowercase alphanumeric with '_' or '-'",
            id
        )));
    }

    Ok(())
}

/// One entry of a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateStep {
    pub name: String,
    pub initial_status: StepStatus,
}

/// Ordered, read-only step definition for a request type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    steps: Vec<TemplateStep>,
}

impl WorkflowTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_step(mut self, name: impl Into<String>, initial_status: StepStatus) -> Self {
        self.steps.push(TemplateStep {
            name: name.into(),
            initial_status,
        });
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn steps(&self) -> &[TemplateStep] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Check the template is instantiable
    ///
    /// Step names must be unique and non-empty, only the first entry may start
    /// `in_progress`, and every other entry starts `pending`.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_template_id(&self.id)?;

        if self.steps.is_empty() {
            return Err(DomainError::validation(format!(
                "Template '{}' must have at least one step",
                self.id
            )));
        }

        let mut seen = HashSet::new();

        for (index, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "Template '{}' has an unnamed step at position {}",
                    self.id,
                    index + 1
                )));
            }

            if !seen.insert(step.name.as_str()) {
                return Err(DomainError::validation(format!(
                    "Template '{}' has duplicate step '{}'",
                    self.id, step.name
                )));
            }

            let allowed = match index {
                0 => matches!(step.initial_status, StepStatus::Pending | StepStatus::InProgress),
                _ => step.initial_status == StepStatus::Pending,
            };

            if !allowed {
                return Err(DomainError::validation(format!(
                    "Template '{}' step '{}' cannot start as {}",
                    self.id, step.name, step.initial_status
                )));
            }
        }

        Ok(())
    }

    /// Rows to insert when instantiating this template, numbered from 1
    pub fn instantiate(&self) -> Vec<NewWorkflowStep> {
        self.steps
            .iter()
            .zip(1u32..)
            .map(|(step, sequence)| {
                NewWorkflowStep::new(step.name.clone(), step.initial_status).with_sequence(sequence)
            })
            .collect()
    }
}

/// Read-only set of templates selectable at workflow creation
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: Vec<WorkflowTemplate>,
}

impl TemplateRegistry {
    /// Build a registry, validating every template and rejecting duplicate ids
    pub fn new(templates: Vec<WorkflowTemplate>) -> Result<Self, DomainError> {
        let mut ids = HashSet::new();

        for template in &templates {
            template.validate()?;

            if !ids.insert(template.id().to_string()) {
                return Err(DomainError::configuration(format!(
                    "Duplicate template id '{}'",
                    template.id()
                )));
            }
        }

        Ok(Self { templates })
    }

    /// Registry holding the built-in return templates
    pub fn builtin() -> Self {
        Self {
            templates: builtin_templates(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowTemplate> {
        self.templates.iter().find(|t| t.id() == id)
    }

    /// Look up a template, failing with `NotFound` for unknown ids
    pub fn resolve(&self, id: &str) -> Result<&WorkflowTemplate, DomainError> {
        validate_template_id(id)?;

        self.get(id)
            .ok_or_else(|| DomainError::not_found(format!("Workflow template '{}' not found", id)))
    }

    pub fn list(&self) -> &[WorkflowTemplate] {
        &self.templates
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_templates() -> Vec<WorkflowTemplate> {
    vec![
        WorkflowTemplate::new(DEFAULT_TEMPLATE_ID, "Standard Return")
            .with_description("Manager review and warehouse check before refund")
            .with_step("submitted", StepStatus::InProgress)
            .with_step("manager_review", StepStatus::Pending)
            .with_step("warehouse_check", StepStatus::Pending)
            .with_step("refund_processed", StepStatus::Pending)
            .with_step("completed", StepStatus::Pending),
        WorkflowTemplate::new("quick_return", "Quick Return")
            .with_description("Low-value returns refunded without review")
            .with_step("submitted", StepStatus::InProgress)
            .with_step("refund_processed", StepStatus::Pending)
            .with_step("completed", StepStatus::Pending),
        WorkflowTemplate::new("exchange_return", "Exchange Return")
            .with_description("Returned goods replaced instead of refunded")
            .with_step("submitted", StepStatus::InProgress)
            .with_step("manager_review", StepStatus::Pending)
            .with_step("warehouse_check", StepStatus::Pending)
            .with_step("replacement_shipped", StepStatus::Pending)
            .with_step("completed", StepStatus::Pending),
    ]
}
