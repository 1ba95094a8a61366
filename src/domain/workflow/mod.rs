//! Return workflow domain module
//!
//! A return workflow is an ordered sequence of named steps per
//! `(request_type, request_id)`, instantiated from a template and advanced one
//! step at a time. Step statuses move along
//! `pending -> in_progress -> completed`, with `rejected` reachable from
//! `pending`/`in_progress` and `skipped` from `pending`.

mod entity;
mod outcome;
pub mod repository;
mod template;

pub use entity::{
    NewWorkflowStep, RequestKey, StepId, StepStatus, WorkflowStep, REJECTED_STEP,
    RETURN_REQUEST_TYPE,
};
pub use outcome::WorkflowOutcome;
pub use repository::WorkflowStepRepository;
pub use template::{
    validate_template_id, TemplateRegistry, TemplateStep, WorkflowTemplate, DEFAULT_TEMPLATE_ID,
};

#[cfg(test)]
pub use repository::MockWorkflowStepRepository;
