//! Domain layer - Core business logic and entities

pub mod approval;
pub mod error;
pub mod storage;
pub mod workflow;

pub use approval::{
    ApprovalStatus, ApprovalStep, ApprovalStepDefinition, ApprovalStepStatus, ApprovalWorkflow,
    ApprovalWorkflowId, ApprovalWorkflowRepository,
};
pub use error::DomainError;
pub use storage::{Storage, StorageEntity, StorageKey};
pub use workflow::{
    NewWorkflowStep, RequestKey, StepId, StepStatus, TemplateRegistry, WorkflowOutcome,
    WorkflowStep, WorkflowStepRepository, WorkflowTemplate,
};
