//! SFA Workflow Service
//!
//! State machines behind the sales-force return process:
//! - Template-driven return workflows advanced one step at a time
//! - Generic multi-step approval workflows (order approvals and the like)
//! - In-memory or PostgreSQL persistence with optimistic concurrency

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::AppState;
use domain::{ApprovalWorkflow, DomainError, TemplateRegistry, WorkflowStep};
use infrastructure::{
    approval::StorageApprovalWorkflowRepository,
    services::{ApprovalWorkflowService, ReturnWorkflowService, ReturnWorkflowServiceConfig},
    storage::{
        run_storage_migrations, StorageConfig, StorageFactory, APPROVAL_WORKFLOWS_TABLE,
        WORKFLOW_STEPS_TABLE,
    },
    workflow::StorageWorkflowStepRepository,
};
use tracing::info;

/// Create the application state with default configuration
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state from configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let storage_config = StorageConfig::from_backend(
        &config.storage.backend,
        config.storage.database_url.as_deref(),
        config.storage.max_connections,
    )?;

    let pool = match &storage_config {
        StorageConfig::InMemory => {
            info!("Using in-memory storage");
            None
        }
        StorageConfig::Postgres(pg) => {
            let pool = pg.connect().await?;
            let version = run_storage_migrations(&pool).await?;
            info!(?version, "PostgreSQL storage ready");
            Some(pool)
        }
    };

    let templates = Arc::new(TemplateRegistry::builtin());

    if templates.get(&config.workflow.default_template).is_none() {
        return Err(DomainError::configuration(format!(
            "Default template '{}' is not registered",
            config.workflow.default_template
        ))
        .into());
    }

    let step_storage = StorageFactory::create::<WorkflowStep>(pool.as_ref(), WORKFLOW_STEPS_TABLE);
    let approval_storage =
        StorageFactory::create::<ApprovalWorkflow>(pool.as_ref(), APPROVAL_WORKFLOWS_TABLE);

    let workflow_service = ReturnWorkflowService::with_config(
        Arc::new(StorageWorkflowStepRepository::new(step_storage)),
        templates,
        ReturnWorkflowServiceConfig {
            default_template: config.workflow.default_template.clone(),
            request_type: config.workflow.request_type.clone(),
        },
    );
    let approval_service = ApprovalWorkflowService::new(Arc::new(
        StorageApprovalWorkflowRepository::new(approval_storage),
    ));

    Ok(AppState::new(
        Arc::new(workflow_service),
        Arc::new(approval_service),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_state_uses_memory_storage() {
        let state = create_app_state().await.unwrap();

        assert!(!state.workflow_service.list_templates().is_empty());
        assert!(state.approval_service.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_default_template_is_rejected() {
        let mut config = AppConfig::default();
        config.workflow.default_template = "missing".to_string();

        let err = create_app_state_with_config(&config).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_postgres_requires_url() {
        let mut config = AppConfig::default();
        config.storage.backend = "postgres".to_string();

        assert!(create_app_state_with_config(&config).await.is_err());
    }
}
