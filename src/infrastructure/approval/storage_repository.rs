//! Storage-backed approval workflow repository implementation

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::approval::{
    ApprovalWorkflow, ApprovalWorkflowId, ApprovalWorkflowRepository,
};
use crate::domain::storage::Storage;
use crate::domain::DomainError;

/// Storage-backed implementation of ApprovalWorkflowRepository
#[derive(Debug)]
pub struct StorageApprovalWorkflowRepository {
    storage: Arc<dyn Storage<ApprovalWorkflow>>,
}

impl StorageApprovalWorkflowRepository {
    /// Create a new storage-backed repository
    pub fn new(storage: Arc<dyn Storage<ApprovalWorkflow>>) -> Self {
        Self { storage }
    }
}

fn oldest_first(mut workflows: Vec<ApprovalWorkflow>) -> Vec<ApprovalWorkflow> {
    workflows.sort_by_key(|w| w.created_at());
    workflows
}

#[async_trait]
impl ApprovalWorkflowRepository for StorageApprovalWorkflowRepository {
    async fn get(&self, id: &ApprovalWorkflowId) -> Result<Option<ApprovalWorkflow>, DomainError> {
        self.storage.get(id).await
    }

    async fn list(&self) -> Result<Vec<ApprovalWorkflow>, DomainError> {
        Ok(oldest_first(self.storage.list().await?))
    }

    async fn list_by_type(&self, workflow_type: &str) -> Result<Vec<ApprovalWorkflow>, DomainError> {
        Ok(oldest_first(self.storage.list_partition(workflow_type).await?))
    }

    async fn create(&self, workflow: ApprovalWorkflow) -> Result<ApprovalWorkflow, DomainError> {
        self.storage.create(workflow).await
    }

    async fn update(&self, workflow: ApprovalWorkflow) -> Result<ApprovalWorkflow, DomainError> {
        self.storage.update(workflow).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::approval::{ApprovalStatus, ApprovalStepDefinition};
    use crate::domain::storage::StorageEntity;
    use crate::infrastructure::storage::InMemoryStorage;

    fn repo() -> StorageApprovalWorkflowRepository {
        StorageApprovalWorkflowRepository::new(Arc::new(InMemoryStorage::<ApprovalWorkflow>::new()))
    }

    fn workflow(workflow_type: &str, reference: &str) -> ApprovalWorkflow {
        ApprovalWorkflow::new(
            workflow_type,
            "sales_order",
            reference,
            10,
            vec![ApprovalStepDefinition::new("manager").with_role("manager")],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repo();
        let created = repo.create(workflow("order_approval", "SO-1")).await.unwrap();

        let fetched = repo.get(created.id()).await.unwrap().unwrap();
        assert_eq!(fetched.reference_number(), "SO-1");
        assert_eq!(fetched.status(), ApprovalStatus::Pending);

        let missing = ApprovalWorkflowId::generate();
        assert!(repo.get(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_type() {
        let repo = repo();
        repo.create(workflow("order_approval", "SO-1")).await.unwrap();
        repo.create(workflow("order_approval", "SO-2")).await.unwrap();
        repo.create(workflow("credit_limit", "CL-1")).await.unwrap();

        assert_eq!(repo.list().await.unwrap().len(), 3);

        let orders = repo.list_by_type("order_approval").await.unwrap();
        let mut refs: Vec<&str> = orders.iter().map(|w| w.reference_number()).collect();
        refs.sort();
        assert_eq!(refs, vec!["SO-1", "SO-2"]);

        assert!(repo.list_by_type("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_detects_stale_writes() {
        let repo = repo();
        let created = repo.create(workflow("order_approval", "SO-1")).await.unwrap();

        let mut first = created.clone();
        first.approve(20, None, None).unwrap();
        let saved = repo.update(first).await.unwrap();
        assert_eq!(saved.status(), ApprovalStatus::Approved);
        assert_eq!(saved.version(), created.version() + 1);

        let mut stale = created;
        stale.cancel(None).unwrap();
        assert!(repo.update(stale).await.unwrap_err().is_conflict());
    }
}
