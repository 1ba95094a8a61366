//! Storage-backed workflow step repository implementation

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::storage::{Storage, WriteBatch};
use crate::domain::workflow::{
    NewWorkflowStep, RequestKey, StepId, WorkflowStep, WorkflowStepRepository,
};
use crate::domain::DomainError;

/// Storage-backed implementation of WorkflowStepRepository
///
/// Steps are partitioned by `request_type:request_id`, so instance lookups hit
/// a single partition.
#[derive(Debug)]
pub struct StorageWorkflowStepRepository {
    storage: Arc<dyn Storage<WorkflowStep>>,
}

impl StorageWorkflowStepRepository {
    /// Create a new storage-backed repository
    pub fn new(storage: Arc<dyn Storage<WorkflowStep>>) -> Self {
        Self { storage }
    }

    async fn active_steps(&self, key: &RequestKey) -> Result<Vec<WorkflowStep>, DomainError> {
        let mut steps: Vec<WorkflowStep> = self
            .storage
            .list_partition(&key.to_string())
            .await?
            .into_iter()
            .filter(|s| s.is_active())
            .collect();

        steps.sort_by(|a, b| {
            a.sequence()
                .cmp(&b.sequence())
                .then(a.created_at().cmp(&b.created_at()))
        });

        Ok(steps)
    }
}

/// Assign sequences to rows that did not ask for one, continuing after `last`
fn number_steps(
    key: &RequestKey,
    steps: Vec<NewWorkflowStep>,
    mut last: u32,
    user_id: i64,
) -> Vec<WorkflowStep> {
    steps
        .into_iter()
        .map(|input| {
            let sequence = match input.sequence {
                Some(sequence) => sequence,
                None => last + 1,
            };
            last = last.max(sequence);
            WorkflowStep::new(key, input, sequence, user_id)
        })
        .collect()
}

#[async_trait]
impl WorkflowStepRepository for StorageWorkflowStepRepository {
    async fn get_step(&self, id: &StepId) -> Result<Option<WorkflowStep>, DomainError> {
        self.storage.get(id).await
    }

    async fn get_workflow_steps(&self, key: &RequestKey) -> Result<Vec<WorkflowStep>, DomainError> {
        self.active_steps(key).await
    }

    async fn get_workflow_step_by_step(
        &self,
        key: &RequestKey,
        step: &str,
    ) -> Result<Option<WorkflowStep>, DomainError> {
        Ok(self
            .active_steps(key)
            .await?
            .into_iter()
            .find(|s| s.step() == step))
    }

    async fn add_workflow_step(
        &self,
        key: &RequestKey,
        step: NewWorkflowStep,
        user_id: i64,
    ) -> Result<WorkflowStep, DomainError> {
        let last = self
            .active_steps(key)
            .await?
            .last()
            .map_or(0, |s| s.sequence());

        let row = number_steps(key, vec![step], last, user_id)
            .pop()
            .ok_or_else(|| DomainError::internal("No step row was built"))?;

        self.storage.create(row).await
    }

    async fn add_workflow_steps(
        &self,
        key: &RequestKey,
        steps: Vec<NewWorkflowStep>,
        user_id: i64,
    ) -> Result<Vec<WorkflowStep>, DomainError> {
        if steps.is_empty() {
            return Ok(Vec::new());
        }

        let last = self
            .active_steps(key)
            .await?
            .last()
            .map_or(0, |s| s.sequence());

        self.storage
            .create_batch(number_steps(key, steps, last, user_id))
            .await
    }

    async fn update_workflow_step(&self, step: WorkflowStep) -> Result<WorkflowStep, DomainError> {
        let id = step.id().clone();

        self.storage.update(step).await.map_err(|e| match e {
            DomainError::NotFound { .. } => {
                DomainError::not_found(format!("Workflow step '{}' not found", id))
            }
            other => other,
        })
    }

    async fn replace_workflow_steps(
        &self,
        key: &RequestKey,
        steps: Vec<NewWorkflowStep>,
        user_id: i64,
    ) -> Result<(usize, Vec<WorkflowStep>), DomainError> {
        let superseded: Vec<WorkflowStep> = self
            .active_steps(key)
            .await?
            .into_iter()
            .map(|mut step| {
                step.deactivate(user_id);
                step
            })
            .collect();
        let count = superseded.len();

        let batch = WriteBatch::updates(superseded).with_inserts(number_steps(key, steps, 0, user_id));
        let written = self.storage.write_batch(batch).await?;

        Ok((count, written.inserts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::storage::mock::MockStorage;
    use crate::domain::workflow::StepStatus;
    use crate::infrastructure::storage::InMemoryStorage;

    fn repo() -> StorageWorkflowStepRepository {
        StorageWorkflowStepRepository::new(Arc::new(InMemoryStorage::<WorkflowStep>::new()))
    }

    fn key() -> RequestKey {
        RequestKey::return_request(42)
    }

    #[tokio::test]
    async fn test_missing_workflow_is_empty() {
        let repo = repo();

        assert!(repo.get_workflow_steps(&key()).await.unwrap().is_empty());
        assert!(repo
            .get_workflow_step_by_step(&key(), "submitted")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_add_steps_in_order() {
        let repo = repo();
        let created = repo
            .add_workflow_steps(
                &key(),
                vec![
                    NewWorkflowStep::new("submitted", StepStatus::InProgress).with_sequence(1),
                    NewWorkflowStep::new("manager_review", StepStatus::Pending).with_sequence(2),
                    NewWorkflowStep::new("completed", StepStatus::Pending).with_sequence(3),
                ],
                7,
            )
            .await
            .unwrap();
        assert_eq!(created.len(), 3);

        let steps = repo.get_workflow_steps(&key()).await.unwrap();
        let names: Vec<&str> = steps.iter().map(|s| s.step()).collect();
        assert_eq!(names, vec!["submitted", "manager_review", "completed"]);
        assert!(steps.iter().all(|s| s.request_id() == 42 && s.created_by() == 7));

        // Other instances are not visible
        assert!(repo
            .get_workflow_steps(&RequestKey::return_request(43))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_add_step_appends_after_last() {
        let repo = repo();
        repo.add_workflow_steps(
            &key(),
            vec![
                NewWorkflowStep::new("submitted", StepStatus::Pending),
                NewWorkflowStep::new("completed", StepStatus::Pending),
            ],
            1,
        )
        .await
        .unwrap();

        let extra = repo
            .add_workflow_step(
                &key(),
                NewWorkflowStep::new("quality_review", StepStatus::Pending),
                1,
            )
            .await
            .unwrap();

        assert_eq!(extra.sequence(), 3);
        assert!(extra.action_by().is_none());

        let found = repo
            .get_workflow_step_by_step(&key(), "quality_review")
            .await
            .unwrap();
        assert_eq!(found.unwrap().id(), extra.id());
    }

    #[tokio::test]
    async fn test_update_step_and_conflict() {
        let repo = repo();
        let step = repo
            .add_workflow_step(&key(), NewWorkflowStep::new("submitted", StepStatus::Pending), 1)
            .await
            .unwrap();

        let mut first = step.clone();
        first
            .apply_status(StepStatus::Completed, None, Some(3), 3)
            .unwrap();
        let updated = repo.update_workflow_step(first).await.unwrap();
        assert_eq!(updated.status(), StepStatus::Completed);

        let mut stale = step;
        stale.apply_status(StepStatus::Skipped, None, None, 4).unwrap();
        let err = repo.update_workflow_step(stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_unknown_step_is_not_found() {
        let repo = repo();
        let orphan = WorkflowStep::new(
            &key(),
            NewWorkflowStep::new("submitted", StepStatus::Pending),
            1,
            1,
        );
        let id = orphan.id().to_string();

        let err = repo.update_workflow_step(orphan).await.unwrap_err();

        assert!(matches!(err, DomainError::NotFound { .. }));
        assert!(err.to_string().contains(&id));
    }

    #[tokio::test]
    async fn test_replace_supersedes_active_steps() {
        let repo = repo();
        let old = repo
            .add_workflow_steps(
                &key(),
                vec![
                    NewWorkflowStep::new("submitted", StepStatus::Completed),
                    NewWorkflowStep::new("completed", StepStatus::InProgress),
                ],
                1,
            )
            .await
            .unwrap();

        let (superseded, fresh) = repo
            .replace_workflow_steps(
                &key(),
                vec![NewWorkflowStep::new("submitted", StepStatus::InProgress)],
                2,
            )
            .await
            .unwrap();

        assert_eq!(superseded, 2);
        assert_eq!(fresh[0].sequence(), 1);
        let active = repo.get_workflow_steps(&key()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), fresh[0].id());

        // Rows are kept, only flagged
        let stored = repo.get_step(old[0].id()).await.unwrap().unwrap();
        assert!(!stored.is_active());
        assert_eq!(stored.updated_by(), Some(2));
    }

    #[tokio::test]
    async fn test_replace_failure_keeps_old_steps() {
        let storage = Arc::new(MockStorage::<WorkflowStep>::new());
        let repo = StorageWorkflowStepRepository::new(storage.clone());
        repo.add_workflow_steps(
            &key(),
            vec![
                NewWorkflowStep::new("submitted", StepStatus::InProgress),
                NewWorkflowStep::new("manager_review", StepStatus::Pending),
                NewWorkflowStep::new("completed", StepStatus::Pending),
            ],
            1,
        )
        .await
        .unwrap();

        storage.fail_updates_after(2);
        let err = repo
            .replace_workflow_steps(
                &key(),
                vec![NewWorkflowStep::new("submitted", StepStatus::InProgress)],
                2,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Storage { .. }));
        let active = repo.get_workflow_steps(&key()).await.unwrap();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(|s| s.updated_by().is_none()));
    }
}
