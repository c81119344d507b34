//! Plan operations against the file store

use chrono::{NaiveDate, Utc};

use super::model::{Plan, PlanDraft, Progress, Task};
use crate::error::{Error, Result};
use crate::store::FileStore;
use crate::types::FileWrite;

/// Reads the plan file, applies one change and writes it back.
///
/// Every mutation is a read-modify-write of the whole document with no
/// locking; concurrent writers race and the last one wins.
#[derive(Clone)]
pub struct PlanTracker {
    store: FileStore,
}

impl PlanTracker {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    fn plan_file(&self) -> &str {
        &self.store.config().plan_file
    }

    /// Replace the plan with a fresh one built from `draft`.
    pub async fn create_plan(&self, draft: PlanDraft) -> Result<Plan> {
        let plan = Plan::from_draft(draft)?;
        self.save(&plan).await?;
        tracing::info!(tasks = plan.tasks().count(), "Created plan");
        Ok(plan)
    }

    pub async fn save(&self, plan: &Plan) -> Result<()> {
        self.store
            .write(FileWrite::new(self.plan_file(), plan.to_markdown()))
            .await?;
        Ok(())
    }

    pub async fn load(&self) -> Result<Plan> {
        let file = self.store.read(self.plan_file()).await?.ok_or_else(|| {
            Error::Plan(format!(
                "{} is missing; run init or create a plan",
                self.plan_file()
            ))
        })?;
        Ok(Plan::parse(&file.content))
    }

    pub async fn next_task(&self) -> Result<Option<Task>> {
        Ok(self.load().await?.next_task().cloned())
    }

    pub async fn blocked_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.load().await?.blocked_tasks().into_iter().cloned().collect())
    }

    pub async fn review_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.load().await?.review_tasks().into_iter().cloned().collect())
    }

    pub async fn progress(&self) -> Result<Progress> {
        Ok(self.load().await?.progress())
    }

    pub async fn start_task(&self, step: &str) -> Result<Task> {
        self.update(|plan| plan.start(step)).await
    }

    /// Mark done with today's date.
    pub async fn complete_task(&self, step: &str) -> Result<Task> {
        let today = Utc::now().date_naive();
        self.complete_task_on(step, today).await
    }

    pub async fn complete_task_on(&self, step: &str, on: NaiveDate) -> Result<Task> {
        self.update(|plan| plan.complete(step, on)).await
    }

    pub async fn block_task(&self, step: &str, reason: &str) -> Result<Task> {
        self.update(|plan| plan.block(step, reason)).await
    }

    pub async fn review_task(&self, step: &str, note: &str) -> Result<Task> {
        self.update(|plan| plan.flag_review(step, note)).await
    }

    pub async fn reset_task(&self, step: &str) -> Result<Task> {
        self.update(|plan| plan.reset(step)).await
    }

    /// Append a dated line to the Notes section.
    pub async fn append_note(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("note is empty", "pass the note text"));
        }
        let mut plan = self.load().await?;
        plan.append_note(&format!("- {}: {}", Utc::now().format("%Y-%m-%d"), text));
        self.save(&plan).await
    }

    async fn update<F>(&self, change: F) -> Result<Task>
    where
        F: FnOnce(&mut Plan) -> Result<Task>,
    {
        let mut plan = self.load().await?;
        let task = change(&mut plan)?;
        self.save(&plan).await?;
        tracing::info!(step = %task.step, status = %task.status(), "Updated task");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::StoreConfig;
    use crate::executor::RequestExecutor;
    use crate::plan::{PhaseDraft, TaskStatus};
    use crate::retry::RetryPolicy;
    use crate::sheets::MemorySheets;

    async fn tracker() -> PlanTracker {
        let api = Arc::new(MemorySheets::new());
        let executor = Arc::new(RequestExecutor::from_api(api, RetryPolicy::immediate(1)));
        let store = FileStore::connect(executor, StoreConfig::default())
            .await
            .unwrap();
        PlanTracker::new(store)
    }

    fn draft() -> PlanDraft {
        PlanDraft {
            title: "Tidy".into(),
            goal: "Clean up the store.".into(),
            phases: vec![PhaseDraft {
                name: "Sweep".into(),
                tasks: vec!["List files".into(), "Archive old ones".into()],
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_seeded_plan_loads() {
        let tracker = tracker().await;
        let plan = tracker.load().await.unwrap();
        assert_eq!(plan.next_task().unwrap().step, "1.1");
    }

    #[tokio::test]
    async fn test_create_and_advance() {
        let tracker = tracker().await;
        tracker.create_plan(draft()).await.unwrap();

        tracker.start_task("1.1").await.unwrap();
        let done = tracker
            .complete_task_on("1.1", NaiveDate::from_ymd_opt(2024, 2, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(done.status(), TaskStatus::Done);
        assert_eq!(tracker.next_task().await.unwrap().unwrap().step, "1.2");

        tracker.block_task("1.2", "needs owner").await.unwrap();
        assert!(tracker.next_task().await.unwrap().is_none());
        assert_eq!(tracker.blocked_tasks().await.unwrap().len(), 1);

        let content = tracker
            .store()
            .read("plan.md")
            .await
            .unwrap()
            .unwrap()
            .content;
        assert!(content.contains("- [x] 1.1 List files (done: 2024-02-02)\n"));
        assert!(content.contains("- [>] 1.2 Archive old ones (blocked: needs owner)\n"));
    }

    #[tokio::test]
    async fn test_unknown_step_leaves_plan_untouched() {
        let tracker = tracker().await;
        tracker.create_plan(draft()).await.unwrap();
        let before = tracker.store().read("plan.md").await.unwrap().unwrap();

        let err = tracker.start_task("4.2").await.unwrap_err();
        assert!(matches!(err, Error::Plan(_)));
        let after = tracker.store().read("plan.md").await.unwrap().unwrap();
        assert_eq!(before.content, after.content);
    }

    #[tokio::test]
    async fn test_append_note() {
        let tracker = tracker().await;
        tracker.create_plan(draft()).await.unwrap();
        tracker.append_note("talked to ops").await.unwrap();
        let notes = tracker.load().await.unwrap().notes().unwrap();
        assert!(notes.ends_with(": talked to ops"));
        assert!(tracker.append_note(" ").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_plan_is_plan_error() {
        let tracker = tracker().await;
        let mut config = StoreConfig::default();
        config.plan_file = "other-plan.md".into();
        let store = FileStore::open(tracker.store().executor().clone(), config)
            .await
            .unwrap();
        let err = PlanTracker::new(store).load().await.unwrap_err();
        assert!(matches!(err, Error::Plan(_)));
    }
}
