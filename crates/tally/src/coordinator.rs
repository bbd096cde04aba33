use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::hooks::HookPipeline;
use crate::instance::from_completion;
use crate::recurrence::dates::{date_of, format_timestamp, parse_date, parse_timestamp, start_of_day};
use crate::recurrence::{parse_interval, OccurrenceRule};
use crate::storage::TaskStore;
use crate::strategy::resolve_strategy;
use crate::sweep::{process_due_recurrences, SweepErrorPolicy};
use tally_models::*;

/// Single entry point for changing tasks. Every operation takes `now`
/// explicitly and re-reads what it needs from the store; writes happen only
/// after blocking hooks and rule evaluation succeeded.
pub struct TaskMutationCoordinator {
    store: Arc<dyn TaskStore>,
    hooks: HookPipeline,
    sweep_policy: SweepErrorPolicy,
}

impl TaskMutationCoordinator {
    pub fn new(store: Arc<dyn TaskStore>, hooks: HookPipeline) -> Self {
        Self {
            store,
            hooks,
            sweep_policy: SweepErrorPolicy::default(),
        }
    }

    pub fn with_sweep_policy(mut self, policy: SweepErrorPolicy) -> Self {
        self.sweep_policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn get_task(&self, id: &str) -> Result<Task> {
        self.store.load(id)
    }

    /// Non-terminal tasks, or everything with `include_terminal`.
    pub fn list_tasks(&self, include_terminal: bool) -> Result<Vec<Task>> {
        Ok(self
            .store
            .load_all()?
            .into_iter()
            .filter(|t| include_terminal || !t.status.is_terminal())
            .collect())
    }

    pub async fn create_task(&self, input: NewTask, now: DateTime<Utc>) -> Result<Task> {
        let today = date_of(now);
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: input.title.trim().to_string(),
            description: input.description,
            status: input.status.unwrap_or_default(),
            area: input.area,
            project: input.project,
            tags: input.tags.unwrap_or_default(),
            priority: input.priority,
            notes: input.notes,
            estimated_minutes: input.estimated_minutes,
            created: today.clone(),
            updated: today,
            due: input.due,
            defer_until: input.defer_until,
            completed_at: None,
            actual_minutes: None,
            last_surfaced: None,
            nudge_count: 0,
            recurrence: input.recurrence,
            recurrence_trigger: input.recurrence_trigger.unwrap_or_default(),
            recurrence_strategy: input.recurrence_strategy.unwrap_or_default(),
            recurrence_last_generated: None,
        };
        validate(&task)?;

        let generated_id = task.id.clone();
        let task = self.hooks.run_create_hooks(task).await?;
        validate(&task)?;
        if task.id != generated_id {
            match self.store.load(&task.id) {
                Ok(_) => {
                    return Err(Error::InvalidTask(format!(
                        "create hooks returned id {} which belongs to an existing task",
                        task.id
                    )))
                }
                Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.store.save(&task)?;

        tracing::info!(task_id = %task.id, title = %task.title, "task created");
        Ok(task)
    }

    /// Apply `patch`, run modify hooks, persist. When the patch or a hook
    /// marks a live task `done`, the change is finished as a completion (so
    /// recurrence fires) and written in the same batch as the next instance.
    pub async fn modify_task(&self, id: &str, patch: TaskPatch, now: DateTime<Utc>) -> Result<Task> {
        let mut patch = patch;
        let mut completing = patch.status == Some(TaskStatus::Done);
        if completing {
            patch.status = None;
        }

        let old = self.store.load(id)?;
        let mut task = old.clone();
        if !patch.is_empty() {
            let new = apply_patch(old.clone(), patch, now);
            validate(&new)?;
            task = self.hooks.run_modify_hooks(&old, new).await?;
            validate(&task)?;
            completing |= task.status == TaskStatus::Done;
        }

        if completing && old.status != TaskStatus::Done {
            return Ok(self.finish_completion(task, now).await?.completed);
        }
        if task != old {
            self.store.save(&task)?;
            tracing::info!(task_id = %task.id, "task modified");
        }
        Ok(task)
    }

    pub async fn drop_task(&self, id: &str, now: DateTime<Utc>) -> Result<Task> {
        self.modify_task(id, TaskPatch::default().with_status(TaskStatus::Dropped), now)
            .await
    }

    /// Mark done, persist, then run `complete` hooks. Completing a done task
    /// is a no-op.
    pub async fn complete_task(&self, id: &str, now: DateTime<Utc>) -> Result<CompletionOutcome> {
        let task = self.store.load(id)?;
        if task.status == TaskStatus::Done {
            return Ok(CompletionOutcome {
                completed: task,
                next: None,
            });
        }
        self.finish_completion(task, now).await
    }

    /// The next instance is computed before anything is written, so a bad
    /// rule leaves the store untouched. `task` and its successor are saved in
    /// one batch.
    async fn finish_completion(&self, task: Task, now: DateTime<Utc>) -> Result<CompletionOutcome> {
        let completed = Task {
            status: TaskStatus::Done,
            completed_at: Some(format_timestamp(now)),
            updated: date_of(now),
            ..task
        };

        let next = from_completion(&completed, now)?;
        let completed = match &next {
            Some(next) => {
                let resolution = resolve_strategy(&completed, next, now);
                let current = resolution.updated_current.unwrap_or(completed);
                self.store.save_batch(&[current.clone(), next.clone()])?;
                current
            }
            None => {
                self.store.save(&completed)?;
                completed
            }
        };
        tracing::info!(
            task_id = %completed.id,
            next = ?next.as_ref().map(|t| t.id.as_str()),
            "task completed"
        );

        self.hooks
            .run_non_mutating_hooks(HookEvent::Complete, &completed)
            .await;
        Ok(CompletionOutcome { completed, next })
    }

    /// Delete, then run `delete` hooks with the removed record.
    pub async fn delete_task(&self, id: &str) -> Result<Task> {
        let task = self.store.load(id)?;
        self.store.delete(id)?;
        tracing::info!(task_id = %task.id, "task deleted");

        self.hooks
            .run_non_mutating_hooks(HookEvent::Delete, &task)
            .await;
        Ok(task)
    }

    pub fn process_due_recurrences(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        process_due_recurrences(self.store.as_ref(), now, self.sweep_policy)
    }
}

fn apply_patch(task: Task, patch: TaskPatch, now: DateTime<Utc>) -> Task {
    let mut t = task;
    if let Some(title) = patch.title {
        t.title = title.trim().to_string();
    }
    if let Some(v) = patch.description {
        t.description = v;
    }
    if let Some(status) = patch.status {
        t.status = status;
    }
    if let Some(v) = patch.area {
        t.area = v;
    }
    if let Some(v) = patch.project {
        t.project = v;
    }
    if let Some(tags) = patch.tags {
        t.tags = tags;
    }
    if let Some(v) = patch.priority {
        t.priority = v;
    }
    if let Some(v) = patch.notes {
        t.notes = v;
    }
    if let Some(v) = patch.estimated_minutes {
        t.estimated_minutes = v;
    }
    if let Some(v) = patch.actual_minutes {
        t.actual_minutes = v;
    }
    if let Some(v) = patch.due {
        t.due = v;
    }
    if let Some(v) = patch.defer_until {
        t.defer_until = v;
    }
    if let Some(v) = patch.recurrence {
        t.recurrence = v;
    }
    if let Some(v) = patch.recurrence_trigger {
        t.recurrence_trigger = v;
    }
    if let Some(v) = patch.recurrence_strategy {
        t.recurrence_strategy = v;
    }
    t.updated = date_of(now);
    t
}

/// Reject records the engine could not process later: bad dates, empty
/// titles, or rules the task's trigger cannot evaluate.
fn validate(task: &Task) -> Result<()> {
    if task.id.trim().is_empty() {
        return Err(Error::InvalidTask("empty id".to_string()));
    }
    if task.title.trim().is_empty() {
        return Err(Error::InvalidTask("empty title".to_string()));
    }

    let created = parse_date(&task.created)?;
    parse_date(&task.updated)?;
    for date in [&task.due, &task.defer_until].into_iter().flatten() {
        parse_date(date)?;
    }
    for ts in [&task.completed_at, &task.recurrence_last_generated, &task.last_surfaced]
        .into_iter()
        .flatten()
    {
        parse_timestamp(ts)?;
    }

    if let Some(rule) = task.recurrence.as_deref() {
        match task.recurrence_trigger {
            RecurrenceTrigger::Completion => {
                parse_interval(rule)?;
            }
            RecurrenceTrigger::Clock => {
                OccurrenceRule::parse(rule, start_of_day(created))?;
            }
        }
    }
    Ok(())
}
