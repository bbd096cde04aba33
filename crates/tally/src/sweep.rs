use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;
use crate::instance::from_clock_tick;
use crate::recurrence::is_due;
use crate::storage::TaskStore;
use crate::strategy::resolve_strategy;
use tally_models::{SweepFailure, SweepReport, Task};

/// What a sweep does when one task fails (bad rule, bad date, store error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepErrorPolicy {
    /// Stop at the first failure and return it. Work already committed for
    /// earlier tasks stays committed.
    #[default]
    Abort,
    /// Log the failure, record it in the report and move on. The failing task
    /// is left untouched so the next sweep retries it.
    Skip,
}

enum Outcome {
    NotDue,
    Generated { next: Task, replaced: bool },
}

fn sweep_one(store: &dyn TaskStore, task: &Task, now: DateTime<Utc>) -> Result<Outcome> {
    if !is_due(task, now)? {
        return Ok(Outcome::NotDue);
    }

    let next = from_clock_tick(task, now)?;
    let resolution = resolve_strategy(task, &next, now);

    let mut batch = Vec::with_capacity(2);
    if let Some(updated) = resolution.updated_current {
        batch.push(updated);
    }
    batch.push(next.clone());
    store.save_batch(&batch)?;

    Ok(Outcome::Generated {
        next,
        replaced: resolution.should_replace_current,
    })
}

/// Generate the next instance of every clock-driven task that is due at `now`.
///
/// Candidates: `recurrence` set, trigger `clock`, status not done/dropped.
/// Each lineage's watermark moves in the same batch write that stores its new
/// instance, so a second call with the same `now` finds nothing due. Callers
/// must not run two sweeps against one store concurrently.
pub fn process_due_recurrences(
    store: &dyn TaskStore,
    now: DateTime<Utc>,
    policy: SweepErrorPolicy,
) -> Result<SweepReport> {
    let candidates: Vec<Task> = store
        .load_all()?
        .into_iter()
        .filter(|t| t.is_clock_driven() && !t.status.is_terminal())
        .collect();

    tracing::debug!(candidates = candidates.len(), "starting recurrence sweep");

    let mut report = SweepReport::default();
    for task in &candidates {
        match sweep_one(store, task, now) {
            Ok(Outcome::NotDue) => {}
            Ok(Outcome::Generated { next, replaced }) => {
                if replaced {
                    report.replaced.push(task.id.clone());
                }
                report.created.push(next);
            }
            Err(e) => match policy {
                SweepErrorPolicy::Abort => {
                    tracing::error!(task_id = %task.id, error = %e, "recurrence sweep aborted");
                    return Err(e);
                }
                SweepErrorPolicy::Skip => {
                    tracing::warn!(task_id = %task.id, error = %e, "skipping task in recurrence sweep");
                    report.failed.push(SweepFailure {
                        task_id: task.id.clone(),
                        error: e.to_string(),
                    });
                }
            },
        }
    }

    tracing::info!(
        created = report.created.len(),
        replaced = report.replaced.len(),
        failed = report.failed.len(),
        "recurrence sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::Error;
    use crate::recurrence::dates::parse_timestamp;
    use crate::storage::sqlite::SqliteBackend;
    use tally_models::{RecurrenceStrategy, RecurrenceTrigger, TaskStatus};

    fn store() -> SqliteBackend {
        SqliteBackend::from_connection(db::init_memory().unwrap())
    }

    fn at(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn recurring(id: &str, rule: &str, trigger: RecurrenceTrigger, strategy: RecurrenceStrategy) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            description: None,
            status: TaskStatus::Active,
            area: None,
            project: None,
            tags: vec![],
            priority: None,
            notes: None,
            estimated_minutes: None,
            created: "2026-03-01".to_string(),
            updated: "2026-03-01".to_string(),
            due: None,
            defer_until: None,
            completed_at: None,
            actual_minutes: None,
            last_surfaced: None,
            nudge_count: 1,
            recurrence: Some(rule.to_string()),
            recurrence_trigger: trigger,
            recurrence_strategy: strategy,
            recurrence_last_generated: None,
        }
    }

    #[test]
    fn skips_non_candidates() {
        let store = store();
        let mut done = recurring("done", "FREQ=DAILY", RecurrenceTrigger::Clock, RecurrenceStrategy::Replace);
        done.status = TaskStatus::Done;
        let completion = recurring(
            "completion",
            "FREQ=DAILY",
            RecurrenceTrigger::Completion,
            RecurrenceStrategy::Replace,
        );
        let mut plain = recurring("plain", "FREQ=DAILY", RecurrenceTrigger::Clock, RecurrenceStrategy::Replace);
        plain.recurrence = None;
        store.save_batch(&[done, completion, plain]).unwrap();

        let report =
            process_due_recurrences(&store, at("2026-04-01T00:00:00Z"), SweepErrorPolicy::Abort)
                .unwrap();
        assert!(report.is_empty());
        assert_eq!(store.load_all().unwrap().len(), 3);
    }

    #[test]
    fn not_due_yet_is_left_alone() {
        let store = store();
        store
            .save(&recurring("t-1", "FREQ=WEEKLY", RecurrenceTrigger::Clock, RecurrenceStrategy::Replace))
            .unwrap();
        let report =
            process_due_recurrences(&store, at("2026-03-07T23:00:00Z"), SweepErrorPolicy::Abort)
                .unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn abort_policy_propagates_parse_errors() {
        let store = store();
        store
            .save(&recurring("bad", "FREQ=SOMETIMES", RecurrenceTrigger::Clock, RecurrenceStrategy::Replace))
            .unwrap();
        let err = process_due_recurrences(&store, at("2026-03-10T00:00:00Z"), SweepErrorPolicy::Abort)
            .unwrap_err();
        assert!(matches!(err, Error::RecurrenceParse { .. }));
    }

    #[test]
    fn skip_policy_reports_and_continues() {
        let store = store();
        store
            .save_batch(&[
                recurring("a-bad", "FREQ=SOMETIMES", RecurrenceTrigger::Clock, RecurrenceStrategy::Replace),
                recurring("b-good", "FREQ=DAILY", RecurrenceTrigger::Clock, RecurrenceStrategy::Replace),
            ])
            .unwrap();

        let report =
            process_due_recurrences(&store, at("2026-03-02T12:00:00Z"), SweepErrorPolicy::Skip)
                .unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].task_id, "a-bad");
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.replaced, vec!["b-good".to_string()]);

        let bad = store.load("a-bad").unwrap();
        assert_eq!(bad.status, TaskStatus::Active);
        assert!(bad.recurrence_last_generated.is_none());
    }

    #[test]
    fn replace_then_rerun_is_noop() {
        let store = store();
        store
            .save(&recurring("t-1", "FREQ=DAILY", RecurrenceTrigger::Clock, RecurrenceStrategy::Replace))
            .unwrap();
        let now = at("2026-03-02T08:00:00Z");

        let first = process_due_recurrences(&store, now, SweepErrorPolicy::Abort).unwrap();
        assert_eq!(first.created.len(), 1);
        assert_eq!(first.replaced, vec!["t-1".to_string()]);

        let before = store.load_all().unwrap();
        let second = process_due_recurrences(&store, now, SweepErrorPolicy::Abort).unwrap();
        assert!(second.is_empty());
        assert_eq!(store.load_all().unwrap(), before);
    }

    #[test]
    fn new_instance_waits_for_following_occurrence() {
        let store = store();
        store
            .save(&recurring("t-1", "FREQ=DAILY", RecurrenceTrigger::Clock, RecurrenceStrategy::Replace))
            .unwrap();
        process_due_recurrences(&store, at("2026-03-02T08:00:00Z"), SweepErrorPolicy::Abort).unwrap();

        // next occurrence after the 08:00 watermark is 2026-03-03T00:00Z
        let later = process_due_recurrences(&store, at("2026-03-02T23:59:00Z"), SweepErrorPolicy::Abort)
            .unwrap();
        assert!(later.is_empty());

        let next_day = process_due_recurrences(&store, at("2026-03-03T00:00:00Z"), SweepErrorPolicy::Abort)
            .unwrap();
        assert_eq!(next_day.created.len(), 1);

        let live: Vec<Task> = store
            .load_all()
            .unwrap()
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .collect();
        assert_eq!(live.len(), 1);
    }
}
