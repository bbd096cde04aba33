use chrono::{DateTime, Utc};

use crate::recurrence::dates::date_of;
use tally_models::{RecurrenceStrategy, Task, TaskStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyResolution {
    /// Rewritten current instance to persist, if it changed.
    pub updated_current: Option<Task>,
    /// True when the current instance was retired in favour of the new one.
    pub should_replace_current: bool,
}

/// Decide the fate of `current` given the freshly generated `next`.
///
/// - `replace` on a live task: current is dropped and its watermark advanced.
/// - `accumulate`: current keeps its status but hands the lineage to `next`:
///   its `recurrence` is cleared so only the newest instance generates again.
///   `updated` and the watermark still advance.
/// - anything else (replace on an already terminal task): untouched.
pub fn resolve_strategy(current: &Task, next: &Task, now: DateTime<Utc>) -> StrategyResolution {
    let watermark = next.recurrence_last_generated.clone();
    let today = date_of(now);

    match current.recurrence_strategy {
        RecurrenceStrategy::Replace if !current.status.is_terminal() => StrategyResolution {
            updated_current: Some(Task {
                status: TaskStatus::Dropped,
                updated: today,
                recurrence_last_generated: watermark,
                ..current.clone()
            }),
            should_replace_current: true,
        },
        RecurrenceStrategy::Accumulate => StrategyResolution {
            updated_current: Some(Task {
                updated: today,
                recurrence: None,
                recurrence_last_generated: watermark,
                ..current.clone()
            }),
            should_replace_current: false,
        },
        RecurrenceStrategy::Replace => StrategyResolution {
            updated_current: None,
            should_replace_current: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::dates::parse_timestamp;
    use tally_models::RecurrenceTrigger;

    fn task(id: &str, status: TaskStatus, strategy: RecurrenceStrategy) -> Task {
        Task {
            id: id.to_string(),
            title: "Standup notes".to_string(),
            description: None,
            status,
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
            nudge_count: 0,
            recurrence: Some("FREQ=DAILY".to_string()),
            recurrence_trigger: RecurrenceTrigger::Clock,
            recurrence_strategy: strategy,
            recurrence_last_generated: None,
        }
    }

    fn next_of(current: &Task) -> Task {
        Task {
            id: "t-next".to_string(),
            status: TaskStatus::Active,
            recurrence_last_generated: Some("2026-03-04T07:00:00Z".to_string()),
            ..current.clone()
        }
    }

    fn now() -> DateTime<Utc> {
        parse_timestamp("2026-03-04T07:00:00Z").unwrap()
    }

    #[test]
    fn replace_drops_live_current() {
        let current = task("t-1", TaskStatus::Active, RecurrenceStrategy::Replace);
        let res = resolve_strategy(&current, &next_of(&current), now());

        assert!(res.should_replace_current);
        let updated = res.updated_current.expect("current should be rewritten");
        assert_eq!(updated.id, "t-1");
        assert_eq!(updated.status, TaskStatus::Dropped);
        assert_eq!(updated.updated, "2026-03-04");
        assert_eq!(
            updated.recurrence_last_generated.as_deref(),
            Some("2026-03-04T07:00:00Z")
        );
    }

    #[test]
    fn replace_leaves_terminal_current_alone() {
        for status in [TaskStatus::Done, TaskStatus::Dropped] {
            let current = task("t-1", status, RecurrenceStrategy::Replace);
            let res = resolve_strategy(&current, &next_of(&current), now());
            assert!(!res.should_replace_current);
            assert!(res.updated_current.is_none());
        }
    }

    #[test]
    fn accumulate_keeps_status_and_advances_watermark() {
        let current = task("t-1", TaskStatus::Waiting, RecurrenceStrategy::Accumulate);
        let res = resolve_strategy(&current, &next_of(&current), now());

        assert!(!res.should_replace_current);
        let updated = res.updated_current.unwrap();
        assert_eq!(updated.status, TaskStatus::Waiting);
        assert_eq!(updated.updated, "2026-03-04");
        assert_eq!(
            updated.recurrence_last_generated.as_deref(),
            Some("2026-03-04T07:00:00Z")
        );
        assert!(updated.recurrence.is_none());
        assert!(!updated.is_recurring());
    }

    #[test]
    fn accumulate_on_done_task_stays_done() {
        let current = task("t-1", TaskStatus::Done, RecurrenceStrategy::Accumulate);
        let next = next_of(&current);
        let res = resolve_strategy(&current, &next, now());
        let updated = res.updated_current.unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert!(updated.recurrence.is_none());
        // the lineage lives on in the successor
        assert_eq!(next.recurrence.as_deref(), Some("FREQ=DAILY"));
    }
}
