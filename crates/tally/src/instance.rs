use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::recurrence::dates::{date_of, format_timestamp};
use crate::recurrence::{parse_interval, shift_calendar_date, shift_timestamp_to_calendar_date};
use tally_models::{Task, TaskStatus};

/// Copy the template with a new id and every instance-scoped field reset.
/// Lineage fields (title, description, area, project, tags, priority, notes,
/// estimate, recurrence settings) carry over unchanged.
fn successor_of(template: &Task, generated_at: DateTime<Utc>) -> Task {
    let today = date_of(generated_at);
    Task {
        id: Uuid::new_v4().to_string(),
        status: TaskStatus::Active,
        created: today.clone(),
        updated: today,
        completed_at: None,
        actual_minutes: None,
        last_surfaced: None,
        nudge_count: 0,
        recurrence_last_generated: Some(format_timestamp(generated_at)),
        ..template.clone()
    }
}

/// Next instance of a completion-driven task.
///
/// Returns `Ok(None)` when the task is not completion-driven. The new
/// instance is deferred until `completed_at + interval`; its due date, when
/// the template had one, moves by the same interval.
pub fn from_completion(completed: &Task, completed_at: DateTime<Utc>) -> Result<Option<Task>> {
    if !completed.is_completion_driven() {
        return Ok(None);
    }
    let Some(rule) = completed.recurrence.as_deref() else {
        return Ok(None);
    };

    let interval = parse_interval(rule)?;
    let completed_at_str = format_timestamp(completed_at);
    let defer_until = shift_timestamp_to_calendar_date(&completed_at_str, interval)?;
    let due = completed
        .due
        .as_deref()
        .map(|due| shift_calendar_date(due, interval))
        .transpose()?;

    let mut next = successor_of(completed, completed_at);
    next.due = due;
    next.defer_until = Some(defer_until);

    tracing::info!(
        parent = %completed.id,
        task_id = %next.id,
        interval = %interval,
        due = ?next.due,
        defer_until = ?next.defer_until,
        "generated next instance on completion"
    );
    Ok(Some(next))
}

/// Next instance of a clock-driven task. Clock instances are never deferred.
pub fn from_clock_tick(existing: &Task, generated_at: DateTime<Utc>) -> Result<Task> {
    if !existing.is_recurring() {
        return Err(Error::NotRecurring(existing.id.clone()));
    }

    let mut next = successor_of(existing, generated_at);
    next.defer_until = None;

    tracing::info!(
        parent = %existing.id,
        task_id = %next.id,
        generated_at = %format_timestamp(generated_at),
        "generated next instance on clock tick"
    );
    Ok(next)
}
