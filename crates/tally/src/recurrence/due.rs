//! Due-ness of clock-driven recurring tasks.
//!
//! Unlike [`super::interval`], this accepts the full RRULE grammar (by-day,
//! by-month, EXDATE lines ...). The rule is anchored at midnight UTC of the
//! task's `created` date; any DTSTART carried by the rule string is replaced.

use chrono::{DateTime, Utc};
use rrule::{RRuleSet, Tz};

use super::dates::{parse_date, parse_timestamp, start_of_day};
use super::interval::strip_rule_prefix;
use crate::error::{Error, Result};
use tally_models::Task;

const PROPERTY_PREFIXES: &[&str] = &["RRULE:", "EXRULE:", "RDATE", "EXDATE"];

/// A parsed occurrence rule anchored at a start instant.
#[derive(Debug, Clone)]
pub struct OccurrenceRule {
    rule: String,
    set: RRuleSet,
}

impl OccurrenceRule {
    pub fn parse(rule: &str, anchor: DateTime<Utc>) -> Result<Self> {
        let source = build_rrule_source(rule, anchor);
        let set: RRuleSet = source.parse().map_err(|e: rrule::RRuleError| {
            Error::RecurrenceParse {
                rule: rule.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            rule: rule.to_string(),
            set,
        })
    }

    /// First occurrence strictly after `after`, if the rule has one.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // `after` bounds are inclusive in some rrule releases; fetch two and filter.
        self.set
            .clone()
            .after(after.with_timezone(&Tz::UTC))
            .all(2)
            .dates
            .into_iter()
            .map(|dt| dt.with_timezone(&Utc))
            .find(|dt| *dt > after)
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }
}

/// Whether a new occurrence of a clock-driven task is due at `now`.
///
/// The watermark is `recurrence_last_generated`, or the anchor when the
/// lineage has never generated. Due iff the first occurrence strictly after
/// the watermark is `<= now`. Parse failures propagate.
pub fn is_due(task: &Task, now: DateTime<Utc>) -> Result<bool> {
    let Some(rule) = task.recurrence.as_deref() else {
        return Ok(false);
    };
    let anchor = start_of_day(parse_date(&task.created)?);
    let watermark = match task.recurrence_last_generated.as_deref() {
        Some(ts) => parse_timestamp(ts)?,
        None => anchor,
    };

    let occurrence = OccurrenceRule::parse(rule, anchor)?.next_after(watermark);
    tracing::debug!(
        task_id = %task.id,
        rule,
        watermark = %watermark,
        next = ?occurrence,
        "evaluated recurrence"
    );
    Ok(occurrence.is_some_and(|next| next <= now))
}

fn build_rrule_source(rule: &str, anchor: DateTime<Utc>) -> String {
    let mut lines = vec![format!("DTSTART:{}", anchor.format("%Y%m%dT%H%M%SZ"))];
    for line in rule.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let upper = line.to_ascii_uppercase();
        if upper.starts_with("DTSTART") {
            continue;
        }
        if PROPERTY_PREFIXES.iter().any(|p| upper.starts_with(p)) && !upper.starts_with("RRULE:") {
            lines.push(line.to_string());
        } else {
            lines.push(format!("RRULE:{}", strip_rule_prefix(line)));
        }
    }
    lines.join("\n")
}
