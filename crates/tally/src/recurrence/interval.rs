use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Some(Frequency::Daily),
            "WEEKLY" => Some(Frequency::Weekly),
            "MONTHLY" => Some(Frequency::Monthly),
            "YEARLY" => Some(Frequency::Yearly),
            _ => None,
        }
    }
}

/// `{frequency, interval}` derived from a rule string on demand. Never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceInterval {
    pub frequency: Frequency,
    pub interval: u32,
}

impl RecurrenceInterval {
    pub fn new(frequency: Frequency, interval: u32) -> Self {
        Self {
            frequency,
            interval,
        }
    }
}

impl fmt::Display for RecurrenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={};INTERVAL={}", self.frequency.as_str(), self.interval)
    }
}

/// Keys that do not change the step between occurrences.
const NEUTRAL_KEYS: &[&str] = &["WKST"];

/// Parse a rule string into a fixed interval.
///
/// Tolerates a leading `RRULE:` marker and surrounding whitespace. Fails with
/// [`Error::UnsupportedRecurrence`] when the string holds more than one rule,
/// the frequency is missing or outside DAILY/WEEKLY/MONTHLY/YEARLY, the
/// interval is not a positive integer, or any other constraint is present.
pub fn parse_interval(rule: &str) -> Result<RecurrenceInterval> {
    let unsupported = |reason: &str| Error::UnsupportedRecurrence {
        rule: rule.to_string(),
        reason: reason.to_string(),
    };

    let lines: Vec<&str> = rule
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() != 1 {
        return Err(unsupported("expected exactly one rule"));
    }

    let body = strip_rule_prefix(lines[0]);
    if body.is_empty() {
        return Err(unsupported("empty rule"));
    }

    let mut frequency = None;
    let mut interval = None;

    for part in body.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| unsupported(&format!("malformed part '{part}'")))?;
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim();

        match key.as_str() {
            "FREQ" => {
                if frequency.is_some() {
                    return Err(unsupported("FREQ given more than once"));
                }
                frequency = Some(
                    Frequency::from_str(value)
                        .ok_or_else(|| unsupported(&format!("unsupported frequency '{value}'")))?,
                );
            }
            "INTERVAL" => {
                if interval.is_some() {
                    return Err(unsupported("INTERVAL given more than once"));
                }
                let n: u32 = value
                    .parse()
                    .map_err(|_| unsupported(&format!("interval '{value}' is not an integer")))?;
                if n == 0 {
                    return Err(unsupported("interval must be positive"));
                }
                interval = Some(n);
            }
            k if NEUTRAL_KEYS.contains(&k) => {}
            other => {
                return Err(unsupported(&format!(
                    "{other} cannot be expressed as a fixed interval"
                )));
            }
        }
    }

    let frequency = frequency.ok_or_else(|| unsupported("missing FREQ"))?;
    Ok(RecurrenceInterval::new(frequency, interval.unwrap_or(1)))
}

/// Strip an optional case-insensitive `RRULE:` marker.
pub(crate) fn strip_rule_prefix(line: &str) -> &str {
    let line = line.trim();
    match line.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("RRULE:") => line[6..].trim(),
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unsupported(rule: &str) {
        match parse_interval(rule) {
            Err(Error::UnsupportedRecurrence { .. }) => {}
            other => panic!("expected UnsupportedRecurrence for {rule:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_plain_and_prefixed_rules() {
        assert_eq!(
            parse_interval("FREQ=WEEKLY;INTERVAL=2").unwrap(),
            RecurrenceInterval::new(Frequency::Weekly, 2)
        );
        assert_eq!(
            parse_interval("RRULE:FREQ=DAILY").unwrap(),
            RecurrenceInterval::new(Frequency::Daily, 1)
        );
        assert_eq!(
            parse_interval("  rrule:freq=monthly;interval=3 ").unwrap(),
            RecurrenceInterval::new(Frequency::Monthly, 3)
        );
    }

    #[test]
    fn order_of_parts_does_not_matter() {
        assert_eq!(
            parse_interval("INTERVAL=4;FREQ=YEARLY").unwrap(),
            RecurrenceInterval::new(Frequency::Yearly, 4)
        );
    }

    #[test]
    fn week_start_is_ignored() {
        assert_eq!(
            parse_interval("FREQ=WEEKLY;WKST=MO").unwrap(),
            RecurrenceInterval::new(Frequency::Weekly, 1)
        );
    }

    #[test]
    fn rejects_sub_daily_frequencies() {
        assert_unsupported("FREQ=HOURLY");
        assert_unsupported("FREQ=MINUTELY;INTERVAL=15");
    }

    #[test]
    fn rejects_bad_intervals() {
        assert_unsupported("FREQ=DAILY;INTERVAL=0");
        assert_unsupported("FREQ=DAILY;INTERVAL=-1");
        assert_unsupported("FREQ=DAILY;INTERVAL=1.5");
        assert_unsupported("FREQ=DAILY;INTERVAL=");
    }

    #[test]
    fn rejects_constrained_rules() {
        assert_unsupported("FREQ=WEEKLY;BYDAY=MO,WE");
        assert_unsupported("FREQ=MONTHLY;BYMONTHDAY=-1");
        assert_unsupported("FREQ=DAILY;COUNT=3");
    }

    #[test]
    fn rejects_multiple_rules_and_garbage() {
        assert_unsupported("RRULE:FREQ=DAILY\nRRULE:FREQ=WEEKLY");
        assert_unsupported("");
        assert_unsupported("RRULE:");
        assert_unsupported("every tuesday");
        assert_unsupported("INTERVAL=2");
        assert_unsupported("FREQ=DAILY;FREQ=WEEKLY");
    }

    #[test]
    fn display_is_canonical() {
        let interval = parse_interval("rrule:freq=weekly").unwrap();
        assert_eq!(interval.to_string(), "FREQ=WEEKLY;INTERVAL=1");
    }
}
