//! Recurrence rules: fixed-interval parsing for completion-driven tasks,
//! full occurrence-rule evaluation for clock-driven ones, and the date
//! arithmetic both rely on.

pub mod dates;
pub mod due;
pub mod interval;

pub use dates::{shift_calendar_date, shift_timestamp_to_calendar_date};
pub use due::{is_due, OccurrenceRule};
pub use interval::{parse_interval, Frequency, RecurrenceInterval};
