/// Top-level error type. Date/rule and blocking-hook variants are fatal to the
/// mutation that raised them; nothing is persisted once one of them is returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A calendar date or timestamp could not be parsed.
    #[error("invalid date '{0}'")]
    InvalidDate(String),

    /// The rule is valid RRULE syntax but cannot be expressed as a fixed interval.
    #[error("unsupported recurrence '{rule}': {reason}")]
    UnsupportedRecurrence { rule: String, reason: String },

    /// The rule could not be parsed even for due-ness evaluation.
    #[error("cannot parse recurrence '{rule}': {message}")]
    RecurrenceParse { rule: String, message: String },

    /// Clock-tick generation requested on a task without a recurrence rule.
    #[error("task {0} is not recurring")]
    NotRecurring(String),

    /// Spawn error, non-zero exit, timeout or abnormal termination of a hook.
    #[error("hook {hook} failed: {reason}")]
    HookExecution { hook: String, reason: String },

    /// A modify hook changed the task id or moved the recurrence watermark back.
    #[error("hook {hook} broke the modify contract: expected {expected}, found {found}")]
    HookContractViolation {
        hook: String,
        expected: String,
        found: String,
    },

    /// A hook printed something that is not a task record.
    #[error("hook {hook} produced invalid output: {message}")]
    HookOutputInvalid { hook: String, message: String },

    #[error("task not found: {0}")]
    NotFound(String),

    /// A record that would be persisted fails validation (empty title, ...).
    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, Error>;
