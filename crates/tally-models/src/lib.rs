use serde::{Deserialize, Serialize};

// --- Enums ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Inbox,
    Active,
    Waiting,
    Someday,
    Done,
    Dropped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Inbox => "inbox",
            TaskStatus::Active => "active",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Someday => "someday",
            TaskStatus::Done => "done",
            TaskStatus::Dropped => "dropped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "inbox" => Some(TaskStatus::Inbox),
            "active" => Some(TaskStatus::Active),
            "waiting" => Some(TaskStatus::Waiting),
            "someday" => Some(TaskStatus::Someday),
            "done" => Some(TaskStatus::Done),
            "dropped" => Some(TaskStatus::Dropped),
            _ => None,
        }
    }

    /// Done and dropped tasks never come back to life; regeneration creates a new record instead.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Dropped)
    }
}

/// What causes a recurring task to spawn its next instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceTrigger {
    /// Periodic sweep driven by calendar time.
    Clock,
    /// Marking the current instance done.
    #[default]
    Completion,
}

impl RecurrenceTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceTrigger::Clock => "clock",
            RecurrenceTrigger::Completion => "completion",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "clock" => Some(RecurrenceTrigger::Clock),
            "completion" => Some(RecurrenceTrigger::Completion),
            _ => None,
        }
    }
}

/// Fate of the current instance once its successor has been generated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceStrategy {
    /// Retire the current instance (mark it dropped).
    #[default]
    Replace,
    /// Keep the current instance live next to the new one.
    Accumulate,
}

impl RecurrenceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceStrategy::Replace => "replace",
            RecurrenceStrategy::Accumulate => "accumulate",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "replace" => Some(RecurrenceStrategy::Replace),
            "accumulate" => Some(RecurrenceStrategy::Accumulate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    Create,
    Modify,
    Complete,
    Delete,
}

impl HookEvent {
    pub const ALL: [HookEvent; 4] = [
        HookEvent::Create,
        HookEvent::Modify,
        HookEvent::Complete,
        HookEvent::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Create => "create",
            HookEvent::Modify => "modify",
            HookEvent::Complete => "complete",
            HookEvent::Delete => "delete",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create" => Some(HookEvent::Create),
            "modify" => Some(HookEvent::Modify),
            "complete" => Some(HookEvent::Complete),
            "delete" => Some(HookEvent::Delete),
            _ => None,
        }
    }

    /// Blocking events abort the mutation when a hook fails; the others are best-effort.
    pub fn is_blocking(&self) -> bool {
        matches!(self, HookEvent::Create | HookEvent::Modify)
    }
}

// --- Domain models ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub estimated_minutes: Option<i64>,
    /// Calendar date, `YYYY-MM-DD`
    pub created: String,
    /// Calendar date, `YYYY-MM-DD`
    pub updated: String,
    #[serde(default)]
    pub due: Option<String>,
    /// Hidden from "ready" views until this calendar date
    #[serde(default)]
    pub defer_until: Option<String>,
    /// RFC 3339 UTC timestamp
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub actual_minutes: Option<i64>,
    #[serde(default)]
    pub last_surfaced: Option<String>,
    #[serde(default)]
    pub nudge_count: i64,
    /// RRULE string, optionally prefixed with `RRULE:`
    #[serde(default)]
    pub recurrence: Option<String>,
    #[serde(default)]
    pub recurrence_trigger: RecurrenceTrigger,
    #[serde(default)]
    pub recurrence_strategy: RecurrenceStrategy,
    /// Watermark: timestamp of the last occurrence this lineage produced
    #[serde(default)]
    pub recurrence_last_generated: Option<String>,
}

impl Task {
    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    pub fn is_clock_driven(&self) -> bool {
        self.is_recurring() && self.recurrence_trigger == RecurrenceTrigger::Clock
    }

    pub fn is_completion_driven(&self) -> bool {
        self.is_recurring() && self.recurrence_trigger == RecurrenceTrigger::Completion
    }
}

// --- DTOs ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub area: Option<String>,
    pub project: Option<String>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<String>,
    pub notes: Option<String>,
    pub estimated_minutes: Option<i64>,
    pub due: Option<String>,
    pub defer_until: Option<String>,
    pub recurrence: Option<String>,
    pub recurrence_trigger: Option<RecurrenceTrigger>,
    pub recurrence_strategy: Option<RecurrenceStrategy>,
}

impl NewTask {
    /// Builder for tests: one place to update when fields are added.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_due(mut self, due: impl Into<String>) -> Self {
        self.due = Some(due.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_recurrence(
        mut self,
        rule: impl Into<String>,
        trigger: RecurrenceTrigger,
        strategy: RecurrenceStrategy,
    ) -> Self {
        self.recurrence = Some(rule.into());
        self.recurrence_trigger = Some(trigger);
        self.recurrence_strategy = Some(strategy);
        self
    }
}

/// Partial update. Clearable fields use `Option<Option<_>>`: `Some(None)` clears.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub area: Option<Option<String>>,
    pub project: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub estimated_minutes: Option<Option<i64>>,
    pub actual_minutes: Option<Option<i64>>,
    pub due: Option<Option<String>>,
    pub defer_until: Option<Option<String>>,
    pub recurrence: Option<Option<String>>,
    pub recurrence_trigger: Option<RecurrenceTrigger>,
    pub recurrence_strategy: Option<RecurrenceStrategy>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.area.is_none()
            && self.project.is_none()
            && self.tags.is_none()
            && self.priority.is_none()
            && self.notes.is_none()
            && self.estimated_minutes.is_none()
            && self.actual_minutes.is_none()
            && self.due.is_none()
            && self.defer_until.is_none()
            && self.recurrence.is_none()
            && self.recurrence_trigger.is_none()
            && self.recurrence_strategy.is_none()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_due(mut self, due: Option<String>) -> Self {
        self.due = Some(due);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub task_id: String,
    pub error: String,
}

/// Result of one pass over the clock-driven recurring tasks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub created: Vec<Task>,
    pub replaced: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.replaced.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub completed: Task,
    /// Next instance of a completion-driven lineage, if one was generated
    pub next: Option<Task>,
}
