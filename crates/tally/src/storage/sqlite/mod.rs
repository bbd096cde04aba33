use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::storage::TaskStore;
use tally_models::*;

const TASK_COLS: &str = "id, title, description, status, area, project, priority, notes, estimated_minutes, created, updated, due, defer_until, completed_at, actual_minutes, last_surfaced, nudge_count, recurrence, recurrence_trigger, recurrence_strategy, recurrence_last_generated";

/// SQLite-backed task store.
/// Wraps a `Mutex<Connection>`; one process-wide connection is plenty for a personal tracker.
pub struct SqliteBackend {
    pub conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self::new(Arc::new(Mutex::new(conn)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("connection mutex poisoned".to_string()))
    }
}

fn enum_column<T>(idx: usize, value: String, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected value '{value}'").into(),
        )
    })
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: enum_column(3, row.get(3)?, TaskStatus::from_str)?,
        area: row.get(4)?,
        project: row.get(5)?,
        priority: row.get(6)?,
        notes: row.get(7)?,
        estimated_minutes: row.get(8)?,
        created: row.get(9)?,
        updated: row.get(10)?,
        due: row.get(11)?,
        defer_until: row.get(12)?,
        completed_at: row.get(13)?,
        actual_minutes: row.get(14)?,
        last_surfaced: row.get(15)?,
        nudge_count: row.get(16)?,
        recurrence: row.get(17)?,
        recurrence_trigger: enum_column(18, row.get(18)?, RecurrenceTrigger::from_str)?,
        recurrence_strategy: enum_column(19, row.get(19)?, RecurrenceStrategy::from_str)?,
        recurrence_last_generated: row.get(20)?,
        tags: Vec::new(),
    })
}

fn load_tags(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM task_tags WHERE task_id = ?1 ORDER BY tag")?;
    let tags = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(tags)
}

fn save_tags(conn: &Connection, task_id: &str, tags: &[String]) -> Result<()> {
    conn.execute("DELETE FROM task_tags WHERE task_id = ?1", params![task_id])?;
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO task_tags (task_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute(params![task_id, tag])?;
    }
    Ok(())
}

fn upsert_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks (id, title, description, status, area, project, priority, notes, estimated_minutes, created, updated, due, defer_until, completed_at, actual_minutes, last_surfaced, nudge_count, recurrence, recurrence_trigger, recurrence_strategy, recurrence_last_generated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
         ON CONFLICT(id) DO UPDATE SET
            title=excluded.title, description=excluded.description, status=excluded.status,
            area=excluded.area, project=excluded.project, priority=excluded.priority,
            notes=excluded.notes, estimated_minutes=excluded.estimated_minutes,
            created=excluded.created, updated=excluded.updated, due=excluded.due,
            defer_until=excluded.defer_until, completed_at=excluded.completed_at,
            actual_minutes=excluded.actual_minutes, last_surfaced=excluded.last_surfaced,
            nudge_count=excluded.nudge_count, recurrence=excluded.recurrence,
            recurrence_trigger=excluded.recurrence_trigger,
            recurrence_strategy=excluded.recurrence_strategy,
            recurrence_last_generated=excluded.recurrence_last_generated",
        params![
            task.id,
            task.title,
            task.description,
            task.status.as_str(),
            task.area,
            task.project,
            task.priority,
            task.notes,
            task.estimated_minutes,
            task.created,
            task.updated,
            task.due,
            task.defer_until,
            task.completed_at,
            task.actual_minutes,
            task.last_surfaced,
            task.nudge_count,
            task.recurrence,
            task.recurrence_trigger.as_str(),
            task.recurrence_strategy.as_str(),
            task.recurrence_last_generated,
        ],
    )?;
    save_tags(conn, &task.id, &task.tags)
}

impl TaskStore for SqliteBackend {
    fn load(&self, id: &str) -> Result<Task> {
        let conn = self.lock()?;
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let tags = load_tags(&conn, &task.id)?;
        Ok(Task { tags, ..task })
    }

    fn load_all(&self) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLS} FROM tasks ORDER BY created, id"
        ))?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<rusqlite::Result<Vec<Task>>>()?;
        tasks
            .into_iter()
            .map(|task| {
                let tags = load_tags(&conn, &task.id)?;
                Ok(Task { tags, ..task })
            })
            .collect()
    }

    fn save(&self, task: &Task) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        upsert_task(&tx, task)?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn save_batch(&self, tasks: &[Task]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for task in tasks {
            upsert_task(&tx, task)?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn backend() -> SqliteBackend {
        SqliteBackend::from_connection(db::init_memory().unwrap())
    }

    fn sample(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: "Stretch".to_string(),
            description: Some("Ten minutes".to_string()),
            status: TaskStatus::Active,
            area: Some("health".to_string()),
            project: None,
            tags: vec!["daily".to_string(), "body".to_string()],
            priority: None,
            notes: None,
            estimated_minutes: Some(10),
            created: "2026-03-01".to_string(),
            updated: "2026-03-01".to_string(),
            due: None,
            defer_until: None,
            completed_at: None,
            actual_minutes: None,
            last_surfaced: None,
            nudge_count: 2,
            recurrence: Some("FREQ=DAILY".to_string()),
            recurrence_trigger: RecurrenceTrigger::Clock,
            recurrence_strategy: RecurrenceStrategy::Accumulate,
            recurrence_last_generated: Some("2026-03-02T00:00:00Z".to_string()),
        }
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let store = backend();
        let task = sample("t-1");
        store.save(&task).unwrap();

        let loaded = store.load("t-1").unwrap();
        // tags come back sorted
        assert_eq!(loaded.tags, vec!["body".to_string(), "daily".to_string()]);
        assert_eq!(Task { tags: task.tags.clone(), ..loaded }, task);
    }

    #[test]
    fn save_overwrites_existing_record() {
        let store = backend();
        let mut task = sample("t-1");
        store.save(&task).unwrap();

        task.status = TaskStatus::Dropped;
        task.tags = vec!["archived".to_string()];
        store.save(&task).unwrap();

        let loaded = store.load("t-1").unwrap();
        assert_eq!(loaded.status, TaskStatus::Dropped);
        assert_eq!(loaded.tags, vec!["archived".to_string()]);
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn missing_task_is_not_found() {
        let store = backend();
        assert!(matches!(store.load("nope"), Err(Error::NotFound(_))));
        assert!(matches!(store.delete("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_removes_task_and_tags() {
        let store = backend();
        store.save(&sample("t-1")).unwrap();
        store.delete("t-1").unwrap();
        assert!(store.load_all().unwrap().is_empty());

        let conn = store.conn.lock().unwrap();
        let tags: i64 = conn
            .query_row("SELECT COUNT(*) FROM task_tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tags, 0);
    }

    #[test]
    fn save_batch_writes_all() {
        let store = backend();
        store
            .save_batch(&[sample("t-1"), sample("t-2")])
            .unwrap();
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn unknown_status_in_row_is_a_storage_error() {
        let store = backend();
        store.save(&sample("t-1")).unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute("UPDATE tasks SET status='archived' WHERE id='t-1'", [])
            .unwrap();
        assert!(matches!(store.load("t-1"), Err(Error::Storage(_))));
    }
}
