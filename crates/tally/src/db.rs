use rusqlite::Connection;

use crate::error::Result;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'inbox',
        area TEXT,
        project TEXT,
        priority TEXT,
        notes TEXT,
        estimated_minutes INTEGER,
        created TEXT NOT NULL,
        updated TEXT NOT NULL,
        due TEXT,
        defer_until TEXT,
        completed_at TEXT,
        actual_minutes INTEGER,
        last_surfaced TEXT,
        nudge_count INTEGER NOT NULL DEFAULT 0,
        recurrence TEXT,
        recurrence_trigger TEXT NOT NULL DEFAULT 'completion',
        recurrence_strategy TEXT NOT NULL DEFAULT 'replace',
        recurrence_last_generated TEXT
    );

    CREATE TABLE IF NOT EXISTS task_tags (
        task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        tag TEXT NOT NULL,
        PRIMARY KEY (task_id, tag)
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
    CREATE INDEX IF NOT EXISTS idx_tasks_recurrence ON tasks(recurrence_trigger, status);
    CREATE INDEX IF NOT EXISTS idx_task_tags_task_id ON task_tags(task_id);
";

/// Open (or create) the task database at `path` and bring the schema up to date.
pub fn init_db(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;

    // WAL so a `list` from another process does not block the sweep
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    apply_schema(&conn)?;
    tracing::debug!(path, "database ready");
    Ok(conn)
}

/// Fresh in-memory database; used by tests and dry runs.
pub fn init_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    apply_schema(&conn)?;
    Ok(conn)
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
