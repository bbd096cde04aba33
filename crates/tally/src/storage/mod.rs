pub mod sqlite;

use crate::error::Result;
use tally_models::Task;

/// Persistence collaborator consumed by the recurrence engine and the
/// mutation coordinator. The engine never caches what it loads: every
/// operation re-reads the records it needs and writes each affected record back.
pub trait TaskStore: Send + Sync {
    /// Fails with `Error::NotFound` when no task has this id.
    fn load(&self, id: &str) -> Result<Task>;
    fn load_all(&self) -> Result<Vec<Task>>;
    /// Insert or overwrite by id.
    fn save(&self, task: &Task) -> Result<()>;
    /// Fails with `Error::NotFound` when no task has this id.
    fn delete(&self, id: &str) -> Result<()>;

    /// Save several records. Backends that can should commit them together.
    fn save_batch(&self, tasks: &[Task]) -> Result<()> {
        for task in tasks {
            self.save(task)?;
        }
        Ok(())
    }
}
