use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use tally_models::HookEvent;

/// A discovered hook executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookHandle {
    /// File name, e.g. `on-modify.10-validate`
    pub name: String,
    pub path: PathBuf,
}

/// `on-<event>` optionally followed by `.<anything non-empty>`.
pub fn matches_event(file_name: &str, event: HookEvent) -> bool {
    let Some(rest) = file_name
        .strip_prefix("on-")
        .and_then(|r| r.strip_prefix(event.as_str()))
    else {
        return false;
    };
    match rest.strip_prefix('.') {
        Some(suffix) => !suffix.is_empty(),
        None => rest.is_empty(),
    }
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    true
}

/// Hooks for `event` in `dir`, sorted by file name. The order is the
/// execution order. A missing directory means no hooks.
///
/// Symlinks are followed; dangling links, directories and files without an
/// execute bit are skipped.
pub fn discover_hooks(dir: &Path, event: HookEvent) -> Result<Vec<HookHandle>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut hooks = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !matches_event(&name, event) {
            continue;
        }

        let path = entry.path();
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!(hook = %name, error = %e, "skipping unreadable hook");
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        if !is_executable(&meta) {
            tracing::debug!(hook = %name, "skipping hook without execute permission");
            continue;
        }
        hooks.push(HookHandle { name, path });
    }

    hooks.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(hooks)
}
