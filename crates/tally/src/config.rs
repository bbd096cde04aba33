//! TOML configuration shared by the `tally` CLI and the ticker daemon.
//!
//! ```toml
//! data_dir = "~/.local/share/tally"
//! database = "tally.db"      # relative to data_dir
//! hooks_dir = "hooks"        # relative to data_dir
//!
//! [hooks]
//! timeout_secs = 0           # 0 disables the timeout
//!
//! [sweep]
//! on_error = "abort"         # abort | skip
//! interval_secs = 300
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sweep::SweepErrorPolicy;

pub const ENV_CONFIG: &str = "TALLY_CONFIG";
pub const ENV_DATA_DIR_OVERRIDE: &str = "TALLY_DATA_DIR";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_hooks_dir")]
    pub hooks_dir: PathBuf,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub on_error: SweepErrorPolicy,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_database() -> PathBuf {
    PathBuf::from("tally.db")
}
fn default_hooks_dir() -> PathBuf {
    PathBuf::from("hooks")
}
fn default_interval() -> u64 {
    300
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            on_error: SweepErrorPolicy::default(),
            interval_secs: default_interval(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            database: default_database(),
            hooks_dir: default_hooks_dir(),
            hooks: HooksConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from `explicit` (must exist) or from the default location (may be absent).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("can't read config '{}': {}", path.display(), e))
                })?;
                Self::from_toml(&text)?
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => {
                    let text = std::fs::read_to_string(&path)?;
                    Self::from_toml(&text)?
                }
                _ => Self::default(),
            },
        };

        if let Ok(dir) = std::env::var(ENV_DATA_DIR_OVERRIDE) {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tally").join("config.toml"))
    }

    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => expand_home(dir),
            None => dirs::data_dir()
                .map(|d| d.join("tally"))
                .unwrap_or_else(|| PathBuf::from(".tally")),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(expand_home(&self.database))
    }

    pub fn hooks_path(&self) -> PathBuf {
        self.data_dir().join(expand_home(&self.hooks_dir))
    }

    pub fn hook_timeout(&self) -> Option<Duration> {
        match self.hooks.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep.interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.database, PathBuf::from("tally.db"));
        assert_eq!(config.hooks_dir, PathBuf::from("hooks"));
        assert_eq!(config.hook_timeout(), None);
        assert_eq!(config.sweep.on_error, SweepErrorPolicy::Abort);
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
    }

    #[test]
    fn full_file_parses() {
        let config = Config::from_toml(
            r#"
            data_dir = "/srv/tally"
            database = "tasks.sqlite"
            hooks_dir = "/etc/tally/hooks"

            [hooks]
            timeout_secs = 15

            [sweep]
            on_error = "skip"
            interval_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/srv/tally/tasks.sqlite"));
        // absolute hooks_dir wins over data_dir
        assert_eq!(config.hooks_path(), PathBuf::from("/etc/tally/hooks"));
        assert_eq!(config.hook_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.sweep.on_error, SweepErrorPolicy::Skip);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn unknown_policy_is_a_config_error() {
        let err = Config::from_toml("[sweep]\non_error = \"retry\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = Config::load(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[hooks]\ntimeout_secs = 3\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.hook_timeout(), Some(Duration::from_secs(3)));
    }
}
