//! Unified precedence resolution for store settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Explicit overrides passed by the embedding caller
//! 2. Environment variables (`WAYMARK_DATA_DIR`, `WAYMARK_BUSY_TIMEOUT_MS`)
//! 3. Session config.kdl (`<data-dir>/<project-hash>/config.kdl`)
//! 4. System config.kdl (`~/.config/waymark/config.kdl`, or `$WAYMARK_CONFIG_DIR/config.kdl`)
//! 5. Built-in defaults

use crate::config::StoreConfig;
use crate::storage::get_storage_dir;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Base directory holding one store directory per project.
pub const DATA_DIR_ENV: &str = "WAYMARK_DATA_DIR";
/// Directory holding the system config.kdl.
pub const CONFIG_DIR_ENV: &str = "WAYMARK_CONFIG_DIR";
/// Busy timeout override in milliseconds.
pub const BUSY_TIMEOUT_ENV: &str = "WAYMARK_BUSY_TIMEOUT_MS";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value passed explicitly by the caller
    Override,
    /// Value from session-level config
    Session,
    /// Value from system-level config
    System,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::Override => write!(f, "override"),
            ValueSource::Session => write!(f, "session"),
            ValueSource::System => write!(f, "system"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Caller-supplied overrides (highest precedence).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Base data directory (the per-project hash directory is created inside)
    pub data_dir: Option<PathBuf>,
    pub artifact_root: Option<PathBuf>,
    pub busy_timeout_ms: Option<u64>,
    pub automation_store: Option<bool>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifact_root = Some(root.into());
        self
    }

    pub fn with_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    pub fn with_automation_store(mut self, enabled: bool) -> Self {
        self.automation_store = Some(enabled);
        self
    }
}

/// Fully resolved settings for opening a store.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    /// Canonical project root
    pub project_root: PathBuf,
    /// Directory holding this project's database files
    pub store_dir: Resolved<PathBuf>,
    /// Absolute directory where File finalize checks for artifacts
    pub artifact_root: Resolved<PathBuf>,
    pub busy_timeout: Resolved<Duration>,
    pub automation_store: Resolved<bool>,
}

impl ResolvedSettings {
    /// Path of the session config.kdl for this store.
    pub fn session_config_path(&self) -> PathBuf {
        self.store_dir.value.join("config.kdl")
    }
}

/// Path of the system-wide config.kdl, if one can be located.
pub fn system_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir).join("config.kdl"));
        }
    }
    dirs::config_dir().map(|d| d.join("waymark").join("config.kdl"))
}

/// Resolve settings for the project at `project_root`.
pub fn resolve_settings(project_root: &Path, overrides: &ConfigOverrides) -> Result<ResolvedSettings> {
    let project_root = project_root.canonicalize().map_err(|e| {
        Error::Config(format!(
            "Could not canonicalize project root {}: {}",
            project_root.display(),
            e
        ))
    })?;

    // Base data directory
    let base = if let Some(ref dir) = overrides.data_dir {
        Resolved::new(dir.clone(), ValueSource::Override)
    } else if let Some(dir) = non_empty_env(DATA_DIR_ENV) {
        Resolved::new(
            PathBuf::from(dir),
            ValueSource::EnvVar(DATA_DIR_ENV.to_string()),
        )
    } else {
        let dir = dirs::data_dir()
            .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
        Resolved::new(dir.join("waymark"), ValueSource::Default)
    };
    let store_dir = Resolved::new(get_storage_dir(&project_root, &base.value), base.source);

    let system_config = match system_config_path() {
        Some(path) => StoreConfig::load(&path)?,
        None => StoreConfig::new(),
    };
    let session_config = StoreConfig::load(&store_dir.value.join("config.kdl"))?;

    // Artifact root
    let artifact_root = if let Some(ref root) = overrides.artifact_root {
        Resolved::new(root.clone(), ValueSource::Override)
    } else if let Some(ref root) = session_config.artifact_root {
        Resolved::new(root.clone(), ValueSource::Session)
    } else if let Some(ref root) = system_config.artifact_root {
        Resolved::new(root.clone(), ValueSource::System)
    } else {
        Resolved::new(PathBuf::new(), ValueSource::Default)
    };
    let artifact_root = Resolved::new(
        project_root.join(&artifact_root.value),
        artifact_root.source,
    );
    if !artifact_root.value.is_dir() {
        return Err(Error::Config(format!(
            "artifact root {} ({}) is not a directory",
            artifact_root.value.display(),
            artifact_root.source
        )));
    }

    // Busy timeout
    let timeout_ms = if let Some(ms) = overrides.busy_timeout_ms {
        Resolved::new(ms, ValueSource::Override)
    } else if let Some(raw) = non_empty_env(BUSY_TIMEOUT_ENV) {
        let ms = raw.parse::<u64>().map_err(|_| {
            Error::Config(format!("{} must be an integer, got '{}'", BUSY_TIMEOUT_ENV, raw))
        })?;
        Resolved::new(ms, ValueSource::EnvVar(BUSY_TIMEOUT_ENV.to_string()))
    } else if let Some(ms) = session_config.busy_timeout_ms {
        Resolved::new(ms, ValueSource::Session)
    } else if let Some(ms) = system_config.busy_timeout_ms {
        Resolved::new(ms, ValueSource::System)
    } else {
        Resolved::new(DEFAULT_BUSY_TIMEOUT_MS, ValueSource::Default)
    };
    if timeout_ms.value == 0 {
        return Err(Error::Config(format!(
            "busy timeout must be greater than 0 ({})",
            timeout_ms.source
        )));
    }
    let busy_timeout = Resolved::new(Duration::from_millis(timeout_ms.value), timeout_ms.source);

    // Automation store
    let automation_store = if let Some(enabled) = overrides.automation_store {
        Resolved::new(enabled, ValueSource::Override)
    } else if let Some(enabled) = session_config.automation_store {
        Resolved::new(enabled, ValueSource::Session)
    } else if let Some(enabled) = system_config.automation_store {
        Resolved::new(enabled, ValueSource::System)
    } else {
        Resolved::new(true, ValueSource::Default)
    };

    Ok(ResolvedSettings {
        project_root,
        store_dir,
        artifact_root,
        busy_timeout,
        automation_store,
    })
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn isolated_system_config() -> TempDir {
        let dir = TempDir::new().unwrap();
        // SAFETY: tests touching the environment run serially
        unsafe { std::env::set_var(CONFIG_DIR_ENV, dir.path()) };
        dir
    }

    #[test]
    fn test_value_source_display() {
        assert_eq!(ValueSource::EnvVar("X".into()).to_string(), "env:X");
        assert_eq!(ValueSource::Override.to_string(), "override");
        assert_eq!(ValueSource::Default.to_string(), "default");
    }

    #[test]
    #[serial]
    fn test_resolve_defaults_with_override_data_dir() {
        let _system = isolated_system_config();
        unsafe { std::env::remove_var(BUSY_TIMEOUT_ENV) };
        let project = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();

        let settings =
            resolve_settings(project.path(), &ConfigOverrides::new().with_data_dir(data.path()))
                .unwrap();

        assert!(settings.store_dir.value.starts_with(data.path()));
        assert_eq!(settings.store_dir.source, ValueSource::Override);
        assert_eq!(settings.busy_timeout.value, Duration::from_millis(5000));
        assert_eq!(settings.busy_timeout.source, ValueSource::Default);
        assert!(settings.automation_store.value);
        assert_eq!(
            settings.artifact_root.value,
            project.path().canonicalize().unwrap()
        );

        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
    }

    #[test]
    #[serial]
    fn test_session_overrides_system() {
        let system = isolated_system_config();
        unsafe { std::env::remove_var(BUSY_TIMEOUT_ENV) };
        let project = TempDir::new().unwrap();
        std::fs::create_dir_all(project.path().join("lib")).unwrap();
        let data = TempDir::new().unwrap();
        let overrides = ConfigOverrides::new().with_data_dir(data.path());

        // Only a timeout goes in the system file; other tests share the process env.
        StoreConfig {
            busy_timeout_ms: Some(100),
            ..Default::default()
        }
        .save(&system.path().join("config.kdl"))
        .unwrap();

        let first = resolve_settings(project.path(), &overrides).unwrap();
        assert_eq!(first.busy_timeout.value, Duration::from_millis(100));
        assert_eq!(first.busy_timeout.source, ValueSource::System);

        StoreConfig {
            artifact_root: Some(PathBuf::from("lib")),
            busy_timeout_ms: Some(200),
            automation_store: Some(false),
        }
        .save(&first.session_config_path())
        .unwrap();

        let settings = resolve_settings(project.path(), &overrides).unwrap();
        assert_eq!(settings.busy_timeout.value, Duration::from_millis(200));
        assert_eq!(settings.busy_timeout.source, ValueSource::Session);
        assert!(!settings.automation_store.value);
        assert_eq!(settings.automation_store.source, ValueSource::Session);
        assert!(settings.artifact_root.value.ends_with("lib"));

        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
    }

    #[test]
    #[serial]
    fn test_env_overrides_session_timeout() {
        let _system = isolated_system_config();
        let project = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        unsafe { std::env::set_var(BUSY_TIMEOUT_ENV, "1234") };

        let settings =
            resolve_settings(project.path(), &ConfigOverrides::new().with_data_dir(data.path()))
                .unwrap();
        assert_eq!(settings.busy_timeout.value, Duration::from_millis(1234));
        assert_eq!(
            settings.busy_timeout.source,
            ValueSource::EnvVar(BUSY_TIMEOUT_ENV.to_string())
        );

        unsafe { std::env::remove_var(BUSY_TIMEOUT_ENV) };
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
    }

    #[test]
    #[serial]
    fn test_missing_artifact_root_is_config_error() {
        let _system = isolated_system_config();
        let project = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let overrides = ConfigOverrides::new()
            .with_data_dir(data.path())
            .with_artifact_root("does/not/exist");

        let err = resolve_settings(project.path(), &overrides).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
    }
}
