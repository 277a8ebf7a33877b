//! Storage layer for Waymark data.
//!
//! A store is a directory holding one SQLite file per logical database:
//!
//! - `core.db` - read-only catalog of directives and helpers
//! - `project.db` - project metadata (artifacts, work breakdown, notes)
//! - `settings.db` - preference store
//! - `automation.db` - optional automation store
//!
//! The directory lives at `<data-dir>/<project-hash>/`, where the hash is
//! derived from the canonical project root. All DDL is generated from the
//! schema registry, and every database records the schema version it was
//! created with.

pub mod catalog;
pub mod context;
pub mod hierarchy;
pub mod integrity;
pub mod notes;
pub mod ordering;
pub mod project;
pub mod reservation;
pub mod tiered;

use crate::config::{ConfigOverrides, ResolvedSettings, resolve_settings};
use crate::schema::{Database, SCHEMA_VERSION, database_ddl};
use crate::{Error, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Storage manager for a single project.
pub struct Store {
    /// Directory holding this project's database files
    root: PathBuf,
    /// Absolute directory where finalized files must exist
    artifact_root: PathBuf,
    busy_timeout: Duration,
    core: Connection,
    project: Connection,
    settings: Connection,
    user: Option<Connection>,
}

impl Store {
    /// Initialize storage for a project, resolving settings from the environment.
    pub fn init(project_root: &Path) -> Result<Self> {
        Self::init_with_overrides(project_root, &ConfigOverrides::default())
    }

    /// Open existing storage for a project.
    pub fn open(project_root: &Path) -> Result<Self> {
        Self::open_with_overrides(project_root, &ConfigOverrides::default())
    }

    /// Check if storage exists for a project.
    pub fn exists(project_root: &Path) -> Result<bool> {
        let settings = resolve_settings(project_root, &ConfigOverrides::default())?;
        Ok(Self::exists_at(&settings.store_dir.value))
    }

    /// Initialize storage under an explicit base data directory.
    pub fn init_with_data_dir(project_root: &Path, data_dir: &Path) -> Result<Self> {
        Self::init_with_overrides(project_root, &ConfigOverrides::new().with_data_dir(data_dir))
    }

    /// Open storage under an explicit base data directory.
    pub fn open_with_data_dir(project_root: &Path, data_dir: &Path) -> Result<Self> {
        Self::open_with_overrides(project_root, &ConfigOverrides::new().with_data_dir(data_dir))
    }

    pub fn init_with_overrides(project_root: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        Self::init_with_settings(&resolve_settings(project_root, overrides)?)
    }

    pub fn open_with_overrides(project_root: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        Self::open_with_settings(&resolve_settings(project_root, overrides)?)
    }

    /// Create every database (idempotently) and open the store.
    pub fn init_with_settings(settings: &ResolvedSettings) -> Result<Self> {
        let root = settings.store_dir.value.clone();
        let timeout = settings.busy_timeout.value;
        fs::create_dir_all(&root)?;

        // The core catalog is writable exactly once, while it is seeded.
        {
            let core = open_connection(&root.join(Database::Core.file_name()), false, timeout)?;
            install_schema(&core, Database::Core)?;
            catalog::seed_helpers(&core)?;
        }
        for db in [Database::Project, Database::Settings] {
            let conn = open_connection(&root.join(db.file_name()), false, timeout)?;
            install_schema(&conn, db)?;
        }
        if settings.automation_store.value {
            let conn = open_connection(&root.join(Database::User.file_name()), false, timeout)?;
            install_schema(&conn, Database::User)?;
        }

        info!(store = %root.display(), "initialized store");
        Self::open_with_settings(settings)
    }

    /// Open an initialized store, checking every database's schema version.
    pub fn open_with_settings(settings: &ResolvedSettings) -> Result<Self> {
        let root = settings.store_dir.value.clone();
        if !Self::exists_at(&root) {
            return Err(Error::NotFound(format!(
                "No store at {}; initialize it first",
                root.display()
            )));
        }
        let timeout = settings.busy_timeout.value;

        let core = open_connection(&root.join(Database::Core.file_name()), true, timeout)?;
        check_schema_version(&core, Database::Core)?;

        let project = open_connection(&root.join(Database::Project.file_name()), false, timeout)?;
        install_schema(&project, Database::Project)?;

        let settings_conn =
            open_connection(&root.join(Database::Settings.file_name()), false, timeout)?;
        install_schema(&settings_conn, Database::Settings)?;

        let user = if settings.automation_store.value {
            let conn = open_connection(&root.join(Database::User.file_name()), false, timeout)?;
            install_schema(&conn, Database::User)?;
            Some(conn)
        } else {
            None
        };

        debug!(
            store = %root.display(),
            artifact_root = %settings.artifact_root.value.display(),
            automation = user.is_some(),
            "opened store"
        );

        Ok(Self {
            root,
            artifact_root: settings.artifact_root.value.clone(),
            busy_timeout: timeout,
            core,
            project,
            settings: settings_conn,
            user,
        })
    }

    fn exists_at(root: &Path) -> bool {
        root.join(Database::Core.file_name()).exists()
            && root.join(Database::Project.file_name()).exists()
    }

    /// Directory holding the database files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory where finalized files are checked for existence.
    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    /// Whether a database is available in this store.
    pub fn has_database(&self, db: Database) -> bool {
        db != Database::User || self.user.is_some()
    }

    /// Read access to a database.
    pub(crate) fn conn(&self, db: Database) -> Result<&Connection> {
        match db {
            Database::Core => Ok(&self.core),
            Database::Project => Ok(&self.project),
            Database::Settings => Ok(&self.settings),
            Database::User => self.user.as_ref().ok_or_else(automation_disabled),
        }
    }

    /// Write access to a database. The core catalog never hands one out.
    pub(crate) fn conn_mut(&mut self, db: Database) -> Result<&mut Connection> {
        match db {
            Database::Core => Err(Error::forbidden(
                "the core database is read-only",
                Some("import_directives"),
            )),
            Database::Project => Ok(&mut self.project),
            Database::Settings => Ok(&mut self.settings),
            Database::User => self.user.as_mut().ok_or_else(automation_disabled),
        }
    }

    /// A short-lived writable connection to the core catalog, for imports.
    fn core_writer(&self) -> Result<Connection> {
        open_connection(
            &self.root.join(Database::Core.file_name()),
            false,
            self.busy_timeout,
        )
    }
}

fn automation_disabled() -> Error {
    Error::InvalidState(
        "the automation database is disabled for this store (automation-store #false)".to_string(),
    )
}

fn open_connection(path: &Path, read_only: bool, busy_timeout: Duration) -> Result<Connection> {
    let conn = if read_only {
        Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?
    } else {
        Connection::open(path)?
    };
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

/// Create tables and indexes if needed, then verify the recorded version.
fn install_schema(conn: &Connection, db: Database) -> Result<()> {
    conn.execute_batch(&database_ddl(db))?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (id, schema_version) VALUES (1, ?1)",
        [SCHEMA_VERSION],
    )?;
    check_schema_version(conn, db)
}

fn check_schema_version(conn: &Connection, db: Database) -> Result<()> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT schema_version FROM schema_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(v) => Err(Error::InvalidState(format!(
            "{} database has schema version {}, expected {}",
            db, v, SCHEMA_VERSION
        ))),
        None => Err(Error::InvalidState(format!(
            "{} database has no schema version",
            db
        ))),
    }
}

/// Current time in the stored timestamp format.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Get the storage directory for a project under a base data directory.
///
/// Uses a hash of the canonical project path so each project gets its own store.
pub fn get_storage_dir(project_root: &Path, base: &Path) -> PathBuf {
    let canonical = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let hash = hasher.finalize();
    let hash_hex = format!("{:x}", hash);

    base.join(&hash_hex[..12])
}

/// Check that a final name ends with the row's own ID token (`-ID_<id>` or
/// `_ID_<id>`, case-insensitive). For file names the token may instead sit
/// right before any extension, so `bundle-ID_7.tar.gz` qualifies.
pub fn name_carries_id(name: &str, id: i64, is_file_name: bool) -> bool {
    let lower = name.to_ascii_lowercase();
    let token = format!("id_{}", id);
    let ends_with_token = |stem: &str| {
        stem.strip_suffix(&token)
            .and_then(|prefix| prefix.bytes().last())
            .is_some_and(|sep| matches!(sep, b'-' | b'_'))
    };

    if !is_file_name {
        return ends_with_token(&lower);
    }
    let stems: Vec<&str> = lower
        .match_indices('.')
        .filter(|(pos, _)| *pos > 0)
        .map(|(pos, _)| &lower[..pos])
        .collect();
    if stems.is_empty() {
        return ends_with_token(&lower);
    }
    stems.into_iter().any(|stem| ends_with_token(stem))
}
