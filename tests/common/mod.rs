//! Common test utilities for waymark integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's `~/.local/share/waymark/` directory.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

pub use tempfile::TempDir;
use waymark::Store;
use waymark::storage::reservation::{FileFinalization, FileReservation};

/// A test environment with isolated data storage.
///
/// Each `TestEnv` creates two temporary directories:
/// - `project_dir`: Acts as the project root (artifacts are written here)
/// - `data_dir`: Holds the store's database files
pub struct TestEnv {
    pub project_dir: TempDir,
    pub data_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        waymark::logging::init_logging_with_filter("waymark=debug");
        Self {
            project_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
        }
    }

    /// Get the path to the project directory.
    pub fn path(&self) -> &Path {
        self.project_dir.path()
    }

    /// Initialize a store in the isolated data directory.
    pub fn init_store(&self) -> Store {
        Store::init_with_data_dir(self.path(), self.data_dir.path()).unwrap()
    }

    /// Open the store created by `init_store`.
    pub fn open_store(&self) -> Store {
        Store::open_with_data_dir(self.path(), self.data_dir.path()).unwrap()
    }

    /// Write an artifact relative to the project root.
    pub fn write_artifact(&self, relative: &str, contents: &str) {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    /// Reserve `dir/stem.ext`, write `dir/stem-ID_<id>.ext` and finalize it.
    pub fn tracked_file(&self, store: &mut Store, dir: &str, stem: &str, ext: &str) -> i64 {
        let id = store
            .reserve_file(&FileReservation {
                path: format!("{}/{}.{}", dir, stem, ext),
                ..Default::default()
            })
            .unwrap();
        let name = format!("{}-ID_{}.{}", stem, id, ext);
        self.write_artifact(&format!("{}/{}", dir, name), "");
        store
            .finalize_file(
                id,
                &FileFinalization {
                    name,
                    ..Default::default()
                },
            )
            .unwrap();
        id
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
