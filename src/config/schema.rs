//! KDL schema for config.kdl.
//!
//! ```kdl
//! // Store settings for one project
//! artifact-root "crates/app"   // where File finalize looks for artifacts
//! busy-timeout-ms 5000         // storage engine busy/statement timeout
//! automation-store #true       // create the optional automation database
//! ```

use crate::{Error, Result};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Store settings stored in config.kdl.
///
/// Every value is optional so that a session file can override a system file
/// one key at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root used to verify that finalized files exist (relative to the project root)
    pub artifact_root: Option<PathBuf>,

    /// Busy timeout for every database connection, in milliseconds
    pub busy_timeout_ms: Option<u64>,

    /// Whether the optional automation database is created and opened
    pub automation_store: Option<bool>,
}

impl StoreConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.busy_timeout_ms == Some(0) {
            return Err("busy-timeout-ms must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(node) = doc.get("artifact-root") {
            if let Some(s) = first_value(node).and_then(|v| v.as_string()) {
                config.artifact_root = Some(PathBuf::from(s));
            }
        }

        if let Some(node) = doc.get("busy-timeout-ms") {
            if let Some(i) = first_value(node).and_then(|v| v.as_integer()) {
                if let Ok(ms) = u64::try_from(i) {
                    config.busy_timeout_ms = Some(ms);
                }
            }
        }

        if let Some(node) = doc.get("automation-store") {
            config.automation_store = first_value(node).and_then(|v| v.as_bool());
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref root) = self.artifact_root {
            let mut node = KdlNode::new("artifact-root");
            node.push(KdlEntry::new(KdlValue::String(
                root.to_string_lossy().to_string(),
            )));
            doc.nodes_mut().push(node);
        }

        if let Some(ms) = self.busy_timeout_ms {
            let mut node = KdlNode::new("busy-timeout-ms");
            node.push(KdlEntry::new(KdlValue::Integer(ms as i128)));
            doc.nodes_mut().push(node);
        }

        if let Some(enabled) = self.automation_store {
            let mut node = KdlNode::new("automation-store");
            node.push(KdlEntry::new(KdlValue::Bool(enabled)));
            doc.nodes_mut().push(node);
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &StoreConfig) {
        if other.artifact_root.is_some() {
            self.artifact_root = other.artifact_root.clone();
        }
        if other.busy_timeout_ms.is_some() {
            self.busy_timeout_ms = other.busy_timeout_ms;
        }
        if other.automation_store.is_some() {
            self.automation_store = other.automation_store;
        }
    }

    /// Load a config file. A missing file yields an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let doc: KdlDocument = content.parse().map_err(|e| {
            Error::Config(format!("Failed to parse KDL in {}: {}", path.display(), e))
        })?;

        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Write the config file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate().map_err(Error::Config)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_kdl().to_string())?;
        Ok(())
    }
}

fn first_value(node: &KdlNode) -> Option<&KdlValue> {
    node.entries().first().map(|e| e.value())
}
