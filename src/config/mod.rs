//! Configuration for Waymark stores.
//!
//! ## config.kdl
//!
//! Located at:
//! - System: `~/.config/waymark/config.kdl` (or `$WAYMARK_CONFIG_DIR/config.kdl`)
//! - Session: `<data-dir>/<project-hash>/config.kdl`
//!
//! Contains:
//! - `artifact-root` - Directory (relative to the project root) where finalized files must exist
//! - `busy-timeout-ms` - Storage engine busy timeout
//! - `automation-store` - Whether the optional automation database is used
//!
//! Use the [`resolver`] module for unified precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    BUSY_TIMEOUT_ENV, CONFIG_DIR_ENV, ConfigOverrides, DATA_DIR_ENV, Resolved, ResolvedSettings,
    ValueSource, resolve_settings, system_config_path,
};
pub use schema::StoreConfig;
