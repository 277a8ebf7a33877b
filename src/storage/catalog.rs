//! The core catalog: directives, their categories, and the helper index.
//!
//! The catalog is read-only at runtime. It is written only while the store is
//! seeded and when directive content is imported from a provider.

use super::Store;
use super::tiered::{decode, select_where};
use crate::api;
use crate::collab::DirectiveProvider;
use crate::models::{Directive, Row};
use crate::schema::{Database, Table};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::json;
use tracing::{debug, info};

/// Index every boundary operation in `helpers`, keyed by name.
pub(crate) fn seed_helpers(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO helpers (name, target_database, purpose) VALUES (?1, ?2, ?3)",
    )?;
    let mut added = 0;
    for op in api::operations() {
        added += stmt.execute(params![op.name, op.database.as_str(), op.description])?;
    }
    debug!(added, "seeded helper index");
    Ok(())
}

fn category_id(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT OR IGNORE INTO categories (name) VALUES (?1)", [name])?;
    Ok(conn.query_row("SELECT id FROM categories WHERE name = ?1", [name], |row| row.get(0))?)
}

impl Store {
    /// Load directive content into the catalog. Existing directives with the
    /// same name are replaced; categories are added, never removed.
    pub fn import_directives(&mut self, provider: &dyn DirectiveProvider) -> Result<usize> {
        let entries = provider.directives()?;
        if let Some(blank) = entries.iter().position(|e| e.name.trim().is_empty()) {
            return Err(Error::InvalidArgument(format!(
                "directive #{} has an empty name",
                blank
            )));
        }

        let mut conn = self.core_writer()?;
        let tx = conn.transaction()?;
        for entry in &entries {
            tx.execute(
                "INSERT INTO directives (name, description, guidance) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET description = excluded.description, guidance = excluded.guidance",
                params![entry.name, entry.description, entry.guidance],
            )?;
            let directive_id: i64 =
                tx.query_row("SELECT id FROM directives WHERE name = ?1", [&entry.name], |row| {
                    row.get(0)
                })?;
            for category in &entry.categories {
                let cat = category_id(&tx, category)?;
                let linked: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM directive_categories WHERE directive_id = ?1 AND category_id = ?2",
                        params![directive_id, cat],
                        |row| row.get(0),
                    )
                    .optional()?;
                if linked.is_none() {
                    tx.execute(
                        "INSERT INTO directive_categories (directive_id, category_id) VALUES (?1, ?2)",
                        params![directive_id, cat],
                    )?;
                }
            }
        }
        tx.commit()?;
        info!(count = entries.len(), "imported directives");
        Ok(entries.len())
    }

    pub fn get_directive(&self, name: &str) -> Result<Directive> {
        let rows = select_where(&self.core, Table::Directives, &[("name", json!(name))], None, Some(1))?;
        match rows.into_iter().next() {
            Some(row) => decode(row),
            None => Err(Error::NotFound(format!("directive '{}' not found", name))),
        }
    }

    /// Category names of one directive.
    pub fn get_directive_categories(&self, name: &str) -> Result<Vec<String>> {
        let directive = self.get_directive(name)?;
        let mut stmt = self.core.prepare(
            "SELECT c.name FROM categories c
             JOIN directive_categories dc ON dc.category_id = c.id
             WHERE dc.directive_id = ?1 ORDER BY c.name",
        )?;
        let names = stmt
            .query_map([directive.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Helper index rows, optionally narrowed to the database they act on.
    pub fn get_helpers(&self, database: Option<Database>) -> Result<Vec<Row>> {
        let conditions: Vec<(&str, serde_json::Value)> = database
            .map(|db| vec![("target_database", json!(db.as_str()))])
            .unwrap_or_default();
        select_where(&self.core, Table::Helpers, &conditions, Some("name ASC"), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::collab::{DirectiveEntry, StaticDirectives};
    use crate::test_utils::TestEnv;

    fn provider() -> StaticDirectives {
        StaticDirectives::new(vec![
            DirectiveEntry {
                name: "project_init".into(),
                description: Some("Start a project".into()),
                guidance: Some("Ask for purpose and goals".into()),
                categories: vec!["project".into(), "setup".into()],
            },
            DirectiveEntry {
                name: "file_write".into(),
                categories: vec!["project".into()],
                ..Default::default()
            },
        ])
    }

    #[test]
    fn test_import_and_read_directives() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        assert_eq!(store.import_directives(&provider()).unwrap(), 2);

        let d = store.get_directive("project_init").unwrap();
        assert_eq!(d.guidance.as_deref(), Some("Ask for purpose and goals"));
        assert_eq!(
            store.get_directive_categories("project_init").unwrap(),
            vec!["project".to_string(), "setup".to_string()]
        );

        // re-import replaces content without duplicating links
        store.import_directives(&provider()).unwrap();
        assert_eq!(store.fetch_by_ids(Table::Directives, &[]).unwrap().len(), 2);
        assert_eq!(store.fetch_by_ids(Table::DirectiveCategories, &[]).unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_directive() {
        let env = TestEnv::new();
        let store = env.init_store();
        let err = store.get_directive("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_helper_index_covers_operations() {
        let env = TestEnv::new();
        let store = env.init_store();
        let helpers = store.get_helpers(None).unwrap();
        assert_eq!(helpers.len(), api::operations().len());

        let core_only = store.get_helpers(Some(Database::Core)).unwrap();
        assert!(core_only.iter().any(|h| h["name"] == "get_directive"));
        assert!(core_only.iter().all(|h| h["target_database"] == "core"));
    }

    #[test]
    fn test_catalog_rejects_generic_writes() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        let err = store
            .insert(Table::Directives, &crate::storage::tiered::fields(json!({"name": "x"})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
