//! Referential integrity for destructive operations.
//!
//! Every deletion is routed through one lookup table:
//! - protected tables are deleted by a named operation that first looks for
//!   dependents and refuses with a [`BlockingReport`] while any remain
//! - restricted tables are never deleted
//! - every other table goes through the generic delete
//!
//! Nothing cascades silently. The only rows removed alongside their owner are
//! pending items, and each one is listed in the deletion note.

use super::notes::{NewNote, append_note};
use super::ordering::{self, RepairReport};
use super::tiered::{constraint_error, require_row, row_id, row_label, select_where};
use super::Store;
use crate::models::{NoteSource, NoteType, Row};
use crate::schema::{Database, Table};
use crate::{Error, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

/// How a table's rows may be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteRoute {
    /// Deleted only by the named validated operation
    Protected(&'static str),
    /// Never deleted; carries the reason
    Restricted(&'static str),
    /// Generic delete with an audit note
    Simple,
}

const DELETE_ROUTES: &[(Table, DeleteRoute)] = &[
    (
        Table::Project,
        DeleteRoute::Restricted("the project row is the store's singleton and is never deleted"),
    ),
    (
        Table::Notes,
        DeleteRoute::Restricted("notes are append-only and are never deleted"),
    ),
    (Table::Files, DeleteRoute::Protected("delete_file")),
    (Table::Functions, DeleteRoute::Protected("delete_function")),
    (Table::Types, DeleteRoute::Protected("delete_type")),
    (Table::Themes, DeleteRoute::Protected("delete_theme")),
    (Table::Flows, DeleteRoute::Protected("delete_flow")),
    (
        Table::CompletionPath,
        DeleteRoute::Protected("delete_completion_path"),
    ),
    (Table::Milestones, DeleteRoute::Protected("delete_milestone")),
    (Table::Tasks, DeleteRoute::Protected("delete_task")),
    (Table::Subtasks, DeleteRoute::Protected("delete_subtask")),
    (Table::Sidequests, DeleteRoute::Protected("delete_sidequest")),
    (Table::Items, DeleteRoute::Protected("delete_item")),
];

/// Look up the deletion route for a table.
pub fn delete_route(table: Table) -> DeleteRoute {
    DELETE_ROUTES
        .iter()
        .find(|(t, _)| *t == table)
        .map(|(_, route)| *route)
        .unwrap_or(DeleteRoute::Simple)
}

#[derive(Debug, Clone, Copy)]
enum Link {
    /// Dependent row holds the owner's ID in a column
    Column(&'static str),
    /// Dependent row lists the owner's ID in a JSON array column
    Member(&'static str),
    /// Items owned through the polymorphic reference
    OwnedItems,
}

#[derive(Debug, Clone, Copy)]
struct Dependency {
    table: Table,
    link: Link,
}

const fn column(table: Table, field: &'static str) -> Dependency {
    Dependency {
        table,
        link: Link::Column(field),
    }
}

const fn member(table: Table, field: &'static str) -> Dependency {
    Dependency {
        table,
        link: Link::Member(field),
    }
}

const OWNED_ITEMS: Dependency = Dependency {
    table: Table::Items,
    link: Link::OwnedItems,
};

const FILE_DEPENDENTS: &[Dependency] = &[
    column(Table::Functions, "file_id"),
    column(Table::Types, "file_id"),
    column(Table::FileFlows, "file_id"),
];
const FUNCTION_DEPENDENTS: &[Dependency] = &[
    column(Table::Interactions, "source_function_id"),
    column(Table::Interactions, "target_function_id"),
    column(Table::TypesFunctions, "function_id"),
];
const TYPE_DEPENDENTS: &[Dependency] = &[column(Table::TypesFunctions, "type_id")];
const THEME_DEPENDENTS: &[Dependency] = &[column(Table::FlowThemes, "theme_id")];
const FLOW_DEPENDENTS: &[Dependency] = &[
    column(Table::FlowThemes, "flow_id"),
    column(Table::FileFlows, "flow_id"),
    member(Table::Tasks, "flow_ids"),
    member(Table::Sidequests, "flow_ids"),
];
const PATH_DEPENDENTS: &[Dependency] = &[column(Table::Milestones, "completion_path_id")];
const MILESTONE_DEPENDENTS: &[Dependency] = &[column(Table::Tasks, "milestone_id")];
const TASK_DEPENDENTS: &[Dependency] = &[
    column(Table::Subtasks, "parent_task_id"),
    column(Table::Sidequests, "paused_task_id"),
    OWNED_ITEMS,
];
const SUBTASK_DEPENDENTS: &[Dependency] =
    &[column(Table::Sidequests, "paused_subtask_id"), OWNED_ITEMS];
const SIDEQUEST_DEPENDENTS: &[Dependency] = &[OWNED_ITEMS];
const USER_DIRECTIVE_DEPENDENTS: &[Dependency] =
    &[column(Table::DirectiveExecutions, "directive_id")];

fn dependencies(table: Table) -> &'static [Dependency] {
    match table {
        Table::Files => FILE_DEPENDENTS,
        Table::Functions => FUNCTION_DEPENDENTS,
        Table::Types => TYPE_DEPENDENTS,
        Table::Themes => THEME_DEPENDENTS,
        Table::Flows => FLOW_DEPENDENTS,
        Table::CompletionPath => PATH_DEPENDENTS,
        Table::Milestones => MILESTONE_DEPENDENTS,
        Table::Tasks => TASK_DEPENDENTS,
        Table::Subtasks => SUBTASK_DEPENDENTS,
        Table::Sidequests => SIDEQUEST_DEPENDENTS,
        Table::UserDirectives => USER_DIRECTIVE_DEPENDENTS,
        _ => &[],
    }
}

/// One dependent row, identified for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DependentRow {
    pub id: i64,
    pub label: String,
}

/// All dependents found through one link.
#[derive(Debug, Clone, Serialize)]
pub struct Blocker {
    pub table: Table,
    /// Column (or `status` for locked items) that ties the rows to the target
    pub field: &'static str,
    pub count: usize,
    pub rows: Vec<DependentRow>,
    pub resolution: String,
}

/// Why a protected delete was refused, and what to do about it.
#[derive(Debug, Clone, Serialize)]
pub struct BlockingReport {
    pub table: Table,
    pub id: i64,
    pub label: String,
    pub blockers: Vec<Blocker>,
    /// Ordered steps that unblock the deletion
    pub resolution_steps: Vec<String>,
}

impl BlockingReport {
    fn new(table: Table, id: i64, label: String, blockers: Vec<Blocker>) -> Self {
        let mut resolution_steps: Vec<String> =
            blockers.iter().map(|b| b.resolution.clone()).collect();
        if let DeleteRoute::Protected(op) = delete_route(table) {
            resolution_steps.push(format!("Retry {} for {} {}", op, table, id));
        }
        Self {
            table,
            id,
            label,
            blockers,
            resolution_steps,
        }
    }

    /// Total number of dependent rows.
    pub fn total(&self) -> usize {
        self.blockers.iter().map(|b| b.count).sum()
    }
}

impl fmt::Display for BlockingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let found: Vec<String> = self
            .blockers
            .iter()
            .map(|b| format!("{} via {}: {}", b.table, b.field, b.count))
            .collect();
        write!(
            f,
            "Cannot delete {} {} ('{}'): {} dependent row(s) ({}).",
            self.table,
            self.id,
            self.label,
            self.total(),
            found.join("; ")
        )?;
        for (i, step) in self.resolution_steps.iter().enumerate() {
            write!(f, " {}. {}.", i + 1, step)?;
        }
        Ok(())
    }
}

fn resolution(owner: Table, id: i64, dep: &Dependency, count: usize) -> String {
    match dep.link {
        Link::Column(field) => match delete_route(dep.table) {
            DeleteRoute::Protected(op) => format!(
                "Remove the {} {} row(s) with {} = {} using {}",
                count, dep.table, field, id, op
            ),
            _ => format!(
                "Remove the {} {} row(s) with {} = {}",
                count, dep.table, field, id
            ),
        },
        Link::Member(field) => format!(
            "Drop {} {} from {} on the {} {} row(s) with set_flows",
            owner, id, field, count, dep.table
        ),
        Link::OwnedItems => format!(
            "{} item(s) are in progress or completed and cannot be removed; keep {} {} and mark it completed instead",
            count, owner, id
        ),
    }
}

/// Dependents that block deleting `table`/`id`, plus the pending items that
/// would be removed with it.
pub(crate) fn find_blockers(conn: &Connection, table: Table, id: i64) -> Result<(Vec<Blocker>, Vec<i64>)> {
    let mut blockers = Vec::new();
    let mut pending_items = Vec::new();

    for dep in dependencies(table) {
        let (field, rows) = match dep.link {
            Link::Column(field) | Link::Member(field) => (
                field,
                select_where(conn, dep.table, &[(field, Value::from(id))], None, None)?,
            ),
            Link::OwnedItems => {
                let owned = select_where(
                    conn,
                    Table::Items,
                    &[
                        ("reference_table", Value::from(table.name())),
                        ("reference_id", Value::from(id)),
                    ],
                    None,
                    None,
                )?;
                let (pending, locked): (Vec<Row>, Vec<Row>) = owned
                    .into_iter()
                    .partition(|r| r.get("status").and_then(Value::as_str) == Some("pending"));
                pending_items.extend(pending.iter().map(row_id));
                ("status", locked)
            }
        };
        if rows.is_empty() {
            continue;
        }
        blockers.push(Blocker {
            table: dep.table,
            field,
            count: rows.len(),
            rows: rows
                .iter()
                .map(|r| DependentRow {
                    id: row_id(r),
                    label: row_label(r),
                })
                .collect(),
            resolution: resolution(table, id, dep, rows.len()),
        });
    }
    Ok((blockers, pending_items))
}

/// Audit details recorded with every deletion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteAudit {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub source: NoteSource,
}

impl DeleteAudit {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            source: NoteSource::default(),
        }
    }

    pub fn with_source(mut self, source: NoteSource) -> Self {
        self.source = source;
        self
    }
}

/// Result of a successful deletion.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub table: Table,
    pub id: i64,
    /// The deletion note appended in the same transaction
    pub note_id: i64,
    /// Pending items removed along with their owner
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_items: Vec<i64>,
    /// Stage renumbering done after a completion path was removed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairReport>,
}

fn deletion_note(table: Table, id: i64, label: &str, removed_items: &[i64], audit: &DeleteAudit) -> NewNote {
    let mut content = format!("Deleted {} {} ('{}')", table, id, label);
    if let Some(reason) = audit.reason.as_deref().filter(|r| !r.trim().is_empty()) {
        content.push_str(&format!(": {}", reason));
    }
    if !removed_items.is_empty() {
        let ids: Vec<String> = removed_items.iter().map(|i| i.to_string()).collect();
        content.push_str(&format!(". Removed pending item(s): {}", ids.join(", ")));
    }
    NewNote::new(content)
        .of_type(NoteType::Deletion)
        .about(table, id)
        .from_source(audit.source)
}

impl Store {
    pub fn delete_file(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::Files, id, audit)
    }

    pub fn delete_function(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::Functions, id, audit)
    }

    pub fn delete_type(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::Types, id, audit)
    }

    pub fn delete_theme(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::Themes, id, audit)
    }

    pub fn delete_flow(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::Flows, id, audit)
    }

    /// Delete a stage, then renumber the remaining stages densely.
    pub fn delete_completion_path(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::CompletionPath, id, audit)
    }

    pub fn delete_milestone(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::Milestones, id, audit)
    }

    /// Delete a task. Pending items go with it; any other dependent blocks.
    pub fn delete_task(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::Tasks, id, audit)
    }

    pub fn delete_subtask(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::Subtasks, id, audit)
    }

    pub fn delete_sidequest(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::Sidequests, id, audit)
    }

    /// Delete an item. Only pending items may be deleted.
    pub fn delete_item(&mut self, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.delete_protected(Table::Items, id, audit)
    }

    /// Dependents that currently block deleting a row, without deleting it.
    pub fn check_delete(&self, table: Table, id: i64) -> Result<Option<BlockingReport>> {
        let conn = self.conn(table.database())?;
        let existing = require_row(conn, table, id)?;
        ensure_deletable(table, id, &existing)?;
        let (blockers, _) = find_blockers(conn, table, id)?;
        if blockers.is_empty() {
            return Ok(None);
        }
        Ok(Some(BlockingReport::new(table, id, row_label(&existing), blockers)))
    }

    fn delete_protected(&mut self, table: Table, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        let tx = self.project.transaction()?;
        let existing = require_row(&tx, table, id)?;
        let label = row_label(&existing);
        ensure_deletable(table, id, &existing)?;

        let (blockers, removed_items) = find_blockers(&tx, table, id)?;
        if !blockers.is_empty() {
            let report = BlockingReport::new(table, id, label, blockers);
            warn!(table = %table, id, dependents = report.total(), "delete blocked");
            return Err(Error::BlockingReferences(Box::new(report)));
        }

        for item in &removed_items {
            tx.execute("DELETE FROM items WHERE id = ?1", [item])?;
        }
        tx.execute(&format!("DELETE FROM {} WHERE id = ?1", table.name()), [id])
            .map_err(|e| constraint_error(table, e))?;
        let note_id = append_note(&tx, &deletion_note(table, id, &label, &removed_items, audit))?;
        let repair = if table == Table::CompletionPath {
            Some(ordering::repair_in(&tx)?)
        } else {
            None
        };
        tx.commit()?;

        info!(table = %table, id, items = removed_items.len(), "deleted row");
        Ok(DeleteOutcome {
            table,
            id,
            note_id,
            removed_items,
            repair,
        })
    }

    /// Generic delete for tables without a specialized delete operation.
    /// Incoming references still block.
    pub(crate) fn delete_simple(&mut self, table: Table, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        let db = table.database();
        let note_id = if db == Database::Project {
            let tx = self.project.transaction()?;
            let existing = require_row(&tx, table, id)?;
            refuse_blocked(&tx, table, id, &existing)?;
            tx.execute(&format!("DELETE FROM {} WHERE id = ?1", table.name()), [id])
                .map_err(|e| constraint_error(table, e))?;
            let note_id = append_note(&tx, &deletion_note(table, id, &row_label(&existing), &[], audit))?;
            tx.commit()?;
            note_id
        } else {
            let conn = self.conn(db)?;
            let existing = require_row(conn, table, id)?;
            refuse_blocked(conn, table, id, &existing)?;
            // The note is written first and only committed once the row is gone.
            let notes = self.project.unchecked_transaction()?;
            let note_id = append_note(&notes, &deletion_note(table, id, &row_label(&existing), &[], audit))?;
            conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table.name()), [id])
                .map_err(|e| constraint_error(table, e))?;
            notes.commit()?;
            note_id
        };

        info!(table = %table, id, "deleted row");
        Ok(DeleteOutcome {
            table,
            id,
            note_id,
            removed_items: Vec::new(),
            repair: None,
        })
    }
}

/// State preconditions a row must meet before it can be deleted at all.
fn ensure_deletable(table: Table, id: i64, existing: &Row) -> Result<()> {
    if table != Table::Items {
        return Ok(());
    }
    let status = existing.get("status").and_then(Value::as_str).unwrap_or_default();
    if status != "pending" {
        return Err(Error::InvalidState(format!(
            "item {} is {}; only pending items can be deleted",
            id, status
        )));
    }
    Ok(())
}

fn refuse_blocked(conn: &Connection, table: Table, id: i64, existing: &Row) -> Result<()> {
    let (blockers, _) = find_blockers(conn, table, id)?;
    if blockers.is_empty() {
        return Ok(());
    }
    let report = BlockingReport::new(table, id, row_label(existing), blockers);
    warn!(table = %table, id, dependents = report.total(), "delete blocked");
    Err(Error::BlockingReferences(Box::new(report)))
}
