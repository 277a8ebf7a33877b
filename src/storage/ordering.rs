//! Dense ordering of completion path stages.
//!
//! `order_index` values always form the sequence 1..N. Every operation that
//! moves stages runs in one transaction and goes through negative temporary
//! values, so the unique index on `order_index` never sees a collision.

use super::notes::{NewNote, append_note};
use super::tiered::{fields, get_typed, insert_row, select_typed};
use super::{Store, now};
use crate::models::{CompletionPath, NoteSource, NoteType, PathStatus};
use crate::schema::Table;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// One stage whose index changed during a repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexChange {
    pub id: i64,
    pub old_index: i64,
    pub new_index: i64,
}

/// Stages that shared one index before a repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateIndex {
    pub order_index: i64,
    /// IDs in the order they were renumbered
    pub ids: Vec<i64>,
}

/// What a repair found and changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub total: usize,
    pub changes: Vec<IndexChange>,
    pub duplicates: Vec<DuplicateIndex>,
    /// Indices missing from 1..=max before the repair
    pub gaps: Vec<i64>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty()
    }
}

fn stage_order(conn: &Connection) -> Result<Vec<(i64, i64)>> {
    let mut stmt =
        conn.prepare("SELECT id, order_index FROM completion_path ORDER BY order_index ASC, id ASC")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<(i64, i64)>>>()?;
    Ok(rows)
}

/// Renumber every stage to 1..N, keeping the current relative order
/// (ties broken by ID).
pub(crate) fn repair_in(conn: &Connection) -> Result<RepairReport> {
    let order = stage_order(conn)?;

    let mut by_index: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for (id, index) in &order {
        by_index.entry(*index).or_default().push(*id);
    }
    let duplicates = by_index
        .iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(index, ids)| DuplicateIndex {
            order_index: *index,
            ids: ids.clone(),
        })
        .collect();
    let max = order.iter().map(|(_, index)| *index).max().unwrap_or(0);
    let gaps = (1..=max).filter(|i| !by_index.contains_key(i)).collect();

    let changes: Vec<IndexChange> = order
        .iter()
        .enumerate()
        .filter_map(|(rank, (id, old))| {
            let new_index = rank as i64 + 1;
            (*old != new_index).then_some(IndexChange {
                id: *id,
                old_index: *old,
                new_index,
            })
        })
        .collect();

    if !changes.is_empty() {
        // Park every moving stage below any existing value, then place it.
        let floor = order.iter().map(|(_, index)| index.abs()).max().unwrap_or(0) + 1;
        let stamp = now();
        for (i, change) in changes.iter().enumerate() {
            conn.execute(
                "UPDATE completion_path SET order_index = ?1 WHERE id = ?2",
                params![-(floor + i as i64), change.id],
            )?;
        }
        for change in &changes {
            conn.execute(
                "UPDATE completion_path SET order_index = ?1, updated_at = ?2 WHERE id = ?3",
                params![change.new_index, stamp, change.id],
            )?;
        }
    }

    Ok(RepairReport {
        total: order.len(),
        changes,
        duplicates,
        gaps,
    })
}

fn count_stages(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM completion_path", [], |row| row.get(0))?)
}

impl Store {
    /// Add a stage at `position` (1-based), or at the end when omitted.
    /// Stages at or after the position shift down by one.
    pub fn add_completion_path(
        &mut self,
        name: &str,
        description: Option<&str>,
        position: Option<i64>,
    ) -> Result<CompletionPath> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("Stage name is empty".to_string()));
        }

        let tx = self.project.transaction()?;
        let count = count_stages(&tx)?;
        let position = position.unwrap_or(count + 1);
        if position < 1 || position > count + 1 {
            return Err(Error::InvalidArgument(format!(
                "position must be between 1 and {}, got {}",
                count + 1,
                position
            )));
        }
        if position <= count {
            tx.execute(
                "UPDATE completion_path SET order_index = -order_index - 1 WHERE order_index >= ?1",
                [position],
            )?;
            tx.execute(
                "UPDATE completion_path SET order_index = -order_index WHERE order_index < 0",
                [],
            )?;
        }
        let id = insert_row(
            &tx,
            Table::CompletionPath,
            &fields(json!({
                "name": name,
                "description": description,
                "order_index": position,
            })),
        )?;
        let stage = get_typed(&tx, Table::CompletionPath, id)?;
        tx.commit()?;

        info!(id, position, "added completion path stage");
        Ok(stage)
    }

    pub fn get_completion_path(&self, id: i64) -> Result<CompletionPath> {
        get_typed(&self.project, Table::CompletionPath, id)
    }

    /// All stages in order.
    pub fn get_completion_paths(&self) -> Result<Vec<CompletionPath>> {
        select_typed(&self.project, Table::CompletionPath, &[], Some("order_index ASC"))
    }

    /// Move a stage to a free index. An index held by another stage is
    /// refused (use [`Store::swap_completion_paths`]); an index past the end
    /// moves the stage last.
    pub fn reorder_completion_path(&mut self, id: i64, new_index: i64) -> Result<CompletionPath> {
        if new_index < 1 {
            return Err(Error::InvalidArgument(format!(
                "order_index must be at least 1, got {}",
                new_index
            )));
        }

        let tx = self.project.transaction()?;
        let stage: CompletionPath = get_typed(&tx, Table::CompletionPath, id)?;
        if stage.order_index == new_index {
            return Ok(stage);
        }
        let occupant: Option<i64> = tx
            .query_row(
                "SELECT id FROM completion_path WHERE order_index = ?1 AND id != ?2",
                params![new_index, id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(other) = occupant {
            return Err(Error::InvalidState(format!(
                "order_index {} belongs to stage {}; use swap_completion_paths",
                new_index, other
            )));
        }

        tx.execute(
            "UPDATE completion_path SET order_index = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_index, now(), id],
        )?;
        repair_in(&tx)?;
        let stage = get_typed(&tx, Table::CompletionPath, id)?;
        tx.commit()?;

        info!(id, new_index, "reordered completion path stage");
        Ok(stage)
    }

    /// Exchange the positions of two stages.
    pub fn swap_completion_paths(&mut self, a: i64, b: i64) -> Result<(CompletionPath, CompletionPath)> {
        if a == b {
            return Err(Error::InvalidArgument(
                "cannot swap a stage with itself".to_string(),
            ));
        }

        let tx = self.project.transaction()?;
        let first: CompletionPath = get_typed(&tx, Table::CompletionPath, a)?;
        let second: CompletionPath = get_typed(&tx, Table::CompletionPath, b)?;
        let sentinel: i64 = tx.query_row(
            "SELECT MIN(0, COALESCE(MIN(order_index), 0)) - 1 FROM completion_path",
            [],
            |row| row.get(0),
        )?;
        let stamp = now();

        tx.execute(
            "UPDATE completion_path SET order_index = ?1 WHERE id = ?2",
            params![sentinel, a],
        )?;
        tx.execute(
            "UPDATE completion_path SET order_index = ?1, updated_at = ?2 WHERE id = ?3",
            params![first.order_index, stamp, b],
        )?;
        tx.execute(
            "UPDATE completion_path SET order_index = ?1, updated_at = ?2 WHERE id = ?3",
            params![second.order_index, stamp, a],
        )?;

        let first = get_typed(&tx, Table::CompletionPath, a)?;
        let second = get_typed(&tx, Table::CompletionPath, b)?;
        tx.commit()?;

        info!(a, b, "swapped completion path stages");
        Ok((first, second))
    }

    /// Renumber stages to 1..N and record a repair note when anything moved.
    pub fn repair_completion_paths(&mut self) -> Result<RepairReport> {
        let tx = self.project.transaction()?;
        let report = repair_in(&tx)?;
        if !report.is_clean() {
            warn!(
                changed = report.changes.len(),
                duplicates = report.duplicates.len(),
                gaps = report.gaps.len(),
                "repaired completion path order"
            );
            append_note(
                &tx,
                &NewNote::new(format!(
                    "Renumbered {} of {} completion path stage(s); {} duplicate index group(s), gaps at {:?}",
                    report.changes.len(),
                    report.total,
                    report.duplicates.len(),
                    report.gaps
                ))
                .of_type(NoteType::Repair)
                .from_source(NoteSource::System),
            )?;
        }
        tx.commit()?;
        Ok(report)
    }

    pub fn set_completion_path_status(&mut self, id: i64, status: PathStatus) -> Result<CompletionPath> {
        let changed = self.project.execute(
            "UPDATE completion_path SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("completion_path {} not found", id)));
        }
        self.get_completion_path(id)
    }

    /// The first stage that is not completed.
    pub fn current_completion_path(&self) -> Result<Option<CompletionPath>> {
        Ok(self
            .get_completion_paths()?
            .into_iter()
            .find(|stage| stage.status != PathStatus::Completed))
    }
}
