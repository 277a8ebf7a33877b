//! Append-only notes.
//!
//! Notes can be attached to any row of any table, including rows that were
//! deleted later (deletion notes reference the row they describe). There is
//! no update or delete path for notes.

use super::Store;
use super::tiered::{decode, ensure_exists, get_typed, insert_row, select_typed};
use crate::models::{Note, NoteSeverity, NoteSource, NoteType, Row};
use crate::schema::Table;
use crate::{Error, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// A note to append.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNote {
    pub content: String,
    #[serde(default)]
    pub note_type: NoteType,
    #[serde(default)]
    pub reference_table: Option<Table>,
    #[serde(default)]
    pub reference_id: Option<i64>,
    #[serde(default)]
    pub source: NoteSource,
    #[serde(default)]
    pub severity: NoteSeverity,
    #[serde(default)]
    pub directive_name: Option<String>,
}

impl NewNote {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn of_type(mut self, note_type: NoteType) -> Self {
        self.note_type = note_type;
        self
    }

    /// Attach the note to a row.
    pub fn about(mut self, table: Table, id: i64) -> Self {
        self.reference_table = Some(table);
        self.reference_id = Some(id);
        self
    }

    pub fn from_source(mut self, source: NoteSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_severity(mut self, severity: NoteSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn for_directive(mut self, name: impl Into<String>) -> Self {
        self.directive_name = Some(name.into());
        self
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("content".into(), json!(self.content));
        row.insert("note_type".into(), json!(self.note_type.as_str()));
        row.insert(
            "reference_table".into(),
            json!(self.reference_table.map(|t| t.name())),
        );
        row.insert("reference_id".into(), json!(self.reference_id));
        row.insert("source".into(), json!(self.source.as_str()));
        row.insert("severity".into(), json!(self.severity.as_str()));
        row.insert("directive_name".into(), json!(self.directive_name));
        row
    }
}

/// Append a note inside the caller's transaction, without checking the
/// reference.
pub(crate) fn append_note(conn: &Connection, note: &NewNote) -> Result<i64> {
    let id = insert_row(conn, Table::Notes, &note.to_row())?;
    debug!(id, note_type = %note.note_type, "appended note");
    Ok(id)
}

/// Filter for listing notes. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteFilter {
    #[serde(default)]
    pub note_type: Option<NoteType>,
    #[serde(default)]
    pub reference_table: Option<Table>,
    #[serde(default)]
    pub reference_id: Option<i64>,
    #[serde(default)]
    pub source: Option<NoteSource>,
    #[serde(default)]
    pub severity: Option<NoteSeverity>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Store {
    /// Append a note. A referenced row must exist.
    pub fn add_note(&mut self, note: NewNote) -> Result<Note> {
        if note.content.trim().is_empty() {
            return Err(Error::InvalidArgument("Note content is empty".to_string()));
        }
        match (note.reference_table, note.reference_id) {
            (Some(table), Some(id)) => ensure_exists(self.conn(table.database())?, table, id)?,
            (None, None) => {}
            _ => {
                return Err(Error::InvalidArgument(
                    "reference_table and reference_id must be given together".to_string(),
                ));
            }
        }

        let id = append_note(&self.project, &note)?;
        get_typed(&self.project, Table::Notes, id)
    }

    pub fn get_note(&self, id: i64) -> Result<Note> {
        get_typed(&self.project, Table::Notes, id)
    }

    /// Notes attached to one row, newest first.
    pub fn get_notes_for(&self, table: Table, id: i64) -> Result<Vec<Note>> {
        select_typed(
            &self.project,
            Table::Notes,
            &[
                ("reference_table", Value::from(table.name())),
                ("reference_id", Value::from(id)),
            ],
            Some("created_at DESC, id DESC"),
        )
    }

    /// Notes matching a filter, newest first.
    pub fn get_notes(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        let mut conditions: Vec<(&str, Value)> = Vec::new();
        if let Some(t) = filter.note_type {
            conditions.push(("note_type", Value::from(t.as_str())));
        }
        if let Some(table) = filter.reference_table {
            conditions.push(("reference_table", Value::from(table.name())));
        }
        if let Some(id) = filter.reference_id {
            conditions.push(("reference_id", Value::from(id)));
        }
        if let Some(source) = filter.source {
            conditions.push(("source", Value::from(source.as_str())));
        }
        if let Some(severity) = filter.severity {
            conditions.push(("severity", Value::from(severity.as_str())));
        }
        let mut notes: Vec<Note> = select_typed(
            &self.project,
            Table::Notes,
            &conditions,
            Some("created_at DESC, id DESC"),
        )?;
        if let Some(limit) = filter.limit {
            notes.truncate(limit);
        }
        Ok(notes)
    }

    /// Case-insensitive substring search over note content, newest first.
    pub fn search_notes(&self, text: &str, limit: Option<usize>) -> Result<Vec<Note>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidArgument("Search text is empty".to_string()));
        }
        let escaped = text
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let mut notes = self
            .fetch_raw(
                Table::Notes,
                "content LIKE ? ESCAPE '\\'",
                &[Value::from(format!("%{}%", escaped))],
            )?
            .into_iter()
            .map(decode::<Note>)
            .collect::<Result<Vec<_>>>()?;
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            notes.truncate(limit);
        }
        Ok(notes)
    }
}
