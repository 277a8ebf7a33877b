//! Reserve-then-finalize lifecycle for files, functions and types.
//!
//! A reservation creates the row first so its ID is known; the artifact is
//! then named with an `-ID_<id>` (or `_ID_<id>`) suffix and finalized. A
//! finalized file must exist under the artifact root.
//!
//! Batch variants run in one transaction with a savepoint per element: a bad
//! element is rolled back and reported, the others are kept.

use super::tiered::{ensure_exists, fields, get_typed, insert_row, require_row, select_typed};
use super::{Store, name_carries_id, now};
use crate::models::{FileRecord, FunctionRecord, Purity, Row, TypeRecord};
use crate::schema::Table;
use crate::{Error, ErrorKind, Result};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Component, Path};
use tracing::{info, warn};

/// A file to reserve, by its intended path relative to the artifact root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileReservation {
    pub path: String,
    /// Defaults to the last component of `path`
    #[serde(default)]
    pub preliminary_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Final naming of a reserved file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileFinalization {
    /// Must carry the row's ID token
    pub name: String,
    /// Defaults to the reserved path's directory joined with `name`
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionReservation {
    pub file_id: i64,
    pub preliminary_name: String,
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionFinalization {
    pub name: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub parameters: Option<String>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub purity_level: Option<Purity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeReservation {
    pub file_id: i64,
    pub preliminary_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeFinalization {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
}

/// A finalized record plus follow-ups the caller should act on.
#[derive(Debug, Clone, Serialize)]
pub struct Finalized<T> {
    pub record: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reminders: Vec<String>,
}

/// Failure of one batch element.
#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one batch element, by input position.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchError>,
}

/// Per-element results of a batch call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub results: Vec<BatchEntry>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    fn ok(&mut self, index: usize, id: i64) {
        self.succeeded += 1;
        self.results.push(BatchEntry {
            index,
            id: Some(id),
            error: None,
        });
    }

    fn err(&mut self, index: usize, error: &Error) {
        self.failed += 1;
        self.results.push(BatchEntry {
            index,
            id: None,
            error: Some(BatchError {
                kind: error.kind(),
                message: error.to_string(),
            }),
        });
    }

    /// IDs of the elements that succeeded, in input order.
    pub fn ids(&self) -> Vec<i64> {
        self.results.iter().filter_map(|r| r.id).collect()
    }
}

/// Paths are stored relative to the artifact root and may not escape it.
fn check_relative_path(path: &str) -> Result<()> {
    let p = Path::new(path);
    if path.trim().is_empty() {
        return Err(Error::InvalidArgument("File path is empty".to_string()));
    }
    if p.is_absolute()
        || p
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(Error::InvalidArgument(format!(
            "File path '{}' must be relative to the artifact root",
            path
        )));
    }
    Ok(())
}

fn ensure_path_free(conn: &Connection, path: &str, except: Option<i64>) -> Result<()> {
    let holders: Vec<FileRecord> = select_typed(conn, Table::Files, &[("path", json!(path))], None)?;
    if let Some(holder) = holders.iter().find(|f| Some(f.id) != except) {
        return Err(Error::InvalidState(format!(
            "path '{}' is already tracked by file {}",
            path, holder.id
        )));
    }
    Ok(())
}

fn reserve_file_in(conn: &Connection, r: &FileReservation) -> Result<i64> {
    check_relative_path(&r.path)?;
    ensure_path_free(conn, &r.path, None)?;
    let name = match &r.preliminary_name {
        Some(name) if !name.trim().is_empty() => name.clone(),
        _ => Path::new(&r.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| r.path.clone()),
    };
    insert_row(
        conn,
        Table::Files,
        &fields(json!({
            "name": name,
            "path": r.path,
            "language": r.language,
            "is_reserved": true,
        })),
    )
}

/// Load a row that must still be reserved.
fn reserved_row(conn: &Connection, table: Table, id: i64) -> Result<Row> {
    let row = require_row(conn, table, id).map_err(|_| {
        Error::InvalidState(format!("there is no reservation for {} {}", table, id))
    })?;
    if row.get("is_reserved").and_then(Value::as_bool) != Some(true) {
        return Err(Error::InvalidState(format!(
            "{} {} is already finalized as '{}'",
            table,
            id,
            row.get("name").and_then(Value::as_str).unwrap_or_default()
        )));
    }
    Ok(row)
}

fn check_final_name(table: Table, id: i64, name: &str) -> Result<()> {
    if !name_carries_id(name, id, table == Table::Files) {
        return Err(Error::InvalidArgument(format!(
            "final name '{}' for {} {} must end with -ID_{id} or _ID_{id}{}",
            name,
            table,
            id,
            if table == Table::Files { " before the extension" } else { "" },
        )));
    }
    Ok(())
}

fn finalize_file_in(conn: &Connection, artifact_root: &Path, id: i64, f: &FileFinalization) -> Result<FileRecord> {
    let row = reserved_row(conn, Table::Files, id)?;
    check_final_name(Table::Files, id, &f.name)?;

    let path = match &f.path {
        Some(path) => path.clone(),
        None => {
            let reserved = row.get("path").and_then(Value::as_str).unwrap_or_default();
            match Path::new(reserved).parent() {
                Some(dir) if !dir.as_os_str().is_empty() => {
                    dir.join(&f.name).to_string_lossy().into_owned()
                }
                _ => f.name.clone(),
            }
        }
    };
    check_relative_path(&path)?;

    let on_disk = artifact_root.join(&path);
    if !on_disk.is_file() {
        warn!(id, path = %on_disk.display(), "finalize refused: artifact missing");
        return Err(Error::PreconditionFailed(format!(
            "no file at {}; file {} stays reserved",
            on_disk.display(),
            id
        )));
    }
    ensure_path_free(conn, &path, Some(id))?;

    conn.execute(
        "UPDATE files SET name = ?1, path = ?2, language = COALESCE(?3, language), is_reserved = 0, updated_at = ?4 WHERE id = ?5",
        params![f.name, path, f.language, now(), id],
    )?;
    get_typed(conn, Table::Files, id)
}

fn reserve_function_in(conn: &Connection, r: &FunctionReservation) -> Result<i64> {
    if r.preliminary_name.trim().is_empty() {
        return Err(Error::InvalidArgument("Function name is empty".to_string()));
    }
    ensure_exists(conn, Table::Files, r.file_id)?;
    insert_row(
        conn,
        Table::Functions,
        &fields(json!({
            "name": r.preliminary_name,
            "file_id": r.file_id,
            "purpose": r.purpose,
            "is_reserved": true,
        })),
    )
}

fn touch_file(conn: &Connection, file_id: i64, stamp: &str) -> Result<()> {
    conn.execute(
        "UPDATE files SET updated_at = ?1 WHERE id = ?2",
        params![stamp, file_id],
    )?;
    Ok(())
}

fn finalize_function_in(conn: &Connection, id: i64, f: &FunctionFinalization) -> Result<FunctionRecord> {
    let row = reserved_row(conn, Table::Functions, id)?;
    check_final_name(Table::Functions, id, &f.name)?;
    let file_id = row.get("file_id").and_then(Value::as_i64).unwrap_or_default();

    let stamp = now();
    conn.execute(
        "UPDATE functions SET name = ?1, purpose = COALESCE(?2, purpose), parameters = COALESCE(?3, parameters),
             returns = COALESCE(?4, returns), purity_level = COALESCE(?5, purity_level),
             is_reserved = 0, updated_at = ?6
         WHERE id = ?7",
        params![
            f.name,
            f.purpose,
            f.parameters,
            f.returns,
            f.purity_level.map(|p| p.as_str()),
            stamp,
            id
        ],
    )?;
    touch_file(conn, file_id, &stamp)?;
    get_typed(conn, Table::Functions, id)
}

fn reserve_type_in(conn: &Connection, r: &TypeReservation) -> Result<i64> {
    if r.preliminary_name.trim().is_empty() {
        return Err(Error::InvalidArgument("Type name is empty".to_string()));
    }
    ensure_exists(conn, Table::Files, r.file_id)?;
    insert_row(
        conn,
        Table::Types,
        &fields(json!({
            "name": r.preliminary_name,
            "file_id": r.file_id,
            "description": r.description,
            "is_reserved": true,
        })),
    )
}

fn finalize_type_in(conn: &Connection, id: i64, f: &TypeFinalization) -> Result<Finalized<TypeRecord>> {
    let row = reserved_row(conn, Table::Types, id)?;
    check_final_name(Table::Types, id, &f.name)?;
    let file_id = row.get("file_id").and_then(Value::as_i64).unwrap_or_default();

    let stamp = now();
    conn.execute(
        "UPDATE types SET name = ?1, description = COALESCE(?2, description),
             definition = COALESCE(?3, definition), is_reserved = 0, updated_at = ?4
         WHERE id = ?5",
        params![f.name, f.description, f.definition, stamp, id],
    )?;
    touch_file(conn, file_id, &stamp)?;

    let linked: i64 = conn.query_row(
        "SELECT COUNT(*) FROM types_functions WHERE type_id = ?1",
        [id],
        |r| r.get(0),
    )?;
    let mut reminders = Vec::new();
    if linked == 0 {
        reminders.push(format!(
            "Register the functions that construct or operate on type {} ('{}') with add_type_function",
            id, f.name
        ));
    }
    Ok(Finalized {
        record: get_typed(conn, Table::Types, id)?,
        reminders,
    })
}

impl Store {
    /// Reserve a file row, returning its ID for the final name.
    pub fn reserve_file(&mut self, r: &FileReservation) -> Result<i64> {
        let tx = self.project.transaction()?;
        let id = reserve_file_in(&tx, r)?;
        tx.commit()?;
        info!(id, path = %r.path, "reserved file");
        Ok(id)
    }

    /// Finalize a reserved file once it exists under the artifact root.
    pub fn finalize_file(&mut self, id: i64, f: &FileFinalization) -> Result<FileRecord> {
        let tx = self.project.transaction()?;
        let file = finalize_file_in(&tx, &self.artifact_root, id, f)?;
        tx.commit()?;
        info!(id, path = %file.path, "finalized file");
        Ok(file)
    }

    pub fn reserve_function(&mut self, r: &FunctionReservation) -> Result<i64> {
        let tx = self.project.transaction()?;
        let id = reserve_function_in(&tx, r)?;
        tx.commit()?;
        info!(id, file_id = r.file_id, "reserved function");
        Ok(id)
    }

    /// Finalize a function; the owning file's `updated_at` moves with it.
    pub fn finalize_function(&mut self, id: i64, f: &FunctionFinalization) -> Result<FunctionRecord> {
        let tx = self.project.transaction()?;
        let function = finalize_function_in(&tx, id, f)?;
        tx.commit()?;
        info!(id, name = %f.name, "finalized function");
        Ok(function)
    }

    pub fn reserve_type(&mut self, r: &TypeReservation) -> Result<i64> {
        let tx = self.project.transaction()?;
        let id = reserve_type_in(&tx, r)?;
        tx.commit()?;
        info!(id, file_id = r.file_id, "reserved type");
        Ok(id)
    }

    /// Finalize a type. Reminds the caller to register type-function links
    /// when none exist yet.
    pub fn finalize_type(&mut self, id: i64, f: &TypeFinalization) -> Result<Finalized<TypeRecord>> {
        let tx = self.project.transaction()?;
        let finalized = finalize_type_in(&tx, id, f)?;
        tx.commit()?;
        info!(id, name = %f.name, "finalized type");
        Ok(finalized)
    }

    pub fn reserve_files(&mut self, entries: &[FileReservation]) -> Result<BatchReport> {
        self.batch(entries, |conn, _, r| reserve_file_in(conn, r))
    }

    /// Finalize several files; each `(id, finalization)` pair stands alone.
    pub fn finalize_files(&mut self, entries: &[(i64, FileFinalization)]) -> Result<BatchReport> {
        let root = self.artifact_root.clone();
        self.batch(entries, |conn, _, (id, f)| {
            finalize_file_in(conn, &root, *id, f).map(|file| file.id)
        })
    }

    pub fn reserve_functions(&mut self, entries: &[FunctionReservation]) -> Result<BatchReport> {
        self.batch(entries, |conn, _, r| reserve_function_in(conn, r))
    }

    pub fn finalize_functions(&mut self, entries: &[(i64, FunctionFinalization)]) -> Result<BatchReport> {
        self.batch(entries, |conn, _, (id, f)| {
            finalize_function_in(conn, *id, f).map(|function| function.id)
        })
    }

    pub fn reserve_types(&mut self, entries: &[TypeReservation]) -> Result<BatchReport> {
        self.batch(entries, |conn, _, r| reserve_type_in(conn, r))
    }

    pub fn finalize_types(&mut self, entries: &[(i64, TypeFinalization)]) -> Result<BatchReport> {
        self.batch(entries, |conn, _, (id, f)| {
            finalize_type_in(conn, *id, f).map(|t| t.record.id)
        })
    }

    /// Run `op` for every element under its own savepoint.
    fn batch<T, F>(&mut self, entries: &[T], mut op: F) -> Result<BatchReport>
    where
        F: FnMut(&Connection, usize, &T) -> Result<i64>,
    {
        let mut tx = self.project.transaction()?;
        let mut report = BatchReport::default();
        for (index, entry) in entries.iter().enumerate() {
            let sp = tx.savepoint()?;
            match op(&*sp, index, entry) {
                Ok(id) => {
                    sp.commit()?;
                    report.ok(index, id);
                }
                Err(e) => {
                    // Dropping the savepoint rolls the element back.
                    drop(sp);
                    report.err(index, &e);
                }
            }
        }
        tx.commit()?;
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "batch applied"
        );
        Ok(report)
    }

    pub fn get_file(&self, id: i64) -> Result<FileRecord> {
        get_typed(&self.project, Table::Files, id)
    }

    pub fn get_file_by_path(&self, path: &str) -> Result<FileRecord> {
        select_typed::<FileRecord>(&self.project, Table::Files, &[("path", json!(path))], None)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no file tracked at '{}'", path)))
    }

    pub fn get_function(&self, id: i64) -> Result<FunctionRecord> {
        get_typed(&self.project, Table::Functions, id)
    }

    pub fn get_type(&self, id: i64) -> Result<TypeRecord> {
        get_typed(&self.project, Table::Types, id)
    }

    pub fn get_functions_for_file(&self, file_id: i64) -> Result<Vec<FunctionRecord>> {
        select_typed(&self.project, Table::Functions, &[("file_id", json!(file_id))], None)
    }

    pub fn get_types_for_file(&self, file_id: i64) -> Result<Vec<TypeRecord>> {
        select_typed(&self.project, Table::Types, &[("file_id", json!(file_id))], None)
    }

    /// Rows of `table` (files, functions or types) still waiting for finalize.
    pub fn get_reserved(&self, table: Table) -> Result<Vec<Row>> {
        if !matches!(table, Table::Files | Table::Functions | Table::Types) {
            return Err(Error::InvalidArgument(format!(
                "'{}' has no reservation lifecycle",
                table
            )));
        }
        super::tiered::select_where(&self.project, table, &[("is_reserved", json!(true))], None, None)
    }
}
