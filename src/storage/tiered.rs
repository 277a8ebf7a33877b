//! Generic row access driven by the schema registry.
//!
//! Reads come in tiers:
//! - Tier 2: `fetch_where` - equality/membership conditions with optional ordering and limit
//! - Tier 3: `fetch_by_ids` - rows by ID list (empty list = whole table, core catalog only)
//! - Tier 4: `fetch_raw` - a single caller-supplied boolean predicate
//!
//! Tier 1 (named lookups such as `get_task`) lives next to each entity.
//!
//! Generic writes (`insert`, `update`, `delete`) validate against the registry
//! and refuse tables whose lifecycle belongs to a specialized operation.

use super::integrity::{DeleteAudit, DeleteOutcome, DeleteRoute, delete_route};
use super::{Store, name_carries_id, now};
use crate::models::Row;
use crate::schema::{FieldDescriptor, FieldType, Table, available_fields_hint};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Operation that owns row creation for a table, if any.
pub fn creator_for(table: Table) -> Option<&'static str> {
    match table {
        Table::Project => Some("init_project"),
        Table::Files => Some("reserve_file"),
        Table::Functions => Some("reserve_function"),
        Table::Types => Some("reserve_type"),
        Table::Themes => Some("add_theme"),
        Table::Flows => Some("add_flow"),
        Table::CompletionPath => Some("add_completion_path"),
        Table::Milestones => Some("add_milestone"),
        Table::Tasks => Some("add_task"),
        Table::Subtasks => Some("add_subtask"),
        Table::Sidequests => Some("add_sidequest"),
        Table::Items => Some("add_item"),
        Table::Notes => Some("add_note"),
        _ => None,
    }
}

fn type_label(ty: FieldType) -> &'static str {
    match ty {
        FieldType::Integer => "an integer",
        FieldType::Real => "a number",
        FieldType::Text => "text",
        FieldType::Boolean => "a boolean",
        FieldType::Timestamp => "an RFC 3339 timestamp",
        FieldType::JsonArray => "a JSON array",
    }
}

/// Convert a JSON value into the stored representation of a field.
pub(crate) fn to_sql_value(table: Table, field: &FieldDescriptor, value: &Value) -> Result<SqlValue> {
    let mismatch = || {
        Error::InvalidArgument(format!(
            "Field '{}' on '{}' expects {}, got {}",
            field.name,
            table,
            type_label(field.ty),
            value
        ))
    };

    if value.is_null() {
        return if field.nullable {
            Ok(SqlValue::Null)
        } else {
            Err(Error::InvalidArgument(format!(
                "Field '{}' on '{}' cannot be null",
                field.name, table
            )))
        };
    }

    let converted = match field.ty {
        FieldType::Integer => value.as_i64().map(SqlValue::Integer).ok_or_else(mismatch)?,
        FieldType::Real => value.as_f64().map(SqlValue::Real).ok_or_else(mismatch)?,
        FieldType::Boolean => match value {
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(v @ (0 | 1)) => SqlValue::Integer(v),
                _ => return Err(mismatch()),
            },
            _ => return Err(mismatch()),
        },
        FieldType::Text => {
            let s = value.as_str().ok_or_else(mismatch)?;
            match field.allowed {
                Some(allowed) => {
                    let lower = s.to_lowercase();
                    if !allowed.contains(&lower.as_str()) {
                        return Err(Error::InvalidArgument(format!(
                            "Field '{}' on '{}' must be one of {}, got '{}'",
                            field.name,
                            table,
                            allowed.join("|"),
                            s
                        )));
                    }
                    SqlValue::Text(lower)
                }
                None => SqlValue::Text(s.to_string()),
            }
        }
        FieldType::Timestamp => {
            let s = value.as_str().ok_or_else(mismatch)?;
            let parsed = DateTime::parse_from_rfc3339(s).map_err(|_| mismatch())?;
            SqlValue::Text(
                parsed
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            )
        }
        FieldType::JsonArray => match value {
            Value::Array(_) => SqlValue::Text(value.to_string()),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(parsed @ Value::Array(_)) => SqlValue::Text(parsed.to_string()),
                _ => return Err(mismatch()),
            },
            _ => return Err(mismatch()),
        },
    };
    Ok(converted)
}

/// Convert a JSON scalar with no field context (raw predicate parameters,
/// JSON array members).
fn scalar_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Decode one result row. Columns arrive in registry order.
fn decode_row(table: Table, row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (i, field) in table.fields().iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) if field.ty == FieldType::Boolean => Value::Bool(n != 0),
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ValueRef::Text(bytes) => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                if field.ty == FieldType::JsonArray {
                    serde_json::from_str(&text).unwrap_or(Value::String(text))
                } else {
                    Value::String(text)
                }
            }
            ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        };
        out.insert(field.name.to_string(), value);
    }
    Ok(out)
}

/// Deserialize a decoded row into a model.
pub(crate) fn decode<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Unwrap a `json!` object literal into a row.
pub(crate) fn fields(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

pub(crate) fn row_id(row: &Row) -> i64 {
    row.get("id").and_then(Value::as_i64).unwrap_or_default()
}

/// Short human label for a row: its name, or its non-id integer columns.
pub(crate) fn row_label(row: &Row) -> String {
    if let Some(name) = row.get("name").and_then(Value::as_str) {
        return name.to_string();
    }
    if let Some(content) = row.get("content").and_then(Value::as_str) {
        return content.chars().take(60).collect();
    }
    row.iter()
        .filter(|(k, v)| k.as_str() != "id" && v.is_i64())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn order_clause(table: Table, order_by: Option<&str>) -> Result<String> {
    let Some(order) = order_by.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok("id ASC".to_string());
    };

    let mut terms = Vec::new();
    let mut has_id = false;
    for term in order.split(',') {
        let mut words = term.split_whitespace();
        let name = words.next().ok_or_else(|| {
            Error::InvalidArgument(format!("Empty term in order_by '{}'", order))
        })?;
        let field = table.field(name)?;
        let direction = match words.next() {
            None => "ASC",
            Some(d) if d.eq_ignore_ascii_case("asc") => "ASC",
            Some(d) if d.eq_ignore_ascii_case("desc") => "DESC",
            Some(d) => {
                return Err(Error::InvalidArgument(format!(
                    "Sort direction must be ASC or DESC, got '{}'",
                    d
                )));
            }
        };
        if words.next().is_some() {
            return Err(Error::InvalidArgument(format!(
                "order_by terms look like 'field [ASC|DESC]', got '{}'",
                term.trim()
            )));
        }
        has_id |= field.primary;
        terms.push(format!("{} {}", field.name, direction));
    }
    if !has_id {
        terms.push("id ASC".to_string());
    }
    Ok(terms.join(", "))
}

fn run_select(
    conn: &Connection,
    table: Table,
    where_sql: Option<&str>,
    params: &[SqlValue],
    tail: &str,
) -> Result<Vec<Row>> {
    let mut sql = format!("SELECT {} FROM {}", table.column_list(), table.name());
    if let Some(clause) = where_sql {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    sql.push(' ');
    sql.push_str(tail);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| decode_row(table, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Tier 2 engine: AND-ed conditions.
///
/// `null` matches `IS NULL`; an array matches any of its values. On a JSON
/// array column a scalar tests membership.
pub(crate) fn select_where(
    conn: &Connection,
    table: Table,
    conditions: &[(&str, Value)],
    order_by: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<Row>> {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for (name, value) in conditions {
        let field = table.field(name)?;
        match value {
            Value::Null => clauses.push(format!("{} IS NULL", field.name)),
            _ if field.ty == FieldType::JsonArray => {
                if value.is_array() || value.is_object() {
                    return Err(Error::InvalidArgument(format!(
                        "Field '{}' on '{}' holds a JSON array; filter with a single value to test membership",
                        field.name, table
                    )));
                }
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM json_each({t}.{f}) WHERE json_each.value = ?)",
                    t = table.name(),
                    f = field.name
                ));
                params.push(scalar_to_sql(value));
            }
            Value::Array(values) => {
                if values.is_empty() {
                    clauses.push("0".to_string());
                    continue;
                }
                let mut placeholders = Vec::with_capacity(values.len());
                for v in values {
                    params.push(to_sql_value(table, field, v)?);
                    placeholders.push("?");
                }
                clauses.push(format!("{} IN ({})", field.name, placeholders.join(", ")));
            }
            _ => {
                params.push(to_sql_value(table, field, value)?);
                clauses.push(format!("{} = ?", field.name));
            }
        }
    }

    let mut tail = format!("ORDER BY {}", order_clause(table, order_by)?);
    if let Some(n) = limit {
        tail.push_str(&format!(" LIMIT {}", n));
    }
    let where_sql = (!clauses.is_empty()).then(|| clauses.join(" AND "));
    run_select(conn, table, where_sql.as_deref(), &params, &tail)
}

/// Fetch a row by ID.
pub(crate) fn fetch_row(conn: &Connection, table: Table, id: i64) -> Result<Option<Row>> {
    Ok(select_where(conn, table, &[("id", Value::from(id))], None, Some(1))?
        .into_iter()
        .next())
}

/// Fetch a row by ID, failing with `NotFound`.
pub(crate) fn require_row(conn: &Connection, table: Table, id: i64) -> Result<Row> {
    fetch_row(conn, table, id)?
        .ok_or_else(|| Error::NotFound(format!("{} {} not found", table, id)))
}

/// Fetch and decode a row by ID.
pub(crate) fn get_typed<T: DeserializeOwned>(conn: &Connection, table: Table, id: i64) -> Result<T> {
    decode(require_row(conn, table, id)?)
}

/// Tier 2 with typed output.
pub(crate) fn select_typed<T: DeserializeOwned>(
    conn: &Connection,
    table: Table,
    conditions: &[(&str, Value)],
    order_by: Option<&str>,
) -> Result<Vec<T>> {
    select_where(conn, table, conditions, order_by, None)?
        .into_iter()
        .map(decode)
        .collect()
}

pub(crate) fn ensure_exists(conn: &Connection, table: Table, id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table.name()),
        [id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(Error::NotFound(format!("{} {} not found", table, id)))
    }
}

/// Map constraint failures to a caller-facing error.
pub(crate) fn constraint_error(table: Table, err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(code, msg)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::InvalidState(format!(
                "Constraint violated on '{}': {}",
                table,
                msg.clone().unwrap_or_else(|| code.to_string())
            ))
        }
        _ => Error::Database(err),
    }
}

fn check_references(conn: &Connection, table: Table, fields: &Row) -> Result<()> {
    for field in table.fields() {
        let (Some((target, column)), Some(value)) = (field.references, fields.get(field.name))
        else {
            continue;
        };
        let Some(id) = value.as_i64() else {
            continue;
        };
        let exists: bool = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
                target.name(),
                column
            ),
            [id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::NotFound(format!(
                "{}.{} references {} {}, which does not exist",
                table, field.name, target, id
            )));
        }
    }
    Ok(())
}

/// Validate and insert a row, filling omitted timestamps.
pub(crate) fn insert_row(conn: &Connection, table: Table, fields: &Row) -> Result<i64> {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (name, value) in fields {
        let field = table.field(name)?;
        if field.primary {
            return Err(Error::InvalidArgument(format!(
                "Row ids on '{}' are assigned by the store",
                table
            )));
        }
        values.push(to_sql_value(table, field, value)?);
        columns.push(field.name);
    }

    let missing: Vec<&str> = table
        .fields()
        .iter()
        .filter(|f| f.is_required() && !fields.contains_key(f.name))
        .map(|f| f.name)
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "Missing required field(s) {} for '{}'. {}",
            missing.join(", "),
            table,
            available_fields_hint(table)
        )));
    }

    let stamp = now();
    for field in table.fields() {
        if field.ty == FieldType::Timestamp && !fields.contains_key(field.name) {
            columns.push(field.name);
            values.push(SqlValue::Text(stamp.clone()));
        }
    }

    check_references(conn, table, fields)?;

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name(),
        columns.join(", "),
        vec!["?"; columns.len()].join(", ")
    );
    conn.execute(&sql, params_from_iter(values.iter()))
        .map_err(|e| constraint_error(table, e))?;
    Ok(conn.last_insert_rowid())
}

/// Validate and apply a partial update, bumping `updated_at`.
pub(crate) fn update_row(conn: &Connection, table: Table, id: i64, fields: &Row) -> Result<()> {
    if fields.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "No fields to update on '{}'. {}",
            table,
            available_fields_hint(table)
        )));
    }

    let mut sets = Vec::new();
    let mut values = Vec::new();
    for (name, value) in fields {
        let field = table.field(name)?;
        if field.primary {
            return Err(Error::forbidden("row ids are immutable", None));
        }
        values.push(to_sql_value(table, field, value)?);
        sets.push(format!("{} = ?", field.name));
    }
    if table.has_field("updated_at") && !fields.contains_key("updated_at") {
        sets.push("updated_at = ?".to_string());
        values.push(SqlValue::Text(now()));
    }

    check_references(conn, table, fields)?;

    values.push(SqlValue::Integer(id));
    let sql = format!("UPDATE {} SET {} WHERE id = ?", table.name(), sets.join(", "));
    let changed = conn
        .execute(&sql, params_from_iter(values.iter()))
        .map_err(|e| constraint_error(table, e))?;
    if changed == 0 {
        return Err(Error::NotFound(format!("{} {} not found", table, id)));
    }
    Ok(())
}

/// Columns placing a row under its parent. The creating operation validates
/// them, so they never change afterwards.
fn parent_links(table: Table) -> &'static [&'static str] {
    match table {
        Table::Milestones => &["completion_path_id"],
        Table::Tasks => &["milestone_id"],
        Table::Subtasks => &["parent_task_id"],
        Table::Sidequests => &["paused_task_id", "paused_subtask_id"],
        Table::Functions | Table::Types => &["file_id"],
        _ => &[],
    }
}

/// Refuse generic updates that would bypass a specialized protocol.
fn guard_update(table: Table, existing: &Row, fields: &Row, artifact_root: &Path) -> Result<()> {
    let id = row_id(existing);
    let touches = |name: &str| fields.contains_key(name);

    if let Some(field) = parent_links(table).iter().copied().find(|field| touches(*field)) {
        return Err(Error::forbidden(
            format!("'{}.{}' is fixed when the row is created", table, field),
            creator_for(table),
        ));
    }

    match table {
        Table::Notes => {
            return Err(Error::forbidden(
                "notes are append-only; record a new note instead",
                Some("add_note"),
            ));
        }
        Table::Items => {
            let status = existing.get("status").and_then(Value::as_str).unwrap_or_default();
            if status != "pending" {
                return Err(Error::InvalidState(format!(
                    "item {} is {}; in-progress and completed items are immutable",
                    id, status
                )));
            }
            if touches("status") {
                return Err(Error::forbidden(
                    "item status only moves forward",
                    Some("update_item_status"),
                ));
            }
            if touches("reference_table") || touches("reference_id") {
                return Err(Error::forbidden("items cannot change owner", None));
            }
        }
        Table::Files | Table::Functions | Table::Types => {
            let finalize = match table {
                Table::Files => "finalize_file",
                Table::Functions => "finalize_function",
                _ => "finalize_type",
            };
            if touches("is_reserved") {
                return Err(Error::forbidden(
                    "reservation state changes only through finalize",
                    Some(finalize),
                ));
            }
            if existing.get("is_reserved").and_then(Value::as_bool) == Some(true) {
                return Err(Error::InvalidState(format!(
                    "{} {} is still reserved; finalize it before editing",
                    table, id
                )));
            }
            if let Some(name) = fields.get("name") {
                let name = name.as_str().unwrap_or_default();
                if !name_carries_id(name, id, table == Table::Files) {
                    return Err(Error::InvalidArgument(format!(
                        "'{}' must keep the ID token of {} {} (e.g. name-ID_{})",
                        name, table, id, id
                    )));
                }
            }
            if let Some(path) = fields.get("path").and_then(Value::as_str) {
                if !artifact_root.join(path).exists() {
                    return Err(Error::PreconditionFailed(format!(
                        "no artifact at {}",
                        artifact_root.join(path).display()
                    )));
                }
            }
        }
        Table::CompletionPath if touches("order_index") => {
            return Err(Error::forbidden(
                "stage order is kept dense by the ordering operations",
                Some("reorder_completion_path"),
            ));
        }
        Table::Tasks | Table::Sidequests if touches("flow_ids") => {
            return Err(Error::forbidden(
                "flow links are validated when set",
                Some("set_flows"),
            ));
        }
        Table::Project => {
            if touches("version") {
                return Err(Error::forbidden(
                    "the project version moves with evolution events",
                    Some("record_evolution"),
                ));
            }
            if touches("last_known_git_hash") || touches("last_git_sync") {
                return Err(Error::forbidden(
                    "VCS state is recorded by synchronization",
                    Some("sync_with_vcs"),
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

impl Store {
    fn writable_table(&self, table: Table) -> Result<()> {
        if table.database().is_read_only() {
            return Err(Error::forbidden(
                format!("'{}' belongs to the read-only core database", table),
                Some("import_directives"),
            ));
        }
        Ok(())
    }

    /// Tier 2: rows matching every condition.
    pub fn fetch_where(
        &self,
        table: Table,
        conditions: &Row,
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let conditions: Vec<(&str, Value)> = conditions
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        select_where(self.conn(table.database())?, table, &conditions, order_by, limit)
    }

    /// Tier 3: rows by ID, ordered by ID.
    ///
    /// An empty list returns the whole table for the read-only catalog and is
    /// refused on mutable databases.
    pub fn fetch_by_ids(&self, table: Table, ids: &[i64]) -> Result<Vec<Row>> {
        let conn = self.conn(table.database())?;
        if ids.is_empty() {
            if table.database().is_read_only() {
                return select_where(conn, table, &[], None, None);
            }
            return Err(Error::InvalidArgument(format!(
                "An empty ID list on mutable table '{}' would return everything; pass IDs, or use fetch_where or fetch_raw",
                table
            )));
        }
        let ids = Value::Array(ids.iter().map(|id| Value::from(*id)).collect());
        select_where(conn, table, &[("id", ids)], None, None)
    }

    /// Tier 4: rows matching a raw boolean predicate with positional `?` parameters.
    pub fn fetch_raw(&self, table: Table, predicate: &str, params: &[Value]) -> Result<Vec<Row>> {
        let predicate = predicate.trim();
        if predicate.is_empty() {
            return Err(Error::InvalidArgument("Predicate is empty".to_string()));
        }
        if predicate.contains(';') {
            return Err(Error::InvalidArgument(
                "Predicate must be a single boolean expression".to_string(),
            ));
        }

        let conn = self.conn(table.database())?;
        let sql = format!(
            "SELECT {} FROM {} WHERE ({}) ORDER BY id ASC",
            table.column_list(),
            table.name(),
            predicate
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| {
            Error::InvalidArgument(format!("Malformed predicate for '{}': {}", table, e))
        })?;
        if !stmt.readonly() {
            return Err(Error::InvalidArgument(
                "Predicate must not modify data".to_string(),
            ));
        }
        let params: Vec<SqlValue> = params.iter().map(scalar_to_sql).collect();
        debug!(table = %table, predicate, "raw fetch");
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| decode_row(table, row))
            .map_err(|e| Error::InvalidArgument(format!("Predicate failed on '{}': {}", table, e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Insert into a table without a specialized creator.
    pub fn insert(&mut self, table: Table, fields: &Row) -> Result<Row> {
        self.writable_table(table)?;
        if let Some(op) = creator_for(table) {
            return Err(Error::forbidden(
                format!("'{}' rows are created through {}", table, op),
                Some(op),
            ));
        }

        let tx = self.conn_mut(table.database())?.transaction()?;
        let id = insert_row(&tx, table, fields)?;
        let row = require_row(&tx, table, id)?;
        tx.commit()?;

        info!(table = %table, id, "inserted row");
        Ok(row)
    }

    /// Partial update of one row, within the guard rails of each table.
    pub fn update(&mut self, table: Table, id: i64, fields: &Row) -> Result<Row> {
        self.writable_table(table)?;
        let artifact_root = self.artifact_root.clone();

        let tx = self.conn_mut(table.database())?.transaction()?;
        let existing = require_row(&tx, table, id)?;
        guard_update(table, &existing, fields, &artifact_root)?;
        update_row(&tx, table, id, fields)?;
        let row = require_row(&tx, table, id)?;
        tx.commit()?;

        info!(table = %table, id, fields = fields.len(), "updated row");
        Ok(row)
    }

    /// Delete one row of a table without a specialized delete operation.
    /// Rows that are still referenced answer `BlockingReferences`.
    ///
    /// Protected tables answer `Forbidden` naming their validated delete;
    /// the project row and notes are never deleted.
    pub fn delete(&mut self, table: Table, id: i64, audit: &DeleteAudit) -> Result<DeleteOutcome> {
        self.writable_table(table)?;
        match delete_route(table) {
            DeleteRoute::Protected(op) => Err(Error::forbidden(
                format!(
                    "'{}' rows may have dependents; deletion goes through {}",
                    table, op
                ),
                Some(op),
            )),
            DeleteRoute::Restricted(reason) => Err(Error::forbidden(reason, None)),
            DeleteRoute::Simple => self.delete_simple(table, id, audit),
        }
    }
}
