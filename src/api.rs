//! String-keyed call boundary.
//!
//! `call(store, op, args)` dispatches an operation name and a JSON argument
//! object to the store and always answers with a `Response`: either
//! `{"success": true, "result": ...}` or
//! `{"success": false, "error": {"kind", "message", "use_instead"?, "report"?}}`.
//! Nothing crosses this boundary as a panic or an `Err`.

use crate::models::{
    InteractionType, ItemOwner, ItemStatus, NoteSource, PathStatus, Priority, TypeFunctionRole,
    WorkKind, WorkStatus,
};
use crate::schema::Database::{Core, Project};
use crate::schema::{self, Database, Table};
use crate::storage::context::ContextOptions;
use crate::storage::hierarchy::{NewSidequest, NewTask};
use crate::storage::integrity::DeleteAudit;
use crate::storage::notes::{NewNote, NoteFilter};
use crate::storage::reservation::{
    FileFinalization, FileReservation, FunctionFinalization, FunctionReservation,
    TypeFinalization, TypeReservation,
};
use crate::storage::Store;
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// One operation exposed at the boundary.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OperationDef {
    pub name: &'static str,
    /// Database the operation reads or writes
    pub database: Database,
    pub description: &'static str,
}

const fn def(name: &'static str, database: Database, description: &'static str) -> OperationDef {
    OperationDef {
        name,
        database,
        description,
    }
}

const OPERATIONS: &[OperationDef] = &[
    // generic tiers
    def("fetch_where", Project, "Rows matching AND-ed field conditions"),
    def("fetch_by_ids", Project, "Rows by ID; an empty list is only allowed on the core catalog"),
    def("fetch_raw", Project, "Rows matching a read-only boolean predicate with ? parameters"),
    def("insert", Project, "Insert into a table that has no specialized creator"),
    def("update", Project, "Partial update within each table's guard rails"),
    def("delete", Project, "Delete from a table with no dependents to check"),
    def("check_delete", Project, "Report what blocks deleting a row, without deleting"),
    def("describe_table", Core, "Field descriptors of a table"),
    def("list_tables", Core, "Tables of a database"),
    // project
    def("init_project", Project, "Create the project record"),
    def("get_project", Project, "Read the project record"),
    def("update_project", Project, "Change project name, purpose, goals or status"),
    def("record_evolution", Project, "Bump the project version with a reason"),
    def("record_vcs_state", Project, "Store the last known commit hash"),
    // reservation
    def("reserve_file", Project, "Reserve a file ID before the file exists"),
    def("finalize_file", Project, "Give a reserved file its ID-carrying name"),
    def("reserve_function", Project, "Reserve a function ID"),
    def("finalize_function", Project, "Give a reserved function its ID-carrying name"),
    def("reserve_type", Project, "Reserve a type ID"),
    def("finalize_type", Project, "Give a reserved type its ID-carrying name"),
    def("reserve_files", Project, "Reserve several files, each independently"),
    def("finalize_files", Project, "Finalize several files, each independently"),
    def("reserve_functions", Project, "Reserve several functions, each independently"),
    def("finalize_functions", Project, "Finalize several functions, each independently"),
    def("reserve_types", Project, "Reserve several types, each independently"),
    def("finalize_types", Project, "Finalize several types, each independently"),
    def("get_reserved", Project, "Rows of a table still waiting for finalization"),
    // organization and work breakdown
    def("add_theme", Project, "Create a theme"),
    def("add_flow", Project, "Create a flow"),
    def("link_flow_theme", Project, "Tag a flow with a theme"),
    def("link_file_flow", Project, "Attach a file to a flow"),
    def("add_type_function", Project, "Record a function's role for a type"),
    def("add_interaction", Project, "Record a call edge between functions"),
    def("add_completion_path", Project, "Append or insert a completion path stage"),
    def("add_milestone", Project, "Create a milestone under a stage"),
    def("add_task", Project, "Create a task under a milestone"),
    def("add_subtask", Project, "Create a subtask under a task"),
    def("add_sidequest", Project, "Create a sidequest pausing a task"),
    def("add_item", Project, "Create a pending item"),
    def("set_flows", Project, "Replace the flows of a task or sidequest"),
    def("update_status", Project, "Set the status of a stage, milestone, task, subtask or sidequest"),
    def("update_item_status", Project, "Move an item forward"),
    // ordering
    def("get_completion_paths", Project, "Stages in order"),
    def("current_completion_path", Project, "First stage that is not completed"),
    def("reorder_completion_path", Project, "Move a stage to a free index"),
    def("swap_completion_paths", Project, "Swap the positions of two stages"),
    def("repair_completion_paths", Project, "Renumber stages densely from 1"),
    // validated deletes
    def("delete_file", Project, "Delete a file with no dependents"),
    def("delete_function", Project, "Delete a function with no dependents"),
    def("delete_type", Project, "Delete a type with no dependents"),
    def("delete_theme", Project, "Delete a theme with no dependents"),
    def("delete_flow", Project, "Delete a flow no task or file refers to"),
    def("delete_completion_path", Project, "Delete an empty stage and renumber"),
    def("delete_milestone", Project, "Delete a milestone with no tasks"),
    def("delete_task", Project, "Delete a task with no live work under it"),
    def("delete_subtask", Project, "Delete a subtask with no live work under it"),
    def("delete_sidequest", Project, "Delete a sidequest with no live work under it"),
    def("delete_item", Project, "Delete a pending item"),
    // notes and context
    def("add_note", Project, "Append a note"),
    def("get_notes", Project, "Notes matching a filter, newest first"),
    def("search_notes", Project, "Notes containing text"),
    def("get_work_context", Project, "Everything relevant to a unit of work"),
    // lookups
    def("get_file", Project, "File by ID"),
    def("get_file_by_path", Project, "File by path"),
    def("get_function", Project, "Function by ID"),
    def("get_type", Project, "Type by ID"),
    def("get_functions_for_file", Project, "Functions of a file"),
    def("get_types_for_file", Project, "Types of a file"),
    def("get_flows", Project, "All flows"),
    def("get_themes", Project, "All themes"),
    def("get_milestone", Project, "Milestone by ID"),
    def("get_milestones_for_path", Project, "Milestones of a stage"),
    def("get_task", Project, "Task by ID"),
    def("get_tasks_for_milestone", Project, "Tasks of a milestone"),
    def("get_incomplete_tasks", Project, "Tasks not yet completed, by priority"),
    def("get_subtask", Project, "Subtask by ID"),
    def("get_sidequest", Project, "Sidequest by ID"),
    def("get_item", Project, "Item by ID"),
    def("get_items_for", Project, "Items of a task, subtask or sidequest"),
    def("get_directive", Core, "Directive by name"),
    def("get_directive_categories", Core, "Categories of a directive"),
    def("get_helpers", Core, "The operation index"),
];

/// Every operation `call` understands.
pub fn operations() -> &'static [OperationDef] {
    OPERATIONS
}

/// Outcome of one boundary call.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub success: bool,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Response {
    fn ok(result: Value) -> Self {
        let mut body = Map::new();
        body.insert("result".to_string(), result);
        Self {
            success: true,
            body,
        }
    }

    fn failure(err: &Error) -> Self {
        let mut error = Map::new();
        error.insert("kind".to_string(), json!(err.kind()));
        error.insert("message".to_string(), json!(err.to_string()));
        match err {
            Error::Forbidden {
                use_instead: Some(op),
                ..
            } => {
                error.insert("use_instead".to_string(), json!(op));
            }
            Error::BlockingReferences(report) => {
                error.insert(
                    "report".to_string(),
                    serde_json::to_value(report).unwrap_or(Value::Null),
                );
            }
            _ => {}
        }
        let mut body = Map::new();
        body.insert("error".to_string(), Value::Object(error));
        Self {
            success: false,
            body,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        self.body.get("result")
    }

    pub fn error(&self) -> Option<&Value> {
        self.body.get("error")
    }

    /// Error kind tag, e.g. `"blocking_references"`.
    pub fn error_kind(&self) -> Option<&str> {
        self.error()?.get("kind")?.as_str()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"success":false}"#.to_string())
    }
}

/// Run one operation.
pub fn call(store: &mut Store, op: &str, args: &Value) -> Response {
    debug!(op, "api call");
    match dispatch(store, op, args) {
        Ok(result) => Response::ok(result),
        Err(err) => {
            warn!(op, kind = ?err.kind(), error = %err, "api call failed");
            Response::failure(&err)
        }
    }
}

fn arg<'a>(args: &'a Value, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|v| !v.is_null())
}

fn missing(key: &str) -> Error {
    Error::InvalidArgument(format!("missing argument '{}'", key))
}

fn req_i64(args: &Value, key: &str) -> Result<i64> {
    let value = arg(args, key).ok_or_else(|| missing(key))?;
    value
        .as_i64()
        .ok_or_else(|| Error::InvalidArgument(format!("argument '{}' must be an integer", key)))
}

fn opt_i64(args: &Value, key: &str) -> Result<Option<i64>> {
    match arg(args, key) {
        None => Ok(None),
        Some(_) => req_i64(args, key).map(Some),
    }
}

fn req_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    let value = arg(args, key).ok_or_else(|| missing(key))?;
    value
        .as_str()
        .ok_or_else(|| Error::InvalidArgument(format!("argument '{}' must be a string", key)))
}

fn opt_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>> {
    match arg(args, key) {
        None => Ok(None),
        Some(_) => req_str(args, key).map(Some),
    }
}

fn req_object(args: &Value, key: &str) -> Result<Map<String, Value>> {
    match arg(args, key) {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(Error::InvalidArgument(format!(
            "argument '{}' must be an object",
            key
        ))),
        None => Err(missing(key)),
    }
}

/// Deserialize a value into an argument struct.
fn parse<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| Error::InvalidArgument(format!("invalid {}: {}", what, e)))
}

fn parse_arg<T: DeserializeOwned>(args: &Value, key: &str) -> Result<T> {
    parse(arg(args, key).ok_or_else(|| missing(key))?, key)
}

/// Resolve `table`, scoped by `database` when given.
fn table_arg(args: &Value) -> Result<Table> {
    let name = req_str(args, "table")?;
    match opt_str(args, "database")? {
        Some(db) => Table::parse(Database::parse(db)?, name),
        None => Table::parse_any(name),
    }
}

/// Batch finalize entries: each an object with `id` plus the finalization fields.
fn finalize_entries<F: DeserializeOwned>(args: &Value) -> Result<Vec<(i64, F)>> {
    let entries = arg(args, "entries")
        .and_then(Value::as_array)
        .ok_or_else(|| missing("entries"))?;
    entries
        .iter()
        .map(|entry| Ok((req_i64(entry, "id")?, parse(entry, "entry")?)))
        .collect()
}

fn audit(args: &Value) -> Result<DeleteAudit> {
    parse(args, "delete audit")
}

fn to<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn dispatch(store: &mut Store, op: &str, args: &Value) -> Result<Value> {
    let no_args = Value::Object(Map::new());
    let args = if args.is_null() { &no_args } else { args };

    match op {
        "fetch_where" => {
            let conditions = match arg(args, "conditions") {
                Some(_) => req_object(args, "conditions")?,
                None => Map::new(),
            };
            let limit = opt_i64(args, "limit")?.map(|n| n.max(0) as usize);
            to(store.fetch_where(table_arg(args)?, &conditions, opt_str(args, "order_by")?, limit)?)
        }
        "fetch_by_ids" => {
            let ids: Vec<i64> = parse_arg(args, "ids")?;
            to(store.fetch_by_ids(table_arg(args)?, &ids)?)
        }
        "fetch_raw" => {
            let params: Vec<Value> = match arg(args, "params") {
                Some(_) => parse_arg(args, "params")?,
                None => Vec::new(),
            };
            to(store.fetch_raw(table_arg(args)?, req_str(args, "predicate")?, &params)?)
        }
        "insert" => to(store.insert(table_arg(args)?, &req_object(args, "fields")?)?),
        "update" => to(store.update(
            table_arg(args)?,
            req_i64(args, "id")?,
            &req_object(args, "fields")?,
        )?),
        "delete" => to(store.delete(table_arg(args)?, req_i64(args, "id")?, &audit(args)?)?),
        "check_delete" => to(store.check_delete(table_arg(args)?, req_i64(args, "id")?)?),
        "describe_table" => {
            let table = table_arg(args)?;
            to(json!({
                "table": table,
                "database": table.database(),
                "fields": schema::fields(table),
                "required": schema::required_fields(table),
                "hint": schema::available_fields_hint(table),
            }))
        }
        "list_tables" => {
            let db = Database::parse(req_str(args, "database")?)?;
            to(db.tables().iter().map(|t| t.name()).collect::<Vec<_>>())
        }

        "init_project" => {
            let goals: Vec<String> = match arg(args, "goals") {
                Some(_) => parse_arg(args, "goals")?,
                None => Vec::new(),
            };
            to(store.init_project(req_str(args, "name")?, opt_str(args, "purpose")?, &goals)?)
        }
        "get_project" => to(store.get_project()?),
        "update_project" => to(store.update_project(&req_object(args, "fields")?)?),
        "record_evolution" => {
            let source = match opt_str(args, "source")? {
                Some(s) => NoteSource::parse(s)?,
                None => NoteSource::default(),
            };
            to(store.record_evolution(req_str(args, "reason")?, source)?)
        }
        "record_vcs_state" => {
            to(store.record_vcs_state(req_str(args, "hash")?, opt_str(args, "synced_at")?)?)
        }

        "reserve_file" => to(json!({"id": store.reserve_file(&parse::<FileReservation>(args, "file reservation")?)?})),
        "finalize_file" => to(store.finalize_file(
            req_i64(args, "id")?,
            &parse::<FileFinalization>(args, "file finalization")?,
        )?),
        "reserve_function" => to(json!({
            "id": store.reserve_function(&parse::<FunctionReservation>(args, "function reservation")?)?
        })),
        "finalize_function" => to(store.finalize_function(
            req_i64(args, "id")?,
            &parse::<FunctionFinalization>(args, "function finalization")?,
        )?),
        "reserve_type" => to(json!({"id": store.reserve_type(&parse::<TypeReservation>(args, "type reservation")?)?})),
        "finalize_type" => to(store.finalize_type(
            req_i64(args, "id")?,
            &parse::<TypeFinalization>(args, "type finalization")?,
        )?),
        "reserve_files" => to(store.reserve_files(&parse_arg::<Vec<FileReservation>>(args, "entries")?)?),
        "finalize_files" => to(store.finalize_files(&finalize_entries::<FileFinalization>(args)?)?),
        "reserve_functions" => {
            to(store.reserve_functions(&parse_arg::<Vec<FunctionReservation>>(args, "entries")?)?)
        }
        "finalize_functions" => {
            to(store.finalize_functions(&finalize_entries::<FunctionFinalization>(args)?)?)
        }
        "reserve_types" => to(store.reserve_types(&parse_arg::<Vec<TypeReservation>>(args, "entries")?)?),
        "finalize_types" => to(store.finalize_types(&finalize_entries::<TypeFinalization>(args)?)?),
        "get_reserved" => to(store.get_reserved(table_arg(args)?)?),

        "add_theme" => to(store.add_theme(req_str(args, "name")?, opt_str(args, "description")?)?),
        "add_flow" => to(store.add_flow(req_str(args, "name")?, opt_str(args, "description")?)?),
        "link_flow_theme" => to(json!({
            "id": store.link_flow_theme(req_i64(args, "flow_id")?, req_i64(args, "theme_id")?)?
        })),
        "link_file_flow" => to(json!({
            "id": store.link_file_flow(req_i64(args, "file_id")?, req_i64(args, "flow_id")?)?
        })),
        "add_type_function" => {
            let role = match opt_str(args, "role")? {
                Some(r) => TypeFunctionRole::parse(r)?,
                None => TypeFunctionRole::default(),
            };
            to(store.add_type_function(req_i64(args, "type_id")?, req_i64(args, "function_id")?, role)?)
        }
        "add_interaction" => {
            let kind = match opt_str(args, "interaction_type")? {
                Some(k) => InteractionType::parse(k)?,
                None => InteractionType::default(),
            };
            to(store.add_interaction(
                req_i64(args, "source_function_id")?,
                req_i64(args, "target_function_id")?,
                kind,
                opt_str(args, "description")?,
            )?)
        }
        "add_completion_path" => to(store.add_completion_path(
            req_str(args, "name")?,
            opt_str(args, "description")?,
            opt_i64(args, "position")?,
        )?),
        "add_milestone" => to(store.add_milestone(
            req_i64(args, "completion_path_id")?,
            req_str(args, "name")?,
            opt_str(args, "description")?,
        )?),
        "add_task" => to(store.add_task(parse::<NewTask>(args, "task")?)?),
        "add_subtask" => {
            let priority = match opt_str(args, "priority")? {
                Some(p) => Priority::parse(p)?,
                None => Priority::default(),
            };
            to(store.add_subtask(
                req_i64(args, "parent_task_id")?,
                req_str(args, "name")?,
                opt_str(args, "description")?,
                priority,
            )?)
        }
        "add_sidequest" => to(store.add_sidequest(parse::<NewSidequest>(args, "sidequest")?)?),
        "add_item" => to(store.add_item(
            parse_arg::<ItemOwner>(args, "owner")?,
            req_str(args, "name")?,
            opt_str(args, "description")?,
        )?),
        "set_flows" => {
            let flow_ids: Vec<i64> = parse_arg(args, "flow_ids")?;
            to(store.set_flows(WorkKind::parse(req_str(args, "kind")?)?, req_i64(args, "id")?, &flow_ids)?)
        }
        "update_status" => {
            let table = table_arg(args)?;
            let id = req_i64(args, "id")?;
            let status = req_str(args, "status")?;
            if table == Table::CompletionPath {
                to(store.set_completion_path_status(id, PathStatus::parse(status)?)?)
            } else {
                store.set_work_status(table, id, WorkStatus::parse(status)?)?;
                to(json!({"table": table, "id": id, "status": status.to_lowercase()}))
            }
        }
        "update_item_status" => to(store.update_item_status(
            req_i64(args, "id")?,
            ItemStatus::parse(req_str(args, "status")?)?,
        )?),

        "get_completion_paths" => to(store.get_completion_paths()?),
        "current_completion_path" => to(store.current_completion_path()?),
        "reorder_completion_path" => to(store.reorder_completion_path(
            req_i64(args, "id")?,
            req_i64(args, "new_index")?,
        )?),
        "swap_completion_paths" => {
            to(store.swap_completion_paths(req_i64(args, "a")?, req_i64(args, "b")?)?)
        }
        "repair_completion_paths" => to(store.repair_completion_paths()?),

        "delete_file" => to(store.delete_file(req_i64(args, "id")?, &audit(args)?)?),
        "delete_function" => to(store.delete_function(req_i64(args, "id")?, &audit(args)?)?),
        "delete_type" => to(store.delete_type(req_i64(args, "id")?, &audit(args)?)?),
        "delete_theme" => to(store.delete_theme(req_i64(args, "id")?, &audit(args)?)?),
        "delete_flow" => to(store.delete_flow(req_i64(args, "id")?, &audit(args)?)?),
        "delete_completion_path" => {
            to(store.delete_completion_path(req_i64(args, "id")?, &audit(args)?)?)
        }
        "delete_milestone" => to(store.delete_milestone(req_i64(args, "id")?, &audit(args)?)?),
        "delete_task" => to(store.delete_task(req_i64(args, "id")?, &audit(args)?)?),
        "delete_subtask" => to(store.delete_subtask(req_i64(args, "id")?, &audit(args)?)?),
        "delete_sidequest" => to(store.delete_sidequest(req_i64(args, "id")?, &audit(args)?)?),
        "delete_item" => to(store.delete_item(req_i64(args, "id")?, &audit(args)?)?),

        "add_note" => to(store.add_note(parse::<NewNote>(args, "note")?)?),
        "get_notes" => to(store.get_notes(&parse::<NoteFilter>(args, "note filter")?)?),
        "search_notes" => {
            let limit = opt_i64(args, "limit")?.map(|n| n.max(0) as usize);
            to(store.search_notes(req_str(args, "text")?, limit)?)
        }
        "get_work_context" => to(store.get_work_context(
            WorkKind::parse(req_str(args, "kind")?)?,
            req_i64(args, "id")?,
            parse::<ContextOptions>(args, "context options")?,
        )?),

        "get_file" => to(store.get_file(req_i64(args, "id")?)?),
        "get_file_by_path" => to(store.get_file_by_path(req_str(args, "path")?)?),
        "get_function" => to(store.get_function(req_i64(args, "id")?)?),
        "get_type" => to(store.get_type(req_i64(args, "id")?)?),
        "get_functions_for_file" => to(store.get_functions_for_file(req_i64(args, "file_id")?)?),
        "get_types_for_file" => to(store.get_types_for_file(req_i64(args, "file_id")?)?),
        "get_flows" => to(store.get_flows()?),
        "get_themes" => to(store.get_themes()?),
        "get_milestone" => to(store.get_milestone(req_i64(args, "id")?)?),
        "get_milestones_for_path" => {
            to(store.get_milestones_for_path(req_i64(args, "completion_path_id")?)?)
        }
        "get_task" => to(store.get_task(req_i64(args, "id")?)?),
        "get_tasks_for_milestone" => to(store.get_tasks_for_milestone(req_i64(args, "milestone_id")?)?),
        "get_incomplete_tasks" => to(store.get_incomplete_tasks()?),
        "get_subtask" => to(store.get_subtask(req_i64(args, "id")?)?),
        "get_sidequest" => to(store.get_sidequest(req_i64(args, "id")?)?),
        "get_item" => to(store.get_item(req_i64(args, "id")?)?),
        "get_items_for" => to(store.get_items_for(parse_arg::<ItemOwner>(args, "owner")?)?),
        "get_directive" => to(store.get_directive(req_str(args, "name")?)?),
        "get_directive_categories" => to(store.get_directive_categories(req_str(args, "name")?)?),
        "get_helpers" => {
            let db = opt_str(args, "database")?.map(Database::parse).transpose()?;
            to(store.get_helpers(db)?)
        }

        other => Err(Error::NotFound(format!(
            "unknown operation '{}'; see api::operations()",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;
    use std::collections::HashSet;

    #[test]
    fn test_operation_names_unique() {
        let names: HashSet<&str> = operations().iter().map(|o| o.name).collect();
        assert_eq!(names.len(), operations().len());
    }

    #[test]
    fn test_every_operation_is_dispatched() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        for op in operations() {
            let response = call(&mut store, op.name, &json!({}));
            if let Some(message) = response.error().and_then(|e| e["message"].as_str()) {
                assert!(
                    !message.contains("unknown operation"),
                    "{} is listed but not dispatched",
                    op.name
                );
            }
        }
    }

    #[test]
    fn test_unknown_operation() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        let response = call(&mut store, "drop_everything", &Value::Null);
        assert!(!response.success);
        assert_eq!(response.error_kind(), Some("not_found"));
    }

    #[test]
    fn test_forbidden_carries_use_instead() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        let response = call(
            &mut store,
            "insert",
            &json!({"table": "tasks", "fields": {"name": "x", "milestone_id": 1}}),
        );
        assert_eq!(response.error_kind(), Some("forbidden"));
        assert_eq!(response.error().unwrap()["use_instead"], "add_task");
    }

    #[test]
    fn test_missing_argument_is_invalid() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        let response = call(&mut store, "get_task", &json!({}));
        assert_eq!(response.error_kind(), Some("invalid_argument"));
        assert!(response.to_json().contains("missing argument 'id'"));
    }

    #[test]
    fn test_success_shape() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        let response = call(&mut store, "add_flow", &json!({"name": "checkout"}));
        assert!(response.success);
        let out: Value = serde_json::from_str(&response.to_json()).unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["result"]["name"], "checkout");
    }
}
