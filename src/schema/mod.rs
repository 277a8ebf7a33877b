//! Schema registry for the four logical databases.
//!
//! Tables and fields are described statically. The descriptors are used to:
//! - validate table and field names before any query is built
//! - produce "available fields" hints for callers
//! - generate the physical DDL, so the registry and the database cannot drift

use crate::models::{
    InteractionType, ItemStatus, NoteSeverity, NoteSource, NoteType, PathStatus, Priority,
    ProjectStatus, Purity, TypeFunctionRole, WorkStatus,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version written into every database's `schema_meta` row.
pub const SCHEMA_VERSION: i64 = 1;

/// A logical database, each persisted in its own file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Database {
    /// Read-only catalog of directives and helpers
    Core,
    /// Mutable project metadata
    Project,
    /// Mutable preference store
    Settings,
    /// Optional mutable automation store
    User,
}

impl Database {
    pub const ALL: [Database; 4] = [
        Database::Core,
        Database::Project,
        Database::Settings,
        Database::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Database::Core => "core",
            Database::Project => "project",
            Database::Settings => "settings",
            Database::User => "user",
        }
    }

    /// Parse a database name, accepting a few common aliases.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "core" => Ok(Database::Core),
            "project" => Ok(Database::Project),
            "settings" => Ok(Database::Settings),
            "user" | "automation" | "user_directives" => Ok(Database::User),
            _ => Err(Error::NotFound(format!(
                "Unknown database '{}': expected core|project|settings|user",
                s
            ))),
        }
    }

    /// File name of this database inside the store directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Database::Core => "core.db",
            Database::Project => "project.db",
            Database::Settings => "settings.db",
            Database::User => "automation.db",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Database::Core)
    }

    /// Tables that live in this database.
    pub fn tables(&self) -> Vec<Table> {
        Table::ALL
            .iter()
            .copied()
            .filter(|t| t.database() == *self)
            .collect()
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Every table known to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    // core
    Directives,
    Categories,
    DirectiveCategories,
    Helpers,
    // project
    Project,
    Files,
    Functions,
    Types,
    TypesFunctions,
    Interactions,
    Themes,
    Flows,
    FlowThemes,
    FileFlows,
    CompletionPath,
    Milestones,
    Tasks,
    Subtasks,
    Sidequests,
    Items,
    Notes,
    // settings
    UserSettings,
    TrackingSettings,
    // user
    UserDirectives,
    DirectiveExecutions,
}

impl Table {
    pub const ALL: [Table; 25] = [
        Table::Directives,
        Table::Categories,
        Table::DirectiveCategories,
        Table::Helpers,
        Table::Project,
        Table::Files,
        Table::Functions,
        Table::Types,
        Table::TypesFunctions,
        Table::Interactions,
        Table::Themes,
        Table::Flows,
        Table::FlowThemes,
        Table::FileFlows,
        Table::CompletionPath,
        Table::Milestones,
        Table::Tasks,
        Table::Subtasks,
        Table::Sidequests,
        Table::Items,
        Table::Notes,
        Table::UserSettings,
        Table::TrackingSettings,
        Table::UserDirectives,
        Table::DirectiveExecutions,
    ];

    /// Physical table name.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Directives => "directives",
            Table::Categories => "categories",
            Table::DirectiveCategories => "directive_categories",
            Table::Helpers => "helpers",
            Table::Project => "project",
            Table::Files => "files",
            Table::Functions => "functions",
            Table::Types => "types",
            Table::TypesFunctions => "types_functions",
            Table::Interactions => "interactions",
            Table::Themes => "themes",
            Table::Flows => "flows",
            Table::FlowThemes => "flow_themes",
            Table::FileFlows => "file_flows",
            Table::CompletionPath => "completion_path",
            Table::Milestones => "milestones",
            Table::Tasks => "tasks",
            Table::Subtasks => "subtasks",
            Table::Sidequests => "sidequests",
            Table::Items => "items",
            Table::Notes => "notes",
            Table::UserSettings => "user_settings",
            Table::TrackingSettings => "tracking_settings",
            Table::UserDirectives => "user_directives",
            Table::DirectiveExecutions => "directive_executions",
        }
    }

    pub fn database(&self) -> Database {
        match self {
            Table::Directives | Table::Categories | Table::DirectiveCategories | Table::Helpers => {
                Database::Core
            }
            Table::UserSettings | Table::TrackingSettings => Database::Settings,
            Table::UserDirectives | Table::DirectiveExecutions => Database::User,
            _ => Database::Project,
        }
    }

    /// Resolve a table name within a database.
    pub fn parse(database: Database, name: &str) -> Result<Self> {
        let wanted = name.trim().to_lowercase();
        Table::ALL
            .iter()
            .copied()
            .find(|t| t.database() == database && t.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = database.tables().iter().map(|t| t.name()).collect();
                Error::NotFound(format!(
                    "Unknown table '{}' in {} database; available tables: {}",
                    name,
                    database,
                    known.join(", ")
                ))
            })
    }

    /// Resolve a table name across every database.
    pub fn parse_any(name: &str) -> Result<Self> {
        let wanted = name.trim().to_lowercase();
        Table::ALL
            .iter()
            .copied()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| Error::NotFound(format!("Unknown table '{}'", name)))
    }

    /// Ordered field descriptors.
    pub fn fields(&self) -> &'static [FieldDescriptor] {
        fields(*self)
    }

    /// Look up a single field, failing with the list of available fields.
    pub fn field(&self, name: &str) -> Result<&'static FieldDescriptor> {
        self.fields()
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Unknown field '{}' on table '{}'. {}",
                    name,
                    self.name(),
                    available_fields_hint(*self)
                ))
            })
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields().iter().any(|f| f.name == name)
    }

    /// Comma-separated column list in descriptor order.
    pub fn column_list(&self) -> String {
        self.fields()
            .iter()
            .map(|f| f.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Real,
    Text,
    /// Stored as 0/1
    Boolean,
    /// RFC 3339 text, filled automatically when omitted
    Timestamp,
    /// JSON array stored as text
    JsonArray,
}

impl FieldType {
    fn sql(&self) -> &'static str {
        match self {
            FieldType::Integer | FieldType::Boolean => "INTEGER",
            FieldType::Real => "REAL",
            FieldType::Text | FieldType::Timestamp | FieldType::JsonArray => "TEXT",
        }
    }
}

/// Static description of one column.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldDescriptor {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub nullable: bool,
    pub primary: bool,
    pub unique: bool,
    /// SQL default expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
    /// Accepted text values for enumerated fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<&'static [&'static str]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<(Table, &'static str)>,
}

impl FieldDescriptor {
    const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            primary: false,
            unique: false,
            default: None,
            allowed: None,
            references: None,
        }
    }

    const fn optional(mut self) -> Self {
        self.nullable = true;
        self
    }

    const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    const fn default_sql(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    const fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.allowed = Some(values);
        self
    }

    const fn references(mut self, table: Table) -> Self {
        self.references = Some((table, "id"));
        self
    }

    /// Whether an insert must supply this field.
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.primary && self.default.is_none() && self.ty != FieldType::Timestamp
    }

    fn column_sql(&self) -> String {
        if self.primary {
            return format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", self.name);
        }
        let mut sql = format!("{} {}", self.name, self.ty.sql());
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if let Some(values) = self.allowed {
            let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
            sql.push_str(&format!(" CHECK ({} IN ({}))", self.name, quoted.join(", ")));
        }
        sql
    }
}

const fn pk() -> FieldDescriptor {
    let mut field = FieldDescriptor::new("id", FieldType::Integer);
    field.primary = true;
    field
}

const fn integer(name: &'static str) -> FieldDescriptor {
    FieldDescriptor::new(name, FieldType::Integer)
}

const fn text(name: &'static str) -> FieldDescriptor {
    FieldDescriptor::new(name, FieldType::Text)
}

const fn boolean(name: &'static str) -> FieldDescriptor {
    FieldDescriptor::new(name, FieldType::Boolean)
}

const fn timestamp(name: &'static str) -> FieldDescriptor {
    FieldDescriptor::new(name, FieldType::Timestamp)
}

const fn json_array(name: &'static str) -> FieldDescriptor {
    FieldDescriptor::new(name, FieldType::JsonArray).default_sql("'[]'")
}

const DIRECTIVES: &[FieldDescriptor] = &[
    pk(),
    text("name").unique(),
    text("description").optional(),
    text("guidance").optional(),
];

const CATEGORIES: &[FieldDescriptor] = &[pk(), text("name").unique(), text("description").optional()];

const DIRECTIVE_CATEGORIES: &[FieldDescriptor] = &[
    pk(),
    integer("directive_id").references(Table::Directives),
    integer("category_id").references(Table::Categories),
];

const HELPERS: &[FieldDescriptor] = &[
    pk(),
    text("name").unique(),
    text("target_database"),
    text("purpose").optional(),
];

const PROJECT: &[FieldDescriptor] = &[
    pk(),
    text("name"),
    text("purpose").optional(),
    json_array("goals"),
    text("status").default_sql("'active'").one_of(ProjectStatus::VALUES),
    integer("version").default_sql("1"),
    text("last_known_git_hash").optional(),
    text("last_git_sync").optional(),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const FILES: &[FieldDescriptor] = &[
    pk(),
    text("name"),
    text("path").unique(),
    text("language").optional(),
    boolean("is_reserved").default_sql("0"),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const FUNCTIONS: &[FieldDescriptor] = &[
    pk(),
    text("name"),
    integer("file_id").references(Table::Files),
    text("purpose").optional(),
    text("parameters").optional(),
    text("returns").optional(),
    text("purity_level").default_sql("'pure'").one_of(Purity::VALUES),
    boolean("is_reserved").default_sql("0"),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const TYPES: &[FieldDescriptor] = &[
    pk(),
    text("name"),
    integer("file_id").references(Table::Files),
    text("description").optional(),
    text("definition").optional(),
    boolean("is_reserved").default_sql("0"),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const TYPES_FUNCTIONS: &[FieldDescriptor] = &[
    pk(),
    integer("type_id").references(Table::Types),
    integer("function_id").references(Table::Functions),
    text("role").default_sql("'method'").one_of(TypeFunctionRole::VALUES),
];

const INTERACTIONS: &[FieldDescriptor] = &[
    pk(),
    integer("source_function_id").references(Table::Functions),
    integer("target_function_id").references(Table::Functions),
    text("interaction_type").default_sql("'calls'").one_of(InteractionType::VALUES),
    text("description").optional(),
    timestamp("created_at"),
];

const THEMES: &[FieldDescriptor] = &[
    pk(),
    text("name").unique(),
    text("description").optional(),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const FLOWS: &[FieldDescriptor] = &[
    pk(),
    text("name").unique(),
    text("description").optional(),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const FLOW_THEMES: &[FieldDescriptor] = &[
    pk(),
    integer("flow_id").references(Table::Flows),
    integer("theme_id").references(Table::Themes),
];

const FILE_FLOWS: &[FieldDescriptor] = &[
    pk(),
    integer("file_id").references(Table::Files),
    integer("flow_id").references(Table::Flows),
];

const COMPLETION_PATH: &[FieldDescriptor] = &[
    pk(),
    text("name"),
    integer("order_index"),
    text("status").default_sql("'pending'").one_of(PathStatus::VALUES),
    text("description").optional(),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const MILESTONES: &[FieldDescriptor] = &[
    pk(),
    integer("completion_path_id").references(Table::CompletionPath),
    text("name"),
    text("status").default_sql("'pending'").one_of(WorkStatus::VALUES),
    text("description").optional(),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const TASKS: &[FieldDescriptor] = &[
    pk(),
    integer("milestone_id").references(Table::Milestones),
    text("name"),
    text("description").optional(),
    text("status").default_sql("'pending'").one_of(WorkStatus::VALUES),
    text("priority").default_sql("'medium'").one_of(Priority::VALUES),
    json_array("flow_ids"),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const SUBTASKS: &[FieldDescriptor] = &[
    pk(),
    integer("parent_task_id").references(Table::Tasks),
    text("name"),
    text("description").optional(),
    text("status").default_sql("'pending'").one_of(WorkStatus::VALUES),
    text("priority").default_sql("'medium'").one_of(Priority::VALUES),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const SIDEQUESTS: &[FieldDescriptor] = &[
    pk(),
    integer("paused_task_id").references(Table::Tasks),
    integer("paused_subtask_id").optional().references(Table::Subtasks),
    text("name"),
    text("description").optional(),
    text("status").default_sql("'pending'").one_of(WorkStatus::VALUES),
    text("priority").default_sql("'medium'").one_of(Priority::VALUES),
    json_array("flow_ids"),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const ITEM_OWNERS: &[&str] = &["tasks", "subtasks", "sidequests"];

const ITEMS: &[FieldDescriptor] = &[
    pk(),
    text("reference_table").one_of(ITEM_OWNERS),
    integer("reference_id"),
    text("name"),
    text("description").optional(),
    text("status").default_sql("'pending'").one_of(ItemStatus::VALUES),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const NOTES: &[FieldDescriptor] = &[
    pk(),
    text("content"),
    text("note_type").default_sql("'info'").one_of(NoteType::VALUES),
    text("reference_table").optional(),
    integer("reference_id").optional(),
    text("source").default_sql("'ai'").one_of(NoteSource::VALUES),
    text("severity").default_sql("'info'").one_of(NoteSeverity::VALUES),
    text("directive_name").optional(),
    timestamp("created_at"),
];

const USER_SETTINGS: &[FieldDescriptor] = &[
    pk(),
    text("directive_name").optional(),
    text("setting_key"),
    text("setting_value"),
    text("scope").default_sql("'project'"),
    timestamp("updated_at"),
];

const TRACKING_SETTINGS: &[FieldDescriptor] = &[
    pk(),
    text("feature_name").unique(),
    boolean("enabled").default_sql("0"),
    timestamp("updated_at"),
];

const USER_DIRECTIVES: &[FieldDescriptor] = &[
    pk(),
    text("name").unique(),
    text("trigger_type"),
    text("description").optional(),
    text("status").default_sql("'pending'"),
    text("source_file").optional(),
    timestamp("created_at"),
    timestamp("updated_at"),
];

const DIRECTIVE_EXECUTIONS: &[FieldDescriptor] = &[
    pk(),
    integer("directive_id").references(Table::UserDirectives),
    text("status").default_sql("'running'"),
    text("result").optional(),
    timestamp("started_at"),
    text("finished_at").optional(),
];

/// Field descriptors for a table.
pub fn fields(table: Table) -> &'static [FieldDescriptor] {
    match table {
        Table::Directives => DIRECTIVES,
        Table::Categories => CATEGORIES,
        Table::DirectiveCategories => DIRECTIVE_CATEGORIES,
        Table::Helpers => HELPERS,
        Table::Project => PROJECT,
        Table::Files => FILES,
        Table::Functions => FUNCTIONS,
        Table::Types => TYPES,
        Table::TypesFunctions => TYPES_FUNCTIONS,
        Table::Interactions => INTERACTIONS,
        Table::Themes => THEMES,
        Table::Flows => FLOWS,
        Table::FlowThemes => FLOW_THEMES,
        Table::FileFlows => FILE_FLOWS,
        Table::CompletionPath => COMPLETION_PATH,
        Table::Milestones => MILESTONES,
        Table::Tasks => TASKS,
        Table::Subtasks => SUBTASKS,
        Table::Sidequests => SIDEQUESTS,
        Table::Items => ITEMS,
        Table::Notes => NOTES,
        Table::UserSettings => USER_SETTINGS,
        Table::TrackingSettings => TRACKING_SETTINGS,
        Table::UserDirectives => USER_DIRECTIVES,
        Table::DirectiveExecutions => DIRECTIVE_EXECUTIONS,
    }
}

/// Fields an insert must supply.
pub fn required_fields(table: Table) -> Vec<&'static str> {
    fields(table)
        .iter()
        .filter(|f| f.is_required())
        .map(|f| f.name)
        .collect()
}

/// Human-readable hint listing a table's fields, for tables without
/// specialized operations and for unknown-field errors.
pub fn available_fields_hint(table: Table) -> String {
    let described: Vec<String> = fields(table)
        .iter()
        .map(|f| {
            let mut s = format!("{} ({:?}", f.name, f.ty).to_lowercase();
            if f.is_required() {
                s.push_str(", required");
            }
            if let Some(values) = f.allowed {
                s.push_str(&format!(", one of {}", values.join("|")));
            }
            s.push(')');
            s
        })
        .collect();
    format!("Available fields: {}", described.join(", "))
}

/// CREATE TABLE statement for a table.
pub fn create_table_sql(table: Table) -> String {
    let mut lines: Vec<String> = fields(table).iter().map(|f| f.column_sql()).collect();
    for field in fields(table) {
        if let Some((target, column)) = field.references {
            lines.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                field.name,
                target.name(),
                column
            ));
        }
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        table.name(),
        lines.join(",\n    ")
    )
}

/// Full DDL for a database, including indexes.
pub fn database_ddl(database: Database) -> String {
    let mut statements = vec![
        "CREATE TABLE IF NOT EXISTS schema_meta (\n    id INTEGER PRIMARY KEY CHECK (id = 1),\n    schema_version INTEGER NOT NULL\n);"
            .to_string(),
    ];
    for table in database.tables() {
        statements.push(create_table_sql(table));
        for field in fields(table) {
            if field.references.is_some() {
                statements.push(format!(
                    "CREATE INDEX IF NOT EXISTS idx_{t}_{f} ON {t}({f});",
                    t = table.name(),
                    f = field.name
                ));
            }
        }
    }
    if database == Database::Project {
        // Kept as a separate index so repair tooling can inspect anomalies.
        statements.push(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_completion_path_order ON completion_path(order_index);"
                .to_string(),
        );
        statements.push(
            "CREATE INDEX IF NOT EXISTS idx_items_reference ON items(reference_table, reference_id);"
                .to_string(),
        );
        statements.push(
            "CREATE INDEX IF NOT EXISTS idx_notes_reference ON notes(reference_table, reference_id);"
                .to_string(),
        );
    }
    statements.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_has_primary_key_first() {
        for table in Table::ALL {
            let first = &table.fields()[0];
            assert_eq!(first.name, "id", "table {}", table);
            assert!(first.primary);
        }
    }

    #[test]
    fn test_table_parse_scoped_to_database() {
        assert_eq!(Table::parse(Database::Project, "files").unwrap(), Table::Files);
        assert_eq!(Table::parse(Database::Project, " Tasks ").unwrap(), Table::Tasks);
        let err = Table::parse(Database::Settings, "files").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("user_settings"));
    }

    #[test]
    fn test_unknown_field_lists_available() {
        let err = Table::Files.field("nmae").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let msg = err.to_string();
        assert!(msg.contains("nmae"));
        assert!(msg.contains("path (text, required)"));
    }

    #[test]
    fn test_required_fields_skip_defaults_and_timestamps() {
        let required = required_fields(Table::Tasks);
        assert_eq!(required, vec!["milestone_id", "name"]);
        assert_eq!(required_fields(Table::FlowThemes), vec!["flow_id", "theme_id"]);
    }

    #[test]
    fn test_references_point_into_same_database() {
        for table in Table::ALL {
            for field in table.fields() {
                if let Some((target, _)) = field.references {
                    assert_eq!(target.database(), table.database(), "{}.{}", table, field.name);
                }
            }
        }
    }

    #[test]
    fn test_ddl_contains_checks_and_foreign_keys() {
        let ddl = create_table_sql(Table::Functions);
        assert!(ddl.contains("FOREIGN KEY (file_id) REFERENCES files(id)"));
        assert!(ddl.contains("CHECK (purity_level IN ('pure', 'impure'))"));

        let project = database_ddl(Database::Project);
        assert!(project.contains("idx_completion_path_order"));
    }

    #[test]
    fn test_ddl_executes_on_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        for db in Database::ALL {
            let scratch = rusqlite::Connection::open_in_memory().unwrap();
            scratch.execute_batch(&database_ddl(db)).unwrap();
        }
        conn.execute_batch(&database_ddl(Database::Project)).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sidequests'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
