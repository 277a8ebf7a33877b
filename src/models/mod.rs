//! Data models for Waymark entities.
//!
//! This module defines the core data structures:
//! - `Project` - The singleton describing the tracked project
//! - `FileRecord`, `FunctionRecord`, `TypeRecord` - Code artifacts with a reservation lifecycle
//! - `Theme`, `Flow` - Organizational tags linking artifacts to work
//! - `CompletionPath`, `Milestone`, `Task`, `Subtask`, `Sidequest`, `Item` - The work breakdown
//! - `Note` - Append-only annotations attached to any entity
//!
//! Every struct deserializes from a decoded storage row, so field names follow
//! column names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded storage row: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Declare an enum stored as lowercase text, with parsing and the list of
/// accepted values (which the schema registry turns into CHECK constraints).
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Every accepted text value, in declaration order.
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            /// Convert to the stored text value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// Parse from text, case-insensitive.
            pub fn parse(s: &str) -> crate::Result<Self> {
                match s.to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(crate::Error::InvalidArgument(format!(
                        "invalid {} '{}': expected one of {}",
                        $label,
                        s,
                        Self::VALUES.join("|")
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

text_enum! {
    /// Lifecycle status of the project singleton.
    ProjectStatus, "project status" {
        #[default]
        Active => "active",
        Paused => "paused",
        Completed => "completed",
        Archived => "archived",
    }
}

text_enum! {
    /// Status of a completion path stage.
    PathStatus, "completion path status" {
        #[default]
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
    }
}

text_enum! {
    /// Status shared by milestones, tasks, subtasks and sidequests.
    WorkStatus, "status" {
        #[default]
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Blocked => "blocked",
    }
}

text_enum! {
    /// Status of an item, the smallest unit of work.
    ItemStatus, "item status" {
        #[default]
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
    }
}

text_enum! {
    Priority, "priority" {
        Low => "low",
        #[default]
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

text_enum! {
    Purity, "purity level" {
        #[default]
        Pure => "pure",
        Impure => "impure",
    }
}

text_enum! {
    /// Role a function plays for a type.
    TypeFunctionRole, "type-function role" {
        Constructor => "constructor",
        #[default]
        Method => "method",
        Operator => "operator",
        Accessor => "accessor",
        Transformer => "transformer",
    }
}

text_enum! {
    InteractionType, "interaction type" {
        #[default]
        Calls => "calls",
        Chains => "chains",
        Borrows => "borrows",
        Composes => "composes",
        Pipes => "pipes",
    }
}

text_enum! {
    NoteType, "note type" {
        #[default]
        Info => "info",
        Clarification => "clarification",
        Warning => "warning",
        Deletion => "deletion",
        Evolution => "evolution",
        Repair => "repair",
        Reminder => "reminder",
    }
}

text_enum! {
    NoteSeverity, "note severity" {
        #[default]
        Info => "info",
        Warning => "warning",
        Error => "error",
    }
}

text_enum! {
    /// Who produced a note.
    NoteSource, "note source" {
        User => "user",
        #[default]
        Ai => "ai",
        Directive => "directive",
        System => "system",
    }
}

text_enum! {
    /// A unit of work that can carry a work context.
    WorkKind, "work kind" {
        #[default]
        Task => "task",
        Subtask => "subtask",
        Sidequest => "sidequest",
    }
}

/// Name lifecycle of a file, function or type.
///
/// A reserved row only has a provisional name; a finalized row has a final
/// name that embeds the row's own ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Reservation {
    Reserved { preliminary_name: String },
    Finalized { final_name: String },
}

impl Reservation {
    /// Rebuild the lifecycle state from its two stored columns.
    pub fn from_columns(name: String, is_reserved: bool) -> Self {
        if is_reserved {
            Reservation::Reserved {
                preliminary_name: name,
            }
        } else {
            Reservation::Finalized { final_name: name }
        }
    }

    /// The current name, provisional or final.
    pub fn name(&self) -> &str {
        match self {
            Reservation::Reserved { preliminary_name } => preliminary_name,
            Reservation::Finalized { final_name } => final_name,
        }
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, Reservation::Reserved { .. })
    }
}

/// The project singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    /// Incremented on every evolution event
    pub version: i64,
    #[serde(default)]
    pub last_known_git_hash: Option<String>,
    #[serde(default)]
    pub last_git_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct FileRow {
    id: i64,
    name: String,
    path: String,
    language: Option<String>,
    is_reserved: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A tracked source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "FileRow")]
pub struct FileRecord {
    pub id: i64,
    #[serde(flatten)]
    pub reservation: Reservation,
    pub path: String,
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        Self {
            id: row.id,
            reservation: Reservation::from_columns(row.name, row.is_reserved),
            path: row.path,
            language: row.language,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct FunctionRow {
    id: i64,
    name: String,
    file_id: i64,
    purpose: Option<String>,
    parameters: Option<String>,
    returns: Option<String>,
    purity_level: Purity,
    is_reserved: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A function owned by a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "FunctionRow")]
pub struct FunctionRecord {
    pub id: i64,
    #[serde(flatten)]
    pub reservation: Reservation,
    pub file_id: i64,
    pub purpose: Option<String>,
    pub parameters: Option<String>,
    pub returns: Option<String>,
    pub purity_level: Purity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FunctionRow> for FunctionRecord {
    fn from(row: FunctionRow) -> Self {
        Self {
            id: row.id,
            reservation: Reservation::from_columns(row.name, row.is_reserved),
            file_id: row.file_id,
            purpose: row.purpose,
            parameters: row.parameters,
            returns: row.returns,
            purity_level: row.purity_level,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct TypeRow {
    id: i64,
    name: String,
    file_id: i64,
    description: Option<String>,
    definition: Option<String>,
    is_reserved: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A type owned by a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "TypeRow")]
pub struct TypeRecord {
    pub id: i64,
    #[serde(flatten)]
    pub reservation: Reservation,
    pub file_id: i64,
    pub description: Option<String>,
    /// Structural definition (variants, fields)
    pub definition: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TypeRow> for TypeRecord {
    fn from(row: TypeRow) -> Self {
        Self {
            id: row.id,
            reservation: Reservation::from_columns(row.name, row.is_reserved),
            file_id: row.file_id,
            description: row.description,
            definition: row.definition,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeFunction {
    pub id: i64,
    pub type_id: i64,
    pub function_id: i64,
    pub role: TypeFunctionRole,
}

/// A directed edge between two functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: i64,
    pub source_function_id: i64,
    pub target_function_id: i64,
    pub interaction_type: InteractionType,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An ordered stage of the project's road to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPath {
    pub id: i64,
    pub name: String,
    /// 1-based, unique and contiguous across all stages
    pub order_index: i64,
    pub status: PathStatus,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: i64,
    pub completion_path_id: i64,
    pub name: String,
    pub status: WorkStatus,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A work item tracked under a milestone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub milestone_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: WorkStatus,
    pub priority: Priority,
    /// Flows this task touches, stored on the row itself
    #[serde(default)]
    pub flow_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A child of a task; shares the task's flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: i64,
    pub parent_task_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: WorkStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An out-of-band interruption that pauses a task (and optionally a subtask).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sidequest {
    pub id: i64,
    pub paused_task_id: i64,
    #[serde(default)]
    pub paused_subtask_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: WorkStatus,
    pub priority: Priority,
    #[serde(default)]
    pub flow_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Owner of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemOwner {
    Task(i64),
    Subtask(i64),
    Sidequest(i64),
}

impl ItemOwner {
    /// Build from the polymorphic reference columns.
    pub fn from_reference(table: &str, id: i64) -> crate::Result<Self> {
        match table {
            "tasks" => Ok(ItemOwner::Task(id)),
            "subtasks" => Ok(ItemOwner::Subtask(id)),
            "sidequests" => Ok(ItemOwner::Sidequest(id)),
            other => Err(crate::Error::InvalidArgument(format!(
                "items belong to tasks, subtasks or sidequests, not '{}'",
                other
            ))),
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            ItemOwner::Task(_) => "tasks",
            ItemOwner::Subtask(_) => "subtasks",
            ItemOwner::Sidequest(_) => "sidequests",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ItemOwner::Task(id) | ItemOwner::Subtask(id) | ItemOwner::Sidequest(id) => *id,
        }
    }
}

impl From<(WorkKind, i64)> for ItemOwner {
    fn from((kind, id): (WorkKind, i64)) -> Self {
        match kind {
            WorkKind::Task => ItemOwner::Task(id),
            WorkKind::Subtask => ItemOwner::Subtask(id),
            WorkKind::Sidequest => ItemOwner::Sidequest(id),
        }
    }
}

/// The smallest unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub reference_table: String,
    pub reference_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An append-only annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub content: String,
    pub note_type: NoteType,
    #[serde(default)]
    pub reference_table: Option<String>,
    #[serde(default)]
    pub reference_id: Option<i64>,
    pub source: NoteSource,
    pub severity: NoteSeverity,
    #[serde(default)]
    pub directive_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A directive in the read-only core catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub guidance: Option<String>,
}
