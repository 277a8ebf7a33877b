//! Work context aggregation.
//!
//! `get_work_context` answers "what matters for this unit of work right now"
//! in one read. Only the work item itself is mandatory; every other piece is
//! fetched independently and a failure is reported in `warnings` instead of
//! failing the call.

use super::Store;
use super::tiered::{get_typed, select_typed};
use crate::models::{
    CompletionPath, FileRecord, Flow, FunctionRecord, Interaction, Item, ItemOwner, Milestone,
    Note, Sidequest, Subtask, Task, Theme, WorkKind,
};
use crate::schema::Table;
use crate::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

/// Optional parts of a work context.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContextOptions {
    #[serde(default)]
    pub include_interactions: bool,
    #[serde(default)]
    pub include_notes: bool,
    #[serde(default)]
    pub include_items: bool,
}

impl ContextOptions {
    pub fn all() -> Self {
        Self {
            include_interactions: true,
            include_notes: true,
            include_items: true,
        }
    }
}

/// The unit of work a context was built for.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkItem {
    Task(Task),
    Subtask(Subtask),
    Sidequest(Sidequest),
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowContext {
    pub flow: Flow,
    pub themes: Vec<Theme>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkContext {
    pub kind: WorkKind,
    pub work_item: WorkItem,
    pub milestone: Option<Milestone>,
    pub completion_path: Option<CompletionPath>,
    pub flows: Vec<FlowContext>,
    /// Most recently updated first
    pub files: Vec<FileRecord>,
    /// Most recently updated first
    pub functions: Vec<FunctionRecord>,
    pub interactions: Vec<Interaction>,
    pub items: Vec<Item>,
    pub notes: Vec<Note>,
    pub warnings: Vec<String>,
}

impl WorkContext {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Keeps the value of a sub-fetch, or records why it is missing.
fn keep<T>(warnings: &mut Vec<String>, what: impl Into<String>, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            let msg = format!("{}: {}", what.into(), err);
            warn!(warning = %msg, "work context degraded");
            warnings.push(msg);
            None
        }
    }
}

fn themes_for_flow(conn: &Connection, flow_id: i64) -> Result<Vec<Theme>> {
    let mut stmt = conn.prepare(
        "SELECT theme_id FROM flow_themes WHERE flow_id = ?1 ORDER BY theme_id",
    )?;
    let ids = stmt
        .query_map([flow_id], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    select_typed(conn, Table::Themes, &[("id", json!(ids))], Some("name ASC"))
}

/// Distinct files attached to any of the flows, newest first.
fn files_for_flows(conn: &Connection, flow_ids: &[i64]) -> Result<Vec<FileRecord>> {
    if flow_ids.is_empty() {
        return Ok(Vec::new());
    }
    let file_ids: Vec<i64> = {
        let placeholders = vec!["?"; flow_ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT file_id FROM file_flows WHERE flow_id IN ({})",
            placeholders
        ))?;
        stmt.query_map(rusqlite::params_from_iter(flow_ids.iter()), |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?
    };
    select_typed(
        conn,
        Table::Files,
        &[("id", json!(file_ids))],
        Some("updated_at DESC, id DESC"),
    )
}

fn functions_for_files(conn: &Connection, files: &[FileRecord]) -> Result<Vec<FunctionRecord>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = files.iter().map(|f| f.id).collect();
    select_typed(
        conn,
        Table::Functions,
        &[("file_id", json!(ids))],
        Some("updated_at DESC, id DESC"),
    )
}

/// Interactions touching any of the functions, from either end.
fn interactions_for(conn: &Connection, functions: &[FunctionRecord]) -> Result<Vec<Interaction>> {
    if functions.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = functions.iter().map(|f| f.id).collect();
    let mut out: Vec<Interaction> =
        select_typed(conn, Table::Interactions, &[("source_function_id", json!(ids))], None)?;
    let incoming: Vec<Interaction> =
        select_typed(conn, Table::Interactions, &[("target_function_id", json!(ids))], None)?;
    for interaction in incoming {
        if !out.iter().any(|i| i.id == interaction.id) {
            out.push(interaction);
        }
    }
    out.sort_by_key(|i| i.id);
    Ok(out)
}

impl Store {
    /// Assemble the context of a task, subtask or sidequest.
    ///
    /// Subtasks use their parent task's flows and milestone. A missing work
    /// item is `NotFound`; anything else that cannot be read is skipped with
    /// a warning.
    pub fn get_work_context(&self, kind: WorkKind, id: i64, options: ContextOptions) -> Result<WorkContext> {
        // One read transaction so every part sees the same snapshot.
        let tx = self.project.unchecked_transaction()?;
        let conn: &Connection = &tx;
        let mut warnings = Vec::new();

        let (work_item, owning_task, flow_ids) = match kind {
            WorkKind::Task => {
                let task: Task = get_typed(conn, Table::Tasks, id)?;
                let flows = task.flow_ids.clone();
                (WorkItem::Task(task.clone()), Some(task), flows)
            }
            WorkKind::Subtask => {
                let subtask: Subtask = get_typed(conn, Table::Subtasks, id)?;
                let parent = keep(
                    &mut warnings,
                    format!("parent task {}", subtask.parent_task_id),
                    get_typed::<Task>(conn, Table::Tasks, subtask.parent_task_id),
                );
                let flows = parent.as_ref().map(|t| t.flow_ids.clone()).unwrap_or_default();
                (WorkItem::Subtask(subtask), parent, flows)
            }
            WorkKind::Sidequest => {
                let sidequest: Sidequest = get_typed(conn, Table::Sidequests, id)?;
                let paused = keep(
                    &mut warnings,
                    format!("paused task {}", sidequest.paused_task_id),
                    get_typed::<Task>(conn, Table::Tasks, sidequest.paused_task_id),
                );
                let flows = sidequest.flow_ids.clone();
                (WorkItem::Sidequest(sidequest), paused, flows)
            }
        };

        let milestone = owning_task.as_ref().and_then(|task| {
            keep(
                &mut warnings,
                format!("milestone {}", task.milestone_id),
                get_typed::<Milestone>(conn, Table::Milestones, task.milestone_id),
            )
        });
        let completion_path = milestone.as_ref().and_then(|m| {
            keep(
                &mut warnings,
                format!("completion path {}", m.completion_path_id),
                get_typed::<CompletionPath>(conn, Table::CompletionPath, m.completion_path_id),
            )
        });

        let mut flows = Vec::new();
        for flow_id in &flow_ids {
            let Some(flow) = keep(
                &mut warnings,
                format!("flow {}", flow_id),
                get_typed::<Flow>(conn, Table::Flows, *flow_id),
            ) else {
                continue;
            };
            let themes = keep(
                &mut warnings,
                format!("themes of flow {}", flow_id),
                themes_for_flow(conn, *flow_id),
            )
            .unwrap_or_default();
            flows.push(FlowContext { flow, themes });
        }

        let live_flows: Vec<i64> = flows.iter().map(|f| f.flow.id).collect();
        let files = keep(&mut warnings, "files", files_for_flows(conn, &live_flows)).unwrap_or_default();
        let functions =
            keep(&mut warnings, "functions", functions_for_files(conn, &files)).unwrap_or_default();

        let interactions = if options.include_interactions {
            keep(&mut warnings, "interactions", interactions_for(conn, &functions)).unwrap_or_default()
        } else {
            Vec::new()
        };

        let owner = ItemOwner::from((kind, id));
        let items = if options.include_items {
            keep(
                &mut warnings,
                "items",
                select_typed(
                    conn,
                    Table::Items,
                    &[
                        ("reference_table", json!(owner.table_name())),
                        ("reference_id", json!(id)),
                    ],
                    None,
                ),
            )
            .unwrap_or_default()
        } else {
            Vec::new()
        };

        let notes = if options.include_notes {
            keep(
                &mut warnings,
                "notes",
                select_typed(
                    conn,
                    Table::Notes,
                    &[
                        ("reference_table", json!(owner.table_name())),
                        ("reference_id", json!(id)),
                    ],
                    Some("created_at DESC, id DESC"),
                ),
            )
            .unwrap_or_default()
        } else {
            Vec::new()
        };

        tx.finish()?;
        debug!(
            kind = %kind,
            id,
            flows = flows.len(),
            files = files.len(),
            warnings = warnings.len(),
            "work context assembled"
        );

        Ok(WorkContext {
            kind,
            work_item,
            milestone,
            completion_path,
            flows,
            files,
            functions,
            interactions,
            items,
            notes,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::models::{InteractionType, Priority};
    use crate::storage::hierarchy::NewTask;
    use crate::storage::notes::NewNote;
    use crate::storage::reservation::{FileFinalization, FileReservation, FunctionFinalization, FunctionReservation};
    use crate::test_utils::TestEnv;

    struct Fixture {
        _env: TestEnv,
        store: Store,
        task: Task,
        flow: Flow,
        old_file: i64,
        new_file: i64,
    }

    fn file(env: &TestEnv, store: &mut Store, stem: &str) -> i64 {
        let id = store
            .reserve_file(&FileReservation {
                path: format!("src/{}.rs", stem),
                ..Default::default()
            })
            .unwrap();
        let name = format!("{}-ID_{}.rs", stem, id);
        env.write_artifact(&format!("src/{}", name), "");
        store
            .finalize_file(
                id,
                &FileFinalization {
                    name: name.clone(),
                    path: Some(format!("src/{}", name)),
                    ..Default::default()
                },
            )
            .unwrap();
        id
    }

    fn fixture() -> Fixture {
        let env = TestEnv::new();
        let mut store = env.init_store();
        let path = store.add_completion_path("Core", None, None).unwrap();
        let milestone = store.add_milestone(path.id, "M", None).unwrap();
        let flow = store.add_flow("login", None).unwrap();
        let theme = store.add_theme("auth", None).unwrap();
        store.link_flow_theme(flow.id, theme.id).unwrap();

        let old_file = file(&env, &mut store, "old");
        let new_file = file(&env, &mut store, "new");
        store.link_file_flow(old_file, flow.id).unwrap();
        store.link_file_flow(new_file, flow.id).unwrap();

        let task = store
            .add_task(NewTask {
                milestone_id: milestone.id,
                name: "wire login".into(),
                priority: Priority::High,
                flow_ids: vec![flow.id],
                ..Default::default()
            })
            .unwrap();
        Fixture {
            _env: env,
            store,
            task,
            flow,
            old_file,
            new_file,
        }
    }

    #[test]
    fn test_context_collects_flows_files_and_themes() {
        let mut fx = fixture();
        let ctx = fx
            .store
            .get_work_context(WorkKind::Task, fx.task.id, ContextOptions::default())
            .unwrap();
        assert!(!ctx.is_partial());
        assert_eq!(ctx.flows.len(), 1);
        assert_eq!(ctx.flows[0].themes[0].name, "auth");
        assert_eq!(ctx.milestone.unwrap().name, "M");
        assert_eq!(ctx.completion_path.unwrap().name, "Core");
        // newest first
        let ids: Vec<i64> = ctx.files.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![fx.new_file, fx.old_file]);

        // touching the old file moves it to the front
        let fid = fx
            .store
            .reserve_function(&FunctionReservation {
                file_id: fx.old_file,
                preliminary_name: "check".into(),
                ..Default::default()
            })
            .unwrap();
        fx.store
            .finalize_function(
                fid,
                &FunctionFinalization {
                    name: format!("check_ID_{}", fid),
                    ..Default::default()
                },
            )
            .unwrap();
        let ctx = fx
            .store
            .get_work_context(WorkKind::Task, fx.task.id, ContextOptions::default())
            .unwrap();
        assert_eq!(ctx.files[0].id, fx.old_file);
        assert_eq!(ctx.functions.len(), 1);
    }

    #[test]
    fn test_file_in_two_flows_listed_once() {
        let mut fx = fixture();
        let second = fx.store.add_flow("logout", None).unwrap();
        fx.store.link_file_flow(fx.old_file, second.id).unwrap();
        fx.store
            .set_flows(WorkKind::Task, fx.task.id, &[fx.flow.id, second.id])
            .unwrap();
        let ctx = fx
            .store
            .get_work_context(WorkKind::Task, fx.task.id, ContextOptions::default())
            .unwrap();
        assert_eq!(ctx.flows.len(), 2);
        assert_eq!(ctx.files.len(), 2);
    }

    #[test]
    fn test_missing_flow_becomes_warning() {
        let fx = fixture();
        fx.store
            .project
            .execute_batch(&format!(
                "PRAGMA foreign_keys = OFF; DELETE FROM flows WHERE id = {};",
                fx.flow.id
            ))
            .unwrap();
        let ctx = fx
            .store
            .get_work_context(WorkKind::Task, fx.task.id, ContextOptions::default())
            .unwrap();
        assert!(ctx.is_partial());
        assert!(ctx.warnings[0].contains(&format!("flow {}", fx.flow.id)));
        assert!(ctx.flows.is_empty());
        assert!(ctx.files.is_empty());
    }

    #[test]
    fn test_missing_work_item_is_not_found() {
        let fx = fixture();
        let err = fx
            .store
            .get_work_context(WorkKind::Sidequest, 404, ContextOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_subtask_inherits_parent_flows_and_optional_parts() {
        let mut fx = fixture();
        let subtask = fx
            .store
            .add_subtask(fx.task.id, "form", None, Priority::Medium)
            .unwrap();
        fx.store
            .add_item(ItemOwner::Subtask(subtask.id), "validate email", None)
            .unwrap();
        fx.store
            .add_note(NewNote::new("uses the v2 form").about(Table::Subtasks, subtask.id))
            .unwrap();

        let bare = fx
            .store
            .get_work_context(WorkKind::Subtask, subtask.id, ContextOptions::default())
            .unwrap();
        assert_eq!(bare.flows.len(), 1);
        assert!(bare.items.is_empty());
        assert!(bare.notes.is_empty());

        let full = fx
            .store
            .get_work_context(WorkKind::Subtask, subtask.id, ContextOptions::all())
            .unwrap();
        assert_eq!(full.items.len(), 1);
        assert_eq!(full.notes.len(), 1);
        assert!(matches!(full.work_item, WorkItem::Subtask(_)));
    }

    #[test]
    fn test_interactions_included_on_request() {
        let mut fx = fixture();
        let mut ids = Vec::new();
        for stem in ["a", "b"] {
            let fid = fx
                .store
                .reserve_function(&FunctionReservation {
                    file_id: fx.new_file,
                    preliminary_name: stem.into(),
                    ..Default::default()
                })
                .unwrap();
            fx.store
                .finalize_function(
                    fid,
                    &FunctionFinalization {
                        name: format!("{}_ID_{}", stem, fid),
                        ..Default::default()
                    },
                )
                .unwrap();
            ids.push(fid);
        }
        fx.store
            .add_interaction(ids[0], ids[1], InteractionType::Calls, None)
            .unwrap();
        let ctx = fx
            .store
            .get_work_context(WorkKind::Task, fx.task.id, ContextOptions::all())
            .unwrap();
        assert_eq!(ctx.interactions.len(), 1);
    }
}
