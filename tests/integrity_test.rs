//! Integration tests for referential integrity on delete.
//!
//! These tests verify:
//! - protected deletes are refused while live dependents exist, and nothing
//!   is removed as a side effect
//! - the blocking report names each dependent and how to resolve it
//! - only pending items can be deleted
//! - generic deletes of referenced rows and generic parent-link rewrites are
//!   refused
//! - `fetch_by_ids` with no IDs is only allowed on the read-only catalog

mod common;

use common::TestEnv;
use serde_json::json;
use waymark::models::{InteractionType, ItemOwner, ItemStatus, Priority, TypeFunctionRole};
use waymark::schema::{Database, Table};
use waymark::storage::hierarchy::{NewSidequest, NewTask};
use waymark::storage::integrity::DeleteAudit;
use waymark::storage::notes::NoteFilter;
use waymark::storage::reservation::{FunctionReservation, TypeReservation};
use waymark::{Error, ErrorKind, Store};

fn blocked(result: waymark::Result<waymark::storage::integrity::DeleteOutcome>) -> Box<waymark::BlockingReport> {
    match result {
        Err(Error::BlockingReferences(report)) => report,
        Err(other) => panic!("expected BlockingReferences, got {:?}", other),
        Ok(outcome) => panic!("delete of {} {} should have been refused", outcome.table, outcome.id),
    }
}

fn exists(store: &Store, table: Table, id: i64) -> bool {
    !store.fetch_by_ids(table, &[id]).unwrap().is_empty()
}

#[test]
fn test_file_delete_blocked_until_function_removed() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    for i in 1..=9 {
        env.tracked_file(&mut store, "pad", &format!("f{}", i), "rs");
    }
    let file_id = env.tracked_file(&mut store, "src", "target", "rs");
    assert_eq!(file_id, 10);
    let fn_id = store
        .reserve_function(&FunctionReservation {
            file_id,
            preliminary_name: "run".into(),
            ..Default::default()
        })
        .unwrap();

    let report = blocked(store.delete_file(file_id, &DeleteAudit::new("cleanup")));
    assert_eq!(report.total(), 1);
    assert_eq!(report.blockers[0].table, Table::Functions);
    assert_eq!(report.blockers[0].field, "file_id");
    assert_eq!(report.blockers[0].rows[0].id, fn_id);
    assert!(!report.resolution_steps.is_empty());
    assert!(report.to_string().contains("Cannot delete files 10"));
    assert!(exists(&store, Table::Functions, fn_id));

    store
        .delete_function(fn_id, &DeleteAudit::new("unused"))
        .unwrap();
    let outcome = store
        .delete_file(file_id, &DeleteAudit::new("cleanup"))
        .unwrap();
    assert!(!exists(&store, Table::Files, file_id));

    let note = store.get_note(outcome.note_id).unwrap();
    assert_eq!(note.reference_id, Some(file_id));
    assert!(note.content.contains("cleanup"));
}

#[test]
fn test_no_silent_cascade_on_any_protected_table() {
    let env = TestEnv::new();
    let mut store = env.init_store();

    let file_id = env.tracked_file(&mut store, "src", "core", "rs");
    let caller = store
        .reserve_function(&FunctionReservation {
            file_id,
            preliminary_name: "caller".into(),
            ..Default::default()
        })
        .unwrap();
    let callee = store
        .reserve_function(&FunctionReservation {
            file_id,
            preliminary_name: "callee".into(),
            ..Default::default()
        })
        .unwrap();
    let interaction = store
        .add_interaction(caller, callee, InteractionType::Calls, None)
        .unwrap();
    let type_id = store
        .reserve_type(&TypeReservation {
            file_id,
            preliminary_name: "Point".into(),
            ..Default::default()
        })
        .unwrap();
    let role = store
        .add_type_function(type_id, callee, TypeFunctionRole::Constructor)
        .unwrap();

    let theme = store.add_theme("payments", None).unwrap();
    let flow = store.add_flow("refund", None).unwrap();
    let flow_theme = store.link_flow_theme(flow.id, theme.id).unwrap();

    let path = store.add_completion_path("Build", None, None).unwrap();
    let milestone = store.add_milestone(path.id, "MVP", None).unwrap();
    let task = store
        .add_task(NewTask {
            milestone_id: milestone.id,
            name: "refunds".into(),
            flow_ids: vec![flow.id],
            ..Default::default()
        })
        .unwrap();
    let subtask = store
        .add_subtask(task.id, "partial refunds", None, Priority::Low)
        .unwrap();
    let sidequest = store
        .add_sidequest(NewSidequest {
            paused_task_id: task.id,
            paused_subtask_id: Some(subtask.id),
            name: "fix currency rounding".into(),
            ..Default::default()
        })
        .unwrap();
    let item = store
        .add_item(ItemOwner::Sidequest(sidequest.id), "round half even", None)
        .unwrap();
    store
        .update_item_status(item.id, ItemStatus::InProgress)
        .unwrap();

    let audit = DeleteAudit::new("attempt");
    let cases: Vec<(Table, i64, Table, i64)> = vec![
        (Table::Files, file_id, Table::Functions, caller),
        (Table::Functions, caller, Table::Interactions, interaction.id),
        (Table::Types, type_id, Table::TypesFunctions, role.id),
        (Table::Themes, theme.id, Table::FlowThemes, flow_theme),
        (Table::Flows, flow.id, Table::Tasks, task.id),
        (Table::CompletionPath, path.id, Table::Milestones, milestone.id),
        (Table::Milestones, milestone.id, Table::Tasks, task.id),
        (Table::Tasks, task.id, Table::Subtasks, subtask.id),
        (Table::Subtasks, subtask.id, Table::Sidequests, sidequest.id),
        (Table::Sidequests, sidequest.id, Table::Items, item.id),
    ];
    for (table, id, dependent, dependent_id) in cases {
        let result = match table {
            Table::Files => store.delete_file(id, &audit),
            Table::Functions => store.delete_function(id, &audit),
            Table::Types => store.delete_type(id, &audit),
            Table::Themes => store.delete_theme(id, &audit),
            Table::Flows => store.delete_flow(id, &audit),
            Table::CompletionPath => store.delete_completion_path(id, &audit),
            Table::Milestones => store.delete_milestone(id, &audit),
            Table::Tasks => store.delete_task(id, &audit),
            Table::Subtasks => store.delete_subtask(id, &audit),
            Table::Sidequests => store.delete_sidequest(id, &audit),
            other => unreachable!("{} is not protected", other),
        };
        let report = blocked(result);
        assert!(
            report.blockers.iter().any(|b| b.table == dependent),
            "{} {} should be blocked by {}",
            table,
            id,
            dependent
        );
        assert!(exists(&store, table, id));
        assert!(exists(&store, dependent, dependent_id));
    }

    // Generic delete on a protected table points at the validated one.
    let err = store.delete(Table::Files, file_id, &audit).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let Error::Forbidden { use_instead, .. } = err else {
        unreachable!()
    };
    assert_eq!(use_instead.as_deref(), Some("delete_file"));
}

#[test]
fn test_pending_items_removed_with_owner() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let path = store.add_completion_path("P", None, None).unwrap();
    let milestone = store.add_milestone(path.id, "M", None).unwrap();
    let task = store
        .add_task(NewTask {
            milestone_id: milestone.id,
            name: "T".into(),
            ..Default::default()
        })
        .unwrap();
    let a = store.add_item(ItemOwner::Task(task.id), "a", None).unwrap();
    let b = store.add_item(ItemOwner::Task(task.id), "b", None).unwrap();

    let outcome = store
        .delete_task(task.id, &DeleteAudit::new("descoped"))
        .unwrap();
    assert_eq!(outcome.removed_items, vec![a.id, b.id]);
    assert!(!exists(&store, Table::Items, a.id));

    let note = store.get_note(outcome.note_id).unwrap();
    assert!(note.content.contains("descoped"));
}

#[test]
fn test_only_pending_items_can_be_deleted() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let path = store.add_completion_path("P", None, None).unwrap();
    let milestone = store.add_milestone(path.id, "M", None).unwrap();
    let task = store
        .add_task(NewTask {
            milestone_id: milestone.id,
            name: "T".into(),
            ..Default::default()
        })
        .unwrap();
    let owner = ItemOwner::Task(task.id);
    let pending = store.add_item(owner, "pending", None).unwrap();
    let started = store.add_item(owner, "started", None).unwrap();
    let done = store.add_item(owner, "done", None).unwrap();
    store
        .update_item_status(started.id, ItemStatus::InProgress)
        .unwrap();
    store
        .update_item_status(done.id, ItemStatus::Completed)
        .unwrap();

    let audit = DeleteAudit::default();
    let kinds: Vec<ErrorKind> = [started.id, done.id]
        .iter()
        .map(|id| store.delete_item(*id, &audit).unwrap_err().kind())
        .collect();
    assert_eq!(kinds, vec![ErrorKind::InvalidState, ErrorKind::InvalidState]);
    assert!(exists(&store, Table::Items, started.id));
    assert!(exists(&store, Table::Items, done.id));

    store.delete_item(pending.id, &audit).unwrap();
    assert!(!exists(&store, Table::Items, pending.id));
}

#[test]
fn test_empty_id_list_only_on_read_only_catalog() {
    let env = TestEnv::new();
    let store = env.init_store();
    for table in Table::ALL {
        let result = store.fetch_by_ids(table, &[]);
        if table.database() == Database::Core {
            let rows = result.unwrap();
            if table == Table::Helpers {
                assert!(!rows.is_empty());
            }
        } else {
            assert_eq!(
                result.unwrap_err().kind(),
                ErrorKind::InvalidArgument,
                "{} should refuse an empty ID list",
                table
            );
        }
    }
}

#[test]
fn test_simple_delete_records_note_in_project() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let row = store
        .insert(
            Table::TrackingSettings,
            &json!({"feature_name": "auto_notes", "enabled": true})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
    let id = row["id"].as_i64().unwrap();

    store
        .delete(Table::TrackingSettings, id, &DeleteAudit::new("reset"))
        .unwrap();
    assert!(!exists(&store, Table::TrackingSettings, id));

    let notes = store
        .get_notes(&NoteFilter {
            reference_table: Some(Table::TrackingSettings),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(notes.len(), 1);
}

#[test]
fn test_project_and_notes_cannot_be_deleted() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let project = store.init_project("p", None, &[]).unwrap();
    let err = store
        .delete(Table::Project, project.id, &DeleteAudit::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let note = store
        .add_note(waymark::storage::notes::NewNote::new("keep"))
        .unwrap();
    let err = store
        .delete(Table::Notes, note.id, &DeleteAudit::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[test]
fn test_directive_delete_blocked_by_executions() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let directive = store
        .insert(
            Table::UserDirectives,
            &json!({"name": "nightly", "trigger_type": "manual"})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
    let directive_id = directive["id"].as_i64().unwrap();
    let run = store
        .insert(
            Table::DirectiveExecutions,
            &json!({"directive_id": directive_id}).as_object().cloned().unwrap(),
        )
        .unwrap();
    let run_id = run["id"].as_i64().unwrap();

    let report = blocked(store.delete(Table::UserDirectives, directive_id, &DeleteAudit::default()));
    assert_eq!(report.blockers.len(), 1);
    assert_eq!(report.blockers[0].table, Table::DirectiveExecutions);
    assert_eq!(report.blockers[0].rows[0].id, run_id);
    assert!(report.resolution_steps[0].contains("directive_executions"));
    assert!(exists(&store, Table::UserDirectives, directive_id));
    assert!(
        store
            .check_delete(Table::UserDirectives, directive_id)
            .unwrap()
            .is_some()
    );

    store
        .delete(Table::DirectiveExecutions, run_id, &DeleteAudit::default())
        .unwrap();
    let outcome = store
        .delete(Table::UserDirectives, directive_id, &DeleteAudit::new("retired"))
        .unwrap();
    assert!(!exists(&store, Table::UserDirectives, directive_id));
    let note = store.get_note(outcome.note_id).unwrap();
    assert!(note.content.contains("retired"));
}

#[test]
fn test_generic_update_cannot_move_rows_between_parents() {
    let env = TestEnv::new();
    let mut store = env.init_store();
    let path = store.add_completion_path("Build", None, None).unwrap();
    let other_path = store.add_completion_path("Ship", None, None).unwrap();
    let milestone = store.add_milestone(path.id, "MVP", None).unwrap();
    let mut tasks = Vec::new();
    for name in ["checkout", "search"] {
        tasks.push(
            store
                .add_task(NewTask {
                    milestone_id: milestone.id,
                    name: name.into(),
                    ..Default::default()
                })
                .unwrap(),
        );
    }
    let own_subtask = store
        .add_subtask(tasks[0].id, "cart totals", None, Priority::Medium)
        .unwrap();
    let foreign_subtask = store
        .add_subtask(tasks[1].id, "ranking", None, Priority::Medium)
        .unwrap();
    let sidequest = store
        .add_sidequest(NewSidequest {
            paused_task_id: tasks[0].id,
            paused_subtask_id: Some(own_subtask.id),
            name: "fix rounding".into(),
            ..Default::default()
        })
        .unwrap();

    let moves = [
        (
            Table::Sidequests,
            sidequest.id,
            json!({"paused_subtask_id": foreign_subtask.id}),
            "add_sidequest",
        ),
        (
            Table::Sidequests,
            sidequest.id,
            json!({"paused_task_id": tasks[1].id}),
            "add_sidequest",
        ),
        (
            Table::Subtasks,
            own_subtask.id,
            json!({"parent_task_id": tasks[1].id}),
            "add_subtask",
        ),
        (
            Table::Tasks,
            tasks[0].id,
            json!({"milestone_id": milestone.id, "name": "cart"}),
            "add_task",
        ),
        (
            Table::Milestones,
            milestone.id,
            json!({"completion_path_id": other_path.id}),
            "add_milestone",
        ),
    ];
    for (table, id, fields, creator) in moves {
        let err = store
            .update(table, id, &fields.as_object().cloned().unwrap())
            .unwrap_err();
        match err {
            Error::Forbidden { use_instead, .. } => {
                assert_eq!(use_instead.as_deref(), Some(creator), "{}", table)
            }
            other => panic!("{} update should be forbidden, got {:?}", table, other),
        }
    }

    let sidequest_row = store.fetch_by_ids(Table::Sidequests, &[sidequest.id]).unwrap();
    assert_eq!(sidequest_row[0]["paused_subtask_id"], json!(own_subtask.id));
    assert_eq!(store.get_task(tasks[0].id).unwrap().name, "checkout");

    let renamed = store
        .update(
            Table::Milestones,
            milestone.id,
            &json!({"name": "Beta"}).as_object().cloned().unwrap(),
        )
        .unwrap();
    assert_eq!(renamed["name"], json!("Beta"));
}
