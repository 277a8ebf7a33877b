//! Organizational entities and the work breakdown.
//!
//! Themes and flows tag artifacts; completion path stages hold milestones,
//! milestones hold tasks, tasks hold subtasks and can be paused by
//! sidequests, and items are the smallest unit under any of the three.
//! Creators validate every parent before inserting.

use super::tiered::{ensure_exists, fields, get_typed, insert_row, select_typed};
use super::{Store, now};
use crate::models::{
    Flow, Interaction, InteractionType, Item, ItemOwner, ItemStatus, Milestone, Priority,
    Sidequest, Subtask, Task, Theme, TypeFunction, TypeFunctionRole, WorkKind, WorkStatus,
};
use crate::schema::Table;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

/// A task to create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub milestone_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub flow_ids: Vec<i64>,
}

/// A sidequest to create, pausing a task and optionally one of its subtasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSidequest {
    pub paused_task_id: i64,
    #[serde(default)]
    pub paused_subtask_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub flow_ids: Vec<i64>,
}

fn require_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("{} name is empty", what)));
    }
    Ok(())
}

/// Every flow ID must exist; duplicates are dropped, order kept.
fn checked_flow_ids(conn: &Connection, flow_ids: &[i64]) -> Result<Vec<i64>> {
    let mut unique = Vec::with_capacity(flow_ids.len());
    for id in flow_ids {
        if !unique.contains(id) {
            ensure_exists(conn, Table::Flows, *id)?;
            unique.push(*id);
        }
    }
    Ok(unique)
}

/// Insert a link row unless the same link already exists.
fn link(conn: &Connection, table: Table, a: (&str, i64), b: (&str, i64)) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT id FROM {} WHERE {} = ?1 AND {} = ?2",
                table.name(),
                a.0,
                b.0
            ),
            params![a.1, b.1],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let mut row = fields(json!({}));
    row.insert(a.0.to_string(), json!(a.1));
    row.insert(b.0.to_string(), json!(b.1));
    insert_row(conn, table, &row)
}

impl Store {
    pub fn add_theme(&mut self, name: &str, description: Option<&str>) -> Result<Theme> {
        require_name("Theme", name)?;
        let tx = self.project.transaction()?;
        let id = insert_row(
            &tx,
            Table::Themes,
            &fields(json!({"name": name, "description": description})),
        )?;
        let theme = get_typed(&tx, Table::Themes, id)?;
        tx.commit()?;
        info!(id, name, "added theme");
        Ok(theme)
    }

    pub fn add_flow(&mut self, name: &str, description: Option<&str>) -> Result<Flow> {
        require_name("Flow", name)?;
        let tx = self.project.transaction()?;
        let id = insert_row(
            &tx,
            Table::Flows,
            &fields(json!({"name": name, "description": description})),
        )?;
        let flow = get_typed(&tx, Table::Flows, id)?;
        tx.commit()?;
        info!(id, name, "added flow");
        Ok(flow)
    }

    pub fn get_theme(&self, id: i64) -> Result<Theme> {
        get_typed(&self.project, Table::Themes, id)
    }

    pub fn get_flow(&self, id: i64) -> Result<Flow> {
        get_typed(&self.project, Table::Flows, id)
    }

    pub fn get_flows(&self) -> Result<Vec<Flow>> {
        select_typed(&self.project, Table::Flows, &[], Some("name ASC"))
    }

    pub fn get_themes(&self) -> Result<Vec<Theme>> {
        select_typed(&self.project, Table::Themes, &[], Some("name ASC"))
    }

    /// Tag a flow with a theme. Linking twice returns the existing link.
    pub fn link_flow_theme(&mut self, flow_id: i64, theme_id: i64) -> Result<i64> {
        let tx = self.project.transaction()?;
        let id = link(&tx, Table::FlowThemes, ("flow_id", flow_id), ("theme_id", theme_id))?;
        tx.commit()?;
        Ok(id)
    }

    /// Attach a file to a flow. Linking twice returns the existing link.
    pub fn link_file_flow(&mut self, file_id: i64, flow_id: i64) -> Result<i64> {
        let tx = self.project.transaction()?;
        let id = link(&tx, Table::FileFlows, ("file_id", file_id), ("flow_id", flow_id))?;
        tx.commit()?;
        Ok(id)
    }

    /// Record the role a function plays for a type.
    pub fn add_type_function(
        &mut self,
        type_id: i64,
        function_id: i64,
        role: TypeFunctionRole,
    ) -> Result<TypeFunction> {
        let tx = self.project.transaction()?;
        let id = insert_row(
            &tx,
            Table::TypesFunctions,
            &fields(json!({
                "type_id": type_id,
                "function_id": function_id,
                "role": role.as_str(),
            })),
        )?;
        let link = get_typed(&tx, Table::TypesFunctions, id)?;
        tx.commit()?;
        Ok(link)
    }

    /// Record a directed interaction between two functions.
    pub fn add_interaction(
        &mut self,
        source_function_id: i64,
        target_function_id: i64,
        interaction_type: InteractionType,
        description: Option<&str>,
    ) -> Result<Interaction> {
        let tx = self.project.transaction()?;
        let id = insert_row(
            &tx,
            Table::Interactions,
            &fields(json!({
                "source_function_id": source_function_id,
                "target_function_id": target_function_id,
                "interaction_type": interaction_type.as_str(),
                "description": description,
            })),
        )?;
        let interaction = get_typed(&tx, Table::Interactions, id)?;
        tx.commit()?;
        Ok(interaction)
    }

    pub fn add_milestone(
        &mut self,
        completion_path_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Milestone> {
        require_name("Milestone", name)?;
        let tx = self.project.transaction()?;
        let id = insert_row(
            &tx,
            Table::Milestones,
            &fields(json!({
                "completion_path_id": completion_path_id,
                "name": name,
                "description": description,
            })),
        )?;
        let milestone = get_typed(&tx, Table::Milestones, id)?;
        tx.commit()?;
        info!(id, completion_path_id, "added milestone");
        Ok(milestone)
    }

    pub fn add_task(&mut self, task: NewTask) -> Result<Task> {
        require_name("Task", &task.name)?;
        let tx = self.project.transaction()?;
        let flow_ids = checked_flow_ids(&tx, &task.flow_ids)?;
        let id = insert_row(
            &tx,
            Table::Tasks,
            &fields(json!({
                "milestone_id": task.milestone_id,
                "name": task.name,
                "description": task.description,
                "priority": task.priority.as_str(),
                "flow_ids": flow_ids,
            })),
        )?;
        let created = get_typed(&tx, Table::Tasks, id)?;
        tx.commit()?;
        info!(id, milestone_id = task.milestone_id, "added task");
        Ok(created)
    }

    /// Add a subtask. Subtasks carry no flows of their own.
    pub fn add_subtask(
        &mut self,
        parent_task_id: i64,
        name: &str,
        description: Option<&str>,
        priority: Priority,
    ) -> Result<Subtask> {
        require_name("Subtask", name)?;
        let tx = self.project.transaction()?;
        let id = insert_row(
            &tx,
            Table::Subtasks,
            &fields(json!({
                "parent_task_id": parent_task_id,
                "name": name,
                "description": description,
                "priority": priority.as_str(),
            })),
        )?;
        let subtask = get_typed(&tx, Table::Subtasks, id)?;
        tx.commit()?;
        info!(id, parent_task_id, "added subtask");
        Ok(subtask)
    }

    /// Add a sidequest. A paused subtask must belong to the paused task.
    pub fn add_sidequest(&mut self, sidequest: NewSidequest) -> Result<Sidequest> {
        require_name("Sidequest", &sidequest.name)?;
        let tx = self.project.transaction()?;
        ensure_exists(&tx, Table::Tasks, sidequest.paused_task_id)?;
        if let Some(subtask_id) = sidequest.paused_subtask_id {
            let subtask: Subtask = get_typed(&tx, Table::Subtasks, subtask_id)?;
            if subtask.parent_task_id != sidequest.paused_task_id {
                return Err(Error::InvalidArgument(format!(
                    "subtask {} belongs to task {}, not task {}",
                    subtask_id, subtask.parent_task_id, sidequest.paused_task_id
                )));
            }
        }
        let flow_ids = checked_flow_ids(&tx, &sidequest.flow_ids)?;
        let id = insert_row(
            &tx,
            Table::Sidequests,
            &fields(json!({
                "paused_task_id": sidequest.paused_task_id,
                "paused_subtask_id": sidequest.paused_subtask_id,
                "name": sidequest.name,
                "description": sidequest.description,
                "priority": sidequest.priority.as_str(),
                "flow_ids": flow_ids,
            })),
        )?;
        let created = get_typed(&tx, Table::Sidequests, id)?;
        tx.commit()?;
        info!(id, paused_task_id = sidequest.paused_task_id, "added sidequest");
        Ok(created)
    }

    /// Add a pending item under a task, subtask or sidequest.
    pub fn add_item(&mut self, owner: ItemOwner, name: &str, description: Option<&str>) -> Result<Item> {
        require_name("Item", name)?;
        let tx = self.project.transaction()?;
        ensure_exists(&tx, Table::parse_any(owner.table_name())?, owner.id())?;
        let id = insert_row(
            &tx,
            Table::Items,
            &fields(json!({
                "reference_table": owner.table_name(),
                "reference_id": owner.id(),
                "name": name,
                "description": description,
            })),
        )?;
        let item = get_typed(&tx, Table::Items, id)?;
        tx.commit()?;
        Ok(item)
    }

    /// Replace the flows of a task or sidequest. Subtasks inherit their
    /// task's flows and cannot hold their own.
    pub fn set_flows(&mut self, kind: WorkKind, id: i64, flow_ids: &[i64]) -> Result<Vec<i64>> {
        let table = match kind {
            WorkKind::Task => Table::Tasks,
            WorkKind::Sidequest => Table::Sidequests,
            WorkKind::Subtask => {
                return Err(Error::InvalidArgument(
                    "subtasks inherit the flows of their parent task".to_string(),
                ));
            }
        };
        let tx = self.project.transaction()?;
        ensure_exists(&tx, table, id)?;
        let flow_ids = checked_flow_ids(&tx, flow_ids)?;
        tx.execute(
            &format!(
                "UPDATE {} SET flow_ids = ?1, updated_at = ?2 WHERE id = ?3",
                table.name()
            ),
            params![json!(flow_ids).to_string(), now(), id],
        )?;
        tx.commit()?;
        info!(table = %table, id, flows = flow_ids.len(), "set flows");
        Ok(flow_ids)
    }

    /// Set the status of a milestone, task, subtask or sidequest.
    pub fn set_work_status(&mut self, table: Table, id: i64, status: WorkStatus) -> Result<()> {
        if !matches!(
            table,
            Table::Milestones | Table::Tasks | Table::Subtasks | Table::Sidequests
        ) {
            return Err(Error::InvalidArgument(format!(
                "'{}' has no work status",
                table
            )));
        }
        let changed = self.project.execute(
            &format!(
                "UPDATE {} SET status = ?1, updated_at = ?2 WHERE id = ?3",
                table.name()
            ),
            params![status.as_str(), now(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("{} {} not found", table, id)));
        }
        info!(table = %table, id, status = %status, "status changed");
        Ok(())
    }

    /// Move an item forward: pending -> in_progress -> completed. Skipping
    /// ahead is allowed, going back is not.
    pub fn update_item_status(&mut self, id: i64, status: ItemStatus) -> Result<Item> {
        let tx = self.project.transaction()?;
        let item: Item = get_typed(&tx, Table::Items, id)?;
        let rank = |s: ItemStatus| match s {
            ItemStatus::Pending => 0,
            ItemStatus::InProgress => 1,
            ItemStatus::Completed => 2,
        };
        if rank(status) <= rank(item.status) {
            return Err(Error::InvalidState(format!(
                "item {} is {}; status can only move forward",
                id, item.status
            )));
        }
        tx.execute(
            "UPDATE items SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now(), id],
        )?;
        let item = get_typed(&tx, Table::Items, id)?;
        tx.commit()?;
        info!(id, status = %status, "item status changed");
        Ok(item)
    }

    pub fn get_milestone(&self, id: i64) -> Result<Milestone> {
        get_typed(&self.project, Table::Milestones, id)
    }

    pub fn get_milestones_for_path(&self, completion_path_id: i64) -> Result<Vec<Milestone>> {
        select_typed(
            &self.project,
            Table::Milestones,
            &[("completion_path_id", json!(completion_path_id))],
            None,
        )
    }

    pub fn get_task(&self, id: i64) -> Result<Task> {
        get_typed(&self.project, Table::Tasks, id)
    }

    pub fn get_tasks_for_milestone(&self, milestone_id: i64) -> Result<Vec<Task>> {
        select_typed(
            &self.project,
            Table::Tasks,
            &[("milestone_id", json!(milestone_id))],
            None,
        )
    }

    /// Tasks that are not completed, highest priority first.
    pub fn get_incomplete_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = select_typed(
            &self.project,
            Table::Tasks,
            &[("status", json!(["pending", "in_progress", "blocked"]))],
            None,
        )?;
        tasks.sort_by_key(|t| {
            std::cmp::Reverse(match t.priority {
                Priority::Critical => 3,
                Priority::High => 2,
                Priority::Medium => 1,
                Priority::Low => 0,
            })
        });
        Ok(tasks)
    }

    pub fn get_subtask(&self, id: i64) -> Result<Subtask> {
        get_typed(&self.project, Table::Subtasks, id)
    }

    pub fn get_subtasks(&self, parent_task_id: i64) -> Result<Vec<Subtask>> {
        select_typed(
            &self.project,
            Table::Subtasks,
            &[("parent_task_id", json!(parent_task_id))],
            None,
        )
    }

    pub fn get_sidequest(&self, id: i64) -> Result<Sidequest> {
        get_typed(&self.project, Table::Sidequests, id)
    }

    /// Sidequests currently pausing a task.
    pub fn get_sidequests_for_task(&self, task_id: i64) -> Result<Vec<Sidequest>> {
        select_typed(
            &self.project,
            Table::Sidequests,
            &[("paused_task_id", json!(task_id))],
            None,
        )
    }

    pub fn get_item(&self, id: i64) -> Result<Item> {
        get_typed(&self.project, Table::Items, id)
    }

    pub fn get_items_for(&self, owner: ItemOwner) -> Result<Vec<Item>> {
        select_typed(
            &self.project,
            Table::Items,
            &[
                ("reference_table", json!(owner.table_name())),
                ("reference_id", json!(owner.id())),
            ],
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::test_utils::TestEnv;

    fn with_task() -> (TestEnv, Store, Task) {
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
        (env, store, task)
    }

    #[test]
    fn test_add_task_validates_parents_and_flows() {
        let (_env, mut store, task) = with_task();
        let err = store
            .add_task(NewTask {
                milestone_id: 999,
                name: "orphan".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = store
            .add_task(NewTask {
                milestone_id: task.milestone_id,
                name: "bad flow".into(),
                flow_ids: vec![42],
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_flow_ids_deduplicated() {
        let (_env, mut store, task) = with_task();
        let flow = store.add_flow("f", None).unwrap();
        let ids = store
            .set_flows(WorkKind::Task, task.id, &[flow.id, flow.id])
            .unwrap();
        assert_eq!(ids, vec![flow.id]);
        assert_eq!(store.get_task(task.id).unwrap().flow_ids, vec![flow.id]);

        let err = store.set_flows(WorkKind::Subtask, 1, &[flow.id]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_sidequest_subtask_must_belong_to_task() {
        let (_env, mut store, task) = with_task();
        let other = store
            .add_task(NewTask {
                milestone_id: task.milestone_id,
                name: "other".into(),
                ..Default::default()
            })
            .unwrap();
        let subtask = store
            .add_subtask(other.id, "s", None, Priority::Low)
            .unwrap();
        let err = store
            .add_sidequest(NewSidequest {
                paused_task_id: task.id,
                paused_subtask_id: Some(subtask.id),
                name: "sq".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_item_status_moves_forward_only() {
        let (_env, mut store, task) = with_task();
        let item = store.add_item(ItemOwner::Task(task.id), "write", None).unwrap();
        assert_eq!(item.status, ItemStatus::Pending);

        let item = store
            .update_item_status(item.id, ItemStatus::InProgress)
            .unwrap();
        assert_eq!(item.status, ItemStatus::InProgress);

        let err = store
            .update_item_status(item.id, ItemStatus::Pending)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let fields = fields(json!({"name": "rewrite"}));
        let err = store.update(Table::Items, item.id, &fields).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_item_owner_must_exist() {
        let (_env, mut store, _) = with_task();
        let err = store
            .add_item(ItemOwner::Sidequest(55), "x", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_links_are_idempotent() {
        let (_env, mut store, _) = with_task();
        let flow = store.add_flow("f", None).unwrap();
        let theme = store.add_theme("t", None).unwrap();
        let first = store.link_flow_theme(flow.id, theme.id).unwrap();
        let second = store.link_flow_theme(flow.id, theme.id).unwrap();
        assert_eq!(first, second);

        let err = store.link_flow_theme(flow.id, 77).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_open_tasks_sorted_by_priority() {
        let (_env, mut store, task) = with_task();
        let urgent = store
            .add_task(NewTask {
                milestone_id: task.milestone_id,
                name: "urgent".into(),
                priority: Priority::Critical,
                ..Default::default()
            })
            .unwrap();
        store
            .set_work_status(Table::Tasks, task.id, WorkStatus::Completed)
            .unwrap();
        let open = store.get_incomplete_tasks().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, urgent.id);
    }

    #[test]
    fn test_duplicate_theme_name_is_invalid_state() {
        let (_env, mut store, _) = with_task();
        store.add_theme("ux", None).unwrap();
        let err = store.add_theme("ux", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
