//! The project singleton: identity, lifecycle and version-control sync.

use super::notes::{NewNote, append_note};
use super::tiered::{fields, get_typed, insert_row, row_id, select_typed, select_where};
use super::{Store, now};
use crate::collab::VcsCollaborator;
use crate::models::{FileRecord, NoteSource, NoteType, Project, ProjectStatus, Row};
use crate::schema::Table;
use crate::{Error, Result};
use rusqlite::{Connection, params};
use serde_json::json;
use tracing::info;

fn project_id(conn: &Connection) -> Result<i64> {
    let rows = select_where(conn, Table::Project, &[], None, Some(1))?;
    rows.first().map(row_id).ok_or_else(|| {
        Error::NotFound("project is not initialized; call init_project first".to_string())
    })
}

impl Store {
    /// Create the project singleton.
    pub fn init_project(&mut self, name: &str, purpose: Option<&str>, goals: &[String]) -> Result<Project> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("Project name is empty".to_string()));
        }
        let tx = self.project.transaction()?;
        if let Some(existing) = select_where(&tx, Table::Project, &[], None, Some(1))?.first() {
            return Err(Error::InvalidState(format!(
                "project is already initialized (id {}); use update_project",
                row_id(existing)
            )));
        }
        let id = insert_row(
            &tx,
            Table::Project,
            &fields(json!({"name": name, "purpose": purpose, "goals": goals})),
        )?;
        let project = get_typed(&tx, Table::Project, id)?;
        tx.commit()?;
        info!(id, name, "project initialized");
        Ok(project)
    }

    pub fn get_project(&self) -> Result<Project> {
        let id = project_id(&self.project)?;
        get_typed(&self.project, Table::Project, id)
    }

    /// Change name, purpose, goals or status.
    pub fn update_project(&mut self, changes: &Row) -> Result<Project> {
        let id = project_id(&self.project)?;
        self.update(Table::Project, id, changes)?;
        self.get_project()
    }

    pub fn set_project_status(&mut self, status: ProjectStatus) -> Result<Project> {
        self.update_project(&fields(json!({"status": status.as_str()})))
    }

    /// Bump the project version and record why.
    pub fn record_evolution(&mut self, reason: &str, source: NoteSource) -> Result<Project> {
        if reason.trim().is_empty() {
            return Err(Error::InvalidArgument("Evolution reason is empty".to_string()));
        }
        let tx = self.project.transaction()?;
        let id = project_id(&tx)?;
        tx.execute(
            "UPDATE project SET version = version + 1, updated_at = ?1 WHERE id = ?2",
            params![now(), id],
        )?;
        let project: Project = get_typed(&tx, Table::Project, id)?;
        append_note(
            &tx,
            &NewNote::new(format!("v{}: {}", project.version, reason))
                .of_type(NoteType::Evolution)
                .about(Table::Project, id)
                .from_source(source),
        )?;
        tx.commit()?;
        info!(version = project.version, "project evolved");
        Ok(project)
    }

    /// Store the last known commit and when it was seen.
    pub fn record_vcs_state(&mut self, hash: &str, synced_at: Option<&str>) -> Result<Project> {
        let id = project_id(&self.project)?;
        let synced_at = match synced_at {
            Some(text) => chrono::DateTime::parse_from_rfc3339(text)
                .map_err(|e| {
                    Error::InvalidArgument(format!("synced_at '{}' is not RFC 3339: {}", text, e))
                })?
                .with_timezone(&chrono::Utc)
                .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            None => now(),
        };
        self.project.execute(
            "UPDATE project SET last_known_git_hash = ?1, last_git_sync = ?2, updated_at = ?3 WHERE id = ?4",
            params![hash, synced_at, now(), id],
        )?;
        info!(hash, "recorded vcs state");
        self.get_project()
    }

    /// Record the collaborator's current commit as the last known one.
    pub fn sync_with_vcs(&mut self, vcs: &dyn VcsCollaborator) -> Result<Project> {
        let hash = vcs.current_commit_hash()?;
        self.record_vcs_state(&hash, None)
    }

    /// Finalized files whose path changed since the last recorded commit.
    pub fn changed_tracked_files(&self, vcs: &dyn VcsCollaborator) -> Result<Vec<FileRecord>> {
        let project = self.get_project()?;
        let Some(hash) = project.last_known_git_hash else {
            return Err(Error::InvalidState(
                "no commit recorded yet; call sync_with_vcs first".to_string(),
            ));
        };
        let changed = vcs.diff_since(&hash)?;
        if changed.is_empty() {
            return Ok(Vec::new());
        }
        select_typed(
            &self.project,
            Table::Files,
            &[("path", json!(changed)), ("is_reserved", json!(false))],
            Some("path ASC"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::collab::fakes::FakeVcs;
    use crate::storage::notes::NoteFilter;
    use crate::storage::reservation::{FileFinalization, FileReservation};
    use crate::test_utils::TestEnv;

    #[test]
    fn test_init_project_once() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        assert_eq!(store.get_project().unwrap_err().kind(), ErrorKind::NotFound);

        let project = store
            .init_project("waymark", Some("track metadata"), &["ship".to_string()])
            .unwrap();
        assert_eq!(project.version, 1);
        assert_eq!(project.goals, vec!["ship".to_string()]);
        assert_eq!(project.status, ProjectStatus::Active);

        let err = store.init_project("again", None, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_record_evolution_bumps_version_and_notes() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        store.init_project("p", None, &[]).unwrap();
        let project = store
            .record_evolution("switched to async", NoteSource::User)
            .unwrap();
        assert_eq!(project.version, 2);

        let notes = store
            .get_notes(&NoteFilter {
                note_type: Some(NoteType::Evolution),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].content.contains("switched to async"));
    }

    #[test]
    fn test_version_and_vcs_fields_are_guarded() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        store.init_project("p", None, &[]).unwrap();
        let err = store
            .update_project(&fields(json!({"version": 9})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let project = store
            .update_project(&fields(json!({"purpose": "new"})))
            .unwrap();
        assert_eq!(project.purpose.as_deref(), Some("new"));

        let project = store.set_project_status(ProjectStatus::Paused).unwrap();
        assert_eq!(project.status, ProjectStatus::Paused);
    }

    #[test]
    fn test_changed_tracked_files() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        store.init_project("p", None, &[]).unwrap();
        let vcs = FakeVcs {
            hash: "abc123".into(),
            branch: "main".into(),
            changed: vec!["src/lib-ID_1.rs".into(), "README.md".into()],
        };
        let err = store.changed_tracked_files(&vcs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let id = store
            .reserve_file(&FileReservation {
                path: "src/lib.rs".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(id, 1);
        env.write_artifact("src/lib-ID_1.rs", "");
        store
            .finalize_file(
                id,
                &FileFinalization {
                    name: "lib-ID_1.rs".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let project = store.sync_with_vcs(&vcs).unwrap();
        assert_eq!(project.last_known_git_hash.as_deref(), Some("abc123"));
        assert!(project.last_git_sync.is_some());

        let changed = store.changed_tracked_files(&vcs).unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].path, "src/lib-ID_1.rs");
    }
}
