//! Project operations.

use super::short_id::{self, Namespace};
use super::{Database, now_ts};
use crate::error::ToolError;
use crate::query::ProjectLookup;
use crate::query::compile::complete_status_list;
use crate::types::{Project, ProjectStatus};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub fn parse_project_row(row: &Row) -> rusqlite::Result<Project> {
    let status: String = row.get("status")?;
    Ok(Project {
        id: row.get("id")?,
        short_id: row.get("short_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status: ProjectStatus::parse(&status).unwrap_or_default(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Look up a project by primary id or short id using an existing connection.
pub(crate) fn find_project_internal(conn: &Connection, reference: &str) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            "SELECT * FROM projects WHERE id = ?1 OR short_id = lower(?1) LIMIT 1",
            params![reference],
            parse_project_row,
        )
        .optional()?;
    Ok(project)
}

impl ProjectLookup for Connection {
    fn resolve_project(&self, reference: &str) -> Option<String> {
        self.query_row(
            "SELECT id FROM projects WHERE id = ?1 OR short_id = lower(?1) LIMIT 1",
            params![reference.trim()],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or_else(|e| {
            warn!(project = %reference, error = %e, "Project lookup failed; condition degrades");
            None
        })
    }
}

impl Database {
    /// Create a project with a freshly allocated short id.
    pub fn create_project(&self, name: &str, description: Option<String>) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ToolError::missing_field("name").into());
        }
        let id = Uuid::now_v7().to_string();
        let now = now_ts();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let short_id = short_id::allocate(&tx, Namespace::Projects, name)?;
            tx.execute(
                "INSERT INTO projects (id, short_id, name, description, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?5)",
                params![&id, &short_id, name, &description, &now],
            )?;
            tx.commit()?;

            info!(project_id = %id, short_id = %short_id, "Project created");

            Ok(Project {
                id,
                short_id,
                name: name.to_string(),
                description,
                status: ProjectStatus::Active,
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    /// List projects ordered by short id.
    pub fn list_projects(&self, include_archived: bool) -> Result<Vec<Project>> {
        self.with_conn(|conn| {
            let sql = if include_archived {
                "SELECT * FROM projects ORDER BY short_id"
            } else {
                "SELECT * FROM projects WHERE status = 'active' ORDER BY short_id"
            };
            let mut stmt = conn.prepare(sql)?;
            let projects = stmt
                .query_map([], parse_project_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(projects)
        })
    }

    /// Rename or re-describe a project. The short id is kept.
    pub fn update_project(
        &self,
        reference: &str,
        name: Option<String>,
        description: Option<Option<String>>,
    ) -> Result<Project> {
        let now = now_ts();
        self.with_conn(|conn| {
            let project = find_project_internal(conn, reference)?
                .ok_or_else(|| ToolError::project_not_found(reference))?;

            let new_name = match name {
                Some(n) if n.trim().is_empty() => {
                    return Err(ToolError::missing_field("name").into());
                }
                Some(n) => n.trim().to_string(),
                None => project.name.clone(),
            };
            let new_description = description.unwrap_or(project.description.clone());

            conn.execute(
                "UPDATE projects SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
                params![&new_name, &new_description, &now, &project.id],
            )?;

            Ok(Project {
                name: new_name,
                description: new_description,
                updated_at: now,
                ..project
            })
        })
    }

    /// Archive or reactivate a project.
    ///
    /// Archiving fails if the project is the only active project of some
    /// incomplete task.
    pub fn set_project_status(&self, reference: &str, status: ProjectStatus) -> Result<Project> {
        let now = now_ts();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let project = find_project_internal(&tx, reference)?
                .ok_or_else(|| ToolError::project_not_found(reference))?;

            if status == ProjectStatus::Archived && project.status == ProjectStatus::Active {
                let orphan_sql = format!(
                    "SELECT t.display_number FROM tasks t
                     JOIN task_projects tp ON tp.task_id = t.id AND tp.project_id = ?1
                     WHERE t.status NOT IN ({})
                     AND NOT EXISTS (
                         SELECT 1 FROM task_projects other
                         JOIN projects p ON p.id = other.project_id
                         WHERE other.task_id = t.id
                         AND other.project_id != ?1
                         AND p.status = 'active'
                     )
                     ORDER BY t.display_number
                     LIMIT 1",
                    complete_status_list()
                );
                let orphan: Option<i64> = tx
                    .query_row(&orphan_sql, params![&project.id], |row| row.get(0))
                    .optional()?;
                if let Some(number) = orphan {
                    return Err(ToolError::invalid_state(format!(
                        "Project '{}' is the only active project of incomplete task #{}",
                        project.short_id, number
                    ))
                    .into());
                }
            }

            tx.execute(
                "UPDATE projects SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), &now, &project.id],
            )?;
            tx.commit()?;

            debug!(project_id = %project.id, status = status.as_str(), "Project status changed");

            Ok(Project {
                status,
                updated_at: now,
                ..project
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_failure_resolves_to_nothing() {
        // No schema, so the lookup query itself fails.
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(conn.resolve_project("home"), None);
    }

    #[test]
    fn lookup_by_short_id_ignores_case_and_whitespace() {
        let db = Database::open_in_memory().unwrap();
        let project = db.create_project("Home", None).unwrap();
        let resolved = db
            .with_conn(|conn| Ok(conn.resolve_project(" HOME ")))
            .unwrap();
        assert_eq!(resolved, Some(project.id));
    }
}
