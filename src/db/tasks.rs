//! Task CRUD, tags, project memberships and completion.

use super::projects::find_project_internal;
use super::{Database, now_ts};
use crate::error::ToolError;
use crate::types::{NewTask, Task, TaskPatch, TaskStatus, clamp_priority};
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use uuid::Uuid;

// =============================================================================
// Junction table helpers
// =============================================================================

/// Trim, drop empties and dedupe while keeping first-seen order.
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Replace all tags of a task.
fn sync_task_tags(conn: &Connection, task_id: &str, tags: &[String]) -> Result<()> {
    conn.execute("DELETE FROM task_tags WHERE task_id = ?1", params![task_id])?;
    for tag in normalize_tags(tags) {
        conn.execute(
            "INSERT INTO task_tags (task_id, tag) VALUES (?1, ?2)",
            params![task_id, tag],
        )?;
    }
    Ok(())
}

/// Add memberships for project references (ids or short ids).
fn link_projects(conn: &Connection, task_id: &str, references: &[String]) -> Result<()> {
    for reference in references {
        let project = find_project_internal(conn, reference)?
            .ok_or_else(|| ToolError::project_not_found(reference))?;
        conn.execute(
            "INSERT OR IGNORE INTO task_projects (task_id, project_id) VALUES (?1, ?2)",
            params![task_id, &project.id],
        )?;
    }
    Ok(())
}

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let flagged: i64 = row.get("flagged")?;

    Ok(Task {
        id: row.get("id")?,
        display_number: row.get("display_number")?,
        title: row.get("title")?,
        description: row.get("description")?,
        notes: row.get("notes")?,
        status: TaskStatus::parse(&status).unwrap_or_default(),
        priority: row.get("priority")?,
        available_date: row.get("available_date")?,
        due_date: row.get("due_date")?,
        flagged: flagged != 0,
        recurrence: row.get("recurrence")?,
        recurrence_parent_id: row.get("recurrence_parent_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
    })
}

/// Get a task by id or display number (`12` or `#12`) using an existing connection.
pub(crate) fn get_task_internal(conn: &Connection, reference: &str) -> Result<Option<Task>> {
    let reference = reference.trim();
    let number = reference.strip_prefix('#').unwrap_or(reference).parse::<i64>().ok();

    let task = match number {
        Some(n) => conn
            .query_row(
                "SELECT * FROM tasks WHERE display_number = ?1",
                params![n],
                parse_task_row,
            )
            .optional()?,
        None => conn
            .query_row("SELECT * FROM tasks WHERE id = ?1", params![reference], parse_task_row)
            .optional()?,
    };
    Ok(task)
}

fn require_task(conn: &Connection, reference: &str) -> Result<Task> {
    get_task_internal(conn, reference)?
        .ok_or_else(|| ToolError::task_not_found(reference).into())
}

fn next_display_number(conn: &Connection) -> Result<i64> {
    let n: i64 = conn.query_row(
        "SELECT COALESCE(MAX(display_number), 0) + 1 FROM tasks",
        [],
        |row| row.get(0),
    )?;
    Ok(n)
}

/// Insert a task row and its collections. Caller owns the transaction.
fn insert_task(
    conn: &Connection,
    input: &NewTask,
    recurrence_parent_id: Option<&str>,
) -> Result<Task> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(ToolError::missing_field("title").into());
    }

    let id = Uuid::now_v7().to_string();
    let now = now_ts();
    let display_number = next_display_number(conn)?;
    let status = input.status.unwrap_or_default();
    let priority = clamp_priority(input.priority.unwrap_or(0));
    let completed_at = status.is_complete().then(|| now.clone());

    conn.execute(
        "INSERT INTO tasks (
            id, display_number, title, description, notes, status, priority,
            available_date, due_date, flagged, recurrence, recurrence_parent_id,
            created_at, updated_at, completed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13, ?14)",
        params![
            &id,
            display_number,
            title,
            &input.description,
            &input.notes,
            status.as_str(),
            priority,
            &input.available_date,
            &input.due_date,
            input.flagged,
            &input.recurrence,
            recurrence_parent_id,
            &now,
            &completed_at,
        ],
    )?;

    sync_task_tags(conn, &id, &input.tags)?;
    link_projects(conn, &id, &input.projects)?;

    Ok(Task {
        id,
        display_number,
        title: title.to_string(),
        description: input.description.clone(),
        notes: input.notes.clone(),
        status,
        priority,
        available_date: input.available_date.clone(),
        due_date: input.due_date.clone(),
        flagged: input.flagged,
        recurrence: input.recurrence.clone(),
        recurrence_parent_id: recurrence_parent_id.map(String::from),
        created_at: now.clone(),
        updated_at: now,
        completed_at,
    })
}

/// Shift an ISO date by one day; other text is carried over unchanged.
fn advance_one_day(date: &Option<String>) -> Option<String> {
    date.as_ref().map(|d| {
        NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map(|parsed| (parsed + Duration::days(1)).format("%Y-%m-%d").to_string())
            .unwrap_or_else(|_| d.clone())
    })
}

impl Database {
    /// Create a new task with its tags and project memberships.
    pub fn create_task(&self, input: NewTask) -> Result<Task> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let task = insert_task(&tx, &input, None)?;
            tx.commit()?;
            info!(task_id = %task.id, number = task.display_number, "Task created");
            Ok(task)
        })
    }

    /// Get a task by id or display number.
    pub fn get_task(&self, reference: &str) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, reference))
    }

    /// Get the tags of a task, sorted.
    pub fn get_task_tags(&self, task_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT tag FROM task_tags WHERE task_id = ?1 ORDER BY tag")?;
            let tags = stmt
                .query_map(params![task_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(tags)
        })
    }

    /// Apply a patch to a task.
    ///
    /// Moving into a complete status stamps `completed_at`; moving out of one
    /// clears it.
    pub fn update_task(&self, reference: &str, patch: TaskPatch) -> Result<Task> {
        let now = now_ts();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let task = require_task(&tx, reference)?;

            let title = match patch.title {
                Some(t) if t.trim().is_empty() => {
                    return Err(ToolError::missing_field("title").into());
                }
                Some(t) => t.trim().to_string(),
                None => task.title.clone(),
            };
            let status = patch.status.unwrap_or(task.status);
            let completed_at = match (task.status.is_complete(), status.is_complete()) {
                (false, true) => Some(now.clone()),
                (true, false) => None,
                _ => task.completed_at.clone(),
            };

            let updated = Task {
                title,
                description: patch.description.unwrap_or(task.description.clone()),
                notes: patch.notes.unwrap_or(task.notes.clone()),
                status,
                priority: patch.priority.map(clamp_priority).unwrap_or(task.priority),
                available_date: patch.available_date.unwrap_or(task.available_date.clone()),
                due_date: patch.due_date.unwrap_or(task.due_date.clone()),
                flagged: patch.flagged.unwrap_or(task.flagged),
                recurrence: patch.recurrence.unwrap_or(task.recurrence.clone()),
                completed_at,
                updated_at: now.clone(),
                ..task
            };

            tx.execute(
                "UPDATE tasks SET
                    title = ?1, description = ?2, notes = ?3, status = ?4, priority = ?5,
                    available_date = ?6, due_date = ?7, flagged = ?8, recurrence = ?9,
                    completed_at = ?10, updated_at = ?11
                WHERE id = ?12",
                params![
                    &updated.title,
                    &updated.description,
                    &updated.notes,
                    updated.status.as_str(),
                    updated.priority,
                    &updated.available_date,
                    &updated.due_date,
                    updated.flagged,
                    &updated.recurrence,
                    &updated.completed_at,
                    &updated.updated_at,
                    &updated.id,
                ],
            )?;

            if let Some(tags) = &patch.tags {
                sync_task_tags(&tx, &updated.id, tags)?;
            }

            tx.commit()?;
            debug!(task_id = %updated.id, "Task updated");
            Ok(updated)
        })
    }

    /// Mark a task done.
    ///
    /// A task with a recurrence descriptor spawns its next instance with the
    /// dates moved one day ahead. This is a placeholder, not a rule engine:
    /// the descriptor text is never interpreted.
    pub fn complete_task(&self, reference: &str) -> Result<(Task, Option<Task>)> {
        let now = now_ts();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let task = require_task(&tx, reference)?;

            tx.execute(
                "UPDATE tasks SET status = 'done', completed_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![&now, &task.id],
            )?;

            let next = match &task.recurrence {
                Some(recurrence) if !task.status.is_complete() => {
                    let tags: Vec<String> = {
                        let mut stmt = tx.prepare("SELECT tag FROM task_tags WHERE task_id = ?1")?;
                        stmt.query_map(params![&task.id], |row| row.get(0))?
                            .collect::<rusqlite::Result<_>>()?
                    };
                    let projects: Vec<String> = {
                        let mut stmt = tx
                            .prepare("SELECT project_id FROM task_projects WHERE task_id = ?1")?;
                        stmt.query_map(params![&task.id], |row| row.get(0))?
                            .collect::<rusqlite::Result<_>>()?
                    };
                    let input = NewTask {
                        title: task.title.clone(),
                        description: task.description.clone(),
                        notes: task.notes.clone(),
                        status: Some(TaskStatus::Active),
                        priority: Some(task.priority),
                        available_date: advance_one_day(&task.available_date),
                        due_date: advance_one_day(&task.due_date),
                        flagged: task.flagged,
                        recurrence: Some(recurrence.clone()),
                        tags,
                        projects,
                    };
                    let chain_root = task.recurrence_parent_id.as_deref().unwrap_or(&task.id);
                    Some(insert_task(&tx, &input, Some(chain_root))?)
                }
                _ => None,
            };

            tx.commit()?;

            let completed = Task {
                status: TaskStatus::Done,
                completed_at: Some(now.clone()),
                updated_at: now,
                ..task
            };
            info!(
                task_id = %completed.id,
                next = next.as_ref().map(|t| t.display_number),
                "Task completed"
            );
            Ok((completed, next))
        })
    }

    /// Add a task to a project.
    pub fn add_task_project(&self, task_ref: &str, project_ref: &str) -> Result<()> {
        self.with_conn(|conn| {
            let task = require_task(conn, task_ref)?;
            link_projects(conn, &task.id, &[project_ref.to_string()])
        })
    }

    /// Remove a task from a project.
    pub fn remove_task_project(&self, task_ref: &str, project_ref: &str) -> Result<()> {
        self.with_conn(|conn| {
            let task = require_task(conn, task_ref)?;
            let project = find_project_internal(conn, project_ref)?
                .ok_or_else(|| ToolError::project_not_found(project_ref))?;
            conn.execute(
                "DELETE FROM task_projects WHERE task_id = ?1 AND project_id = ?2",
                params![&task.id, &project.id],
            )?;
            Ok(())
        })
    }

    /// Delete a task. Tags, memberships and dependency edges cascade.
    pub fn delete_task(&self, reference: &str) -> Result<Task> {
        self.with_conn(|conn| {
            let task = require_task(conn, reference)?;
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![&task.id])?;
            info!(task_id = %task.id, "Task deleted");
            Ok(task)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_and_deduped() {
        let tags = vec![" home ".to_string(), "home".into(), "".into(), "Home".into()];
        assert_eq!(normalize_tags(&tags), vec!["home", "Home"]);
    }

    #[test]
    fn advance_moves_iso_dates_only() {
        assert_eq!(
            advance_one_day(&Some("2025-01-31".to_string())).as_deref(),
            Some("2025-02-01")
        );
        assert_eq!(advance_one_day(&Some("soon".to_string())).as_deref(), Some("soon"));
        assert_eq!(advance_one_day(&None), None);
    }
}
