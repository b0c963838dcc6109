//! Dependency edges between tasks.
//!
//! An edge `task -> depends_on` means `task` waits for `depends_on`. Cycles are
//! not checked; only self-dependency is rejected. Whether a task is blocked is
//! always derived from the edges at read time.

use super::Database;
use super::tasks::get_task_internal;
use crate::error::ToolError;
use crate::query::compile::complete_status_list;
use anyhow::Result;
use rusqlite::params;

impl Database {
    /// Make `task_ref` depend on `depends_on_ref`.
    pub fn add_dependency(&self, task_ref: &str, depends_on_ref: &str) -> Result<()> {
        self.with_conn(|conn| {
            let task = get_task_internal(conn, task_ref)?
                .ok_or_else(|| ToolError::task_not_found(task_ref))?;
            let depends_on = get_task_internal(conn, depends_on_ref)?
                .ok_or_else(|| ToolError::task_not_found(depends_on_ref))?;

            if task.id == depends_on.id {
                return Err(
                    ToolError::invalid_value("depends_on", "A task cannot depend on itself").into(),
                );
            }

            conn.execute(
                "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_id) VALUES (?1, ?2)",
                params![&task.id, &depends_on.id],
            )?;
            Ok(())
        })
    }

    /// Remove a dependency edge.
    pub fn remove_dependency(&self, task_ref: &str, depends_on_ref: &str) -> Result<()> {
        self.with_conn(|conn| {
            let task = get_task_internal(conn, task_ref)?
                .ok_or_else(|| ToolError::task_not_found(task_ref))?;
            let depends_on = get_task_internal(conn, depends_on_ref)?
                .ok_or_else(|| ToolError::task_not_found(depends_on_ref))?;
            conn.execute(
                "DELETE FROM task_dependencies WHERE task_id = ?1 AND depends_on_id = ?2",
                params![&task.id, &depends_on.id],
            )?;
            Ok(())
        })
    }

    /// Incomplete tasks that `task_id` is waiting on.
    pub fn get_blockers(&self, task_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT d.depends_on_id FROM task_dependencies d
                 JOIN tasks dep ON dep.id = d.depends_on_id
                 WHERE d.task_id = ?1 AND dep.status NOT IN ({})
                 ORDER BY dep.display_number",
                complete_status_list()
            ))?;

            let blockers = stmt
                .query_map(params![task_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;

            Ok(blockers)
        })
    }

    /// Whether a task has at least one incomplete dependency.
    pub fn is_blocked(&self, task_id: &str) -> Result<bool> {
        Ok(!self.get_blockers(task_id)?.is_empty())
    }
}
