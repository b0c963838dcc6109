//! Saved-list execution.
//!
//! Every surface (tools, CLI, scheduled digests) goes through [`Database::run_list`]
//! or [`Database::run_query`], so results are selected, enriched and ordered
//! the same way everywhere.

use super::lists::find_list_internal;
use super::tasks::parse_task_row;
use super::{Database, placeholders};
use crate::error::ToolError;
use crate::query::compile::complete_status_list;
use crate::query::{self, CompileContext, Node, SortDefinition};
use crate::types::{ListTask, ProjectRef, Task};
use anyhow::Result;
use chrono_tz::Tz;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Select tasks matching `node`, at most `limit` rows, in display-number order.
fn select_tasks(conn: &Connection, node: &Node, tz: Tz, limit: usize) -> Result<Vec<Task>> {
    let ctx = CompileContext::new(tz, conn);
    let compiled = query::compile(node, &ctx);

    let sql = format!(
        "SELECT t.* FROM tasks t WHERE {} ORDER BY t.display_number LIMIT ?",
        compiled.where_clause
    );
    let mut params = compiled.params;
    params.push(SqlValue::Integer(limit as i64));

    debug!(sql = %sql, params = params.len(), "Running list query");

    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params_from_iter(params.iter()), parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Run `sql` with the task ids bound to its single `IN (...)` list and
/// collect `(task_id, value)` pairs.
fn load_pairs<T: rusqlite::types::FromSql>(
    conn: &Connection,
    sql_template: &str,
    ids: &[String],
) -> Result<Vec<(String, T)>> {
    let sql = sql_template.replace("{ids}", &placeholders(ids.len()));
    let mut stmt = conn.prepare(&sql)?;
    let pairs = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, T>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(pairs)
}

/// Attach tags, projects, dependency ids and the blocked flag, one query per
/// relation.
pub(crate) fn enrich(conn: &Connection, tasks: Vec<Task>) -> Result<Vec<ListTask>> {
    if tasks.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();

    let mut tags: HashMap<String, Vec<String>> = HashMap::new();
    for (task_id, tag) in load_pairs::<String>(
        conn,
        "SELECT task_id, tag FROM task_tags WHERE task_id IN ({ids}) ORDER BY tag",
        &ids,
    )? {
        tags.entry(task_id).or_default().push(tag);
    }

    let mut projects: HashMap<String, Vec<ProjectRef>> = HashMap::new();
    {
        let sql = format!(
            "SELECT tp.task_id, p.id, p.short_id, p.name FROM task_projects tp
             JOIN projects p ON p.id = tp.project_id
             WHERE tp.task_id IN ({}) ORDER BY p.short_id",
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                ProjectRef {
                    id: row.get(1)?,
                    short_id: row.get(2)?,
                    name: row.get(3)?,
                },
            ))
        })?;
        for row in rows {
            let (task_id, project) = row?;
            projects.entry(task_id).or_default().push(project);
        }
    }

    let mut depends_on: HashMap<String, Vec<String>> = HashMap::new();
    for (task_id, dep) in load_pairs::<String>(
        conn,
        "SELECT d.task_id, d.depends_on_id FROM task_dependencies d
         JOIN tasks dep ON dep.id = d.depends_on_id
         WHERE d.task_id IN ({ids}) ORDER BY dep.display_number",
        &ids,
    )? {
        depends_on.entry(task_id).or_default().push(dep);
    }

    let mut blocks: HashMap<String, Vec<String>> = HashMap::new();
    for (task_id, dependent) in load_pairs::<String>(
        conn,
        "SELECT d.depends_on_id, d.task_id FROM task_dependencies d
         JOIN tasks waiting ON waiting.id = d.task_id
         WHERE d.depends_on_id IN ({ids}) ORDER BY waiting.display_number",
        &ids,
    )? {
        blocks.entry(task_id).or_default().push(dependent);
    }

    let blocked: HashSet<String> = load_pairs::<i64>(
        conn,
        &format!(
            "SELECT DISTINCT d.task_id, 1 FROM task_dependencies d
             JOIN tasks dep ON dep.id = d.depends_on_id
             WHERE d.task_id IN ({{ids}}) AND dep.status NOT IN ({})",
            complete_status_list()
        ),
        &ids,
    )?
    .into_iter()
    .map(|(task_id, _)| task_id)
    .collect();

    Ok(tasks
        .into_iter()
        .map(|task| {
            let id = task.id.clone();
            let mut item = ListTask::new(task);
            item.tags = tags.remove(&id).unwrap_or_default();
            item.projects = projects.remove(&id).unwrap_or_default();
            item.depends_on = depends_on.remove(&id).unwrap_or_default();
            item.blocks = blocks.remove(&id).unwrap_or_default();
            item.is_blocked = blocked.contains(&id);
            item
        })
        .collect())
}

impl Database {
    /// Execute a saved list.
    ///
    /// A list whose stored query is not valid JSON yields an empty result; a
    /// corrupt sort definition leaves the storage order untouched.
    pub fn run_list(&self, reference: &str, limit: usize, tz: Tz) -> Result<Vec<ListTask>> {
        self.with_conn(|conn| {
            let list = find_list_internal(conn, reference)?
                .ok_or_else(|| ToolError::list_not_found(reference))?;

            let Some(node) = Node::parse(&list.query_definition) else {
                warn!(list_id = %list.id, "Stored query definition is not valid JSON");
                return Ok(Vec::new());
            };

            let sort = match list.sort_definition.as_deref() {
                Some(text) => {
                    let parsed = SortDefinition::parse(text);
                    if parsed.is_none() {
                        warn!(list_id = %list.id, "Stored sort definition is not valid; keeping storage order");
                    }
                    parsed
                }
                None => None,
            };

            let tasks = select_tasks(conn, &node, tz, limit)?;
            let mut tasks = enrich(conn, tasks)?;
            query::sort::apply(&mut tasks, sort.as_ref());

            debug!(list_id = %list.id, count = tasks.len(), "List executed");
            Ok(tasks)
        })
    }

    /// Execute an ad-hoc query tree with an optional ordering.
    pub fn run_query(
        &self,
        node: &Node,
        sort: Option<&SortDefinition>,
        limit: usize,
        tz: Tz,
    ) -> Result<Vec<ListTask>> {
        self.with_conn(|conn| {
            let tasks = select_tasks(conn, node, tz, limit)?;
            let mut tasks = enrich(conn, tasks)?;
            query::sort::apply(&mut tasks, sort);
            Ok(tasks)
        })
    }

    /// A single task with its collections attached.
    pub fn get_list_task(&self, reference: &str) -> Result<Option<ListTask>> {
        self.with_conn(|conn| {
            let Some(task) = super::tasks::get_task_internal(conn, reference)? else {
                return Ok(None);
            };
            Ok(enrich(conn, vec![task])?.pop())
        })
    }
}
