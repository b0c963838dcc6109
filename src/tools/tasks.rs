//! Task CRUD and ad-hoc filtering tools.

use super::{
    ToolHandler, get_bool, get_i64, get_nullable_string, get_string, get_string_array, make_tool,
    require_string,
};
use crate::db::Database;
use crate::error::ToolError;
use crate::format::{OutputFormat, format_list_markdown, markdown_to_json};
use crate::query::{Node, SortDefinition, dates};
use crate::types::{NewTask, TaskPatch, TaskStatus};
use anyhow::Result;
use chrono_tz::Tz;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "find_tasks",
            "Filter tasks without saving a list. All given filters must match.",
            json!({
                "status": {
                    "type": "string",
                    "enum": ["incomplete", "complete"],
                    "description": "Two-value status view"
                },
                "project": {
                    "oneOf": [
                        { "type": "string" },
                        { "type": "array", "items": { "type": "string" } }
                    ],
                    "description": "Member of any of these projects (id or short id)"
                },
                "tags": {
                    "oneOf": [
                        { "type": "string" },
                        { "type": "array", "items": { "type": "string" } }
                    ],
                    "description": "Has any of these tags"
                },
                "exclude_tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Has none of these tags"
                },
                "due": {
                    "type": "string",
                    "description": "Due on or before: ISO date or 'today', 'tomorrow', 'friday', 'in 3 days'..."
                },
                "available": {
                    "type": "string",
                    "description": "Available on or before (same forms as due)"
                },
                "flagged": { "type": "boolean" },
                "blocked": { "type": "boolean" },
                "title": { "type": "string", "description": "Title contains (case-sensitive)" },
                "min_priority": { "type": "integer", "description": "Priority at least (0-3)" },
                "sort": { "type": "object", "description": "Same shape as a list's sort_definition" },
                "limit": { "type": "integer" },
                "format": { "type": "string", "enum": ["json", "markdown"] }
            }),
            vec![],
        ),
        make_tool(
            "create_task",
            "Create a task. Dates accept ISO dates or relative forms like 'tomorrow' or 'next week'.",
            json!({
                "title": { "type": "string" },
                "description": { "type": "string" },
                "notes": { "type": "string" },
                "status": {
                    "type": "string",
                    "enum": ["inbox", "active", "blocked", "done", "archived"]
                },
                "priority": { "type": "integer", "minimum": 0, "maximum": 3 },
                "due_date": { "type": "string" },
                "available_date": { "type": "string" },
                "flagged": { "type": "boolean" },
                "recurrence": { "type": "string", "description": "Recurrence descriptor" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "projects": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Project ids or short ids"
                },
                "depends_on": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tasks this task waits on"
                }
            }),
            vec!["title"],
        ),
        make_tool(
            "update_task",
            "Update a task. Only present fields change; null clears nullable fields. tags replaces the whole tag set.",
            json!({
                "task": { "type": "string", "description": "Task id or display number" },
                "title": { "type": "string" },
                "description": { "type": ["string", "null"] },
                "notes": { "type": ["string", "null"] },
                "status": {
                    "type": "string",
                    "enum": ["inbox", "active", "blocked", "done", "archived"]
                },
                "priority": { "type": "integer", "minimum": 0, "maximum": 3 },
                "due_date": { "type": ["string", "null"] },
                "available_date": { "type": ["string", "null"] },
                "flagged": { "type": "boolean" },
                "recurrence": { "type": ["string", "null"] },
                "tags": { "type": "array", "items": { "type": "string" } },
                "add_projects": { "type": "array", "items": { "type": "string" } },
                "remove_projects": { "type": "array", "items": { "type": "string" } }
            }),
            vec!["task"],
        ),
        make_tool(
            "complete_task",
            "Mark a task done. A recurring task spawns its next instance.",
            json!({
                "task": { "type": "string", "description": "Task id or display number" }
            }),
            vec!["task"],
        ),
        make_tool(
            "delete_task",
            "Delete a task with its tags, project memberships and dependency links.",
            json!({
                "task": { "type": "string", "description": "Task id or display number" }
            }),
            vec!["task"],
        ),
    ]
}

/// Build an AND group from flat filter arguments.
pub fn filter_node(args: &Value) -> Node {
    let mut children = Vec::new();

    if let Some(status) = get_string(args, "status") {
        children.push(Node::condition("status", "equals", json!(status)));
    }
    if let Some(projects) = get_string_array(args, "project") {
        children.push(Node::condition("project", "includes", json!(projects)));
    }
    if let Some(tags) = get_string_array(args, "tags") {
        children.push(Node::condition("tags", "includes", json!(tags)));
    }
    if let Some(tags) = get_string_array(args, "exclude_tags") {
        children.push(Node::condition("tags", "excludes", json!(tags)));
    }
    if let Some(due) = get_string(args, "due") {
        children.push(Node::condition("due_date", "is_on_or_before", json!(due)));
    }
    if let Some(available) = get_string(args, "available") {
        children.push(Node::condition(
            "available_date",
            "is_on_or_before",
            json!(available),
        ));
    }
    if let Some(flagged) = get_bool(args, "flagged") {
        children.push(Node::condition("flagged", "equals", json!(flagged)));
    }
    if let Some(blocked) = get_bool(args, "blocked") {
        children.push(Node::condition("blocked", "equals", json!(blocked)));
    }
    if let Some(title) = get_string(args, "title") {
        children.push(Node::condition("title", "contains", json!(title)));
    }
    if let Some(priority) = get_i64(args, "min_priority") {
        children.push(Node::condition("priority", "greater_or_equal", json!(priority)));
    }

    Node::all(children)
}

pub fn find_tasks(handler: &ToolHandler, args: Value) -> Result<Value> {
    let node = filter_node(&args);
    let sort = match args.get("sort") {
        Some(v) if !v.is_null() => Some(
            serde_json::from_value::<SortDefinition>(v.clone())
                .map_err(|e| ToolError::invalid_value("sort", e.to_string()))?,
        ),
        _ => None,
    };
    let limit = handler.limit(&args);
    let format = get_string(&args, "format")
        .and_then(|s| OutputFormat::parse(&s))
        .unwrap_or_default();

    let tasks = handler
        .db
        .run_query(&node, sort.as_ref(), limit, handler.tz)?;

    match format {
        OutputFormat::Markdown => Ok(markdown_to_json(format_list_markdown(
            "Tasks",
            &tasks,
            sort.as_ref(),
        ))),
        OutputFormat::Json => Ok(json!({ "count": tasks.len(), "tasks": tasks })),
    }
}

/// Resolve a date argument. Unrecognized expressions are reported and left
/// unset.
fn resolve_date(value: Option<String>, field: &str, tz: Tz, warnings: &mut Vec<String>) -> Option<String> {
    let expr = value?;
    let resolved = dates::resolve(&expr, tz);
    if resolved.is_none() {
        warnings.push(format!("{field}: could not resolve '{expr}', left unset"));
    }
    resolved
}

fn parse_status(args: &Value) -> Result<Option<TaskStatus>> {
    match get_string(args, "status") {
        Some(s) => TaskStatus::parse(&s)
            .map(Some)
            .ok_or_else(|| ToolError::invalid_value("status", format!("unknown status '{s}'")).into()),
        None => Ok(None),
    }
}

pub fn create_task(handler: &ToolHandler, args: Value) -> Result<Value> {
    let mut warnings = Vec::new();
    let input = NewTask {
        title: require_string(&args, "title")?,
        description: get_string(&args, "description"),
        notes: get_string(&args, "notes"),
        status: parse_status(&args)?,
        priority: get_i64(&args, "priority").map(|p| p as i32),
        available_date: resolve_date(
            get_string(&args, "available_date"),
            "available_date",
            handler.tz,
            &mut warnings,
        ),
        due_date: resolve_date(get_string(&args, "due_date"), "due_date", handler.tz, &mut warnings),
        flagged: get_bool(&args, "flagged").unwrap_or(false),
        recurrence: get_string(&args, "recurrence"),
        tags: get_string_array(&args, "tags").unwrap_or_default(),
        projects: get_string_array(&args, "projects").unwrap_or_default(),
    };

    let task = handler.db.create_task(input)?;
    for depends_on in get_string_array(&args, "depends_on").unwrap_or_default() {
        handler.db.add_dependency(&task.id, &depends_on)?;
    }

    let item = handler
        .db
        .get_list_task(&task.id)?
        .ok_or_else(|| ToolError::task_not_found(&task.id))?;
    Ok(json!({ "task": item, "warnings": warnings }))
}

pub fn update_task(handler: &ToolHandler, args: Value) -> Result<Value> {
    let reference = require_string(&args, "task")?;
    let mut warnings = Vec::new();

    let mut date_patch = |field: &str| match get_nullable_string(&args, field) {
        Some(Some(expr)) => resolve_date(Some(expr), field, handler.tz, &mut warnings).map(Some),
        other => other,
    };
    let available_date = date_patch("available_date");
    let due_date = date_patch("due_date");

    let patch = TaskPatch {
        title: get_string(&args, "title"),
        description: get_nullable_string(&args, "description"),
        notes: get_nullable_string(&args, "notes"),
        status: parse_status(&args)?,
        priority: get_i64(&args, "priority").map(|p| p as i32),
        available_date,
        due_date,
        flagged: get_bool(&args, "flagged"),
        recurrence: get_nullable_string(&args, "recurrence"),
        tags: get_string_array(&args, "tags"),
    };

    let task = handler.db.update_task(&reference, patch)?;
    for project in get_string_array(&args, "add_projects").unwrap_or_default() {
        handler.db.add_task_project(&task.id, &project)?;
    }
    for project in get_string_array(&args, "remove_projects").unwrap_or_default() {
        handler.db.remove_task_project(&task.id, &project)?;
    }

    let item = handler
        .db
        .get_list_task(&task.id)?
        .ok_or_else(|| ToolError::task_not_found(&task.id))?;
    Ok(json!({ "task": item, "warnings": warnings }))
}

pub fn complete_task(db: &Database, args: Value) -> Result<Value> {
    let reference = require_string(&args, "task")?;
    let (task, next) = db.complete_task(&reference)?;
    Ok(json!({ "task": task, "next": next }))
}

pub fn delete_task(db: &Database, args: Value) -> Result<Value> {
    let reference = require_string(&args, "task")?;
    let task = db.delete_task(&reference)?;
    Ok(json!({ "success": true, "id": task.id, "display_number": task.display_number }))
}
