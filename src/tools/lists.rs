//! Saved list tools.

use super::{ToolHandler, get_nullable_string, get_string, make_tool, require_string};
use crate::db::Database;
use crate::error::ToolError;
use crate::format::{OutputFormat, format_digest_markdown, markdown_to_json};
use crate::types::{ListPatch, NewList};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

const QUERY_HELP: &str = "Boolean tree: {\"type\":\"group\",\"operator\":\"AND\"|\"OR\",\"children\":[...]} \
or {\"type\":\"condition\",\"field\":...,\"operator\":...,\"value\":...}. \
Fields: title, due_date, available_date, completed_at, status, flagged, priority, tags, project, blocked.";

const SORT_HELP: &str = "{\"group_by\":[field...],\"sort_within_group\":[{\"field\":...,\"direction\":\"asc\"|\"desc\"}]}";

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "run_list",
            "Run a saved list and return its tasks, filtered, enriched and ordered by the list's definition.",
            json!({
                "list": { "type": "string", "description": "List id or short id" },
                "limit": { "type": "integer", "description": "Maximum tasks (default from config, max 1000)" },
                "format": {
                    "type": "string",
                    "enum": ["json", "markdown"],
                    "description": "Output format (default: json)"
                }
            }),
            vec!["list"],
        ),
        make_tool(
            "create_list",
            "Save a named list: a query tree plus an optional ordering and delivery schedule.",
            json!({
                "name": { "type": "string", "description": "List name; a short id is derived from it" },
                "description": { "type": "string" },
                "query_definition": {
                    "type": ["object", "string"],
                    "description": QUERY_HELP
                },
                "sort_definition": {
                    "type": ["object", "string"],
                    "description": SORT_HELP
                },
                "schedule": {
                    "type": "string",
                    "description": "5-field cron expression in the user's time zone, e.g. '0 8 * * 1-5'"
                }
            }),
            vec!["name", "query_definition"],
        ),
        make_tool(
            "update_list",
            "Change a saved list. Only fields that are present are applied; null clears sort_definition, description or schedule.",
            json!({
                "list": { "type": "string", "description": "List id or short id" },
                "name": { "type": "string" },
                "description": { "type": ["string", "null"] },
                "query_definition": { "type": ["object", "string"], "description": QUERY_HELP },
                "sort_definition": { "type": ["object", "string", "null"], "description": SORT_HELP },
                "schedule": { "type": ["string", "null"] }
            }),
            vec!["list"],
        ),
        make_tool(
            "delete_list",
            "Delete a saved list. Tasks are not affected.",
            json!({
                "list": { "type": "string", "description": "List id or short id" }
            }),
            vec!["list"],
        ),
        make_tool("list_lists", "All saved lists ordered by name.", json!({}), vec![]),
    ]
}

pub fn run_list(handler: &ToolHandler, args: Value) -> Result<Value> {
    let reference = require_string(&args, "list")?;
    let limit = handler.limit(&args);
    let format = get_string(&args, "format")
        .and_then(|s| OutputFormat::parse(&s))
        .unwrap_or_default();

    let list = handler
        .db
        .get_list(&reference)?
        .ok_or_else(|| ToolError::list_not_found(&reference))?;
    let tasks = handler.db.run_list(&list.id, limit, handler.tz)?;

    match format {
        OutputFormat::Markdown => Ok(markdown_to_json(format_digest_markdown(&list, &tasks))),
        OutputFormat::Json => Ok(json!({
            "list": { "id": list.id, "short_id": list.short_id, "name": list.name },
            "count": tasks.len(),
            "tasks": tasks
        })),
    }
}

pub fn create_list(db: &Database, args: Value) -> Result<Value> {
    let input = NewList {
        name: require_string(&args, "name")?,
        description: get_string(&args, "description"),
        query_definition: args.get("query_definition").cloned().unwrap_or(Value::Null),
        sort_definition: args.get("sort_definition").cloned(),
        schedule: get_string(&args, "schedule"),
    };

    let list = db.create_list(input)?;
    Ok(list.to_json())
}

pub fn update_list(db: &Database, args: Value) -> Result<Value> {
    let reference = require_string(&args, "list")?;
    let patch = ListPatch {
        name: get_string(&args, "name"),
        description: get_nullable_string(&args, "description"),
        query_definition: args.get("query_definition").cloned(),
        sort_definition: match args.get("sort_definition") {
            None => None,
            Some(Value::Null) => Some(None),
            Some(v) => Some(Some(v.clone())),
        },
        schedule: get_nullable_string(&args, "schedule"),
    };

    let list = db.update_list(&reference, patch)?;
    Ok(list.to_json())
}

pub fn delete_list(db: &Database, args: Value) -> Result<Value> {
    let reference = require_string(&args, "list")?;
    let list = db.delete_list(&reference)?;
    Ok(json!({ "success": true, "id": list.id, "short_id": list.short_id }))
}

pub fn list_lists(db: &Database, _args: Value) -> Result<Value> {
    let lists = db.list_lists()?;
    Ok(json!({
        "lists": lists.iter().map(|l| l.to_json()).collect::<Vec<_>>()
    }))
}
