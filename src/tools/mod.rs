//! MCP tool implementations.

pub mod deps;
pub mod lists;
pub mod projects;
pub mod tasks;

use crate::config::MAX_LIST_LIMIT;
use crate::db::Database;
use crate::error::ToolError;
use anyhow::Result;
use chrono_tz::Tz;
use rmcp::model::Tool;
use serde_json::Value;
use std::sync::Arc;

/// Tool handler that processes MCP tool calls.
pub struct ToolHandler {
    pub db: Arc<Database>,
    pub tz: Tz,
    pub default_limit: usize,
}

impl ToolHandler {
    pub fn new(db: Arc<Database>, tz: Tz, default_limit: usize) -> Self {
        Self {
            db,
            tz,
            default_limit,
        }
    }

    /// Get all available tools.
    pub fn get_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();

        // Saved list tools
        tools.extend(lists::get_tools());

        // Task tools
        tools.extend(tasks::get_tools());

        // Dependency tools
        tools.extend(deps::get_tools());

        // Project tools
        tools.extend(projects::get_tools());

        tools
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        match name {
            // Saved list tools
            "run_list" => lists::run_list(self, arguments),
            "create_list" => lists::create_list(&self.db, arguments),
            "update_list" => lists::update_list(&self.db, arguments),
            "delete_list" => lists::delete_list(&self.db, arguments),
            "list_lists" => lists::list_lists(&self.db, arguments),

            // Task tools
            "find_tasks" => tasks::find_tasks(self, arguments),
            "create_task" => tasks::create_task(self, arguments),
            "update_task" => tasks::update_task(self, arguments),
            "complete_task" => tasks::complete_task(&self.db, arguments),
            "delete_task" => tasks::delete_task(&self.db, arguments),

            // Dependency tools
            "link" => deps::link(&self.db, arguments),
            "unlink" => deps::unlink(&self.db, arguments),

            // Project tools
            "create_project" => projects::create_project(&self.db, arguments),
            "list_projects" => projects::list_projects(&self.db, arguments),
            "update_project" => projects::update_project(&self.db, arguments),
            "archive_project" => projects::archive_project(&self.db, arguments),

            _ => Err(ToolError::unknown_tool(name).into()),
        }
    }

    /// Requested row limit, or the configured default, clamped to the
    /// supported range.
    pub fn limit(&self, args: &Value) -> usize {
        get_i64(args, "limit")
            .map(|n| n.clamp(1, MAX_LIST_LIMIT as i64) as usize)
            .unwrap_or(self.default_limit)
    }
}

/// Helper to create a tool definition.
pub fn make_tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Tool {
    let input_schema = rmcp::model::JsonObject::from_iter([
        ("type".to_string(), serde_json::json!("object")),
        ("properties".to_string(), properties),
        ("required".to_string(), serde_json::json!(required)),
    ]);

    Tool::new(name.to_string(), description.to_string(), input_schema)
}

/// Helper to get a string from arguments.
pub fn get_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str().map(String::from))
}

/// Helper to get a required string from arguments.
pub fn require_string(args: &Value, key: &str) -> Result<String> {
    get_string(args, key).ok_or_else(|| ToolError::missing_field(key).into())
}

/// Helper to get an i64 from arguments.
pub fn get_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(|v| v.as_i64())
}

/// Helper to get a bool from arguments.
pub fn get_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(|v| v.as_bool())
}

/// Helper to get a string array from arguments. A single string is accepted
/// as a one-element array.
pub fn get_string_array(args: &Value, key: &str) -> Option<Vec<String>> {
    match args.get(key)? {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(arr) => Some(
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
        ),
        _ => None,
    }
}

/// Tri-state helper for nullable patch fields: absent leaves the field alone,
/// `null` clears it.
pub fn get_nullable_string(args: &Value, key: &str) -> Option<Option<String>> {
    match args.get(key)? {
        Value::Null => Some(None),
        v => Some(v.as_str().map(String::from)),
    }
}
