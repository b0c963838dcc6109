//! Dependency management tools.

use super::{get_string_array, make_tool};
use crate::db::Database;
use crate::error::ToolError;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    let refs = json!({
        "oneOf": [
            { "type": "string" },
            { "type": "array", "items": { "type": "string" } }
        ]
    });
    let properties = |verb: &str| {
        let mut task = refs.clone();
        task["description"] = json!(format!("Task(s) that {verb} wait, by id or display number"));
        let mut depends_on = refs.clone();
        depends_on["description"] = json!("Task(s) being waited on");
        json!({ "task": task, "depends_on": depends_on })
    };

    vec![
        make_tool(
            "link",
            "Make tasks depend on other tasks. A task is blocked while any task it depends on is incomplete. Accepts a string or array on either side.",
            properties("should"),
            vec!["task", "depends_on"],
        ),
        make_tool(
            "unlink",
            "Remove dependency links between tasks. Accepts a string or array on either side.",
            properties("should no longer"),
            vec!["task", "depends_on"],
        ),
    ]
}

fn pairs(args: &Value) -> Result<Vec<(String, String)>> {
    let tasks =
        get_string_array(args, "task").ok_or_else(|| ToolError::missing_field("task"))?;
    let depends_on = get_string_array(args, "depends_on")
        .ok_or_else(|| ToolError::missing_field("depends_on"))?;

    Ok(tasks
        .iter()
        .flat_map(|t| depends_on.iter().map(move |d| (t.clone(), d.clone())))
        .collect())
}

pub fn link(db: &Database, args: Value) -> Result<Value> {
    let pairs = pairs(&args)?;
    for (task, depends_on) in &pairs {
        db.add_dependency(task, depends_on)?;
    }
    Ok(json!({ "success": true, "linked": pairs.len() }))
}

pub fn unlink(db: &Database, args: Value) -> Result<Value> {
    let pairs = pairs(&args)?;
    for (task, depends_on) in &pairs {
        db.remove_dependency(task, depends_on)?;
    }
    Ok(json!({ "success": true, "unlinked": pairs.len() }))
}
