//! Project tools.

use super::{get_bool, get_nullable_string, get_string, make_tool, require_string};
use crate::db::Database;
use crate::types::ProjectStatus;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_project",
            "Create a project. A short id (e.g. 'home') is derived from the name and can be used wherever a project is referenced.",
            json!({
                "name": { "type": "string", "description": "Project name" },
                "description": { "type": "string", "description": "Optional description" }
            }),
            vec!["name"],
        ),
        make_tool(
            "list_projects",
            "List projects ordered by short id.",
            json!({
                "include_archived": {
                    "type": "boolean",
                    "description": "Include archived projects (default: false)"
                }
            }),
            vec![],
        ),
        make_tool(
            "update_project",
            "Rename or re-describe a project. The short id does not change.",
            json!({
                "project": { "type": "string", "description": "Project id or short id" },
                "name": { "type": "string" },
                "description": { "type": ["string", "null"] }
            }),
            vec!["project"],
        ),
        make_tool(
            "archive_project",
            "Archive a project. Refused while the project still has incomplete tasks. Pass archived=false to restore it.",
            json!({
                "project": { "type": "string", "description": "Project id or short id" },
                "archived": {
                    "type": "boolean",
                    "description": "Target state (default: true)"
                }
            }),
            vec!["project"],
        ),
    ]
}

pub fn create_project(db: &Database, args: Value) -> Result<Value> {
    let name = require_string(&args, "name")?;
    let description = get_string(&args, "description");

    let project = db.create_project(&name, description)?;
    Ok(serde_json::to_value(project)?)
}

pub fn list_projects(db: &Database, args: Value) -> Result<Value> {
    let include_archived = get_bool(&args, "include_archived").unwrap_or(false);
    let projects = db.list_projects(include_archived)?;
    Ok(json!({ "projects": projects }))
}

pub fn update_project(db: &Database, args: Value) -> Result<Value> {
    let reference = require_string(&args, "project")?;
    let project = db.update_project(
        &reference,
        get_string(&args, "name"),
        get_nullable_string(&args, "description"),
    )?;
    Ok(serde_json::to_value(project)?)
}

pub fn archive_project(db: &Database, args: Value) -> Result<Value> {
    let reference = require_string(&args, "project")?;
    let status = if get_bool(&args, "archived").unwrap_or(true) {
        ProjectStatus::Archived
    } else {
        ProjectStatus::Active
    };

    let project = db.set_project_status(&reference, status)?;
    Ok(serde_json::to_value(project)?)
}
