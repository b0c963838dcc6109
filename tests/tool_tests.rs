//! Tool-level tests: JSON arguments in, JSON results out, through the same
//! handler the MCP server uses.

use chrono::Duration;
use chrono_tz::Tz;
use serde_json::{Value, json};
use std::sync::Arc;
use task_lists_mcp::db::Database;
use task_lists_mcp::error::{ErrorCode, ToolError};
use task_lists_mcp::query::dates;
use task_lists_mcp::tools::ToolHandler;

fn setup() -> ToolHandler {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    ToolHandler::new(Arc::new(db), Tz::UTC, 100)
}

async fn call(handler: &ToolHandler, name: &str, args: Value) -> Value {
    handler
        .call_tool(name, args)
        .await
        .unwrap_or_else(|e| panic!("{name} failed: {e}"))
}

async fn call_err(handler: &ToolHandler, name: &str, args: Value) -> ToolError {
    ToolError::from(handler.call_tool(name, args).await.unwrap_err())
}

#[tokio::test]
async fn tools_are_listed() {
    let handler = setup();
    let names: Vec<String> = handler
        .get_tools()
        .iter()
        .map(|t| t.name.to_string())
        .collect();
    for expected in [
        "run_list",
        "create_list",
        "update_list",
        "delete_list",
        "list_lists",
        "find_tasks",
        "create_task",
        "update_task",
        "complete_task",
        "delete_task",
        "link",
        "unlink",
        "create_project",
        "list_projects",
        "update_project",
        "archive_project",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
}

#[tokio::test]
async fn relative_dates_resolve_on_create() {
    let handler = setup();
    let tomorrow = (dates::today_in(Tz::UTC) + Duration::days(1))
        .format("%Y-%m-%d")
        .to_string();

    let created = call(
        &handler,
        "create_task",
        json!({ "title": "dentist", "due_date": "tomorrow", "available_date": "someday" }),
    )
    .await;
    assert_eq!(created["task"]["due_date"], json!(tomorrow));
    assert!(created["task"]["available_date"].is_null());
    assert_eq!(created["warnings"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn saved_list_end_to_end() {
    let handler = setup();
    call(&handler, "create_project", json!({ "name": "Home" })).await;
    call(
        &handler,
        "create_task",
        json!({ "title": "A", "due_date": "2025-02-10", "projects": ["home"] }),
    )
    .await;
    call(
        &handler,
        "create_task",
        json!({ "title": "B", "due_date": "2025-02-01", "projects": ["home"], "tags": ["errand"] }),
    )
    .await;
    call(&handler, "create_task", json!({ "title": "elsewhere" })).await;

    let query = r#"{"type":"group","operator":"AND","children":[
        {"type":"condition","field":"project","operator":"includes","value":["home"]},
        {"type":"condition","field":"status","operator":"equals","value":"incomplete"}]}"#;
    let list = call(
        &handler,
        "create_list",
        json!({
            "name": "Home",
            "query_definition": query,
            "sort_definition": { "sort_within_group": [{ "field": "due_date" }] }
        }),
    )
    .await;
    assert_eq!(list["short_id"], "home");
    assert_eq!(list["query_definition"]["operator"], "AND");

    let result = call(&handler, "run_list", json!({ "list": "home" })).await;
    assert_eq!(result["count"], 2);
    assert_eq!(result["tasks"][0]["title"], "B");
    assert_eq!(result["tasks"][0]["tags"], json!(["errand"]));
    assert_eq!(result["tasks"][1]["title"], "A");

    let md = call(&handler, "run_list", json!({ "list": "home", "format": "markdown" })).await;
    assert_eq!(md["format"], "markdown");
    assert!(md["content"].as_str().unwrap().starts_with("# Home (2)"));

    call(&handler, "complete_task", json!({ "task": "#2" })).await;
    let result = call(&handler, "run_list", json!({ "list": "home" })).await;
    assert_eq!(result["count"], 1);

    let lists = call(&handler, "list_lists", json!({})).await;
    assert_eq!(lists["lists"].as_array().unwrap().len(), 1);

    call(&handler, "delete_list", json!({ "list": "home" })).await;
    let err = call_err(&handler, "run_list", json!({ "list": "home" })).await;
    assert_eq!(err.code, ErrorCode::ListNotFound);
}

#[tokio::test]
async fn find_tasks_combines_filters() {
    let handler = setup();
    call(&handler, "create_task", json!({ "title": "call mom", "flagged": true })).await;
    call(&handler, "create_task", json!({ "title": "call bank" })).await;
    call(&handler, "create_task", json!({ "title": "write report", "flagged": true })).await;

    let result = call(
        &handler,
        "find_tasks",
        json!({ "title": "call", "flagged": true }),
    )
    .await;
    assert_eq!(result["count"], 1);
    assert_eq!(result["tasks"][0]["title"], "call mom");

    let all = call(&handler, "find_tasks", json!({ "limit": 2 })).await;
    assert_eq!(all["count"], 2);
}

#[tokio::test]
async fn link_marks_dependents_blocked() {
    let handler = setup();
    call(&handler, "create_task", json!({ "title": "buy paint" })).await;
    call(&handler, "create_task", json!({ "title": "paint wall" })).await;

    call(&handler, "link", json!({ "task": "2", "depends_on": "1" })).await;
    let blocked = call(&handler, "find_tasks", json!({ "blocked": true })).await;
    assert_eq!(blocked["tasks"][0]["title"], "paint wall");

    let err = call_err(&handler, "link", json!({ "task": "1", "depends_on": "1" })).await;
    assert_eq!(err.code, ErrorCode::InvalidFieldValue);

    call(&handler, "unlink", json!({ "task": "2", "depends_on": "1" })).await;
    let blocked = call(&handler, "find_tasks", json!({ "blocked": true })).await;
    assert_eq!(blocked["count"], 0);
}

#[tokio::test]
async fn validation_errors_are_structured() {
    let handler = setup();
    let err = call_err(&handler, "create_list", json!({ "name": "No query" })).await;
    assert_eq!(err.code, ErrorCode::MissingRequiredField);
    assert_eq!(err.field.as_deref(), Some("query_definition"));

    let err = call_err(
        &handler,
        "create_list",
        json!({ "name": "Bad", "query_definition": "{not json" }),
    )
    .await;
    assert_eq!(err.code, ErrorCode::InvalidFieldValue);

    let err = call_err(&handler, "create_task", json!({ "title": "x", "status": "later" })).await;
    assert_eq!(err.code, ErrorCode::InvalidFieldValue);
}
