//! Structured error types for tool responses.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,
    InvalidState,

    // Not found errors
    TaskNotFound,
    ProjectNotFound,
    ListNotFound,

    // Capacity errors
    ShortIdExhausted,

    // Internal errors
    DatabaseError,
    InternalError,
    UnknownTool,
}

/// Caller-visible failure carried through `anyhow` and rendered as JSON at
/// the MCP boundary.
#[derive(Debug, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorCode::MissingRequiredField, format!("{field} is required")).with_field(field)
    }

    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, reason)
    }

    fn not_found(code: ErrorCode, kind: &str, reference: &str) -> Self {
        Self::new(code, format!("{kind} not found: {reference}"))
    }

    pub fn task_not_found(task_ref: &str) -> Self {
        Self::not_found(ErrorCode::TaskNotFound, "Task", task_ref)
    }

    pub fn project_not_found(project_ref: &str) -> Self {
        Self::not_found(ErrorCode::ProjectNotFound, "Project", project_ref)
    }

    pub fn list_not_found(list_ref: &str) -> Self {
        Self::not_found(ErrorCode::ListNotFound, "List", list_ref)
    }

    pub fn short_id_exhausted(name: &str) -> Self {
        Self::new(ErrorCode::ShortIdExhausted, format!("No free short id left for '{name}'"))
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorCode::UnknownTool, format!("Unknown tool: {name}"))
    }
}

/// Recovers the structured error from an `anyhow` chain. SQLite failures map
/// to `DATABASE_ERROR`, anything else to `INTERNAL_ERROR`.
impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ToolError>() {
            Ok(tool_err) => tool_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(db_err) => ToolError::database(db_err),
                Err(err) => ToolError::internal(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake_case() {
        let err = ToolError::short_id_exhausted("alpha");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "SHORT_ID_EXHAUSTED");
        assert!(json.get("field").is_none());
    }

    #[test]
    fn anyhow_roundtrip_keeps_tool_error() {
        let err: anyhow::Error = ToolError::missing_field("name").into();
        let back = ToolError::from(err);
        assert_eq!(back.code, ErrorCode::MissingRequiredField);
        assert_eq!(back.field.as_deref(), Some("name"));
    }
}
