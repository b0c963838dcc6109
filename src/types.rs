//! Core types for the task store and saved lists.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Task priority, clamped to `PRIORITY_MIN..=PRIORITY_MAX`.
pub type Priority = i32;

pub const PRIORITY_MIN: Priority = 0;
pub const PRIORITY_MAX: Priority = 3;

/// Clamp a priority into the supported range.
pub fn clamp_priority(p: Priority) -> Priority {
    p.clamp(PRIORITY_MIN, PRIORITY_MAX)
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Inbox,
    Active,
    Blocked,
    Done,
    Archived,
}

/// Statuses that count as complete in the two-value view.
pub const COMPLETE_STATUSES: [&str; 2] = ["done", "archived"];

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Inbox => "inbox",
            TaskStatus::Active => "active",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
            TaskStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "inbox" => Some(TaskStatus::Inbox),
            "active" => Some(TaskStatus::Active),
            "blocked" => Some(TaskStatus::Blocked),
            "done" => Some(TaskStatus::Done),
            "archived" => Some(TaskStatus::Archived),
            _ => None,
        }
    }

    /// Whether this status maps to `complete` in the two-value view.
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Archived)
    }
}

/// A task row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub display_number: i64,
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub available_date: Option<String>,
    pub due_date: Option<String>,
    pub flagged: bool,
    pub recurrence: Option<String>,
    pub recurrence_parent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// Project status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Active,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ProjectStatus::Active),
            "archived" => Some(ProjectStatus::Archived),
            _ => None,
        }
    }
}

/// A project tasks can belong to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Project membership as attached to list results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectRef {
    pub id: String,
    pub short_id: String,
    pub name: String,
}

/// A task enriched with its related collections, as returned by list runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListTask {
    #[serde(flatten)]
    pub task: Task,
    pub tags: Vec<String>,
    pub projects: Vec<ProjectRef>,
    /// Tasks this task depends on.
    pub depends_on: Vec<String>,
    /// Tasks that depend on this task.
    pub blocks: Vec<String>,
    pub is_blocked: bool,
}

impl ListTask {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            tags: Vec::new(),
            projects: Vec::new(),
            depends_on: Vec::new(),
            blocks: Vec::new(),
            is_blocked: false,
        }
    }

    /// Text value of a named field for grouping and ordering.
    ///
    /// `None` means the field is not part of the task shape; `Some(None)` means
    /// the field exists but is null.
    pub fn field_text(&self, field: &str) -> Option<Option<String>> {
        let t = &self.task;
        let value = match field {
            "id" => Some(t.id.clone()),
            "display_number" => Some(t.display_number.to_string()),
            "title" => Some(t.title.clone()),
            "description" => t.description.clone(),
            "notes" => t.notes.clone(),
            "status" => Some(t.status.as_str().to_string()),
            "priority" => Some(t.priority.to_string()),
            "available_date" => t.available_date.clone(),
            "due_date" => t.due_date.clone(),
            "flagged" => Some(t.flagged.to_string()),
            "recurrence" => t.recurrence.clone(),
            "created_at" => Some(t.created_at.clone()),
            "updated_at" => Some(t.updated_at.clone()),
            "completed_at" => t.completed_at.clone(),
            "blocked" => Some(self.is_blocked.to_string()),
            "tags" => {
                if self.tags.is_empty() {
                    None
                } else {
                    let mut tags = self.tags.clone();
                    tags.sort();
                    Some(tags.join(","))
                }
            }
            _ => return None,
        };
        Some(value)
    }
}

/// A saved list definition.
///
/// `query_definition` and `sort_definition` hold the persisted JSON text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedList {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub description: Option<String>,
    pub query_definition: String,
    pub sort_definition: Option<String>,
    pub schedule: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SavedList {
    /// JSON shape returned to callers, with the AST and sort definition parsed back
    /// into structured values. Corrupt text is returned as a string.
    pub fn to_json(&self) -> Value {
        let parse = |text: &str| {
            serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()))
        };
        serde_json::json!({
            "id": self.id,
            "short_id": self.short_id,
            "name": self.name,
            "description": self.description,
            "query_definition": parse(&self.query_definition),
            "sort_definition": self.sort_definition.as_deref().map(parse),
            "schedule": self.schedule,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        })
    }
}

/// Fields for a new task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub available_date: Option<String>,
    pub due_date: Option<String>,
    #[serde(default)]
    pub flagged: bool,
    pub recurrence: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Project ids or short ids.
    #[serde(default)]
    pub projects: Vec<String>,
}

/// Patch for an existing task. Outer `None` leaves a field untouched; for
/// nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub available_date: Option<Option<String>>,
    pub due_date: Option<Option<String>>,
    pub flagged: Option<bool>,
    pub recurrence: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

/// Fields for a new saved list. Definitions may be structured JSON or
/// pre-serialized JSON text.
#[derive(Debug, Clone, Default)]
pub struct NewList {
    pub name: String,
    pub description: Option<String>,
    pub query_definition: Value,
    pub sort_definition: Option<Value>,
    pub schedule: Option<String>,
}

/// Patch for a saved list. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct ListPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub query_definition: Option<Value>,
    pub sort_definition: Option<Option<Value>>,
    pub schedule: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_two_value_view() {
        assert!(TaskStatus::Done.is_complete());
        assert!(TaskStatus::Archived.is_complete());
        assert!(!TaskStatus::Blocked.is_complete());
        assert!(!TaskStatus::Inbox.is_complete());
        for s in COMPLETE_STATUSES {
            assert!(TaskStatus::parse(s).unwrap().is_complete());
        }
    }

    #[test]
    fn priority_is_clamped() {
        assert_eq!(clamp_priority(-4), 0);
        assert_eq!(clamp_priority(2), 2);
        assert_eq!(clamp_priority(9), 3);
    }
}
