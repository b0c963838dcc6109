//! Grouping and multi-key ordering of list results.

use crate::types::ListTask;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Declarative sort specification stored with a saved list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortDefinition {
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub sort_within_group: Vec<SortKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

// Anything other than "desc" sorts ascending.
impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref().map(str::to_lowercase).as_deref() {
            Some("desc") => Direction::Desc,
            _ => Direction::Asc,
        })
    }
}

impl SortDefinition {
    /// Parse persisted JSON text; malformed text yields `None` (no-op sort).
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.group_by.is_empty() && self.sort_within_group.is_empty()
    }
}

const DATE_FIELDS: [&str; 4] = ["due_date", "available_date", "created_at", "completed_at"];
const MISSING_DATE: (i32, i32, i32) = (9999, 99, 99);

/// One component of a composite sort key.
///
/// Every task gets the same sequence of variants for a given definition, so
/// the derived ordering only ever compares like with like.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Projects(Vec<String>),
    Group(bool, String),
    Int(i64),
    Date(i32, i32, i32),
    Text(String),
    TextDesc(Reverse<String>),
}

/// Reorder `tasks` in place. Tasks with equal keys keep their input order.
pub fn apply(tasks: &mut [ListTask], definition: Option<&SortDefinition>) {
    let Some(definition) = definition else {
        return;
    };
    if tasks.is_empty() || definition.is_empty() {
        return;
    }
    tasks.sort_by_cached_key(|task| sort_key(task, definition));
}

fn sort_key(task: &ListTask, definition: &SortDefinition) -> Vec<KeyPart> {
    let mut key = Vec::new();

    for field in &definition.group_by {
        if field == "project" {
            let mut ids: Vec<String> = task.projects.iter().map(|p| p.id.clone()).collect();
            ids.sort();
            key.push(KeyPart::Projects(ids));
        } else if let Some(value) = task.field_text(field) {
            key.push(KeyPart::Group(value.is_none(), value.unwrap_or_default()));
        }
    }

    for SortKey { field, direction } in &definition.sort_within_group {
        let desc = *direction == Direction::Desc;
        if field == "priority" {
            let p = task.task.priority as i64;
            key.push(KeyPart::Int(if desc { -p } else { p }));
        } else if DATE_FIELDS.contains(&field.as_str()) {
            let (y, m, d) = task
                .field_text(field)
                .flatten()
                .as_deref()
                .and_then(date_triple)
                .unwrap_or(MISSING_DATE);
            key.push(if desc {
                KeyPart::Date(-y, -m, -d)
            } else {
                KeyPart::Date(y, m, d)
            });
        } else {
            let text = task.field_text(field).flatten().unwrap_or_default();
            key.push(if desc {
                KeyPart::TextDesc(Reverse(text))
            } else {
                KeyPart::Text(text)
            });
        }
    }

    key
}

/// `(year, month, day)` from the leading `YYYY-MM-DD` of a date or timestamp.
fn date_triple(s: &str) -> Option<(i32, i32, i32)> {
    let date = s.get(..10)?;
    let mut parts = date.split('-');
    let y = parts.next()?.parse().ok()?;
    let m = parts.next()?.parse().ok()?;
    let d = parts.next()?.parse().ok()?;
    Some((y, m, d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProjectRef, Task, TaskStatus};

    fn task(n: i64) -> ListTask {
        ListTask::new(Task {
            id: format!("t{n}"),
            display_number: n,
            title: format!("Task {n}"),
            description: None,
            notes: None,
            status: TaskStatus::Active,
            priority: 0,
            available_date: None,
            due_date: None,
            flagged: false,
            recurrence: None,
            recurrence_parent_id: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
            completed_at: None,
        })
    }

    fn with_due(n: i64, due: Option<&str>) -> ListTask {
        let mut t = task(n);
        t.task.due_date = due.map(String::from);
        t
    }

    fn with_projects(n: i64, ids: &[&str]) -> ListTask {
        let mut t = task(n);
        t.projects = ids
            .iter()
            .map(|id| ProjectRef {
                id: id.to_string(),
                short_id: id.to_string(),
                name: id.to_string(),
            })
            .collect();
        t
    }

    fn order(tasks: &[ListTask]) -> Vec<i64> {
        tasks.iter().map(|t| t.task.display_number).collect()
    }

    fn def(json: serde_json::Value) -> SortDefinition {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn absent_definition_is_noop() {
        let mut tasks = vec![task(3), task(1), task(2)];
        apply(&mut tasks, None);
        assert_eq!(order(&tasks), vec![3, 1, 2]);
        apply(&mut tasks, Some(&SortDefinition::default()));
        assert_eq!(order(&tasks), vec![3, 1, 2]);
    }

    #[test]
    fn missing_dates_sort_last_ascending_and_first_descending() {
        let mut tasks = vec![
            with_due(1, None),
            with_due(2, Some("2025-01-10")),
            with_due(3, Some("2025-01-05")),
            with_due(4, Some("not a date")),
        ];
        let asc = def(serde_json::json!({"sort_within_group": [{"field": "due_date", "direction": "asc"}]}));
        apply(&mut tasks, Some(&asc));
        assert_eq!(order(&tasks), vec![3, 2, 1, 4]);

        let desc = def(serde_json::json!({"sort_within_group": [{"field": "due_date", "direction": "desc"}]}));
        apply(&mut tasks, Some(&desc));
        assert_eq!(order(&tasks), vec![1, 4, 2, 3]);
    }

    #[test]
    fn priority_desc_then_title_asc() {
        let mut a = task(1);
        a.task.priority = 1;
        a.task.title = "b".into();
        let mut b = task(2);
        b.task.priority = 3;
        let mut c = task(3);
        c.task.priority = 1;
        c.task.title = "a".into();
        let mut tasks = vec![a, b, c];
        let d = def(serde_json::json!({"sort_within_group": [
            {"field": "priority", "direction": "desc"},
            {"field": "title"}
        ]}));
        apply(&mut tasks, Some(&d));
        assert_eq!(order(&tasks), vec![2, 3, 1]);
    }

    #[test]
    fn directions_are_per_field() {
        let mut tasks = vec![task(1), task(2), task(3), task(4)];
        tasks[0].task.status = TaskStatus::Inbox;
        tasks[0].task.title = "a".into();
        tasks[1].task.status = TaskStatus::Active;
        tasks[1].task.title = "a".into();
        tasks[2].task.status = TaskStatus::Inbox;
        tasks[2].task.title = "z".into();
        tasks[3].task.status = TaskStatus::Active;
        tasks[3].task.title = "z".into();
        let d = def(serde_json::json!({
            "group_by": ["status"],
            "sort_within_group": [{"field": "title", "direction": "desc"}]
        }));
        apply(&mut tasks, Some(&d));
        // "active" < "inbox"; titles descend within each group
        assert_eq!(order(&tasks), vec![4, 2, 3, 1]);
    }

    #[test]
    fn project_groups_ignore_membership_order() {
        let mut tasks = vec![
            with_projects(1, &["p2", "p1"]),
            with_projects(2, &["p3"]),
            with_projects(3, &["p1", "p2"]),
            with_projects(4, &[]),
        ];
        let d = def(serde_json::json!({"group_by": ["project"]}));
        apply(&mut tasks, Some(&d));
        assert_eq!(order(&tasks), vec![4, 1, 3, 2]);
    }

    #[test]
    fn null_groups_sort_after_populated_and_unknown_fields_are_ignored() {
        let mut tasks = vec![
            with_due(1, None),
            with_due(2, Some("2025-03-01")),
            with_due(3, Some("2025-02-01")),
        ];
        let d = def(serde_json::json!({"group_by": ["no_such_field", "due_date"]}));
        apply(&mut tasks, Some(&d));
        assert_eq!(order(&tasks), vec![3, 2, 1]);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let mut tasks: Vec<ListTask> = (1..=6).rev().map(task).collect();
        let d = def(serde_json::json!({"sort_within_group": [{"field": "priority"}]}));
        apply(&mut tasks, Some(&d));
        assert_eq!(order(&tasks), vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn malformed_definition_parses_to_none() {
        assert!(SortDefinition::parse("[oops").is_none());
        let d = SortDefinition::parse(r#"{"sort_within_group":[{"field":"due_date","direction":"sideways"}]}"#)
            .unwrap();
        assert_eq!(d.sort_within_group[0].direction, Direction::Asc);
    }
}
