//! Output formatting utilities for markdown and JSON.

use crate::query::SortDefinition;
use crate::types::{ListTask, SavedList};
use serde_json::Value;

/// Output format for list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

/// One task as a markdown bullet.
pub fn format_task_short(item: &ListTask) -> String {
    let task = &item.task;
    let flag = if task.flagged { "⚑ " } else { "" };
    let priority = if task.priority > 0 {
        format!(" {}", "!".repeat(task.priority as usize))
    } else {
        String::new()
    };
    let due = task
        .due_date
        .as_ref()
        .map(|d| format!(" (due {d})"))
        .unwrap_or_default();
    let tags = if item.tags.is_empty() {
        String::new()
    } else {
        let tags: Vec<String> = item.tags.iter().map(|t| format!("#{t}")).collect();
        format!(" {}", tags.join(" "))
    };
    let blocked = if item.is_blocked { " [blocked]" } else { "" };

    format!(
        "- {}#{} {}{}{}{}{}\n",
        flag, task.display_number, task.title, priority, due, tags, blocked
    )
}

/// Heading text for a task under the given group field.
fn group_label(item: &ListTask, field: &str) -> String {
    if field == "project" || field == "projects" {
        return if item.projects.is_empty() {
            "No project".to_string()
        } else {
            let names: Vec<&str> = item.projects.iter().map(|p| p.name.as_str()).collect();
            names.join(", ")
        };
    }
    match item.field_text(field) {
        Some(Some(text)) => text,
        _ => format!("No {}", field.replace('_', " ")),
    }
}

/// Render list results as a markdown digest.
///
/// Tasks are expected in their final order; consecutive tasks sharing the
/// first `group_by` value are placed under one heading.
pub fn format_list_markdown(title: &str, tasks: &[ListTask], sort: Option<&SortDefinition>) -> String {
    let mut md = format!("# {} ({})\n\n", title, tasks.len());

    if tasks.is_empty() {
        md.push_str("_No matching tasks._\n");
        return md;
    }

    let group_field = sort.and_then(|s| s.group_by.first());
    let Some(field) = group_field else {
        for item in tasks {
            md.push_str(&format_task_short(item));
        }
        return md;
    };

    let mut current: Option<String> = None;
    for item in tasks {
        let label = group_label(item, field);
        if current.as_deref() != Some(label.as_str()) {
            if current.is_some() {
                md.push('\n');
            }
            md.push_str(&format!("## {label}\n\n"));
            current = Some(label);
        }
        md.push_str(&format_task_short(item));
    }

    md
}

/// Digest for a saved list, using its stored ordering for grouping.
pub fn format_digest_markdown(list: &SavedList, tasks: &[ListTask]) -> String {
    let sort = list
        .sort_definition
        .as_deref()
        .and_then(SortDefinition::parse);
    format_list_markdown(&list.name, tasks, sort.as_ref())
}

/// Wrap markdown content for a tool response.
pub fn markdown_to_json(md: String) -> Value {
    serde_json::json!({
        "format": "markdown",
        "content": md
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProjectRef, Task, TaskStatus};

    fn item(number: i64, title: &str, project: Option<&str>) -> ListTask {
        let mut item = ListTask::new(Task {
            id: format!("id-{number}"),
            display_number: number,
            title: title.to_string(),
            description: None,
            notes: None,
            status: TaskStatus::Active,
            priority: 0,
            available_date: None,
            due_date: None,
            flagged: false,
            recurrence: None,
            recurrence_parent_id: None,
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
            completed_at: None,
        });
        if let Some(name) = project {
            item.projects.push(ProjectRef {
                id: format!("p-{name}"),
                short_id: name.to_lowercase(),
                name: name.to_string(),
            });
        }
        item
    }

    #[test]
    fn bullet_shows_number_flag_and_tags() {
        let mut t = item(7, "Call bank", None);
        t.task.flagged = true;
        t.task.priority = 2;
        t.task.due_date = Some("2025-01-10".into());
        t.tags = vec!["phone".into()];
        t.is_blocked = true;
        assert_eq!(
            format_task_short(&t),
            "- ⚑ #7 Call bank !! (due 2025-01-10) #phone [blocked]\n"
        );
    }

    #[test]
    fn groups_by_first_group_field() {
        let tasks = vec![
            item(1, "A", Some("Home")),
            item(2, "B", Some("Home")),
            item(3, "C", None),
        ];
        let sort = SortDefinition::parse(r#"{"group_by":["project"]}"#).unwrap();
        let md = format_list_markdown("Today", &tasks, Some(&sort));
        assert!(md.starts_with("# Today (3)\n\n## Home\n\n- #1 A\n- #2 B\n\n## No project\n\n- #3 C\n"));
    }

    #[test]
    fn empty_digest() {
        let md = format_list_markdown("Empty", &[], None);
        assert!(md.contains("_No matching tasks._"));
    }

    #[test]
    fn output_format_parse() {
        assert_eq!(OutputFormat::parse("MD"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::parse("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("xml"), None);
    }
}
