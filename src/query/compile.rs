//! Compilation of query ASTs into parameterized SQL predicates.
//!
//! Fragments reference the task row through the alias `t` and use positional
//! `?` placeholders. Only literal values from the AST are bound as parameters;
//! column names, operators and subqueries come from the match arms below.

use super::ast::{Condition, Group, Node};
use super::dates;
use crate::types::COMPLETE_STATUSES;
use chrono::{Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

pub const ALWAYS_TRUE: &str = "1 = 1";
pub const ALWAYS_FALSE: &str = "1 = 0";

/// Resolves a project reference (primary id or short id) to its primary id.
pub trait ProjectLookup {
    fn resolve_project(&self, reference: &str) -> Option<String>;
}

/// Inputs shared by every condition of one compilation.
pub struct CompileContext<'a> {
    /// Reference date for relative expressions, in the user's zone.
    pub today: NaiveDate,
    /// Zone that maps stored UTC timestamps onto calendar days.
    pub tz: Tz,
    pub projects: &'a dyn ProjectLookup,
}

impl<'a> CompileContext<'a> {
    pub fn new(tz: Tz, projects: &'a dyn ProjectLookup) -> Self {
        Self {
            today: dates::today_in(tz),
            tz,
            projects,
        }
    }

    pub fn on(today: NaiveDate, tz: Tz, projects: &'a dyn ProjectLookup) -> Self {
        Self {
            today,
            tz,
            projects,
        }
    }
}

/// A WHERE expression plus its bound values, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub where_clause: String,
    pub params: Vec<SqlValue>,
}

/// Compile a whole tree.
pub fn compile(node: &Node, ctx: &CompileContext<'_>) -> CompiledQuery {
    let mut params = Vec::new();
    let where_clause = compile_node(node, ctx, &mut params);
    CompiledQuery {
        where_clause,
        params,
    }
}

/// Compile one node, appending its values to `params`.
pub fn compile_node(node: &Node, ctx: &CompileContext<'_>, params: &mut Vec<SqlValue>) -> String {
    match node {
        Node::Condition(condition) => compile_condition(condition, ctx, params),
        Node::Group(group) => compile_group(group, ctx, params),
        Node::Invalid => ALWAYS_FALSE.to_string(),
    }
}

fn compile_group(group: &Group, ctx: &CompileContext<'_>, params: &mut Vec<SqlValue>) -> String {
    if group.children.is_empty() {
        return ALWAYS_TRUE.to_string();
    }
    let joiner = format!(" {} ", group.operator.as_sql());
    group
        .children
        .iter()
        .map(|child| format!("({})", compile_node(child, ctx, params)))
        .collect::<Vec<_>>()
        .join(&joiner)
}

/// Compile a single condition.
///
/// Any `(field, operator)` pair not matched below is always-false.
pub fn compile_condition(
    condition: &Condition,
    ctx: &CompileContext<'_>,
    params: &mut Vec<SqlValue>,
) -> String {
    let value = &condition.value;
    match (condition.field.as_str(), condition.operator.as_str()) {
        ("title", op) => compile_title(op, value, params),

        (field @ ("available_date" | "due_date" | "completed_at"), "is_empty") => {
            format!("(t.{field} IS NULL OR t.{field} = '')")
        }
        ("completed_at", op) => {
            let Some(date) = scalar_text(value)
                .and_then(|v| dates::resolve_on(&v, ctx.today))
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
            else {
                return ALWAYS_FALSE.to_string();
            };
            compile_timestamp_day(op, date, ctx.tz, params)
        }
        (field @ ("available_date" | "due_date"), op) => {
            let Some(cmp) = date_comparison(op) else {
                return ALWAYS_FALSE.to_string();
            };
            let Some(date) = scalar_text(value).and_then(|v| dates::resolve_on(&v, ctx.today))
            else {
                return ALWAYS_FALSE.to_string();
            };
            params.push(SqlValue::Text(date));
            format!("date(t.{field}) {cmp} date(?)")
        }

        ("status", "equals") => match scalar_text(value).as_deref().and_then(normalize_status) {
            Some(StatusView::Complete) => format!("t.status IN ({})", complete_status_list()),
            Some(StatusView::Incomplete) => format!("t.status NOT IN ({})", complete_status_list()),
            None => ALWAYS_FALSE.to_string(),
        },

        ("flagged", "equals") => {
            params.push(SqlValue::Integer(is_truthy(value) as i64));
            "t.flagged = ?".to_string()
        }

        ("priority", op) => {
            let Some(cmp) = priority_comparison(op) else {
                return ALWAYS_FALSE.to_string();
            };
            let Some(priority) = integer_value(value) else {
                return ALWAYS_FALSE.to_string();
            };
            params.push(SqlValue::Integer(priority));
            format!("t.priority {cmp} ?")
        }

        ("tags", "is_empty") => {
            "NOT EXISTS (SELECT 1 FROM task_tags tg WHERE tg.task_id = t.id)".to_string()
        }
        ("tags", op @ ("includes" | "is" | "excludes" | "is_not")) => {
            let tags: Vec<String> = value_list(value)
                .into_iter()
                .map(|tag| tag.to_lowercase())
                .collect();
            membership(
                is_negated(op),
                "SELECT 1 FROM task_tags tg WHERE tg.task_id = t.id AND lower(tg.tag)",
                tags,
                params,
            )
        }

        ("project", "is_empty") => {
            "NOT EXISTS (SELECT 1 FROM task_projects tp WHERE tp.task_id = t.id)".to_string()
        }
        ("project", op @ ("includes" | "is" | "excludes" | "is_not")) => {
            let mut ids: Vec<String> = Vec::new();
            for reference in value_list(value) {
                if let Some(id) = ctx.projects.resolve_project(&reference) {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
            membership(
                is_negated(op),
                "SELECT 1 FROM task_projects tp WHERE tp.task_id = t.id AND tp.project_id",
                ids,
                params,
            )
        }

        ("blocked", "equals") => {
            let exists = format!(
                "EXISTS (SELECT 1 FROM task_dependencies d \
                 JOIN tasks dep ON dep.id = d.depends_on_id \
                 WHERE d.task_id = t.id AND dep.status NOT IN ({}))",
                complete_status_list()
            );
            if is_truthy(value) {
                exists
            } else {
                format!("NOT {exists}")
            }
        }

        _ => ALWAYS_FALSE.to_string(),
    }
}

fn compile_title(op: &str, value: &Value, params: &mut Vec<SqlValue>) -> String {
    let Some(text) = scalar_text(value) else {
        return ALWAYS_FALSE.to_string();
    };
    // instr/substr keep matching case-sensitive and treat the value literally
    let (sql, binds) = match op {
        "contains" => ("instr(t.title, ?) > 0", 1),
        "not_contains" => ("instr(t.title, ?) = 0", 1),
        "equals" => ("t.title = ?", 1),
        "starts_with" => ("substr(t.title, 1, length(?)) = ?", 2),
        "ends_with" => (
            "(length(t.title) >= length(?) AND substr(t.title, length(t.title) - length(?) + 1) = ?)",
            3,
        ),
        _ => return ALWAYS_FALSE.to_string(),
    };
    params.extend((0..binds).map(|_| SqlValue::Text(text.clone())));
    sql.to_string()
}

/// Compare a UTC timestamp column against a calendar day in `tz`. The day is
/// turned into the half-open instant range `[start, next)` so evening
/// completions west of UTC still land on their local day.
fn compile_timestamp_day(op: &str, day: NaiveDate, tz: Tz, params: &mut Vec<SqlValue>) -> String {
    let Some(next_day) = day.checked_add_days(Days::new(1)) else {
        return ALWAYS_FALSE.to_string();
    };
    let start = local_midnight_utc(day, tz);
    let next = local_midnight_utc(next_day, tz);
    let column = "julianday(t.completed_at)";
    match op {
        "is_on" => {
            params.push(SqlValue::Text(start));
            params.push(SqlValue::Text(next));
            format!("({column} >= julianday(?) AND {column} < julianday(?))")
        }
        "is_before" => {
            params.push(SqlValue::Text(start));
            format!("{column} < julianday(?)")
        }
        "is_on_or_after" => {
            params.push(SqlValue::Text(start));
            format!("{column} >= julianday(?)")
        }
        "is_after" => {
            params.push(SqlValue::Text(next));
            format!("{column} >= julianday(?)")
        }
        "is_on_or_before" => {
            params.push(SqlValue::Text(next));
            format!("{column} < julianday(?)")
        }
        _ => ALWAYS_FALSE.to_string(),
    }
}

/// First instant of `day` in `tz`, as RFC 3339 UTC. A midnight skipped by a
/// DST jump resolves one hour later.
fn local_midnight_utc(day: NaiveDate, tz: Tz) -> String {
    let midnight = day.and_time(chrono::NaiveTime::MIN);
    let instant = tz
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(midnight + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight));
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// `EXISTS`/`NOT EXISTS` over an `IN (...)` list with vacuous results for an
/// empty list: includes → false, excludes → true.
fn membership(
    negated: bool,
    subquery_prefix: &str,
    values: Vec<String>,
    params: &mut Vec<SqlValue>,
) -> String {
    if values.is_empty() {
        let vacuous = if negated { ALWAYS_TRUE } else { ALWAYS_FALSE };
        return vacuous.to_string();
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    params.extend(values.into_iter().map(SqlValue::Text));
    let exists = format!("EXISTS ({subquery_prefix} IN ({placeholders}))");
    if negated {
        format!("NOT {exists}")
    } else {
        exists
    }
}

fn is_negated(op: &str) -> bool {
    matches!(op, "excludes" | "is_not")
}

fn date_comparison(op: &str) -> Option<&'static str> {
    match op {
        "is_on" => Some("="),
        "is_before" => Some("<"),
        "is_after" => Some(">"),
        "is_on_or_before" => Some("<="),
        "is_on_or_after" => Some(">="),
        _ => None,
    }
}

fn priority_comparison(op: &str) -> Option<&'static str> {
    match op {
        "equals" => Some("="),
        "greater_than" => Some(">"),
        "less_than" => Some("<"),
        "greater_or_equal" => Some(">="),
        "less_or_equal" => Some("<="),
        _ => None,
    }
}

enum StatusView {
    Incomplete,
    Complete,
}

fn normalize_status(s: &str) -> Option<StatusView> {
    match s.trim().to_lowercase().as_str() {
        "incomplete" | "open" | "todo" => Some(StatusView::Incomplete),
        "complete" | "completed" | "done" => Some(StatusView::Complete),
        _ => None,
    }
}

pub(crate) fn complete_status_list() -> String {
    COMPLETE_STATUSES
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Truthy set: `true`, `1`, `"1"`, `"true"`, `"yes"`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A list value; a single scalar is treated as a one-element list.
fn value_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::Null => Vec::new(),
        other => scalar_text(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct Projects(HashMap<&'static str, &'static str>);

    impl ProjectLookup for Projects {
        fn resolve_project(&self, reference: &str) -> Option<String> {
            self.0.get(reference).map(|id| id.to_string())
        }
    }

    fn projects() -> Projects {
        Projects(HashMap::from([("alph", "p-1"), ("p-1", "p-1"), ("beta", "p-2")]))
    }

    fn compile_json(value: Value) -> CompiledQuery {
        let lookup = projects();
        let today = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let ctx = CompileContext::on(today, Tz::UTC, &lookup);
        compile(&Node::from_value(&value), &ctx)
    }

    fn cond(field: &str, operator: &str, value: Value) -> Value {
        json!({"type": "condition", "field": field, "operator": operator, "value": value})
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn empty_group_is_always_true() {
        let q = compile_json(json!({"type": "group", "operator": "AND", "children": []}));
        assert_eq!(q.where_clause, ALWAYS_TRUE);
        assert!(q.params.is_empty());
    }

    #[test]
    fn group_parenthesizes_children_in_order() {
        let q = compile_json(json!({
            "type": "group",
            "operator": "OR",
            "children": [
                cond("priority", "greater_than", json!(1)),
                {"type": "group", "operator": "AND", "children": [
                    cond("title", "equals", json!("a")),
                    cond("flagged", "equals", json!("yes"))
                ]}
            ]
        }));
        assert_eq!(
            q.where_clause,
            "(t.priority > ?) OR ((t.title = ?) AND (t.flagged = ?))"
        );
        assert_eq!(
            q.params,
            vec![SqlValue::Integer(1), text("a"), SqlValue::Integer(1)]
        );
    }

    #[test]
    fn unknown_pairs_fail_closed() {
        for value in [
            cond("title", "matches", json!("x")),
            cond("owner", "equals", json!("me")),
            cond("status", "contains", json!("complete")),
            cond("status", "equals", json!("waiting")),
            cond("priority", "equals", json!("high")),
            cond("due_date", "is_on", json!("someday")),
            cond("due_date", "around", json!("today")),
            json!({"type": "nope"}),
            json!([1, 2]),
        ] {
            let q = compile_json(value);
            assert_eq!(q.where_clause, ALWAYS_FALSE);
            assert!(q.params.is_empty());
        }
    }

    #[test]
    fn completed_at_binds_local_day_bounds() {
        let lookup = projects();
        let today = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let ctx = CompileContext::on(today, Tz::America__New_York, &lookup);
        let q = compile(
            &Node::from_value(&cond("completed_at", "is_on", json!("today"))),
            &ctx,
        );
        assert_eq!(
            q.where_clause,
            "(julianday(t.completed_at) >= julianday(?) AND julianday(t.completed_at) < julianday(?))"
        );
        assert_eq!(
            q.params,
            vec![text("2025-01-06T05:00:00Z"), text("2025-01-07T05:00:00Z")]
        );

        let q = compile(
            &Node::from_value(&cond("completed_at", "is_after", json!("2025-07-01"))),
            &ctx,
        );
        assert_eq!(q.where_clause, "julianday(t.completed_at) >= julianday(?)");
        assert_eq!(q.params, vec![text("2025-07-02T04:00:00Z")]);
    }

    #[test]
    fn dates_are_resolved_before_binding() {
        let q = compile_json(cond("due_date", "is_on_or_before", json!("tomorrow")));
        assert_eq!(q.where_clause, "date(t.due_date) <= date(?)");
        assert_eq!(q.params, vec![text("2025-01-07")]);

        let q = compile_json(cond("completed_at", "is_empty", json!("garbage")));
        assert_eq!(q.where_clause, "(t.completed_at IS NULL OR t.completed_at = '')");
        assert!(q.params.is_empty());
    }

    #[test]
    fn status_uses_two_value_view() {
        let q = compile_json(cond("status", "equals", json!("Incomplete")));
        assert_eq!(q.where_clause, "t.status NOT IN ('done', 'archived')");
        let q = compile_json(cond("status", "equals", json!("complete")));
        assert_eq!(q.where_clause, "t.status IN ('done', 'archived')");
    }

    #[test]
    fn truthy_values() {
        for v in [json!(true), json!(1), json!("1"), json!("true"), json!("YES")] {
            assert!(is_truthy(&v), "{v} should be truthy");
        }
        for v in [json!(false), json!(0), json!("no"), json!(null), json!(2)] {
            assert!(!is_truthy(&v), "{v} should be falsy");
        }
    }

    #[test]
    fn tag_lists_follow_vacuous_rules() {
        assert_eq!(compile_json(cond("tags", "includes", json!([]))).where_clause, ALWAYS_FALSE);
        assert_eq!(compile_json(cond("tags", "is", json!([]))).where_clause, ALWAYS_FALSE);
        assert_eq!(compile_json(cond("tags", "excludes", json!([]))).where_clause, ALWAYS_TRUE);
        assert_eq!(compile_json(cond("tags", "is_not", json!([]))).where_clause, ALWAYS_TRUE);

        let q = compile_json(cond("tags", "excludes", json!(["Home", "work"])));
        assert_eq!(
            q.where_clause,
            "NOT EXISTS (SELECT 1 FROM task_tags tg WHERE tg.task_id = t.id AND lower(tg.tag) IN (?, ?))"
        );
        assert_eq!(q.params, vec![text("home"), text("work")]);
    }

    #[test]
    fn projects_resolve_and_drop_unknown_references() {
        let q = compile_json(cond("project", "includes", json!(["alph", "p-1", "nope", "beta"])));
        assert!(q.where_clause.starts_with("EXISTS (SELECT 1 FROM task_projects"));
        assert_eq!(q.params, vec![text("p-1"), text("p-2")]);

        let q = compile_json(cond("project", "includes", json!(["missing"])));
        assert_eq!(q.where_clause, ALWAYS_FALSE);
        let q = compile_json(cond("project", "excludes", json!(["missing"])));
        assert_eq!(q.where_clause, ALWAYS_TRUE);
    }

    #[test]
    fn title_anchors_bind_value_per_placeholder() {
        let q = compile_json(cond("title", "ends_with", json!("report")));
        assert_eq!(q.where_clause.matches('?').count(), 3);
        assert!(!q.where_clause.contains("?1"));
        assert_eq!(q.params, vec![text("report"); 3]);

        let q = compile_json(cond("title", "starts_with", json!("Re")));
        assert_eq!(q.where_clause, "substr(t.title, 1, length(?)) = ?");
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn user_text_never_reaches_sql() {
        let hostile = "x') OR 1=1; DROP TABLE tasks; --";
        for (field, op) in [("title", "contains"), ("tags", "includes"), ("due_date", "is_on")] {
            let q = compile_json(cond(field, op, json!(hostile)));
            assert!(!q.where_clause.contains("DROP"), "{field} {op}");
        }
    }
}
