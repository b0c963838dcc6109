//! Saved-list query AST.
//!
//! Persisted definitions are plain JSON. They are decoded here into a closed
//! sum type; anything that does not fit becomes [`Node::Invalid`], which the
//! compiler turns into an always-false predicate.

use serde_json::Value;

/// A node of the query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Condition(Condition),
    Group(Group),
    Invalid,
}

/// Leaf predicate: `field operator value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

/// Boolean combination of child nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub operator: BoolOp,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    /// Parse a group operator; unknown strings default to AND.
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(|s| s.trim().to_uppercase()).as_deref() {
            Some("OR") => BoolOp::Or,
            _ => BoolOp::And,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
        }
    }
}

impl Node {
    /// Decode a JSON value into a node.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Node::Invalid;
        };

        match obj.get("type").and_then(Value::as_str) {
            Some("condition") => Node::Condition(Condition {
                field: obj
                    .get("field")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                operator: obj
                    .get("operator")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                value: obj.get("value").cloned().unwrap_or(Value::Null),
            }),
            Some("group") => Node::Group(Group {
                operator: BoolOp::parse(obj.get("operator").and_then(Value::as_str)),
                children: obj
                    .get("children")
                    .and_then(Value::as_array)
                    .map(|children| children.iter().map(Node::from_value).collect())
                    .unwrap_or_default(),
            }),
            _ => Node::Invalid,
        }
    }

    /// Parse persisted JSON text. Returns `None` if the text is not JSON.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str::<Value>(text)
            .ok()
            .map(|value| Node::from_value(&value))
    }

    /// Build a condition node.
    pub fn condition(field: &str, operator: &str, value: Value) -> Self {
        Node::Condition(Condition {
            field: field.to_string(),
            operator: operator.to_string(),
            value,
        })
    }

    /// Build an AND group.
    pub fn all(children: Vec<Node>) -> Self {
        Node::Group(Group {
            operator: BoolOp::And,
            children,
        })
    }

    /// Encode back to the persisted JSON shape. `Invalid` encodes as `null`.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Condition(c) => serde_json::json!({
                "type": "condition",
                "field": c.field,
                "operator": c.operator,
                "value": c.value,
            }),
            Node::Group(g) => serde_json::json!({
                "type": "group",
                "operator": g.operator.as_sql(),
                "children": g.children.iter().map(Node::to_value).collect::<Vec<_>>(),
            }),
            Node::Invalid => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_nested_groups() {
        let node = Node::from_value(&json!({
            "type": "group",
            "operator": "or",
            "children": [
                {"type": "condition", "field": "status", "operator": "equals", "value": "incomplete"},
                {"type": "group", "operator": "AND", "children": []}
            ]
        }));
        let Node::Group(group) = node else {
            panic!("expected group");
        };
        assert_eq!(group.operator, BoolOp::Or);
        assert_eq!(group.children.len(), 2);
        assert!(matches!(group.children[0], Node::Condition(_)));
        assert!(matches!(&group.children[1], Node::Group(g) if g.children.is_empty()));
    }

    #[test]
    fn malformed_nodes_are_invalid() {
        assert_eq!(Node::from_value(&json!("status")), Node::Invalid);
        assert_eq!(Node::from_value(&json!({"type": "not"})), Node::Invalid);
        assert_eq!(Node::from_value(&json!({"field": "title"})), Node::Invalid);
        let Node::Group(group) = Node::from_value(&json!({
            "type": "group",
            "children": [42, null]
        })) else {
            panic!("expected group");
        };
        assert_eq!(group.operator, BoolOp::And);
        assert_eq!(group.children, vec![Node::Invalid, Node::Invalid]);
    }

    #[test]
    fn unknown_group_operator_defaults_to_and() {
        assert_eq!(BoolOp::parse(Some("XOR")), BoolOp::And);
        assert_eq!(BoolOp::parse(None), BoolOp::And);
        assert_eq!(BoolOp::parse(Some(" Or ")), BoolOp::Or);
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(Node::parse("{not json").is_none());
        assert!(Node::parse(r#"{"type":"group","children":[]}"#).is_some());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let value = json!({
            "type": "group",
            "operator": "AND",
            "children": [
                {"type": "condition", "field": "tags", "operator": "includes", "value": ["home", "errand"]},
                {"type": "condition", "field": "priority", "operator": "greater_than", "value": 1}
            ]
        });
        let node = Node::from_value(&value);
        assert_eq!(node.to_value(), value);
        assert_eq!(Node::from_value(&node.to_value()), node);
    }
}
