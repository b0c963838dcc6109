//! Saved list definitions.
//!
//! The query AST and sort specification are stored as JSON text. Structured
//! payloads are serialized on the way in; pre-serialized text is validated and
//! stored verbatim.

use super::short_id::{self, Namespace};
use super::{Database, now_ts};
use crate::error::ToolError;
use crate::scheduler::CronSchedule;
use crate::types::{ListPatch, NewList, SavedList};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

fn parse_list_row(row: &Row) -> rusqlite::Result<SavedList> {
    let short_id: Option<String> = row.get("short_id")?;
    Ok(SavedList {
        id: row.get("id")?,
        short_id: short_id.unwrap_or_default(),
        name: row.get("name")?,
        description: row.get("description")?,
        query_definition: row.get("query_definition")?,
        sort_definition: row.get("sort_definition")?,
        schedule: row.get("schedule")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Look up a list by primary id or short id using an existing connection.
pub(crate) fn find_list_internal(conn: &Connection, reference: &str) -> Result<Option<SavedList>> {
    let list = conn
        .query_row(
            "SELECT * FROM saved_lists WHERE id = ?1 OR short_id = lower(?1) LIMIT 1",
            params![reference.trim()],
            parse_list_row,
        )
        .optional()?;
    Ok(list)
}

/// Serialize a definition payload, accepting a JSON value or JSON text.
fn definition_text(value: &Value, field: &str) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Null) => Ok(None),
            Ok(parsed) if is_empty_definition(&parsed) => Ok(None),
            Ok(_) => Ok(Some(text.clone())),
            Err(e) => Err(ToolError::invalid_value(field, format!("{field} is not valid JSON: {e}")).into()),
        },
        other if is_empty_definition(other) => Ok(None),
        other => Ok(Some(serde_json::to_string(other)?)),
    }
}

fn is_empty_definition(value: &Value) -> bool {
    match value {
        Value::Object(obj) => obj.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// The query definition is mandatory and must be a non-empty JSON object.
fn required_query_text(value: &Value) -> Result<String> {
    let text = definition_text(value, "query_definition")?
        .ok_or_else(|| ToolError::missing_field("query_definition"))?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(_)) => Ok(text),
        _ => Err(ToolError::invalid_value(
            "query_definition",
            "query_definition must be a JSON object",
        )
        .into()),
    }
}

fn validated_schedule(schedule: Option<String>) -> Result<Option<String>> {
    match schedule {
        Some(expr) if !expr.trim().is_empty() => {
            let expr = expr.trim().to_string();
            CronSchedule::parse(&expr)
                .map_err(|e| ToolError::invalid_value("schedule", e.to_string()))?;
            Ok(Some(expr))
        }
        _ => Ok(None),
    }
}

/// Assign short ids to rows that lack one.
fn backfill_short_ids(conn: &Connection) -> Result<usize> {
    let missing: Vec<(String, String)> = {
        let mut stmt = conn.prepare(
            "SELECT id, name FROM saved_lists WHERE short_id IS NULL OR short_id = ''
             ORDER BY created_at, id",
        )?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?
    };

    for (id, name) in &missing {
        // Empty strings would otherwise collide on the unique index.
        conn.execute(
            "UPDATE saved_lists SET short_id = NULL WHERE id = ?1",
            params![id],
        )?;
        let short_id = short_id::allocate(conn, Namespace::Lists, name)?;
        conn.execute(
            "UPDATE saved_lists SET short_id = ?1 WHERE id = ?2",
            params![&short_id, id],
        )?;
    }
    Ok(missing.len())
}

impl Database {
    /// Create a saved list.
    pub fn create_list(&self, input: NewList) -> Result<SavedList> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ToolError::missing_field("name").into());
        }
        let query_definition = required_query_text(&input.query_definition)?;
        let sort_definition = match &input.sort_definition {
            Some(value) => definition_text(value, "sort_definition")?,
            None => None,
        };
        let schedule = validated_schedule(input.schedule)?;
        let id = Uuid::now_v7().to_string();
        let now = now_ts();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let short_id = short_id::allocate(&tx, Namespace::Lists, &name)?;
            tx.execute(
                "INSERT INTO saved_lists (
                    id, short_id, name, description, query_definition, sort_definition,
                    schedule, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    &id,
                    &short_id,
                    &name,
                    &input.description,
                    &query_definition,
                    &sort_definition,
                    &schedule,
                    &now,
                ],
            )?;
            tx.commit()?;

            info!(list_id = %id, short_id = %short_id, "Saved list created");

            Ok(SavedList {
                id,
                short_id,
                name,
                description: input.description,
                query_definition,
                sort_definition,
                schedule,
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    /// Get a list by primary id or short id.
    pub fn get_list(&self, reference: &str) -> Result<Option<SavedList>> {
        self.with_conn(|conn| find_list_internal(conn, reference))
    }

    /// All lists ordered by name. Lists without a short id get one first, in
    /// the same transaction.
    pub fn list_lists(&self) -> Result<Vec<SavedList>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let backfilled = backfill_short_ids(&tx)?;
            let lists = {
                let mut stmt = tx.prepare("SELECT * FROM saved_lists ORDER BY name, short_id")?;
                stmt.query_map([], parse_list_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            tx.commit()?;
            if backfilled > 0 {
                warn!(count = backfilled, "Backfilled missing list short ids");
            }
            Ok(lists)
        })
    }

    /// Patch a list. Each field is applied only when present.
    pub fn update_list(&self, reference: &str, patch: ListPatch) -> Result<SavedList> {
        let name = match patch.name {
            Some(n) if n.trim().is_empty() => return Err(ToolError::missing_field("name").into()),
            Some(n) => Some(n.trim().to_string()),
            None => None,
        };
        let query_definition = match &patch.query_definition {
            Some(value) => Some(required_query_text(value)?),
            None => None,
        };
        let sort_definition = match &patch.sort_definition {
            Some(Some(value)) => Some(definition_text(value, "sort_definition")?),
            Some(None) => Some(None),
            None => None,
        };
        let schedule = match patch.schedule {
            Some(s) => Some(validated_schedule(s)?),
            None => None,
        };
        let now = now_ts();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let list = find_list_internal(&tx, reference)?
                .ok_or_else(|| ToolError::list_not_found(reference))?;

            let updated = SavedList {
                name: name.unwrap_or(list.name.clone()),
                description: patch.description.unwrap_or(list.description.clone()),
                query_definition: query_definition.unwrap_or(list.query_definition.clone()),
                sort_definition: sort_definition.unwrap_or(list.sort_definition.clone()),
                schedule: schedule.unwrap_or(list.schedule.clone()),
                updated_at: now,
                ..list
            };

            tx.execute(
                "UPDATE saved_lists SET
                    name = ?1, description = ?2, query_definition = ?3,
                    sort_definition = ?4, schedule = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    &updated.name,
                    &updated.description,
                    &updated.query_definition,
                    &updated.sort_definition,
                    &updated.schedule,
                    &updated.updated_at,
                    &updated.id,
                ],
            )?;
            tx.commit()?;

            info!(list_id = %updated.id, "Saved list updated");
            Ok(updated)
        })
    }

    /// Delete a list. Tasks are untouched.
    pub fn delete_list(&self, reference: &str) -> Result<SavedList> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let list = find_list_internal(&tx, reference)?
                .ok_or_else(|| ToolError::list_not_found(reference))?;
            tx.execute("DELETE FROM saved_lists WHERE id = ?1", params![&list.id])?;
            tx.commit()?;
            info!(list_id = %list.id, "Saved list deleted");
            Ok(list)
        })
    }

    /// Lists that carry a delivery schedule.
    pub fn scheduled_lists(&self) -> Result<Vec<SavedList>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM saved_lists WHERE schedule IS NOT NULL AND schedule != ''
                 ORDER BY name",
            )?;
            let lists = stmt
                .query_map([], parse_list_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(lists)
        })
    }
}
