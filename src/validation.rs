//! Request body checks that run before the store is touched.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::models::{NewTodo, TodoChanges};

pub const RECOGNIZED_FIELDS: [&str; 6] = [
    "title",
    "description",
    "completed",
    "deadline_at",
    "created_at",
    "updated_at",
];

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub type Body = Map<String, Value>;

/// Checks a create body. An empty title is reported before unknown keys.
///
/// `created_at` and `updated_at` are accepted but ignored; the store owns
/// both.
pub fn new_todo(body: &Body) -> Result<NewTodo, ApiError> {
    if body.get("title").and_then(Value::as_str) == Some("") {
        return Err(ApiError::CreateFailed);
    }
    reject_unknown_fields(body, &[])?;

    let deadline_at = field::<Option<String>>(body, "deadline_at")?
        .flatten()
        .map(|raw| deadline(&raw))
        .transpose()?;

    Ok(NewTodo {
        title: field::<Option<String>>(body, "title")?.flatten(),
        description: field::<Option<String>>(body, "description")?
            .flatten()
            .unwrap_or_default(),
        completed: field::<Option<bool>>(body, "completed")?
            .flatten()
            .unwrap_or(false),
        deadline_at,
    })
}

/// Checks an update body for the todo at `id`.
///
/// `id` may be echoed back in the body; a truthy value must match.
pub fn changes(id: i64, body: &Body) -> Result<TodoChanges, ApiError> {
    reject_unknown_fields(body, &["id"])?;

    if let Some(body_id) = body.get("id").filter(|value| is_truthy(value)) {
        if !same_id(body_id, id) {
            return Err(ApiError::IdMismatch);
        }
    }

    let title = field::<String>(body, "title")?;
    if title.as_deref() == Some("") {
        return Err(ApiError::EmptyTitle);
    }

    let deadline_at = match field::<Option<String>>(body, "deadline_at")? {
        Some(Some(raw)) => Some(Some(deadline(&raw)?)),
        Some(None) => Some(None),
        None => None,
    };

    Ok(TodoChanges {
        title,
        description: field(body, "description")?,
        completed: field(body, "completed")?,
        deadline_at,
    })
}

/// Parses an ISO-8601 timestamp. Inputs without an offset are taken as UTC
/// and a bare date means midnight.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(at.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

fn reject_unknown_fields(body: &Body, also_allowed: &[&str]) -> Result<(), ApiError> {
    let unknown = body.keys().any(|key| {
        !RECOGNIZED_FIELDS.contains(&key.as_str()) && !also_allowed.contains(&key.as_str())
    });
    if unknown {
        return Err(ApiError::UnknownFields);
    }
    Ok(())
}

fn field<T: DeserializeOwned>(body: &Body, key: &str) -> Result<Option<T>, ApiError> {
    body.get(key)
        .map(|value| {
            serde_json::from_value(value.clone())
                .map_err(|e| ApiError::BadRequest(format!("Invalid value for '{key}': {e}")))
        })
        .transpose()
}

fn deadline(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    parse_timestamp(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid timestamp for 'deadline_at': {raw}")))
}

// `7` and `7.0` name the same todo.
fn same_id(value: &Value, id: i64) -> bool {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(n) => n == id,
            None => n.as_f64() == Some(id as f64),
        },
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
