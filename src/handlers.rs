use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::db::StoreError;
use crate::error::ApiError;
use crate::models::{ListParams, Todo};
use crate::validation::{self, Body};
use crate::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_todos(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Todo>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let todos = state.store.list()?;
    Ok(Json(due_within(todos, &params, Utc::now())))
}

pub async fn get_todo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Todo>, ApiError> {
    let id = todo_id(path)?;
    state.store.get(id)?.map(Json).ok_or(ApiError::NotFound)
}

pub async fn create_todo(
    State(state): State<AppState>,
    body: Result<Json<Body>, JsonRejection>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let new_todo = validation::new_todo(&body)?;

    let todo = state.store.insert(new_todo).map_err(|e| match e {
        StoreError::Integrity(reason) => {
            tracing::warn!(%reason, "store refused new todo");
            ApiError::CreateFailed
        }
        other => ApiError::Internal(other),
    })?;

    tracing::info!(id = todo.id, "todo created");
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn update_todo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<Body>, JsonRejection>,
) -> Result<Json<Todo>, ApiError> {
    let id = todo_id(path)?;
    if state.store.get(id)?.is_none() {
        return Err(ApiError::NotFound);
    }

    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let changes = validation::changes(id, &body)?;

    let todo = state.store.update(id, changes)?.ok_or(ApiError::NotFound)?;
    tracing::info!(id, "todo updated");
    Ok(Json(todo))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = todo_id(path)?;
    match state.store.delete(id)? {
        Some(todo) => {
            tracing::info!(id, "todo deleted");
            Ok(Json(todo).into_response())
        }
        None => Ok(Json(json!({})).into_response()),
    }
}

// Non-integer ids never match a todo route.
fn todo_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id).map_err(|_| ApiError::NotFound)
}

/// Keeps todos whose deadline falls before `now + window` days, and only
/// completed ones when asked. Todos without a deadline are dropped.
fn due_within(todos: Vec<Todo>, params: &ListParams, now: DateTime<Utc>) -> Vec<Todo> {
    let window = params.window_days();
    let cutoff = Duration::try_days(window)
        .and_then(|days| now.checked_add_signed(days))
        .unwrap_or(if window < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
    let completed_only = params.completed_only();

    todos
        .into_iter()
        .filter(|todo| !completed_only || todo.completed)
        .filter(|todo| todo.deadline_at.is_some_and(|deadline| deadline < cutoff))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn todo(id: i64, completed: bool, due_in_days: Option<i64>) -> Todo {
        Todo {
            id,
            title: format!("todo {id}"),
            description: String::new(),
            completed,
            deadline_at: due_in_days.map(|days| now() + Duration::days(days)),
            created_at: now(),
            updated_at: now(),
        }
    }

    fn params(completed: Option<&str>, window: Option<i64>) -> ListParams {
        ListParams {
            completed: completed.map(str::to_string),
            window,
        }
    }

    fn ids(todos: Vec<Todo>) -> Vec<i64> {
        todos.into_iter().map(|t| t.id).collect()
    }

    fn fixtures() -> Vec<Todo> {
        vec![
            todo(1, true, Some(3)),
            todo(2, false, Some(3)),
            todo(3, true, Some(30)),
            todo(4, true, None),
            todo(5, false, Some(-2)),
            todo(6, true, Some(150)),
        ]
    }

    #[test]
    fn default_window_is_one_hundred_days() {
        let kept = due_within(fixtures(), &params(None, None), now());
        assert_eq!(ids(kept), [1, 2, 3, 5]);
    }

    #[test]
    fn completed_true_narrows_to_done_todos() {
        let kept = due_within(fixtures(), &params(Some("true"), Some(7)), now());
        assert_eq!(ids(kept), [1]);
    }

    #[test]
    fn other_completed_values_do_not_filter() {
        let kept = due_within(fixtures(), &params(Some("false"), Some(7)), now());
        assert_eq!(ids(kept), [1, 2, 5]);
    }

    #[test]
    fn deadline_on_cutoff_is_excluded() {
        let kept = due_within(vec![todo(1, false, Some(7))], &params(None, Some(7)), now());
        assert!(kept.is_empty());
    }

    #[test]
    fn negative_window_looks_into_the_past() {
        let kept = due_within(fixtures(), &params(None, Some(-1)), now());
        assert_eq!(ids(kept), [5]);
    }

    #[test]
    fn huge_windows_clamp_instead_of_overflowing() {
        let kept = due_within(fixtures(), &params(None, Some(i64::MAX)), now());
        assert_eq!(ids(kept), [1, 2, 3, 5, 6]);

        let kept = due_within(fixtures(), &params(None, Some(i64::MIN)), now());
        assert!(kept.is_empty());
    }
}
