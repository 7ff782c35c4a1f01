use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use thiserror::Error;

use crate::models::{NewTodo, Todo, TodoChanges};

const COLUMNS: &str = "id, title, description, completed, deadline_at, created_at, updated_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StoreError::Integrity(e.to_string()),
            _ => StoreError::Sqlite(e),
        }
    }
}

/// Persistence for todos.
///
/// `insert`, `update` and `delete` are each a single unit of work: either
/// every write lands or none does.
pub trait TodoStore: Send + Sync {
    fn insert(&self, todo: NewTodo) -> Result<Todo, StoreError>;
    fn get(&self, id: i64) -> Result<Option<Todo>, StoreError>;
    fn list(&self) -> Result<Vec<Todo>, StoreError>;
    /// Returns `None` when no todo has this id.
    fn update(&self, id: i64, changes: TodoChanges) -> Result<Option<Todo>, StoreError>;
    /// Returns the removed todo, or `None` when no todo has this id.
    fn delete(&self, id: i64) -> Result<Option<Todo>, StoreError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn connect<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("opening database at {}", path.as_ref().display()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        migrate(&conn).context("creating todos schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction rolls the transaction back on unwind, so
        // the connection is still usable.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TodoStore for Database {
    fn insert(&self, todo: NewTodo) -> Result<Todo, StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO todos (title, description, completed, deadline_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                todo.title,
                todo.description,
                todo.completed,
                todo.deadline_at.map(|at| at.to_rfc3339()),
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        let created = tx.query_row(
            &format!("SELECT {COLUMNS} FROM todos WHERE id = ?1"),
            params![id],
            todo_from_row,
        )?;
        tx.commit()?;
        Ok(created)
    }

    fn get(&self, id: i64) -> Result<Option<Todo>, StoreError> {
        Ok(fetch(&self.lock(), id)?)
    }

    fn list(&self) -> Result<Vec<Todo>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM todos ORDER BY id"))?;
        let rows = stmt.query_map([], todo_from_row)?;

        let mut todos = Vec::new();
        for todo in rows {
            todos.push(todo?);
        }
        Ok(todos)
    }

    fn update(&self, id: i64, changes: TodoChanges) -> Result<Option<Todo>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let Some(mut todo) = fetch(&tx, id)? else {
            return Ok(None);
        };

        changes.apply(&mut todo);
        todo.updated_at = Utc::now();
        tx.execute(
            "UPDATE todos
             SET title = ?1, description = ?2, completed = ?3, deadline_at = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                todo.title,
                todo.description,
                todo.completed,
                todo.deadline_at.map(|at| at.to_rfc3339()),
                todo.updated_at.to_rfc3339(),
                id,
            ],
        )?;
        tx.commit()?;
        Ok(Some(todo))
    }

    fn delete(&self, id: i64) -> Result<Option<Todo>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let Some(todo) = fetch(&tx, id)? else {
            return Ok(None);
        };

        tx.execute("DELETE FROM todos WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(Some(todo))
    }
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS todos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            completed INTEGER NOT NULL DEFAULT 0,
            deadline_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
}

fn fetch(conn: &Connection, id: i64) -> rusqlite::Result<Option<Todo>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM todos WHERE id = ?1"),
        params![id],
        todo_from_row,
    )
    .optional()
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    let deadline_at: Option<String> = row.get(4)?;
    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        deadline_at: deadline_at
            .map(|value| parse_datetime(4, &value))
            .transpose()?,
        created_at: parse_datetime(5, &row.get::<_, String>(5)?)?,
        updated_at: parse_datetime(6, &row.get::<_, String>(6)?)?,
    })
}

fn parse_datetime(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}
