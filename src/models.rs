use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub deadline_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A todo that has not been stored yet.
///
/// `title` stays optional so a missing title reaches the store and trips
/// its `NOT NULL` constraint instead of being defaulted.
#[derive(Debug, Clone, Default)]
pub struct NewTodo {
    pub title: Option<String>,
    pub description: String,
    pub completed: bool,
    pub deadline_at: Option<DateTime<Utc>>,
}

/// Fields replaced by an update. `None` leaves the stored value alone;
/// `deadline_at: Some(None)` clears the deadline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub deadline_at: Option<Option<DateTime<Utc>>>,
}

impl TodoChanges {
    pub fn apply(self, todo: &mut Todo) {
        if let Some(title) = self.title {
            todo.title = title;
        }
        if let Some(description) = self.description {
            todo.description = description;
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
        if let Some(deadline_at) = self.deadline_at {
            todo.deadline_at = deadline_at;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub completed: Option<String>,
    pub window: Option<i64>,
}

impl ListParams {
    pub const DEFAULT_WINDOW_DAYS: i64 = 100;

    pub fn completed_only(&self) -> bool {
        self.completed.as_deref() == Some("true")
    }

    pub fn window_days(&self) -> i64 {
        self.window.unwrap_or(Self::DEFAULT_WINDOW_DAYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Todo {
        let at = Utc.with_ymd_and_hms(2023, 2, 20, 0, 0, 0).unwrap();
        Todo {
            id: 1,
            title: "Watch lecture".to_string(),
            description: "Week 1".to_string(),
            completed: false,
            deadline_at: Some(Utc.with_ymd_and_hms(2023, 2, 27, 0, 0, 0).unwrap()),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn todo_serializes_every_field() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["title"], "Watch lecture");
        assert_eq!(json["description"], "Week 1");
        assert_eq!(json["completed"], false);
        assert_eq!(json["deadline_at"], "2023-02-27T00:00:00Z");
        assert_eq!(json["created_at"], "2023-02-20T00:00:00Z");
        assert_eq!(json["updated_at"], "2023-02-20T00:00:00Z");
    }

    #[test]
    fn unset_deadline_serializes_as_null() {
        let mut todo = sample();
        todo.deadline_at = None;
        let json = serde_json::to_value(todo).unwrap();
        assert!(json["deadline_at"].is_null());
    }

    #[test]
    fn changes_only_touch_supplied_fields() {
        let mut todo = sample();
        TodoChanges {
            completed: Some(true),
            ..Default::default()
        }
        .apply(&mut todo);

        let original = sample();
        assert!(todo.completed);
        assert_eq!(todo.title, original.title);
        assert_eq!(todo.description, original.description);
        assert_eq!(todo.deadline_at, original.deadline_at);
    }

    #[test]
    fn changes_can_clear_deadline() {
        let mut todo = sample();
        TodoChanges {
            deadline_at: Some(None),
            ..Default::default()
        }
        .apply(&mut todo);
        assert!(todo.deadline_at.is_none());
    }

    #[test]
    fn list_params_defaults() {
        let params: ListParams = serde_json::from_str("{}").unwrap();
        assert!(!params.completed_only());
        assert_eq!(params.window_days(), 100);

        let params = ListParams {
            completed: Some("True".to_string()),
            window: Some(7),
        };
        assert!(!params.completed_only());
        assert_eq!(params.window_days(), 7);
    }
}
