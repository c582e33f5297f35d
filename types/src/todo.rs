use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a task, assigned by the server. Never reused after deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(Uuid);

impl TodoId {
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Board column a task lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    ToDo,
    InProgress,
    Completed,
}

impl Default for Status {
    fn default() -> Self {
        Self::ToDo
    }
}

/// A task as the server returns it.
///
/// `is_completed`/`completed_at` are maintained server-side; the client never
/// sends them in an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub status: Status,
    pub is_important: bool,
    pub is_urgent: bool,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pomodoro_count: u32,
}

/// Payload for creating a task. The id is server-assigned, so there is no
/// optimistic identity to render before the response arrives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodoDraft {
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub status: Status,
    pub is_important: bool,
    pub is_urgent: bool,
}

impl TodoDraft {
    /// A draft with the service's defaults: `to_do`, important, not urgent.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            due_date: None,
            status: Status::ToDo,
            is_important: true,
            is_urgent: false,
        }
    }
}

/// Partial update for a task. Unset fields are omitted from the PATCH body,
/// so the server leaves them untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TodoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_important: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_urgent: Option<bool>,
}

impl From<&Todo> for TodoPatch {
    /// Patch carrying every client-mutable field of `todo`.
    fn from(todo: &Todo) -> Self {
        Self {
            description: Some(todo.description.clone()),
            due_date: todo.due_date,
            status: Some(todo.status),
            is_important: Some(todo.is_important),
            is_urgent: Some(todo.is_urgent),
        }
    }
}
