//! Task model and owner-scoped task operations.
//!
//! Every operation takes the owner id from the authenticated identity; the
//! store queries always filter on it, so a task owned by someone else is
//! indistinguishable from a task that does not exist.

pub mod store;

pub use store::{SqliteTaskStore, TaskStore};

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;

/// Category assigned when the client leaves it empty.
pub const DEFAULT_CATEGORY: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// A persisted task. Serialized with `_id` and camelCase keys, the shape the
/// browser client reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub is_completed: bool,
    pub priority: Priority,
    pub category: String,
    pub due_date: Option<DateTime<Utc>>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One field of a partial update: absent, explicitly `null`, or a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self::Absent
    }
}

// Only called for keys that exist in the body; missing keys fall back to
// `Default`, which is `Absent`.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Self::Value(value),
            None => Self::Null,
        })
    }
}

/// Body of `POST /api/tasks`. Unknown keys (including any `userId`) are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

impl CreateTaskRequest {
    /// Validate and build a new task owned by `owner`.
    pub fn into_task(self, owner: &str) -> Result<Task, ApiError> {
        let title = required_title(self.title)?;
        let priority = priority_or_default(self.priority.as_deref())?;
        let category = category_or_default(self.category);
        let due_date = match self.due_date {
            Some(raw) => parse_due_date(&raw)?,
            None => None,
        };
        let now = Utc::now().trunc_subsecs(3);

        Ok(Task {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            is_completed: false,
            priority,
            category,
            due_date,
            user_id: owner.to_string(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Body of `PATCH /api/tasks/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default)]
    pub is_completed: Patch<bool>,
    #[serde(default)]
    pub title: Patch<String>,
    #[serde(default)]
    pub priority: Patch<String>,
    #[serde(default)]
    pub category: Patch<String>,
    #[serde(default)]
    pub due_date: Patch<String>,
}

impl TaskPatch {
    /// Parse a raw request body. An empty body is an empty patch.
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ApiError::validation(format!("Invalid request body: {e}")))
    }

    /// Whether this patch flips `isCompleted` instead of leaving it alone.
    ///
    /// Older clients send a bare PATCH to toggle completion, so a body naming
    /// neither `isCompleted` nor `title` toggles.
    pub fn toggles_completion(&self) -> bool {
        !self.is_completed.is_present() && !self.title.is_present()
    }

    /// Merge this patch into `task`. Nothing is written unless every field
    /// validates.
    pub fn apply(self, task: &mut Task) -> Result<(), ApiError> {
        let toggles = self.toggles_completion();
        let is_completed = match self.is_completed {
            Patch::Absent => toggles.then(|| !task.is_completed),
            Patch::Null => return Err(ApiError::validation("isCompleted cannot be null.")),
            Patch::Value(value) => Some(value),
        };
        let title = match self.title {
            Patch::Absent => None,
            Patch::Null => return Err(ApiError::validation("Title is required.")),
            Patch::Value(value) => Some(required_title(Some(value))?),
        };
        let priority = match self.priority {
            Patch::Absent => None,
            Patch::Null => Some(Priority::default()),
            Patch::Value(value) => Some(priority_or_default(Some(&value))?),
        };
        let category = match self.category {
            Patch::Absent => None,
            Patch::Null => Some(DEFAULT_CATEGORY.to_string()),
            Patch::Value(value) => Some(category_or_default(Some(value))),
        };
        let due_date = match self.due_date {
            Patch::Absent => None,
            Patch::Null => Some(None),
            Patch::Value(value) => Some(parse_due_date(&value)?),
        };

        if let Some(value) = is_completed {
            task.is_completed = value;
        }
        if let Some(value) = title {
            task.title = value;
        }
        if let Some(value) = priority {
            task.priority = value;
        }
        if let Some(value) = category {
            task.category = value;
        }
        if let Some(value) = due_date {
            task.due_date = value;
        }
        task.updated_at = Utc::now().trunc_subsecs(3);
        Ok(())
    }
}

fn required_title(title: Option<String>) -> Result<String, ApiError> {
    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::validation("Title is required."))
}

/// Empty or missing means medium; anything outside the enum is rejected.
fn priority_or_default(raw: Option<&str>) -> Result<Priority, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Priority::default()),
        Some(value) => Priority::parse(value).ok_or_else(|| {
            ApiError::validation(format!(
                "Invalid priority '{value}'; expected low, medium or high."
            ))
        }),
    }
}

fn category_or_default(raw: Option<String>) -> String {
    raw.map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

/// Accepts an RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC).
/// Blank input clears the date.
pub fn parse_due_date(raw: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Some(midnight.and_utc()))
        .ok_or_else(|| {
            ApiError::validation(format!(
                "Invalid dueDate '{raw}'; expected YYYY-MM-DD or an RFC 3339 timestamp."
            ))
        })
}

// ── Owner-scoped operations ─────────────────────────────────────

/// All tasks owned by `owner`, oldest first.
pub async fn list_tasks(store: &dyn TaskStore, owner: &str) -> Result<Vec<Task>, ApiError> {
    Ok(store.list_for_owner(owner).await?)
}

pub async fn create_task(
    store: &dyn TaskStore,
    owner: &str,
    request: CreateTaskRequest,
) -> Result<Task, ApiError> {
    let task = request.into_task(owner)?;
    let task = store.insert(task).await?;
    tracing::info!(task_id = %task.id, user_id = %owner, "task created");
    Ok(task)
}

/// Apply `patch` to the caller's task `id`.
///
/// Concurrent updates are last-write-wins on the merged record.
pub async fn update_task(
    store: &dyn TaskStore,
    owner: &str,
    id: &str,
    patch: TaskPatch,
) -> Result<Task, ApiError> {
    let mut task = store
        .find_for_owner(id, owner)
        .await?
        .ok_or(ApiError::NotFound)?;
    patch.apply(&mut task)?;

    let task = store
        .update_for_owner(owner, task)
        .await?
        .ok_or(ApiError::NotFound)?;
    tracing::debug!(task_id = %task.id, user_id = %owner, "task updated");
    Ok(task)
}

pub async fn delete_task(store: &dyn TaskStore, owner: &str, id: &str) -> Result<(), ApiError> {
    if !store.delete_for_owner(id, owner).await? {
        return Err(ApiError::NotFound);
    }
    tracing::info!(task_id = %id, user_id = %owner, "task deleted");
    Ok(())
}
