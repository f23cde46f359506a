//! `/api/tasks` handlers. All of them sit behind [`super::auth_gate`].

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use serde_json::Value;

use super::{invalid_request, AppState};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::tasks::{self, CreateTaskRequest, Task, TaskPatch};

/// GET /api/tasks: the caller's tasks, oldest first.
pub async fn handle_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = tasks::list_tasks(state.tasks.as_ref(), &user.id).await?;
    Ok(Json(tasks))
}

/// POST /api/tasks
pub async fn handle_create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(request) = body.map_err(invalid_request)?;
    let task = tasks::create_task(state.tasks.as_ref(), &user.id, request).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// PATCH /api/tasks/{id}
///
/// The body is read raw: an empty body is a valid patch and flips
/// `isCompleted`, so it cannot go through the `Json` extractor.
pub async fn handle_update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Task>, ApiError> {
    let patch = TaskPatch::from_body(&body)?;
    let task = tasks::update_task(state.tasks.as_ref(), &user.id, &id, patch).await?;
    Ok(Json(task))
}

/// DELETE /api/tasks/{id}
pub async fn handle_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    tasks::delete_task(state.tasks.as_ref(), &user.id, &id).await?;
    Ok(Json(serde_json::json!({"message": "Task deleted successfully"})))
}
