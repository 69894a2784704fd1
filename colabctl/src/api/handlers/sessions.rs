use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::AppState;
use crate::api::extract::JsonBody;
use crate::api::models::sessions::{
    NotebookEnvelope, NotebookSave, NotebookSaved, SessionCreate, SessionEnvelope, SessionList, SessionLogs,
    SessionTerminated,
};
use crate::errors::Result;
use crate::sessions::NewSession;
use crate::types::SessionId;

#[utoipa::path(
    post,
    path = "/sessions/create",
    tag = "sessions",
    summary = "Start a notebook session",
    description = "Allocates a GPU and launches a notebook container. The session starts in `creating` \
                   and switches to `running` once the container has booted.",
    request_body = SessionCreate,
    responses(
        (status = 201, description = "Session created", body = SessionEnvelope),
        (status = 400, description = "Invalid user ID"),
        (status = 503, description = "No GPU free"),
        (status = 500, description = "Container failed to start"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_session(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<SessionCreate>,
) -> Result<(StatusCode, Json<SessionEnvelope>)> {
    let session = state
        .sessions
        .create(NewSession {
            user_id: request.user_id,
            booking_id: request.booking_id,
            name: request.notebook_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(SessionEnvelope { session: session.into() })))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    summary = "Get a session",
    params(("id" = String, Path, description = "Session ID", format = "uuid")),
    responses(
        (status = 200, description = "Session with live container stats", body = SessionEnvelope),
        (status = 404, description = "Session not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_session(State(state): State<AppState>, Path(id): Path<SessionId>) -> Result<Json<SessionEnvelope>> {
    let details = state.sessions.get(id).await?;
    Ok(Json(SessionEnvelope { session: details.into() }))
}

#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    tag = "sessions",
    summary = "Terminate a session",
    params(("id" = String, Path, description = "Session ID", format = "uuid")),
    responses(
        (status = 200, description = "Session terminated", body = SessionTerminated),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Container failed to stop"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn terminate_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionTerminated>> {
    let session = state.sessions.terminate(id).await?;
    Ok(Json(SessionTerminated {
        message: "Session terminated".to_string(),
        session: session.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/save",
    tag = "sessions",
    summary = "Save notebook contents",
    request_body = NotebookSave,
    params(("id" = String, Path, description = "Session ID", format = "uuid")),
    responses(
        (status = 200, description = "Notebook saved", body = NotebookSaved),
        (status = 404, description = "Session not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn save_notebook(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    JsonBody(request): JsonBody<NotebookSave>,
) -> Result<Json<NotebookSaved>> {
    let snapshot = state.sessions.save_notebook(id, request.cells, request.metadata)?;
    Ok(Json(NotebookSaved {
        message: "Notebook saved".to_string(),
        saved_at: snapshot.saved_at,
    }))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/notebook",
    tag = "sessions",
    summary = "Get the last saved notebook",
    params(("id" = String, Path, description = "Session ID", format = "uuid")),
    responses(
        (status = 200, description = "Last saved notebook", body = NotebookEnvelope),
        (status = 404, description = "Session not found or nothing saved yet"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_notebook(State(state): State<AppState>, Path(id): Path<SessionId>) -> Result<Json<NotebookEnvelope>> {
    let snapshot = state.sessions.notebook(id)?;
    Ok(Json(NotebookEnvelope {
        notebook: snapshot.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/logs",
    tag = "sessions",
    summary = "Get container logs",
    params(("id" = String, Path, description = "Session ID", format = "uuid")),
    responses(
        (status = 200, description = "Container output", body = SessionLogs),
        (status = 404, description = "Session not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_session_logs(State(state): State<AppState>, Path(id): Path<SessionId>) -> Result<Json<SessionLogs>> {
    let logs = state.sessions.logs(id).await?;
    Ok(Json(SessionLogs { logs }))
}

#[utoipa::path(
    get,
    path = "/sessions/user/{user_id}",
    tag = "sessions",
    summary = "List a user's sessions",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Sessions in any state, oldest first", body = SessionList),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_user_sessions(State(state): State<AppState>, Path(user_id): Path<String>) -> Json<SessionList> {
    let sessions = state.sessions.list_by_user(&user_id);
    Json(SessionList {
        sessions: sessions.into_iter().map(Into::into).collect(),
    })
}
