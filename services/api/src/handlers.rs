//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for session management.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};
use tutor_core::roster::{CAPABILITIES_TITLE, WELCOME_MESSAGE};
use uuid::Uuid;

use crate::{
    models::{
        CapabilitiesResponse, CapabilityEntry, CreateSessionPayload, ErrorResponse, Message,
        Session, StudyPlanRecord, UpdateSessionStatusPayload,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Reads the caller's id from the `x-user-id` header.
fn user_id(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))
}

/// Loads a session owned by `user_id`, or fails with 404.
async fn owned_session(state: &AppState, id: Uuid, user_id: &str) -> Result<Session, ApiError> {
    state
        .db
        .get_session(id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))
}

/// Create a new tutoring session.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session created successfully", body = Session),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the user creating the session")
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let topic = payload
        .topic
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let session = state
        .db
        .create_session(user_id, topic, WELCOME_MESSAGE)
        .await?;
    info!(session_id = %session.id, %user_id, "Session created");

    Ok((StatusCode::CREATED, Json(session)))
}

/// List all sessions for a user.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "List of sessions", body = [Session]),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Session>>, ApiError> {
    let user_id = user_id(&headers)?;
    let sessions = state.db.list_sessions(user_id).await?;
    Ok(Json(sessions))
}

/// Get a specific session by its ID.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session details", body = Session),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let session = owned_session(&state, id, user_id).await?;
    Ok((StatusCode::OK, Json(session)))
}

/// Update the status of a session.
#[utoipa::path(
    patch,
    path = "/sessions/{id}/status",
    request_body = UpdateSessionStatusPayload,
    responses(
        (status = 200, description = "Session status updated successfully", body = Session),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn update_session_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSessionStatusPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;

    // First, ensure the session exists and belongs to the user.
    owned_session(&state, id, user_id).await?;

    let updated_session = state.db.update_session_status(id, payload.status).await?;

    Ok((StatusCode::OK, Json(updated_session)))
}

/// Get the conversation history of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/messages",
    responses(
        (status = 200, description = "Messages in chronological order", body = [Message]),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user_id = user_id(&headers)?;
    owned_session(&state, id, user_id).await?;
    let messages = state.db.get_session_messages(id).await?;
    Ok(Json(messages))
}

/// Get the latest study plan saved in a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/study-plan",
    responses(
        (status = 200, description = "Latest saved study plan", body = StudyPlanRecord),
        (status = 404, description = "Session or study plan not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn get_study_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<StudyPlanRecord>, ApiError> {
    let user_id = user_id(&headers)?;
    owned_session(&state, id, user_id).await?;
    let record = state.db.get_latest_study_plan(id).await?.ok_or_else(|| {
        ApiError::NotFound(format!("No study plan saved for session '{}'", id))
    })?;
    Ok(Json(record))
}

/// List what the tutor and its specialists can help with.
#[utoipa::path(
    get,
    path = "/capabilities",
    responses(
        (status = 200, description = "Tutor capabilities", body = CapabilitiesResponse)
    )
)]
pub async fn get_capabilities(State(state): State<Arc<AppState>>) -> Json<CapabilitiesResponse> {
    Json(capabilities_response(&state))
}

fn capabilities_response(state: &AppState) -> CapabilitiesResponse {
    CapabilitiesResponse {
        title: CAPABILITIES_TITLE.to_string(),
        capabilities: state
            .tutor
            .roster()
            .capabilities()
            .into_iter()
            .map(CapabilityEntry::from)
            .collect(),
    }
}
