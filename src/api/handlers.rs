//! HTTP request handlers
//!
//! Identifiers and enums arrive as strings and are parsed here, so every
//! malformed input is reported against the field it came from.

use super::types::{
    ConversationQuery, CreateMentorshipRequest, ErrorResponse, MentorQuery, MentorshipQuery,
    SendMessageRequest, UpdateMentorshipRequest,
};
use super::AppState;
use crate::db::{
    Conversation, ConversationId, DbError, MentorFilter, Message, MentorshipRequest, RequestId,
    RequestStatus, Role, User, UserId,
};
use crate::directory::{self, Registration};
use crate::error::CoreError;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use std::str::FromStr;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Users
        .route("/api/users", post(register_user))
        .route("/api/users/:id", get(get_user))
        .route("/api/mentors", get(list_mentors))
        // Mentorship requests
        .route("/api/mentorships", post(create_mentorship).get(list_mentorships))
        .route("/api/mentorships/:id", patch(update_mentorship))
        // Conversations are provisioned on acceptance, never created here
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/:id/messages", get(list_messages))
        .route("/api/conversations/:id/read", patch(mark_read))
        .route("/api/messages", post(send_message))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Users
// ============================================================

async fn register_user(
    State(state): State<AppState>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let Json(registration) = body?;
    let user = directory::register(&state.db, registration)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    let id: UserId = parse_id(Some(id.as_str()), "id")?;
    Ok(Json(state.db.get_user(id)?))
}

async fn list_mentors(
    State(state): State<AppState>,
    Query(query): Query<MentorQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    let available_only = match query.available.as_deref().map(str::trim) {
        None | Some("" | "false" | "0") => false,
        Some("true" | "1") => true,
        Some(_) => return Err(AppError::bad_request("available", "must be true or false")),
    };
    let filter = MentorFilter {
        industry: query
            .industry
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty()),
        available_only,
    };
    Ok(Json(state.db.list_mentors(&filter)?))
}

// ============================================================
// Mentorship Requests
// ============================================================

async fn create_mentorship(
    State(state): State<AppState>,
    body: Result<Json<CreateMentorshipRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MentorshipRequest>), AppError> {
    let Json(req) = body?;
    let student_id: UserId = parse_id(req.student_id.as_deref(), "studentId")?;
    let mentor_id: UserId = parse_id(req.mentor_id.as_deref(), "mentorId")?;

    let request = state
        .requests
        .submit(student_id, mentor_id, req.message.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn update_mentorship(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateMentorshipRequest>, JsonRejection>,
) -> Result<Json<MentorshipRequest>, AppError> {
    let id: RequestId = parse_id(Some(id.as_str()), "id")?;
    let Json(req) = body?;
    let status = req
        .status
        .as_deref()
        .ok_or_else(|| AppError::bad_request("status", "is required"))?
        .parse::<RequestStatus>()
        .map_err(|e| AppError::bad_request("status", e.to_string()))?;

    Ok(Json(state.requests.transition(id, status).await?))
}

async fn list_mentorships(
    State(state): State<AppState>,
    Query(query): Query<MentorshipQuery>,
) -> Result<Json<Vec<MentorshipRequest>>, AppError> {
    let user_id: UserId = parse_id(query.user_id.as_deref(), "userId")?;
    let role = query
        .role
        .as_deref()
        .ok_or_else(|| AppError::bad_request("role", "is required"))?
        .parse::<Role>()
        .map_err(|e| AppError::bad_request("role", e))?;

    Ok(Json(state.requests.list_for_user(user_id, role)?))
}

// ============================================================
// Conversations and Messages
// ============================================================

async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Vec<Conversation>>, AppError> {
    let user_id: UserId = parse_id(query.user_id.as_deref(), "userId")?;
    Ok(Json(state.messenger.list_conversations(user_id)?))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    let id: ConversationId = parse_id(Some(id.as_str()), "id")?;
    Ok(Json(state.messenger.list_messages(id)?))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, AppError> {
    let id: ConversationId = parse_id(Some(id.as_str()), "id")?;
    Ok(Json(state.messenger.mark_read(id)?))
}

async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let Json(req) = body?;
    let conversation_id: ConversationId =
        parse_id(req.conversation_id.as_deref(), "conversationId")?;
    let sender_id: UserId = parse_id(req.sender_id.as_deref(), "senderId")?;
    let content = req
        .content
        .ok_or_else(|| AppError::bad_request("content", "is required"))?;

    let message = state.messenger.send(conversation_id, sender_id, &content)?;
    Ok((StatusCode::CREATED, Json(message)))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("mentorship-server ", env!("CARGO_PKG_VERSION"))
}

fn parse_id<T: FromStr>(raw: Option<&str>, field: &'static str) -> Result<T, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::bad_request(field, "is required"))?;
    raw.parse()
        .map_err(|_| AppError::bad_request(field, "must be a valid UUID"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest {
        message: String,
        field: Option<&'static str>,
    },
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    fn bad_request(field: &'static str, message: impl std::fmt::Display) -> Self {
        AppError::BadRequest {
            message: format!("{field}: {message}"),
            field: Some(field),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { field, message } => AppError::bad_request(field, message),
            CoreError::NotFound(msg) => AppError::NotFound(msg),
            CoreError::Conflict(msg) => AppError::Conflict(msg),
            CoreError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        CoreError::from(err).into()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest {
            message: rejection.body_text(),
            field: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest { message, field } => (
                StatusCode::BAD_REQUEST,
                match field {
                    Some(field) => ErrorResponse::for_field(message, field),
                    None => ErrorResponse::new(message),
                },
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse::new(msg)),
            AppError::Internal(msg) => {
                // Storage detail stays in the log
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
