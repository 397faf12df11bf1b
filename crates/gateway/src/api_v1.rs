//! AI chat API, nested under `/api/v1/ai`.
//!
//! Endpoints:
//!
//! - `GET    /sessions`: List the caller's sessions
//! - `POST   /sessions`: Create a session
//! - `PATCH  /sessions/{uid}`: Rename a session
//! - `DELETE /sessions/{uid}`: Delete a session and its messages
//! - `GET    /sessions/{uid}/messages`: Stored messages of a session
//! - `POST   /sessions/{uid}/chat`: Send a message, get an SSE stream
//!
//! Every route requires `Authorization: Bearer <token>`; the token decides
//! which user the request acts for.

use axum::{
    Extension, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use mnemo_agent::{ChatError, ChatRequest, ChatService, Emitter};
use mnemo_config::GatewayUser;
use mnemo_core::UserId;
use mnemo_core::session::{ChatMessage, Session};

/// Events buffered between the agent task and a slow client.
const EVENT_BUFFER: usize = 64;

// ── State ─────────────────────────────────────────────────────────────────

pub struct ApiState {
    pub chat: Arc<ChatService>,

    /// Bearer token → user it authenticates
    pub tokens: HashMap<String, UserId>,
}

impl ApiState {
    pub fn new(chat: Arc<ChatService>, users: &[GatewayUser]) -> Self {
        Self {
            chat,
            tokens: users
                .iter()
                .map(|u| (u.token.clone(), u.user_id))
                .collect(),
        }
    }
}

pub type SharedApiState = Arc<ApiState>;

/// The authenticated caller, set by the auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

// ── Router ────────────────────────────────────────────────────────────────

/// Build the AI chat router. Nest this under "/api/v1/ai".
pub fn ai_router(state: SharedApiState) -> Router {
    Router::new()
        .route(
            "/sessions",
            get(list_sessions_handler).post(create_session_handler),
        )
        .route(
            "/sessions/{uid}",
            patch(update_session_handler).delete(delete_session_handler),
        )
        .route("/sessions/{uid}/messages", get(list_messages_handler))
        .route("/sessions/{uid}/chat", post(chat_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct SessionRequest {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub uid: String,
    pub title: String,
    pub created_ts: i64,
    pub updated_ts: i64,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        Self {
            uid: s.uid,
            title: s.title,
            created_ts: s.created_ts.timestamp(),
            updated_ts: s.updated_ts.timestamp(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: i64,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub created_ts: i64,
}

impl From<ChatMessage> for MessageResponse {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            role: m.role.as_str().to_string(),
            content: m.content,
            tool_name: m.tool_name,
            created_ts: m.created_ts.timestamp(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error reply: status code plus `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        let status = match &e {
            ChatError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::EmptyContent | ChatError::TitleRequired => StatusCode::BAD_REQUEST,
            ChatError::SessionNotFound => StatusCode::NOT_FOUND,
            ChatError::Store(inner) => {
                error!(error = %inner, "AI chat storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ── Auth ──────────────────────────────────────────────────────────────────

/// Resolve `Authorization: Bearer <token>` to a user, or reject with 401.
async fn auth_middleware(
    State(state): State<SharedApiState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| state.tokens.get(token).copied());

    match user {
        Some(user_id) => {
            req.extensions_mut().insert(CurrentUser(user_id));
            Ok(next.run(req).await)
        }
        None => {
            warn!(path = %req.uri().path(), "Unauthorized AI API request");
            Err(ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized"))
        }
    }
}

// ── Session handlers ──────────────────────────────────────────────────────

async fn list_sessions_handler(
    State(state): State<SharedApiState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let sessions = state.chat.list_sessions(user_id).await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

async fn create_session_handler(
    State(state): State<SharedApiState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    body: Bytes,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    // A missing or malformed body just means "no title".
    let req: SessionRequest = serde_json::from_slice(&body).unwrap_or_default();
    let session = state.chat.create_session(user_id, Some(req.title)).await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

async fn update_session_handler(
    State(state): State<SharedApiState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(uid): Path<String>,
    body: Bytes,
) -> Result<Json<SessionResponse>, ApiError> {
    let req: SessionRequest = serde_json::from_slice(&body).unwrap_or_default();
    let session = state.chat.rename_session(user_id, &uid, &req.title).await?;
    Ok(Json(session.into()))
}

async fn delete_session_handler(
    State(state): State<SharedApiState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(uid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.chat.delete_session(user_id, &uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages_handler(
    State(state): State<SharedApiState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(uid): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let messages = state.chat.list_messages(user_id, &uid).await?;
    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

// ── SSE chat ──────────────────────────────────────────────────────────────

/// `POST /sessions/{uid}/chat`: run one agent turn, streaming its events.
///
/// Request errors are returned as plain JSON before the stream opens. Once
/// it is open the turn runs on its own task; dropping the response (client
/// disconnect) cancels whatever upstream call is in flight.
async fn chat_handler(
    State(state): State<SharedApiState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(uid): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: ChatRequest = serde_json::from_slice(&body).unwrap_or_default();
    let turn = state.chat.prepare_chat(user_id, &uid, request).await?;
    info!(session = %uid, user = user_id, "AI chat SSE request");

    let (emitter, rx) = Emitter::channel(EVENT_BUFFER);
    let disconnect = emitter.cancellation().clone().drop_guard();

    let chat = state.chat.clone();
    tokio::spawn(async move {
        chat.run_turn(turn, &emitter).await;
    });

    let stream = ReceiverStream::new(rx).map(move |event| {
        let _guard = &disconnect;
        Ok::<_, Infallible>(SseEvent::default().data(event.to_json()))
    });

    let headers = [
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        (
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        ),
    ];
    Ok((headers, Sse::new(stream).keep_alive(KeepAlive::default())).into_response())
}
