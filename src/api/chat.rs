//! Chat endpoints. Every handler runs behind the session middleware.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::sse::build_sse_response;
use crate::AppState;
use crate::auth::CurrentSession;
use crate::chat::{ChatMessage, ChatState, SendOutcome};
use crate::error::ApiError;
use crate::session::UserSession;

fn user_session(state: &AppState, current: &CurrentSession) -> UserSession {
    state.sessions.get_or_open(&current.0.sub)
}

/// GET /api/chatrooms
pub async fn list_chatrooms(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> Json<ChatState> {
    Json(user_session(&state, &current).chat.state())
}

#[derive(Debug, Deserialize)]
pub struct TitleRequest {
    #[serde(default)]
    title: String,
}

/// POST /api/chatrooms
pub async fn create_chatroom(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(req): Json<TitleRequest>,
) -> Result<Response, ApiError> {
    let chat = user_session(&state, &current).chat;
    let id = chat.create_chatroom(&req.title)?;
    let chatroom = chat.chatroom(&id);
    Ok((StatusCode::CREATED, Json(json!({ "id": id, "chatroom": chatroom }))).into_response())
}

/// PATCH /api/chatrooms/{id}
pub async fn rename_chatroom(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
    Json(req): Json<TitleRequest>,
) -> Result<Response, ApiError> {
    let chat = user_session(&state, &current).chat;
    if !chat.update_chatroom_title(&id, &req.title)? {
        return Err(ApiError::NotFound("Chatroom not found".to_string()));
    }
    Ok(Json(chat.chatroom(&id)).into_response())
}

/// DELETE /api/chatrooms/{id}
pub async fn delete_chatroom(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
) -> StatusCode {
    user_session(&state, &current).chat.delete_chatroom(&id);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct CurrentRequest {
    #[serde(default)]
    id: Option<String>,
}

/// PUT /api/chatrooms/current
pub async fn set_current_chatroom(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(req): Json<CurrentRequest>,
) -> Result<StatusCode, ApiError> {
    let chat = user_session(&state, &current).chat;
    if chat.set_current_chatroom(req.id.as_deref()) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Chatroom not found".to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    messages: Vec<ChatMessage>,
    has_more: bool,
    is_fetching_more: bool,
    is_typing: bool,
}

/// GET /api/chatrooms/{id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let chat = user_session(&state, &current).chat;
    if chat.chatroom(&id).is_none() {
        return Err(ApiError::NotFound("Chatroom not found".to_string()));
    }
    Ok(Json(MessagesResponse {
        messages: chat.get_messages(&id),
        has_more: chat.can_load_more(&id),
        is_fetching_more: chat.is_fetching_more(),
        is_typing: chat.is_typing(),
    }))
}

/// POST /api/chatrooms/{id}/load-more
pub async fn load_more(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chat = user_session(&state, &current).chat;
    if chat.chatroom(&id).is_none() {
        return Err(ApiError::NotFound("Chatroom not found".to_string()));
    }
    let loaded = chat.load_more_messages(&id).await?;
    Ok(Json(json!({ "loaded": loaded, "hasMore": chat.can_load_more(&id) })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    content: String,
    #[serde(default)]
    is_image: bool,
    #[serde(default)]
    image_url: Option<String>,
}

/// Accept only `data:image/<type>;base64,<payload>` URLs.
fn validate_image_url(url: &str) -> Result<(), ApiError> {
    let invalid = || ApiError::BadRequest("Invalid image data".to_string());
    let rest = url.strip_prefix("data:image/").ok_or_else(invalid)?;
    let (mime, payload) = rest.split_once(";base64,").ok_or_else(invalid)?;
    if mime.is_empty() || payload.is_empty() {
        return Err(invalid());
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ApiError::BadRequest(format!("Invalid image data: {e}")))?;
    Ok(())
}

/// POST /api/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.is_image {
        let url = req
            .image_url
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("Image data is required".to_string()))?;
        validate_image_url(url)?;
    } else if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }

    let chat = user_session(&state, &current).chat;
    let outcome = chat.send_message(&req.content, req.is_image, req.image_url).await?;
    let body = match outcome {
        SendOutcome::Stored => json!({ "status": "stored" }),
        SendOutcome::Replied(reply) => json!({ "status": "replied", "reply": reply }),
        SendOutcome::Failed(error) => json!({ "status": "failed", "error": error }),
    };
    Ok(Json(body))
}

/// DELETE /api/chat
pub async fn clear_chat(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> StatusCode {
    user_session(&state, &current).chat.clear_all_chat_data();
    StatusCode::NO_CONTENT
}

/// GET /api/notifications
pub async fn notifications(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> impl IntoResponse {
    build_sse_response(user_session(&state, &current).notifications.subscribe())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_image_url() {
        assert!(validate_image_url("data:image/png;base64,iVBORw0KGgo=").is_ok());
        assert!(validate_image_url("data:text/plain;base64,aGk=").is_err());
        assert!(validate_image_url("data:image/png;base64,***").is_err());
        assert!(validate_image_url("data:image/png,raw").is_err());
        assert!(validate_image_url("https://example.com/cat.png").is_err());
    }
}
