use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use application::{
    AuthoredMessage, CreateRoomRequest, RegisterUserRequest, StartDirectChatRequest,
};
use domain::{MessageId, Room, RoomId, User, UserId, UserRole};

use crate::{error::ApiError, state::AppState, ws};

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    username: String,
    role: UserRole,
}

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    name: String,
    description: Option<String>,
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct DirectChatPayload {
    user_id: UserId,
    peer_id: UserId,
}

#[derive(Debug, Deserialize)]
struct MembershipPayload {
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct MarkReadPayload {
    user_id: UserId,
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    user_id: UserId,
    limit: Option<u32>,
    before: Option<MessageId>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register_user))
        .route("/rooms", post(create_room))
        .route("/rooms/joined", get(joined_rooms))
        .route("/rooms/available", get(available_rooms))
        .route("/rooms/direct", post(start_direct_chat))
        .route("/rooms/{room_id}/join", post(join_room))
        .route("/rooms/{room_id}/leave", post(leave_room))
        .route("/rooms/{room_id}/messages", get(room_messages))
        .route("/rooms/{room_id}/read", post(mark_read))
        .route("/ws", get(ws::websocket_upgrade))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            role: payload.role,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

async fn create_room(
    State(state): State<AppState>,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    let room = state
        .chat_service
        .create_room(CreateRoomRequest {
            name: payload.name,
            description: payload.description,
            creator_id: payload.user_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(room)))
}

async fn joined_rooms(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<Room>>, ApiError> {
    let rooms = state.chat_service.joined_rooms(query.user_id).await?;
    Ok(Json(rooms))
}

async fn available_rooms(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<Room>>, ApiError> {
    let rooms = state.chat_service.available_rooms(query.user_id).await?;
    Ok(Json(rooms))
}

/// 私聊找回或建立。已有房间直接复用，因此统一回 200 而不是 201。
async fn start_direct_chat(
    State(state): State<AppState>,
    Json(payload): Json<DirectChatPayload>,
) -> Result<Json<Room>, ApiError> {
    let room = state
        .chat_service
        .start_direct_chat(StartDirectChatRequest {
            initiator_id: payload.user_id,
            peer_id: payload.peer_id,
        })
        .await?;

    Ok(Json(room))
}

async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<MembershipPayload>,
) -> Result<StatusCode, ApiError> {
    state.chat_service.join_room(payload.user_id, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<MembershipPayload>,
) -> Result<StatusCode, ApiError> {
    state.chat_service.leave_room(payload.user_id, room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn room_messages(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<AuthoredMessage>>, ApiError> {
    let items = state
        .chat_service
        .room_messages(room_id, query.user_id, query.limit, query.before)
        .await?;

    Ok(Json(items))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<MarkReadPayload>,
) -> Result<StatusCode, ApiError> {
    state
        .chat_service
        .mark_read(room_id, payload.user_id, payload.message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
