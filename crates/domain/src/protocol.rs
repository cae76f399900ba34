//! WebSocket 聊天协议帧定义
//!
//! 线上格式统一为 `{ "type": string, "payload": object }`，
//! type 为 snake_case 帧名，payload 字段为 camelCase。
//! 解析失败一律回 `error { message: "Invalid message format" }`，
//! 连接保持打开。

use serde::{Deserialize, Serialize};

use crate::value_objects::{MessageId, RoomId, Timestamp, UserId};

/// 客户端发来的协议帧。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    /// 声明用户身份，必须是连接上的第一个有效动作
    #[serde(rename_all = "camelCase")]
    Auth { user_id: UserId },
    /// 订阅房间的实时事件（仅本连接生命周期内有效，不写成员表）
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: RoomId },
    /// 取消订阅房间
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomId },
    /// 发送聊天消息
    #[serde(rename_all = "camelCase")]
    ChatMessage { room_id: RoomId, message: String },
    /// 正在输入指示
    #[serde(rename_all = "camelCase")]
    Typing { room_id: RoomId, is_typing: bool },
}

/// 服务端推送的协议帧。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    /// 认证成功
    #[serde(rename_all = "camelCase")]
    AuthSuccess { user_id: UserId },
    /// 认证失败，连接保持打开，允许重试
    #[serde(rename_all = "camelCase")]
    AuthError { message: String },
    /// 订阅成功
    #[serde(rename_all = "camelCase")]
    RoomJoined { room_id: RoomId },
    /// 取消订阅成功
    #[serde(rename_all = "camelCase")]
    RoomLeft { room_id: RoomId },
    /// 新聊天消息，发送者自己也会收到一份作为确认
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        id: MessageId,
        room_id: RoomId,
        user_id: UserId,
        username: String,
        message: String,
        created_at: Timestamp,
    },
    /// 输入状态变化，不回发给发送者本人
    #[serde(rename_all = "camelCase")]
    Typing {
        room_id: RoomId,
        user_id: UserId,
        username: String,
        is_typing: bool,
    },
    /// 帧级错误，单帧出错不影响连接
    #[serde(rename_all = "camelCase")]
    Error { message: String },
    /// 新房间广播（发给所有在线连接，用于刷新可加入列表）
    #[serde(rename_all = "camelCase")]
    NewRoom {
        id: RoomId,
        name: String,
        created_at: Timestamp,
    },
    /// 有用户持久加入了房间（只发给该房间的订阅者）
    #[serde(rename_all = "camelCase")]
    UserJoined { user_id: UserId, room_id: RoomId },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// 无法解析的入站帧的统一应答。
    pub fn invalid_format() -> Self {
        Self::error("Invalid message format")
    }

    /// auth 查无此人的统一应答。
    pub fn user_not_found() -> Self {
        Self::AuthError {
            message: "User not found".to_owned(),
        }
    }
}
