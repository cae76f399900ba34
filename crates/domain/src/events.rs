//! 业务事件定义
//!
//! 通知总线使用的封闭事件集：每种事件一个固定的载荷形状，
//! 订阅和发布都在编译期校验，不存在字符串键的动态分发。

use crate::value_objects::{MessageId, RoomId, Timestamp, UserId};

/// 事件种类，用作总线的订阅键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatEventKind {
    MessageSent,
    UserJoinedRoom,
    UserTyping,
    MessageRead,
    NewRoom,
    UserJoined,
}

impl ChatEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageSent => "message_sent",
            Self::UserJoinedRoom => "user_joined_room",
            Self::UserTyping => "user_typing",
            Self::MessageRead => "message_read",
            Self::NewRoom => "new_room",
            Self::UserJoined => "user_joined",
        }
    }
}

impl std::fmt::Display for ChatEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 聊天子系统的业务事件。
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// 消息已持久化
    MessageSent {
        room_id: RoomId,
        user_id: UserId,
        message_id: MessageId,
    },
    /// 私聊建立时双方被写入成员表
    UserJoinedRoom { room_id: RoomId, user_id: UserId },
    /// 输入状态变化
    UserTyping {
        room_id: RoomId,
        user_id: UserId,
        is_typing: bool,
    },
    /// 已读游标推进
    MessageRead {
        room_id: RoomId,
        user_id: UserId,
        message_id: MessageId,
    },
    /// 新群聊房间创建（全体在线连接都应得知）
    NewRoom {
        room_id: RoomId,
        name: String,
        created_at: Timestamp,
    },
    /// 用户通过 HTTP 持久加入房间（只通知该房间的订阅者）
    UserJoined { room_id: RoomId, user_id: UserId },
}

impl ChatEvent {
    pub fn kind(&self) -> ChatEventKind {
        match self {
            Self::MessageSent { .. } => ChatEventKind::MessageSent,
            Self::UserJoinedRoom { .. } => ChatEventKind::UserJoinedRoom,
            Self::UserTyping { .. } => ChatEventKind::UserTyping,
            Self::MessageRead { .. } => ChatEventKind::MessageRead,
            Self::NewRoom { .. } => ChatEventKind::NewRoom,
            Self::UserJoined { .. } => ChatEventKind::UserJoined,
        }
    }

    /// 事件关联的房间。封闭集里的每种事件都是房间范畴的。
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::MessageSent { room_id, .. }
            | Self::UserJoinedRoom { room_id, .. }
            | Self::UserTyping { room_id, .. }
            | Self::MessageRead { room_id, .. }
            | Self::NewRoom { room_id, .. }
            | Self::UserJoined { room_id, .. } => *room_id,
        }
    }
}
