use crate::value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId};

/// 聊天消息。创建后不可变，先落库再广播。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

/// 待插入的消息。主键由数据库分配，插入成功后换取完整的 [`Message`]。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

impl MessageDraft {
    pub fn new(room_id: RoomId, user_id: UserId, content: MessageContent, now: Timestamp) -> Self {
        Self {
            room_id,
            user_id,
            content,
            created_at: now,
        }
    }
}
