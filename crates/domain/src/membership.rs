use crate::value_objects::{MessageId, RoomId, Timestamp, UserId};

/// 房间成员关系。复合主键 (room_id, user_id)，没有独立的自增 ID。
///
/// 一条成员关系同时意味着：可以读写该房间的消息，
/// 并且认证后的连接会自动订阅该房间的实时事件。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Membership {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub joined_at: Timestamp,
    /// 已读游标，空表示尚未读过任何消息。
    pub last_read_message_id: Option<MessageId>,
}

impl Membership {
    pub fn new(room_id: RoomId, user_id: UserId, now: Timestamp) -> Self {
        Self {
            room_id,
            user_id,
            joined_at: now,
            last_read_message_id: None,
        }
    }

    pub fn record_last_read(&mut self, message_id: MessageId) {
        self.last_read_message_id = Some(message_id);
    }
}
