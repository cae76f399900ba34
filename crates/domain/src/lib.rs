//! 心理支持平台聊天子系统的核心领域模型
//!
//! 包含用户、房间、成员关系、消息等实体，WebSocket 协议帧定义，
//! 以及通知总线使用的封闭业务事件集。

pub mod errors;
pub mod events;
pub mod membership;
pub mod message;
pub mod protocol;
pub mod room;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::DomainError;
pub use events::{ChatEvent, ChatEventKind};
pub use membership::Membership;
pub use message::{Message, MessageDraft};
pub use protocol::{ClientFrame, ServerFrame};
pub use room::{Room, RoomDraft, RoomKind};
pub use user::{User, UserDraft, UserRole};
pub use value_objects::{
    ConnectionId, MessageContent, MessageId, RoomId, Timestamp, UserId, Username,
};
