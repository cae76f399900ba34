//! 持久化端口定义
//!
//! 应用层只依赖这些 trait；Postgres 实现在基础设施层。
//! 测试用内存实现替换。

use async_trait::async_trait;
use domain::{
    Membership, Message, MessageDraft, MessageId, Room, RoomDraft, RoomId, RoomKind, User,
    UserDraft, UserId,
};
use thiserror::Error;

/// 持久化层错误。
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    /// 唯一约束冲突（例如用户名已存在）
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 主键由数据库分配，返回完整的用户行。
    async fn create(&self, draft: UserDraft) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;
}

#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// 创建房间并在同一事务内写入创建者的成员关系，两者要么都成功要么都回滚。
    async fn create_with_creator(
        &self,
        draft: RoomDraft,
        creator_id: UserId,
    ) -> Result<Room, RepositoryError>;
    /// 建立私聊房间：房间行与双方成员关系在同一事务内写入，
    /// 任何一步失败整体回滚，不会留下单成员的私聊房间。
    async fn create_direct_with_members(
        &self,
        draft: RoomDraft,
        initiator_id: UserId,
        peer_id: UserId,
    ) -> Result<Room, RepositoryError>;
    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Room>, RepositoryError>;
    /// 用户已持久加入的全部房间。
    async fn list_joined(&self, user_id: UserId) -> Result<Vec<Room>, RepositoryError>;
    /// 用户尚未加入、可被发现的活跃群聊房间。
    async fn list_available(&self, user_id: UserId) -> Result<Vec<Room>, RepositoryError>;
    /// 按类型列出房间（私聊配对查找用）。
    async fn list_by_kind(&self, kind: RoomKind) -> Result<Vec<Room>, RepositoryError>;
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// 幂等插入：已是成员时不报错，返回 false 表示没有新写入行。
    async fn insert(&self, membership: Membership) -> Result<bool, RepositoryError>;
    /// 幂等删除。
    async fn remove(&self, room_id: RoomId, user_id: UserId) -> Result<(), RepositoryError>;
    async fn exists(&self, room_id: RoomId, user_id: UserId) -> Result<bool, RepositoryError>;
    async fn list_members(&self, room_id: RoomId) -> Result<Vec<Membership>, RepositoryError>;
    /// 推进已读游标；(room_id, user_id) 不存在时返回 NotFound。
    async fn set_last_read(
        &self,
        room_id: RoomId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<(), RepositoryError>;
}

/// 带作者昵称的消息读模型，历史接口直接用 SQL JOIN 得到。
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AuthoredMessage {
    #[serde(flatten)]
    pub message: Message,
    pub username: String,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 保存消息，返回带数据库主键的完整行。广播必须发生在本调用成功之后。
    async fn insert(&self, draft: MessageDraft) -> Result<Message, RepositoryError>;
    /// 房间最近消息，键集分页（id 小于 before），返回按 id 升序的一页。
    async fn list_recent(
        &self,
        room_id: RoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<AuthoredMessage>, RepositoryError>;
}
