//! 领域层错误定义
//!
//! 聊天核心的业务规则错误，错误文案面向客户端保持英文。

use thiserror::Error;

/// 领域层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 用户不存在
    #[error("user not found")]
    UserNotFound,

    /// 用户名已被占用
    #[error("username already taken")]
    UsernameTaken,

    /// 房间不存在
    #[error("room not found")]
    RoomNotFound,

    /// 房间名重复（唯一性在服务层保证，不在数据库层）
    #[error("a room named '{name}' already exists")]
    DuplicateRoomName { name: String },

    /// 发言或读取历史要求持久成员身份
    #[error("user is not a member of this room")]
    NotRoomMember,

    /// 私聊房间固定两人，不可通过加入接口进入
    #[error("direct rooms cannot be joined")]
    DirectRoomNotJoinable,

    /// 私聊只能由辅导员发起
    #[error("only counselors can start a direct chat")]
    CounselorRequired,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn duplicate_room_name(name: impl Into<String>) -> Self {
        Self::DuplicateRoomName { name: name.into() }
    }
}
