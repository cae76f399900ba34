use crate::errors::DomainError;
use crate::value_objects::{Timestamp, UserId, Username};

/// 用户角色。平台上只有两类身份：求助的学生和提供支持的辅导员。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Counselor,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Counselor => "counselor",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "student" => Ok(Self::Student),
            "counselor" => Ok(Self::Counselor),
            other => Err(DomainError::invalid_argument(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

/// 平台用户。匿名机制只暴露昵称，创建后角色不可切换。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub role: UserRole,
    pub created_at: Timestamp,
}

impl User {
    pub fn new(id: UserId, username: Username, role: UserRole, now: Timestamp) -> Self {
        Self {
            id,
            username,
            role,
            created_at: now,
        }
    }

    pub fn is_counselor(&self) -> bool {
        self.role == UserRole::Counselor
    }
}

/// 待插入的用户。主键由数据库分配，插入后换取完整的 [`User`]。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDraft {
    pub username: Username,
    pub role: UserRole,
    pub created_at: Timestamp,
}

impl UserDraft {
    pub fn new(username: Username, role: UserRole, now: Timestamp) -> Self {
        Self {
            username,
            role,
            created_at: now,
        }
    }
}
