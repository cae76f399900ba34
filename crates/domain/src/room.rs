use crate::errors::DomainError;
use crate::value_objects::{RoomId, Timestamp, UserId};

/// 房间类型：群聊可被发现和加入，私聊固定两名成员。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Group,
    Direct,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Direct => "direct",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "group" => Ok(Self::Group),
            "direct" => Ok(Self::Direct),
            other => Err(DomainError::invalid_argument(
                "kind",
                format!("unknown room kind '{other}'"),
            )),
        }
    }
}

/// 聊天房间。只软停用（is_active = false），从不物理删除。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: Option<String>,
    pub kind: RoomKind,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl Room {
    pub fn is_direct(&self) -> bool {
        self.kind == RoomKind::Direct
    }

    /// 私聊房间的内部名称，由两个用户 ID 排序后拼成，
    /// 同一对用户恒定得到同一个名称。
    pub fn direct_name(a: UserId, b: UserId) -> String {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        format!("direct-{low}-{high}")
    }
}

/// 待插入的房间。主键由数据库自增列分配，插入后换取完整的 [`Room`]。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDraft {
    pub name: String,
    pub description: Option<String>,
    pub kind: RoomKind,
    pub created_at: Timestamp,
}

impl RoomDraft {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        kind: RoomKind,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        let name = Self::validate_name(name.into())?;
        Ok(Self {
            name,
            description,
            kind,
            created_at: now,
        })
    }

    fn validate_name(name: String) -> Result<String, DomainError> {
        let name = name.trim().to_owned();
        if name.is_empty() {
            return Err(DomainError::invalid_argument("name", "cannot be empty"));
        }
        if name.len() > 100 {
            return Err(DomainError::invalid_argument("name", "too long"));
        }
        Ok(name)
    }
}
