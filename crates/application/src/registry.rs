//! 连接注册表
//!
//! 进程内唯一的在线连接集合：每个条目记录认证后的用户身份、
//! 出站帧发送端、当前订阅的房间集合，以及仍处于"正在输入"
//! 状态的房间（断连时用于补发 typing=false）。
//!
//! 注册表只在认证成功后产生条目；同一用户允许多个并存连接
//! （多标签页），互相独立，互不去重。发送端已关闭的连接在
//! 广播时静默跳过，摘除条目始终由传输层在连接关闭时完成。

use std::collections::{HashMap, HashSet};

use domain::{ConnectionId, RoomId, ServerFrame, UserId};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

/// 连接注册表错误。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// 同一个连接句柄重复注册（同一用户开第二个连接不算重复）
    #[error("connection already registered")]
    DuplicateConnection,
    #[error("connection not found")]
    ConnectionNotFound,
}

/// 单个在线连接的注册信息。
struct ConnectionEntry {
    user_id: UserId,
    username: String,
    sender: mpsc::UnboundedSender<ServerFrame>,
    rooms: HashSet<RoomId>,
    typing_rooms: HashSet<RoomId>,
}

/// 注销时返回的连接快照，供传输层做断连清理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedConnection {
    pub user_id: UserId,
    pub username: String,
    /// 断连前仍处于 typing=true 的房间
    pub typing_rooms: Vec<RoomId>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个已认证的连接。
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        username: impl Into<String>,
        sender: mpsc::UnboundedSender<ServerFrame>,
    ) -> Result<(), RegistryError> {
        let mut connections = self.connections.write().await;
        if connections.contains_key(&connection_id) {
            return Err(RegistryError::DuplicateConnection);
        }
        connections.insert(
            connection_id,
            ConnectionEntry {
                user_id,
                username: username.into(),
                sender,
                rooms: HashSet::new(),
                typing_rooms: HashSet::new(),
            },
        );
        Ok(())
    }

    /// 订阅房间。重复订阅是无害的空操作。
    pub async fn add_subscription(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), RegistryError> {
        let mut connections = self.connections.write().await;
        let entry = connections
            .get_mut(&connection_id)
            .ok_or(RegistryError::ConnectionNotFound)?;
        entry.rooms.insert(room_id);
        Ok(())
    }

    /// 取消订阅。连接不存在或本来就未订阅时直接返回。
    pub async fn remove_subscription(&self, connection_id: ConnectionId, room_id: RoomId) {
        let mut connections = self.connections.write().await;
        if let Some(entry) = connections.get_mut(&connection_id) {
            entry.rooms.remove(&room_id);
            entry.typing_rooms.remove(&room_id);
        }
    }

    /// 维护连接在某房间的"正在输入"状态。
    pub async fn set_typing(&self, connection_id: ConnectionId, room_id: RoomId, is_typing: bool) {
        let mut connections = self.connections.write().await;
        if let Some(entry) = connections.get_mut(&connection_id) {
            if is_typing {
                entry.typing_rooms.insert(room_id);
            } else {
                entry.typing_rooms.remove(&room_id);
            }
        }
    }

    /// 注销连接，幂等：重复调用返回 `None`。
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<ClosedConnection> {
        let mut connections = self.connections.write().await;
        connections.remove(&connection_id).map(|entry| ClosedConnection {
            user_id: entry.user_id,
            username: entry.username,
            typing_rooms: entry.typing_rooms.into_iter().collect(),
        })
    }

    /// 向房间的所有订阅连接广播一帧，可选排除某个连接
    /// （typing 不回发给发送者本人）。返回成功投递的连接数。
    ///
    /// 发送端已关闭的连接静默跳过，不在这里摘除。
    pub async fn broadcast_to_room(
        &self,
        room_id: RoomId,
        frame: &ServerFrame,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for (connection_id, entry) in connections.iter() {
            if Some(*connection_id) == exclude || !entry.rooms.contains(&room_id) {
                continue;
            }
            if entry.sender.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(connection_id = %connection_id, room_id = %room_id, "连接发送端已关闭，跳过投递");
            }
        }
        delivered
    }

    /// 向所有在线连接广播一帧（不看订阅关系，new_room 公告用）。
    pub async fn broadcast_to_all(&self, frame: &ServerFrame) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for (connection_id, entry) in connections.iter() {
            if entry.sender.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(connection_id = %connection_id, "连接发送端已关闭，跳过投递");
            }
        }
        delivered
    }

    /// 当前在线连接数。
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
