//! 通知总线
//!
//! 把 HTTP 请求处理器里产生的业务事件与实时投递解耦：
//! 房间创建、持久加入这类动作通过总线转到连接注册表广播，
//! 而不是让路由处理器直接操纵连接。
//!
//! 订阅表以封闭的 [`ChatEventKind`] 为键，进程启动时注册一次，
//! 之后只增不减。`emit` 按注册顺序逐个等待订阅者执行完成，
//! 某个订阅者失败只记日志，不影响后续订阅者。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{ChatEvent, ChatEventKind, ServerFrame};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::registry::ConnectionRegistry;

/// 订阅者执行失败。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("subscriber failed: {message}")]
pub struct NotifyError {
    pub message: String,
}

impl NotifyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 业务事件订阅者。
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// 订阅者名称，只用于失败日志。
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &ChatEvent) -> Result<(), NotifyError>;
}

/// 进程级通知总线。
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<ChatEventKind, Vec<Arc<dyn EventSubscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者。同一种类内按注册顺序投递。
    pub async fn subscribe(&self, kind: ChatEventKind, subscriber: Arc<dyn EventSubscriber>) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(kind).or_default().push(subscriber);
    }

    /// 发布事件，返回被调用的订阅者数量。
    ///
    /// 没有订阅者的事件种类是合法的空操作（message_sent 等
    /// 目前只发不收）。
    pub async fn emit(&self, event: ChatEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<Arc<dyn EventSubscriber>> = {
            let subscribers = self.subscribers.read().await;
            match subscribers.get(&kind) {
                Some(list) => list.clone(),
                None => {
                    debug!(kind = %kind, "事件没有订阅者");
                    return 0;
                }
            }
        };

        let mut invoked = 0;
        for subscriber in targets {
            invoked += 1;
            if let Err(err) = subscriber.handle(&event).await {
                // 单个订阅者失败不阻断后续订阅者
                warn!(kind = %kind, subscriber = subscriber.name(), error = %err, "订阅者处理事件失败");
            }
        }
        invoked
    }
}

/// 常驻订阅者：把 new_room 事件广播给所有在线连接，
/// 让每个客户端都能刷新"可加入房间"列表。
pub struct NewRoomFanout {
    registry: Arc<ConnectionRegistry>,
}

impl NewRoomFanout {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EventSubscriber for NewRoomFanout {
    fn name(&self) -> &'static str {
        "new_room_fanout"
    }

    async fn handle(&self, event: &ChatEvent) -> Result<(), NotifyError> {
        if let ChatEvent::NewRoom {
            room_id,
            name,
            created_at,
        } = event
        {
            let frame = ServerFrame::NewRoom {
                id: *room_id,
                name: name.clone(),
                created_at: *created_at,
            };
            let delivered = self.registry.broadcast_to_all(&frame).await;
            debug!(room_id = %room_id, delivered, "new_room 公告已广播");
        }
        Ok(())
    }
}

/// 常驻订阅者：把 user_joined 事件只广播给该房间的订阅连接。
pub struct UserJoinedFanout {
    registry: Arc<ConnectionRegistry>,
}

impl UserJoinedFanout {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EventSubscriber for UserJoinedFanout {
    fn name(&self) -> &'static str {
        "user_joined_fanout"
    }

    async fn handle(&self, event: &ChatEvent) -> Result<(), NotifyError> {
        if let ChatEvent::UserJoined { room_id, user_id } = event {
            let frame = ServerFrame::UserJoined {
                user_id: *user_id,
                room_id: *room_id,
            };
            let delivered = self.registry.broadcast_to_room(*room_id, &frame, None).await;
            debug!(room_id = %room_id, user_id = %user_id, delivered, "user_joined 已广播");
        }
        Ok(())
    }
}
