use std::sync::Arc;
use std::time::Duration;

use application::{ChatService, ConnectionRegistry, EventBus, UserService};

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub chat_service: Arc<ChatService>,
    pub registry: Arc<ConnectionRegistry>,
    pub bus: Arc<EventBus>,
    /// 连接建立后等待 auth 帧的时限，超时即断开。
    pub auth_timeout: Duration,
}

impl AppState {
    pub fn new(
        user_service: Arc<UserService>,
        chat_service: Arc<ChatService>,
        registry: Arc<ConnectionRegistry>,
        bus: Arc<EventBus>,
        auth_timeout: Duration,
    ) -> Self {
        Self {
            user_service,
            chat_service,
            registry,
            bus,
            auth_timeout,
        }
    }
}
