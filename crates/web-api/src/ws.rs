//! WebSocket 实时层
//!
//! 连接升级后走帧内认证：第一个有效动作必须是 auth 帧，限时
//! 未认证即断开。认证失败连接保持打开，允许重试。认证成功后
//! 自动订阅该用户已持久加入的全部房间，后续按帧路由到聊天
//! 服务与连接注册表。单帧出错只回 error 帧，连接不关。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use application::PostMessageRequest;
use domain::{ChatEvent, ClientFrame, ConnectionId, RoomId, ServerFrame, UserId};

use crate::state::AppState;

/// 处理 WebSocket 连接升级。认证在帧内完成，升级本身不设门槛。
pub async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::generate();
    debug!(connection_id = %connection_id, "新 WebSocket 连接");

    let (mut outgoing, mut incoming) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    // 发送任务：把注册表投递的帧序列化成文本推给客户端
    let send_connection_id = connection_id;
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if let Err(err) = outgoing.send(WsMessage::Text(json.into())).await {
                        debug!(connection_id = %send_connection_id, error = %err, "发送失败，连接已断开");
                        break;
                    }
                }
                Err(err) => {
                    error!(connection_id = %send_connection_id, error = %err, "帧序列化失败");
                    break;
                }
            }
        }
        debug!(connection_id = %send_connection_id, "发送任务结束");
    });

    // 接收任务：认证限时 + 逐帧路由
    let recv_state = state.clone();
    let recv_tx = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        let auth_timeout = recv_state.auth_timeout;
        let mut session = ChatSession::new(recv_state, connection_id, recv_tx);
        let auth_deadline = tokio::time::sleep(auth_timeout);
        tokio::pin!(auth_deadline);

        loop {
            tokio::select! {
                () = &mut auth_deadline, if !session.is_authenticated() => {
                    warn!(connection_id = %connection_id, "认证超时，关闭连接");
                    break;
                }
                received = incoming.next() => {
                    let Some(received) = received else { break };
                    match received {
                        Ok(WsMessage::Text(text)) => session.handle_text(text.as_str()).await,
                        Ok(WsMessage::Binary(_)) => {
                            debug!(connection_id = %connection_id, "收到二进制帧，忽略");
                        }
                        Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                        Ok(WsMessage::Close(_)) => {
                            debug!(connection_id = %connection_id, "客户端主动关闭");
                            break;
                        }
                        Err(err) => {
                            debug!(connection_id = %connection_id, error = %err, "读取错误，连接终止");
                            break;
                        }
                    }
                }
            }
        }
        debug!(connection_id = %connection_id, "接收任务结束");
    });

    // 任一方向结束就整体收尾，另一侧任务直接中止，
    // 避免中止前的在途帧在注销之后又把连接重新注册进去
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    cleanup_connection(&state, connection_id).await;
}

/// 断连清理：注销连接，给仍处于 typing=true 的房间补发状态复位。
async fn cleanup_connection(state: &AppState, connection_id: ConnectionId) {
    let Some(closed) = state.registry.unregister(connection_id).await else {
        debug!(connection_id = %connection_id, "未认证连接关闭，无需清理");
        return;
    };

    for room_id in &closed.typing_rooms {
        let frame = ServerFrame::Typing {
            room_id: *room_id,
            user_id: closed.user_id,
            username: closed.username.clone(),
            is_typing: false,
        };
        state.registry.broadcast_to_room(*room_id, &frame, None).await;
        state
            .bus
            .emit(ChatEvent::UserTyping {
                room_id: *room_id,
                user_id: closed.user_id,
                is_typing: false,
            })
            .await;
    }

    info!(
        connection_id = %connection_id,
        user_id = %closed.user_id,
        "WebSocket 连接已清理"
    );
}

/// 认证通过后缓存的用户身份，免得每帧都查库。
#[derive(Debug, Clone)]
struct AuthenticatedUser {
    user_id: UserId,
    username: String,
}

/// 单个 WebSocket 连接的帧处理状态机。
struct ChatSession {
    state: AppState,
    connection_id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerFrame>,
    user: Option<AuthenticatedUser>,
}

impl ChatSession {
    fn new(
        state: AppState,
        connection_id: ConnectionId,
        tx: mpsc::UnboundedSender<ServerFrame>,
    ) -> Self {
        Self {
            state,
            connection_id,
            tx,
            user: None,
        }
    }

    fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// 直接回发一帧给本连接。连接正在关闭时发送失败，忽略即可。
    fn send(&self, frame: ServerFrame) {
        let _ = self.tx.send(frame);
    }

    /// 认证门槛：未认证时回错误帧并拦下该帧。
    fn require_auth(&self) -> Option<AuthenticatedUser> {
        match &self.user {
            Some(user) => Some(user.clone()),
            None => {
                self.send(ServerFrame::error("Authentication required"));
                None
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(connection_id = %self.connection_id, error = %err, "无法解析的入站帧");
                self.send(ServerFrame::invalid_format());
                return;
            }
        };

        match frame {
            ClientFrame::Auth { user_id } => self.handle_auth(user_id).await,
            ClientFrame::JoinRoom { room_id } => self.handle_join_room(room_id).await,
            ClientFrame::LeaveRoom { room_id } => self.handle_leave_room(room_id).await,
            ClientFrame::ChatMessage { room_id, message } => {
                self.handle_chat_message(room_id, message).await;
            }
            ClientFrame::Typing { room_id, is_typing } => {
                self.handle_typing(room_id, is_typing).await;
            }
        }
    }

    async fn handle_auth(&mut self, user_id: UserId) {
        if self.user.is_some() {
            self.send(ServerFrame::error("Already authenticated"));
            return;
        }

        let user = match self.state.user_service.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!(connection_id = %self.connection_id, user_id = %user_id, "认证失败，用户不存在");
                self.send(ServerFrame::user_not_found());
                return;
            }
            Err(err) => {
                error!(connection_id = %self.connection_id, error = %err, "认证查询失败");
                // 留在 auth_error 通道里，客户端的重试逻辑同样适用
                self.send(ServerFrame::AuthError {
                    message: "Authentication failed".to_owned(),
                });
                return;
            }
        };

        let username = user.username.to_string();
        if let Err(err) = self
            .state
            .registry
            .register(self.connection_id, user.id, username.clone(), self.tx.clone())
            .await
        {
            error!(connection_id = %self.connection_id, error = %err, "连接注册失败");
            self.send(ServerFrame::error("Failed to register connection"));
            return;
        }

        self.user = Some(AuthenticatedUser {
            user_id: user.id,
            username,
        });
        self.send(ServerFrame::AuthSuccess { user_id: user.id });
        self.subscribe_joined_rooms(user.id).await;
        info!(connection_id = %self.connection_id, user_id = %user.id, "连接认证成功");
    }

    /// 认证即自动订阅全部已加入房间，客户端无需逐个 join_room。
    /// 自动建立的订阅不回 room_joined 帧。
    async fn subscribe_joined_rooms(&self, user_id: UserId) {
        let rooms = match self.state.chat_service.joined_rooms(user_id).await {
            Ok(rooms) => rooms,
            Err(err) => {
                warn!(connection_id = %self.connection_id, user_id = %user_id, error = %err, "读取已加入房间失败，跳过自动订阅");
                return;
            }
        };

        for room in rooms {
            if let Err(err) = self
                .state
                .registry
                .add_subscription(self.connection_id, room.id)
                .await
            {
                warn!(connection_id = %self.connection_id, room_id = %room.id, error = %err, "自动订阅失败");
            }
        }
    }

    async fn handle_join_room(&mut self, room_id: RoomId) {
        let Some(_user) = self.require_auth() else {
            return;
        };

        match self.state.chat_service.get_room(room_id).await {
            Ok(Some(room)) => {
                if let Err(err) = self
                    .state
                    .registry
                    .add_subscription(self.connection_id, room.id)
                    .await
                {
                    error!(connection_id = %self.connection_id, room_id = %room.id, error = %err, "订阅失败");
                    self.send(ServerFrame::error("Failed to join room"));
                    return;
                }
                self.send(ServerFrame::RoomJoined { room_id: room.id });
            }
            Ok(None) => {
                self.send(ServerFrame::error("Room not found"));
            }
            Err(err) => {
                error!(connection_id = %self.connection_id, room_id = %room_id, error = %err, "房间查询失败");
                self.send(ServerFrame::error("Failed to join room"));
            }
        }
    }

    async fn handle_leave_room(&mut self, room_id: RoomId) {
        let Some(_user) = self.require_auth() else {
            return;
        };

        self.state
            .registry
            .remove_subscription(self.connection_id, room_id)
            .await;
        self.send(ServerFrame::RoomLeft { room_id });
    }

    async fn handle_chat_message(&mut self, room_id: RoomId, message: String) {
        let Some(user) = self.require_auth() else {
            return;
        };

        let stored = match self
            .state
            .chat_service
            .post_message(PostMessageRequest {
                room_id,
                user_id: user.user_id,
                message,
            })
            .await
        {
            Ok(stored) => stored,
            Err(err) => {
                match err.domain_error() {
                    Some(domain_err) => self.send(ServerFrame::error(domain_err.to_string())),
                    None => {
                        error!(connection_id = %self.connection_id, room_id = %room_id, error = %err, "消息入库失败");
                        self.send(ServerFrame::error("Failed to send message"));
                    }
                }
                return;
            }
        };

        // 先落库后广播，发送者也收到一份作为入库确认
        let frame = ServerFrame::ChatMessage {
            id: stored.id,
            room_id: stored.room_id,
            user_id: stored.user_id,
            username: user.username,
            message: stored.content.into_string(),
            created_at: stored.created_at,
        };
        let delivered = self
            .state
            .registry
            .broadcast_to_room(stored.room_id, &frame, None)
            .await;
        debug!(room_id = %stored.room_id, message_id = %stored.id, delivered, "消息已广播");
    }

    async fn handle_typing(&mut self, room_id: RoomId, is_typing: bool) {
        let Some(user) = self.require_auth() else {
            return;
        };

        self.state
            .registry
            .set_typing(self.connection_id, room_id, is_typing)
            .await;

        // 输入指示不落库，也不回发给发送者本人
        let frame = ServerFrame::Typing {
            room_id,
            user_id: user.user_id,
            username: user.username,
            is_typing,
        };
        self.state
            .registry
            .broadcast_to_room(room_id, &frame, Some(self.connection_id))
            .await;
        self.state
            .bus
            .emit(ChatEvent::UserTyping {
                room_id,
                user_id: user.user_id,
                is_typing,
            })
            .await;
    }
}
