//! 集成测试公共设施：内存仓储装配出完整路由，
//! 再按需起一个临时端口上的真实服务器。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, RwLock};
use tokio::time::sleep;

use application::{
    AuthoredMessage, ChatService, ChatServiceDependencies, Clock, ConnectionRegistry, EventBus,
    MembershipRepository, MessageRepository, NewRoomFanout, RepositoryError, RoomRepository,
    SystemClock, UserJoinedFanout, UserRepository, UserService, UserServiceDependencies,
};
use domain::{
    ChatEventKind, Membership, Message, MessageDraft, MessageId, Room, RoomDraft, RoomId, RoomKind,
    User, UserDraft, UserId,
};
use web_api::{router, AppState};

type UserRows = Arc<RwLock<HashMap<UserId, User>>>;
type RoomRows = Arc<RwLock<HashMap<RoomId, Room>>>;
type MembershipRows = Arc<RwLock<HashMap<(RoomId, UserId), Membership>>>;
type MessageRows = Arc<RwLock<Vec<Message>>>;

#[derive(Default)]
struct InMemoryUserRepository {
    rows: UserRows,
    next_id: AtomicI64,
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, draft: UserDraft) -> Result<User, RepositoryError> {
        let mut rows = self.rows.write().await;
        if rows
            .values()
            .any(|user| user.username.as_str() == draft.username.as_str())
        {
            return Err(RepositoryError::conflict("username already exists"));
        }
        let id = UserId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let user = User::new(id, draft.username, draft.role, draft.created_at);
        rows.insert(id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|user| user.username.as_str() == username)
            .cloned())
    }
}

struct InMemoryRoomRepository {
    rooms: RoomRows,
    memberships: MembershipRows,
    next_id: AtomicI64,
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn create_with_creator(
        &self,
        draft: RoomDraft,
        creator_id: UserId,
    ) -> Result<Room, RepositoryError> {
        let mut rooms = self.rooms.write().await;
        let mut memberships = self.memberships.write().await;
        let id = RoomId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let room = Room {
            id,
            name: draft.name,
            description: draft.description,
            kind: draft.kind,
            is_active: true,
            created_at: draft.created_at,
        };
        rooms.insert(id, room.clone());
        memberships.insert(
            (id, creator_id),
            Membership::new(id, creator_id, draft.created_at),
        );
        Ok(room)
    }

    async fn create_direct_with_members(
        &self,
        draft: RoomDraft,
        initiator_id: UserId,
        peer_id: UserId,
    ) -> Result<Room, RepositoryError> {
        let mut rooms = self.rooms.write().await;
        let mut memberships = self.memberships.write().await;
        let id = RoomId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let room = Room {
            id,
            name: draft.name,
            description: draft.description,
            kind: draft.kind,
            is_active: true,
            created_at: draft.created_at,
        };
        rooms.insert(id, room.clone());
        for user_id in [initiator_id, peer_id] {
            memberships.insert((id, user_id), Membership::new(id, user_id, draft.created_at));
        }
        Ok(room)
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        Ok(self.rooms.read().await.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Room>, RepositoryError> {
        Ok(self
            .rooms
            .read()
            .await
            .values()
            .find(|room| room.name == name)
            .cloned())
    }

    async fn list_joined(&self, user_id: UserId) -> Result<Vec<Room>, RepositoryError> {
        let rooms = self.rooms.read().await;
        let memberships = self.memberships.read().await;
        let mut joined: Vec<Room> = rooms
            .values()
            .filter(|room| memberships.contains_key(&(room.id, user_id)))
            .cloned()
            .collect();
        joined.sort_by_key(|room| room.id);
        Ok(joined)
    }

    async fn list_available(&self, user_id: UserId) -> Result<Vec<Room>, RepositoryError> {
        let rooms = self.rooms.read().await;
        let memberships = self.memberships.read().await;
        let mut available: Vec<Room> = rooms
            .values()
            .filter(|room| {
                room.kind == RoomKind::Group
                    && room.is_active
                    && !memberships.contains_key(&(room.id, user_id))
            })
            .cloned()
            .collect();
        available.sort_by_key(|room| room.id);
        Ok(available)
    }

    async fn list_by_kind(&self, kind: RoomKind) -> Result<Vec<Room>, RepositoryError> {
        let rooms = self.rooms.read().await;
        let mut matching: Vec<Room> = rooms
            .values()
            .filter(|room| room.kind == kind)
            .cloned()
            .collect();
        matching.sort_by_key(|room| room.id);
        Ok(matching)
    }
}

struct InMemoryMembershipRepository {
    rows: MembershipRows,
}

#[async_trait]
impl MembershipRepository for InMemoryMembershipRepository {
    async fn insert(&self, membership: Membership) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.write().await;
        let key = (membership.room_id, membership.user_id);
        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, membership);
        Ok(true)
    }

    async fn remove(&self, room_id: RoomId, user_id: UserId) -> Result<(), RepositoryError> {
        self.rows.write().await.remove(&(room_id, user_id));
        Ok(())
    }

    async fn exists(&self, room_id: RoomId, user_id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.rows.read().await.contains_key(&(room_id, user_id)))
    }

    async fn list_members(&self, room_id: RoomId) -> Result<Vec<Membership>, RepositoryError> {
        let rows = self.rows.read().await;
        let mut members: Vec<Membership> = rows
            .values()
            .filter(|membership| membership.room_id == room_id)
            .cloned()
            .collect();
        members.sort_by_key(|membership| membership.user_id);
        Ok(members)
    }

    async fn set_last_read(
        &self,
        room_id: RoomId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&(room_id, user_id)) {
            Some(membership) => {
                membership.record_last_read(message_id);
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

struct InMemoryMessageRepository {
    rows: MessageRows,
    users: UserRows,
    next_id: AtomicI64,
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, draft: MessageDraft) -> Result<Message, RepositoryError> {
        let mut rows = self.rows.write().await;
        let message = Message {
            id: MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            room_id: draft.room_id,
            user_id: draft.user_id,
            content: draft.content,
            created_at: draft.created_at,
        };
        rows.push(message.clone());
        Ok(message)
    }

    async fn list_recent(
        &self,
        room_id: RoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<AuthoredMessage>, RepositoryError> {
        let rows = self.rows.read().await;
        let users = self.users.read().await;
        let mut items: Vec<Message> = rows
            .iter()
            .filter(|message| {
                message.room_id == room_id && before.map_or(true, |cursor| message.id < cursor)
            })
            .cloned()
            .collect();
        items.sort_by_key(|message| message.id);
        let skip = items.len().saturating_sub(limit as usize);
        Ok(items
            .into_iter()
            .skip(skip)
            .map(|message| {
                let username = users
                    .get(&message.user_id)
                    .map(|user| user.username.to_string())
                    .unwrap_or_else(|| "unknown".to_owned());
                AuthoredMessage { message, username }
            })
            .collect())
    }
}

/// 在内存仓储上装配完整应用状态，认证超时可调。
pub async fn build_state(auth_timeout: Duration) -> AppState {
    let users: UserRows = Arc::new(RwLock::new(HashMap::new()));
    let memberships: MembershipRows = Arc::new(RwLock::new(HashMap::new()));

    let user_repository = Arc::new(InMemoryUserRepository {
        rows: users.clone(),
        next_id: AtomicI64::new(0),
    });
    let room_repository = Arc::new(InMemoryRoomRepository {
        rooms: Arc::new(RwLock::new(HashMap::new())),
        memberships: memberships.clone(),
        next_id: AtomicI64::new(0),
    });
    let membership_repository = Arc::new(InMemoryMembershipRepository { rows: memberships });
    let message_repository = Arc::new(InMemoryMessageRepository {
        rows: Arc::new(RwLock::new(Vec::new())),
        users: users.clone(),
        next_id: AtomicI64::new(0),
    });

    let registry = Arc::new(ConnectionRegistry::new());
    let bus = Arc::new(EventBus::new());
    bus.subscribe(
        ChatEventKind::NewRoom,
        Arc::new(NewRoomFanout::new(registry.clone())),
    )
    .await;
    bus.subscribe(
        ChatEventKind::UserJoined,
        Arc::new(UserJoinedFanout::new(registry.clone())),
    )
    .await;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let user_service = Arc::new(UserService::new(UserServiceDependencies {
        user_repository: user_repository.clone(),
        clock: clock.clone(),
    }));
    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        room_repository,
        membership_repository,
        message_repository,
        user_repository,
        clock,
        bus: bus.clone(),
    }));

    AppState::new(user_service, chat_service, registry, bus, auth_timeout)
}

pub async fn build_router() -> Router {
    router(build_state(Duration::from_secs(5)).await)
}

/// 把路由挂到一个临时端口上，返回地址和关停句柄。
pub async fn spawn_server(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    // 给服务器一点启动时间
    sleep(Duration::from_millis(100)).await;
    (addr, shutdown_tx)
}
