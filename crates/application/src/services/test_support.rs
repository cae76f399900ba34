//! 服务层单元测试用的内存仓储。
//!
//! 房间仓储与成员仓储共享同一份成员表，两个建房方法
//! 的"同一事务"语义在内存里天然成立。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use domain::{
    ChatEvent, ChatEventKind, Membership, Message, MessageDraft, MessageId, Room, RoomDraft,
    RoomId, RoomKind, User, UserDraft, UserId,
};
use tokio::sync::RwLock;

use crate::bus::{EventBus, EventSubscriber, NotifyError};
use crate::clock::SystemClock;
use crate::repository::{
    AuthoredMessage, MembershipRepository, MessageRepository, RepositoryError, RoomRepository,
    UserRepository,
};

type UserRows = Arc<RwLock<HashMap<UserId, User>>>;
type RoomRows = Arc<RwLock<BTreeMap<RoomId, Room>>>;
type MembershipRows = Arc<RwLock<HashMap<(RoomId, UserId), Membership>>>;
type MessageRows = Arc<RwLock<Vec<Message>>>;

pub struct InMemoryUserRepository {
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
        let id = UserId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
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

pub struct InMemoryRoomRepository {
    rooms: RoomRows,
    memberships: MembershipRows,
    next_id: AtomicI64,
    fail_next_create: AtomicBool,
}

impl InMemoryRoomRepository {
    /// 让下一次建房调用返回存储错误，模拟写库失败。
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> Result<(), RepositoryError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::storage("simulated write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn create_with_creator(
        &self,
        draft: RoomDraft,
        creator_id: UserId,
    ) -> Result<Room, RepositoryError> {
        self.take_injected_failure()?;
        let mut rooms = self.rooms.write().await;
        let mut memberships = self.memberships.write().await;
        let id = RoomId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
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
        self.take_injected_failure()?;
        let mut rooms = self.rooms.write().await;
        let mut memberships = self.memberships.write().await;
        let id = RoomId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
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
        let memberships = self.memberships.read().await;
        let rooms = self.rooms.read().await;
        Ok(rooms
            .values()
            .filter(|room| memberships.contains_key(&(room.id, user_id)))
            .cloned()
            .collect())
    }

    async fn list_available(&self, user_id: UserId) -> Result<Vec<Room>, RepositoryError> {
        let memberships = self.memberships.read().await;
        let rooms = self.rooms.read().await;
        Ok(rooms
            .values()
            .filter(|room| {
                room.kind == RoomKind::Group
                    && room.is_active
                    && !memberships.contains_key(&(room.id, user_id))
            })
            .cloned()
            .collect())
    }

    async fn list_by_kind(&self, kind: RoomKind) -> Result<Vec<Room>, RepositoryError> {
        Ok(self
            .rooms
            .read()
            .await
            .values()
            .filter(|room| room.kind == kind)
            .cloned()
            .collect())
    }
}

pub struct InMemoryMembershipRepository {
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
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|membership| membership.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn set_last_read(
        &self,
        room_id: RoomId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().await;
        let membership = rows
            .get_mut(&(room_id, user_id))
            .ok_or(RepositoryError::NotFound)?;
        membership.record_last_read(message_id);
        Ok(())
    }
}

pub struct InMemoryMessageRepository {
    rows: MessageRows,
    users: UserRows,
    next_id: AtomicI64,
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, draft: MessageDraft) -> Result<Message, RepositoryError> {
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let message = Message {
            id,
            room_id: draft.room_id,
            user_id: draft.user_id,
            content: draft.content,
            created_at: draft.created_at,
        };
        self.rows.write().await.push(message.clone());
        Ok(message)
    }

    async fn list_recent(
        &self,
        room_id: RoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<AuthoredMessage>, RepositoryError> {
        let users = self.users.read().await;
        let rows = self.rows.read().await;
        let mut page: Vec<&Message> = rows
            .iter()
            .filter(|message| {
                message.room_id == room_id && before.map_or(true, |cursor| message.id < cursor)
            })
            .collect();
        page.sort_by_key(|message| message.id);
        let skip = page.len().saturating_sub(limit as usize);
        Ok(page
            .into_iter()
            .skip(skip)
            .map(|message| AuthoredMessage {
                message: message.clone(),
                username: users
                    .get(&message.user_id)
                    .map(|user| user.username.to_string())
                    .unwrap_or_else(|| "unknown".to_owned()),
            })
            .collect())
    }
}

/// 一套共享底层存储的仓储组合，外加时钟与总线。
pub struct TestBackend {
    pub users: Arc<InMemoryUserRepository>,
    pub rooms: Arc<InMemoryRoomRepository>,
    pub memberships: Arc<InMemoryMembershipRepository>,
    pub messages: Arc<InMemoryMessageRepository>,
    pub clock: Arc<SystemClock>,
    pub bus: Arc<EventBus>,
}

impl TestBackend {
    pub fn new() -> Self {
        let user_rows: UserRows = Arc::default();
        let room_rows: RoomRows = Arc::default();
        let membership_rows: MembershipRows = Arc::default();
        let message_rows: MessageRows = Arc::default();

        Self {
            users: Arc::new(InMemoryUserRepository {
                rows: user_rows.clone(),
                next_id: AtomicI64::new(1),
            }),
            rooms: Arc::new(InMemoryRoomRepository {
                rooms: room_rows,
                memberships: membership_rows.clone(),
                next_id: AtomicI64::new(1),
                fail_next_create: AtomicBool::new(false),
            }),
            memberships: Arc::new(InMemoryMembershipRepository {
                rows: membership_rows,
            }),
            messages: Arc::new(InMemoryMessageRepository {
                rows: message_rows,
                users: user_rows,
                next_id: AtomicI64::new(1),
            }),
            clock: Arc::new(SystemClock),
            bus: Arc::new(EventBus::new()),
        }
    }
}

struct EventRecorder {
    log: Arc<Mutex<Vec<ChatEvent>>>,
}

#[async_trait]
impl EventSubscriber for EventRecorder {
    fn name(&self) -> &'static str {
        "event_recorder"
    }

    async fn handle(&self, event: &ChatEvent) -> Result<(), NotifyError> {
        self.log.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub mod fixtures {
    use domain::{UserRole, Username};

    use super::*;
    use crate::clock::Clock;
    use crate::services::{ChatService, CreateRoomRequest};

    pub async fn user(backend: &TestBackend, name: &str, role: UserRole) -> User {
        let draft = UserDraft::new(Username::parse(name).unwrap(), role, backend.clock.now());
        backend.users.create(draft).await.unwrap()
    }

    pub async fn group_room(service: &ChatService, creator_id: UserId, name: &str) -> Room {
        service
            .create_room(CreateRoomRequest {
                name: name.to_owned(),
                description: None,
                creator_id,
            })
            .await
            .unwrap()
    }

    /// 订阅一种事件并收集到日志里，断言事件发射次数用。
    pub async fn record_events(
        backend: &TestBackend,
        kind: ChatEventKind,
    ) -> Arc<Mutex<Vec<ChatEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        backend
            .bus
            .subscribe(kind, Arc::new(EventRecorder { log: log.clone() }))
            .await;
        log
    }

    pub async fn member_ids(backend: &TestBackend, room_id: RoomId) -> Vec<UserId> {
        let mut ids: Vec<UserId> = backend
            .memberships
            .list_members(room_id)
            .await
            .unwrap()
            .into_iter()
            .map(|membership| membership.user_id)
            .collect();
        ids.sort();
        ids
    }
}
