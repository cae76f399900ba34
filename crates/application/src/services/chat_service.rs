use std::sync::Arc;

use domain::{
    ChatEvent, DomainError, Membership, Message, MessageContent, MessageDraft, MessageId, Room,
    RoomDraft, RoomId, RoomKind, UserId,
};

use crate::{
    bus::EventBus,
    clock::Clock,
    error::ApplicationError,
    repository::{
        AuthoredMessage, MembershipRepository, MessageRepository, RepositoryError, RoomRepository,
        UserRepository,
    },
};

/// 历史分页单次返回的消息条数上限。
const MAX_HISTORY_PAGE: u32 = 200;
const DEFAULT_HISTORY_PAGE: u32 = 50;

#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    pub name: String,
    pub description: Option<String>,
    pub creator_id: UserId,
}

#[derive(Debug, Clone)]
pub struct StartDirectChatRequest {
    pub initiator_id: UserId, // 发起方（必须是辅导员）
    pub peer_id: UserId,
}

#[derive(Debug, Clone)]
pub struct PostMessageRequest {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub message: String,
}

pub struct ChatServiceDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub membership_repository: Arc<dyn MembershipRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
    pub bus: Arc<EventBus>,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 创建群聊房间。名称查重发生在服务层，房间行与创建者
    /// 成员关系由仓储在同一事务内写入。
    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<Room, ApplicationError> {
        self.require_user(request.creator_id).await?;

        let now = self.deps.clock.now();
        let draft = RoomDraft::new(request.name, request.description, RoomKind::Group, now)?;

        // 名称全局唯一，含私聊房间的内部名称
        if self
            .deps
            .room_repository
            .find_by_name(&draft.name)
            .await?
            .is_some()
        {
            return Err(DomainError::duplicate_room_name(draft.name).into());
        }

        let room = self
            .deps
            .room_repository
            .create_with_creator(draft, request.creator_id)
            .await?;

        self.deps
            .bus
            .emit(ChatEvent::NewRoom {
                room_id: room.id,
                name: room.name.clone(),
                created_at: room.created_at,
            })
            .await;

        tracing::info!(room_id = %room.id, creator_id = %request.creator_id, "群聊房间已创建");
        Ok(room)
    }

    /// 用户已持久加入的房间，含私聊。
    pub async fn joined_rooms(&self, user_id: UserId) -> Result<Vec<Room>, ApplicationError> {
        self.require_user(user_id).await?;
        let rooms = self.deps.room_repository.list_joined(user_id).await?;
        Ok(rooms)
    }

    /// 用户可发现、尚未加入的活跃群聊房间。私聊房间从不出现在这里。
    pub async fn available_rooms(&self, user_id: UserId) -> Result<Vec<Room>, ApplicationError> {
        self.require_user(user_id).await?;
        let rooms = self.deps.room_repository.list_available(user_id).await?;
        Ok(rooms)
    }

    /// 按 ID 查房间，实时层订阅前的存在性校验用。
    pub async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, ApplicationError> {
        let room = self.deps.room_repository.find_by_id(room_id).await?;
        Ok(room)
    }

    /// 持久加入群聊房间。幂等：重复加入直接成功，
    /// 只有真正写入新成员行时才发 user_joined 事件。
    pub async fn join_room(&self, user_id: UserId, room_id: RoomId) -> Result<(), ApplicationError> {
        let room = self
            .deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        // 私聊房间只能经由 start_direct_chat 建立成员关系
        if room.is_direct() {
            return Err(DomainError::DirectRoomNotJoinable.into());
        }

        self.require_user(user_id).await?;

        let now = self.deps.clock.now();
        let inserted = self
            .deps
            .membership_repository
            .insert(Membership::new(room.id, user_id, now))
            .await?;

        if inserted {
            self.deps
                .bus
                .emit(ChatEvent::UserJoined {
                    room_id: room.id,
                    user_id,
                })
                .await;
        }
        Ok(())
    }

    /// 退出房间。用户本来就不在房间里时同样静默成功。
    pub async fn leave_room(&self, user_id: UserId, room_id: RoomId) -> Result<(), ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        self.deps
            .membership_repository
            .remove(room_id, user_id)
            .await?;
        Ok(())
    }

    /// 查找两个用户之间已存在的私聊房间：成员集恰好为这两人。
    ///
    /// 私聊房间成员数不变且总量有限，线性扫描足够。
    pub async fn find_direct_room(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Room>, ApplicationError> {
        if a == b {
            return Ok(None);
        }
        let rooms = self
            .deps
            .room_repository
            .list_by_kind(RoomKind::Direct)
            .await?;
        for room in rooms {
            let members = self.deps.membership_repository.list_members(room.id).await?;
            if members.len() == 2
                && members.iter().any(|m| m.user_id == a)
                && members.iter().any(|m| m.user_id == b)
            {
                return Ok(Some(room));
            }
        }
        Ok(None)
    }

    /// 辅导员发起一对一私聊。同一对用户重复发起返回既有房间；
    /// 新建时房间与双方成员关系一次性落库，落库成功后双方各
    /// 触发一次 user_joined_room 事件。
    pub async fn start_direct_chat(
        &self,
        request: StartDirectChatRequest,
    ) -> Result<Room, ApplicationError> {
        if request.initiator_id == request.peer_id {
            return Err(
                DomainError::invalid_argument("peer_id", "cannot chat with yourself").into(),
            );
        }

        let initiator = self.require_user(request.initiator_id).await?;
        if !initiator.is_counselor() {
            return Err(DomainError::CounselorRequired.into());
        }
        let peer = self.require_user(request.peer_id).await?;

        if let Some(existing) = self.find_direct_room(initiator.id, peer.id).await? {
            return Ok(existing);
        }

        let now = self.deps.clock.now();
        let draft = RoomDraft::new(
            Room::direct_name(initiator.id, peer.id),
            None,
            RoomKind::Direct,
            now,
        )?;
        let room = self
            .deps
            .room_repository
            .create_direct_with_members(draft, initiator.id, peer.id)
            .await?;

        for user_id in [initiator.id, peer.id] {
            self.deps
                .bus
                .emit(ChatEvent::UserJoinedRoom {
                    room_id: room.id,
                    user_id,
                })
                .await;
        }

        tracing::info!(
            room_id = %room.id,
            initiator_id = %initiator.id,
            peer_id = %peer.id,
            "私聊房间已建立"
        );
        Ok(room)
    }

    /// 消息入库。房间必须存在且发送者是成员；广播由调用方在
    /// 本方法成功返回之后进行，保证收到回显的消息一定已落库。
    pub async fn post_message(
        &self,
        request: PostMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let content = MessageContent::new(request.message)?;

        let room = self
            .deps
            .room_repository
            .find_by_id(request.room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        let is_member = self
            .deps
            .membership_repository
            .exists(room.id, request.user_id)
            .await?;
        if !is_member {
            return Err(DomainError::NotRoomMember.into());
        }

        let now = self.deps.clock.now();
        let stored = self
            .deps
            .message_repository
            .insert(MessageDraft::new(room.id, request.user_id, content, now))
            .await?;

        self.deps
            .bus
            .emit(ChatEvent::MessageSent {
                room_id: stored.room_id,
                user_id: stored.user_id,
                message_id: stored.id,
            })
            .await;

        Ok(stored)
    }

    /// 房间历史消息，键集分页，只有成员可读。
    pub async fn room_messages(
        &self,
        room_id: RoomId,
        user_id: UserId,
        limit: Option<u32>,
        before: Option<MessageId>,
    ) -> Result<Vec<AuthoredMessage>, ApplicationError> {
        let room = self
            .deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        let is_member = self
            .deps
            .membership_repository
            .exists(room.id, user_id)
            .await?;
        if !is_member {
            return Err(DomainError::NotRoomMember.into());
        }

        let limit = limit.unwrap_or(DEFAULT_HISTORY_PAGE).clamp(1, MAX_HISTORY_PAGE);
        let messages = self
            .deps
            .message_repository
            .list_recent(room.id, limit, before)
            .await?;
        Ok(messages)
    }

    /// 推进成员的已读游标并发 message_read 事件。
    pub async fn mark_read(
        &self,
        room_id: RoomId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<(), ApplicationError> {
        match self
            .deps
            .membership_repository
            .set_last_read(room_id, user_id, message_id)
            .await
        {
            Ok(()) => {
                self.deps
                    .bus
                    .emit(ChatEvent::MessageRead {
                        room_id,
                        user_id,
                        message_id,
                    })
                    .await;
                Ok(())
            }
            Err(RepositoryError::NotFound) => Err(DomainError::NotRoomMember.into()),
            Err(err) => Err(err.into()),
        }
    }

    async fn require_user(&self, user_id: UserId) -> Result<domain::User, ApplicationError> {
        let user = self
            .deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        Ok(user)
    }
}
