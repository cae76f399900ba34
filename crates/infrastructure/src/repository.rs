use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Membership, Message, MessageContent, MessageDraft, MessageId, Room, RoomDraft, RoomId,
    RoomKind, User, UserDraft, UserId, UserRole, Username,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use application::repository::{
    AuthoredMessage, MembershipRepository, MessageRepository, RepositoryError, RoomRepository,
    UserRepository,
};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db) = err {
        // 唯一约束冲突单独上报，服务层查重存在并发窗口
        if db.is_unique_violation() {
            return RepositoryError::conflict(db.to_string());
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let username =
            Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let role = UserRole::parse(&value.role).map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            id: UserId::from(value.id),
            username,
            role,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: i64,
    name: String,
    description: Option<String>,
    kind: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<RoomRecord> for Room {
    type Error = RepositoryError;

    fn try_from(value: RoomRecord) -> Result<Self, Self::Error> {
        let kind = RoomKind::parse(&value.kind).map_err(|err| invalid_data(err.to_string()))?;

        Ok(Room {
            id: RoomId::from(value.id),
            name: value.name,
            description: value.description,
            kind,
            is_active: value.is_active,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MemberRecord {
    room_id: i64,
    user_id: i64,
    joined_at: DateTime<Utc>,
    last_read_message_id: Option<i64>,
}

impl TryFrom<MemberRecord> for Membership {
    type Error = RepositoryError;

    fn try_from(value: MemberRecord) -> Result<Self, Self::Error> {
        Ok(Membership {
            room_id: RoomId::from(value.room_id),
            user_id: UserId::from(value.user_id),
            joined_at: value.joined_at,
            last_read_message_id: value.last_read_message_id.map(MessageId::from),
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    room_id: i64,
    user_id: i64,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;

        Ok(Message {
            id: MessageId::from(value.id),
            room_id: RoomId::from(value.room_id),
            user_id: UserId::from(value.user_id),
            content,
            created_at: value.created_at,
        })
    }
}

/// 历史查询 JOIN users 之后的行。
#[derive(Debug, FromRow)]
struct AuthoredMessageRecord {
    id: i64,
    room_id: i64,
    user_id: i64,
    content: String,
    created_at: DateTime<Utc>,
    username: String,
}

impl TryFrom<AuthoredMessageRecord> for AuthoredMessage {
    type Error = RepositoryError;

    fn try_from(value: AuthoredMessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;

        Ok(AuthoredMessage {
            message: Message {
                id: MessageId::from(value.id),
                room_id: RoomId::from(value.room_id),
                user_id: UserId::from(value.user_id),
                content,
                created_at: value.created_at,
            },
            username: value.username,
        })
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, draft: UserDraft) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (username, role, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, username, role, created_at
            "#,
        )
        .bind(draft.username.as_str())
        .bind(draft.role.as_str())
        .bind(draft.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username, role, created_at FROM users WHERE id = $1"#,
        )
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username, role, created_at FROM users WHERE username = $1"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }
}

#[derive(Clone)]
pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomRepository for PgRoomRepository {
    async fn create_with_creator(
        &self,
        draft: RoomDraft,
        creator_id: UserId,
    ) -> Result<Room, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO rooms (name, description, kind, is_active, created_at)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING id, name, description, kind, is_active, created_at
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.kind.as_str())
        .bind(draft.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(r#"INSERT INTO room_members (room_id, user_id, joined_at) VALUES ($1, $2, $3)"#)
            .bind(record.id)
            .bind(i64::from(creator_id))
            .bind(draft.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        Room::try_from(record)
    }

    async fn create_direct_with_members(
        &self,
        draft: RoomDraft,
        initiator_id: UserId,
        peer_id: UserId,
    ) -> Result<Room, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO rooms (name, description, kind, is_active, created_at)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING id, name, description, kind, is_active, created_at
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.kind.as_str())
        .bind(draft.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        for user_id in [initiator_id, peer_id] {
            sqlx::query(
                r#"INSERT INTO room_members (room_id, user_id, joined_at) VALUES ($1, $2, $3)"#,
            )
            .bind(record.id)
            .bind(i64::from(user_id))
            .bind(draft.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;

        Room::try_from(record)
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"SELECT id, name, description, kind, is_active, created_at FROM rooms WHERE id = $1"#,
        )
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Room::try_from).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Room>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"SELECT id, name, description, kind, is_active, created_at FROM rooms WHERE name = $1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Room::try_from).transpose()
    }

    async fn list_joined(&self, user_id: UserId) -> Result<Vec<Room>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT r.id, r.name, r.description, r.kind, r.is_active, r.created_at
            FROM rooms r
            JOIN room_members m ON m.room_id = r.id
            WHERE m.user_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(i64::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Room::try_from).collect()
    }

    async fn list_available(&self, user_id: UserId) -> Result<Vec<Room>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT r.id, r.name, r.description, r.kind, r.is_active, r.created_at
            FROM rooms r
            WHERE r.kind = 'group'
              AND r.is_active
              AND NOT EXISTS (
                  SELECT 1 FROM room_members m
                  WHERE m.room_id = r.id AND m.user_id = $1
              )
            ORDER BY r.id
            "#,
        )
        .bind(i64::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Room::try_from).collect()
    }

    async fn list_by_kind(&self, kind: RoomKind) -> Result<Vec<Room>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"SELECT id, name, description, kind, is_active, created_at FROM rooms WHERE kind = $1 ORDER BY id"#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Room::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgMembershipRepository {
    pool: PgPool,
}

impl PgMembershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRepository for PgMembershipRepository {
    async fn insert(&self, membership: Membership) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO room_members (room_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(i64::from(membership.room_id))
        .bind(i64::from(membership.user_id))
        .bind(membership.joined_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, room_id: RoomId, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query(r#"DELETE FROM room_members WHERE room_id = $1 AND user_id = $2"#)
            .bind(i64::from(room_id))
            .bind(i64::from(user_id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn exists(&self, room_id: RoomId, user_id: UserId) -> Result<bool, RepositoryError> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"SELECT 1::BIGINT FROM room_members WHERE room_id = $1 AND user_id = $2"#,
        )
        .bind(i64::from(room_id))
        .bind(i64::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(found.is_some())
    }

    async fn list_members(&self, room_id: RoomId) -> Result<Vec<Membership>, RepositoryError> {
        let records = sqlx::query_as::<_, MemberRecord>(
            r#"SELECT room_id, user_id, joined_at, last_read_message_id FROM room_members WHERE room_id = $1"#,
        )
        .bind(i64::from(room_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Membership::try_from).collect()
    }

    async fn set_last_read(
        &self,
        room_id: RoomId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE room_members SET last_read_message_id = $3 WHERE room_id = $1 AND user_id = $2"#,
        )
        .bind(i64::from(room_id))
        .bind(i64::from(user_id))
        .bind(i64::from(message_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, draft: MessageDraft) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (room_id, user_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, room_id, user_id, content, created_at
            "#,
        )
        .bind(i64::from(draft.room_id))
        .bind(i64::from(draft.user_id))
        .bind(draft.content.as_str())
        .bind(draft.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn list_recent(
        &self,
        room_id: RoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<AuthoredMessage>, RepositoryError> {
        let records = if let Some(before) = before {
            sqlx::query_as::<_, AuthoredMessageRecord>(
                r#"
                SELECT m.id, m.room_id, m.user_id, m.content, m.created_at, u.username
                FROM messages m
                JOIN users u ON u.id = m.user_id
                WHERE m.room_id = $1 AND m.id < $2
                ORDER BY m.id DESC
                LIMIT $3
                "#,
            )
            .bind(i64::from(room_id))
            .bind(i64::from(before))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
        } else {
            sqlx::query_as::<_, AuthoredMessageRecord>(
                r#"
                SELECT m.id, m.room_id, m.user_id, m.content, m.created_at, u.username
                FROM messages m
                JOIN users u ON u.id = m.user_id
                WHERE m.room_id = $1
                ORDER BY m.id DESC
                LIMIT $2
                "#,
            )
            .bind(i64::from(room_id))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
        };

        let mut items: Vec<AuthoredMessage> = records
            .into_iter()
            .map(AuthoredMessage::try_from)
            .collect::<Result<_, _>>()?;
        items.reverse();
        Ok(items)
    }
}

/// 一个连接池上的全套仓储，启动装配用。
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub room_repository: Arc<PgRoomRepository>,
    pub membership_repository: Arc<PgMembershipRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            room_repository: Arc::new(PgRoomRepository::new(pool.clone())),
            membership_repository: Arc::new(PgMembershipRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
