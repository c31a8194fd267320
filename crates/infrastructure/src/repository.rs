use std::sync::Arc;

use application::{IdentityRepository, MessageStore, RoomRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    DirectMessage, Identity, MessageContent, MessageId, NewDirectMessage, NewRoomMessage,
    RepositoryError, Room, RoomId, RoomMessage, UserId,
};
use sqlx::{error::ErrorKind, postgres::PgPoolOptions, FromRow, PgPool};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    // 外键失败说明引用的房间或用户在写入前被删除
    match err.as_database_error().map(|db| db.kind()) {
        Some(ErrorKind::ForeignKeyViolation) => RepositoryError::NotFound,
        Some(ErrorKind::UniqueViolation) => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    display_name: Option<String>,
    device_token: Option<String>,
}

impl From<UserRecord> for Identity {
    fn from(value: UserRecord) -> Self {
        Identity {
            id: UserId(value.id),
            username: value.username,
            display_name: value.display_name,
            device_token: value.device_token,
        }
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: i64,
    name: String,
}

impl From<RoomRecord> for Room {
    fn from(value: RoomRecord) -> Self {
        Room::new(RoomId(value.id), value.name)
    }
}

#[derive(Debug, FromRow)]
struct RoomMessageRecord {
    id: i64,
    room_id: i64,
    sender_id: i64,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RoomMessageRecord> for RoomMessage {
    type Error = RepositoryError;

    fn try_from(value: RoomMessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        Ok(RoomMessage {
            id: MessageId(value.id),
            room_id: RoomId(value.room_id),
            sender_id: UserId(value.sender_id),
            content,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DirectMessageRecord {
    id: i64,
    sender_id: i64,
    recipient_id: i64,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DirectMessageRecord> for DirectMessage {
    type Error = RepositoryError;

    fn try_from(value: DirectMessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        Ok(DirectMessage {
            id: MessageId(value.id),
            sender_id: UserId(value.sender_id),
            recipient_id: UserId(value.recipient_id),
            content,
            created_at: value.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Identity>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username, display_name, device_token FROM users WHERE id = $1"#,
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Identity::from))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username, display_name, device_token FROM users WHERE username = $1"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Identity::from))
    }

    async fn update_device_token(
        &self,
        id: UserId,
        token: Option<String>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(r#"UPDATE users SET device_token = $2 WHERE id = $1"#)
            .bind(id.value())
            .bind(token)
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
    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(r#"SELECT id, name FROM rooms WHERE id = $1"#)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(record.map(Room::from))
    }
}

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create_room_message(
        &self,
        message: NewRoomMessage,
    ) -> Result<RoomMessage, RepositoryError> {
        let record = sqlx::query_as::<_, RoomMessageRecord>(
            r#"
            INSERT INTO room_messages (room_id, sender_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, room_id, sender_id, content, created_at
            "#,
        )
        .bind(message.room_id.value())
        .bind(message.sender_id.value())
        .bind(message.content.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        RoomMessage::try_from(record)
    }

    async fn list_room_messages(
        &self,
        room_id: RoomId,
    ) -> Result<Vec<RoomMessage>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomMessageRecord>(
            r#"
            SELECT id, room_id, sender_id, content, created_at
            FROM room_messages
            WHERE room_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(room_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(RoomMessage::try_from).collect()
    }

    async fn create_direct_message(
        &self,
        message: NewDirectMessage,
    ) -> Result<DirectMessage, RepositoryError> {
        let record = sqlx::query_as::<_, DirectMessageRecord>(
            r#"
            INSERT INTO direct_messages (sender_id, recipient_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sender_id, recipient_id, content, created_at
            "#,
        )
        .bind(message.sender_id.value())
        .bind(message.recipient_id.value())
        .bind(message.content.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        DirectMessage::try_from(record)
    }

    async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<DirectMessage>, RepositoryError> {
        let records = sqlx::query_as::<_, DirectMessageRecord>(
            r#"
            SELECT id, sender_id, recipient_id, content, created_at
            FROM direct_messages
            WHERE (sender_id = $1 AND recipient_id = $2)
               OR (sender_id = $2 AND recipient_id = $1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(a.value())
        .bind(b.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(DirectMessage::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub identity_repository: Arc<PgIdentityRepository>,
    pub room_repository: Arc<PgRoomRepository>,
    pub message_store: Arc<PgMessageStore>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            identity_repository: Arc::new(PgIdentityRepository::new(pool.clone())),
            room_repository: Arc::new(PgRoomRepository::new(pool.clone())),
            message_store: Arc::new(PgMessageStore::new(pool.clone())),
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
