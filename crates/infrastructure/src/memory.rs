//! 内存存储实现
//!
//! 实现全部仓储接口，用于开发模式（`database.in_memory = true`）和测试。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use application::{IdentityRepository, MessageStore, RoomRepository};
use async_trait::async_trait;
use domain::{
    DirectMessage, Identity, MessageId, NewDirectMessage, NewRoomMessage, RepositoryError, Room,
    RoomId, RoomMessage, UserId,
};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    identities: RwLock<HashMap<UserId, Identity>>,
    rooms: RwLock<HashMap<RoomId, Room>>,
    room_messages: RwLock<Vec<RoomMessage>>,
    direct_messages: RwLock<Vec<DirectMessage>>,
    next_user_id: AtomicI64,
    next_room_id: AtomicI64,
    next_message_id: AtomicI64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新建用户并分配 id
    pub async fn insert_identity(&self, username: &str) -> Identity {
        let id = UserId(self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1);
        let identity = Identity::new(id, username);
        self.identities.write().await.insert(id, identity.clone());
        identity
    }

    /// 新建聊天室并分配 id，名称重复时返回已有的房间
    pub async fn insert_room(&self, name: &str) -> Room {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.values().find(|room| room.name == name) {
            return room.clone();
        }
        let id = RoomId(self.next_room_id.fetch_add(1, Ordering::SeqCst) + 1);
        let room = Room::new(id, name);
        rooms.insert(id, room.clone());
        room
    }

    fn next_message_id(&self) -> MessageId {
        MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn ensure_identity(&self, id: UserId) -> Result<(), RepositoryError> {
        if self.identities.read().await.contains_key(&id) {
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }
}

#[async_trait]
impl IdentityRepository for InMemoryStorage {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Identity>, RepositoryError> {
        Ok(self.identities.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, RepositoryError> {
        Ok(self
            .identities
            .read()
            .await
            .values()
            .find(|identity| identity.username == username)
            .cloned())
    }

    async fn update_device_token(
        &self,
        id: UserId,
        token: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut identities = self.identities.write().await;
        let identity = identities.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        identity.device_token = token;
        Ok(())
    }
}

#[async_trait]
impl RoomRepository for InMemoryStorage {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        Ok(self.rooms.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl MessageStore for InMemoryStorage {
    async fn create_room_message(
        &self,
        message: NewRoomMessage,
    ) -> Result<RoomMessage, RepositoryError> {
        // 与外键约束保持一致
        if !self.rooms.read().await.contains_key(&message.room_id) {
            return Err(RepositoryError::NotFound);
        }
        self.ensure_identity(message.sender_id).await?;

        let mut messages = self.room_messages.write().await;
        let stored = RoomMessage::from_new(self.next_message_id(), message);
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_room_messages(
        &self,
        room_id: RoomId,
    ) -> Result<Vec<RoomMessage>, RepositoryError> {
        let mut messages: Vec<_> = self
            .room_messages
            .read()
            .await
            .iter()
            .filter(|message| message.room_id == room_id)
            .cloned()
            .collect();
        messages.sort_by_key(|message| (message.created_at, message.id));
        Ok(messages)
    }

    async fn create_direct_message(
        &self,
        message: NewDirectMessage,
    ) -> Result<DirectMessage, RepositoryError> {
        self.ensure_identity(message.sender_id).await?;
        self.ensure_identity(message.recipient_id).await?;

        let mut messages = self.direct_messages.write().await;
        let stored = DirectMessage::from_new(self.next_message_id(), message);
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<DirectMessage>, RepositoryError> {
        let mut messages: Vec<_> = self
            .direct_messages
            .read()
            .await
            .iter()
            .filter(|message| message.is_between(a, b))
            .cloned()
            .collect();
        messages.sort_by_key(|message| (message.created_at, message.id));
        Ok(messages)
    }
}
