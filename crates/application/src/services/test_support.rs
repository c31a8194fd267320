//! 服务层单元测试用的内存替身

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::TimeZone;
use domain::{
    DirectMessage, Identity, MessageId, NewDirectMessage, NewRoomMessage, RepositoryError, Room,
    RoomId, RoomMessage, Timestamp, UserId,
};

use crate::broadcaster::{BroadcastError, EventPayload, MessageBroadcaster, PublishReport};
use crate::clock::Clock;
use crate::notification::{NotificationDispatcher, NotificationError};
use crate::repository::{IdentityRepository, MessageStore, RoomRepository};
use crate::topic::Topic;

#[derive(Default)]
pub struct FakeStore {
    identities: Mutex<Vec<Identity>>,
    rooms: Mutex<Vec<Room>>,
    room_messages: Mutex<Vec<RoomMessage>>,
    direct_messages: Mutex<Vec<DirectMessage>>,
    next_id: AtomicI64,
    vanishing_rooms: AtomicBool,
    vanishing_identities: AtomicBool,
}

impl FakeStore {
    pub fn with_identity(self, identity: Identity) -> Self {
        self.identities.lock().unwrap().push(identity);
        self
    }

    pub fn with_room(self, room: Room) -> Self {
        self.rooms.lock().unwrap().push(room);
        self
    }

    /// 写入时房间已被并发删除：清空房间并按外键冲突返回 NotFound
    pub fn vanishing_rooms(self) -> Self {
        self.vanishing_rooms.store(true, Ordering::SeqCst);
        self
    }

    /// 写入时用户已被并发删除
    pub fn vanishing_identities(self) -> Self {
        self.vanishing_identities.store(true, Ordering::SeqCst);
        self
    }

    fn reject_insert(&self) -> Result<(), RepositoryError> {
        let mut rejected = false;
        if self.vanishing_rooms.load(Ordering::SeqCst) {
            self.rooms.lock().unwrap().clear();
            rejected = true;
        }
        if self.vanishing_identities.load(Ordering::SeqCst) {
            self.identities.lock().unwrap().clear();
            rejected = true;
        }
        if rejected {
            Err(RepositoryError::NotFound)
        } else {
            Ok(())
        }
    }

    pub fn room_message_count(&self) -> usize {
        self.room_messages.lock().unwrap().len()
    }

    pub fn direct_message_count(&self) -> usize {
        self.direct_messages.lock().unwrap().len()
    }

    fn next_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl IdentityRepository for FakeStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Identity>, RepositoryError> {
        Ok(self
            .identities
            .lock()
            .unwrap()
            .iter()
            .find(|identity| identity.id == id)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, RepositoryError> {
        Ok(self
            .identities
            .lock()
            .unwrap()
            .iter()
            .find(|identity| identity.username == username)
            .cloned())
    }

    async fn update_device_token(
        &self,
        id: UserId,
        token: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut identities = self.identities.lock().unwrap();
        let identity = identities
            .iter_mut()
            .find(|identity| identity.id == id)
            .ok_or(RepositoryError::NotFound)?;
        identity.device_token = token;
        Ok(())
    }
}

#[async_trait]
impl RoomRepository for FakeStore {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        Ok(self
            .rooms
            .lock()
            .unwrap()
            .iter()
            .find(|room| room.id == id)
            .cloned())
    }
}

#[async_trait]
impl MessageStore for FakeStore {
    async fn create_room_message(
        &self,
        message: NewRoomMessage,
    ) -> Result<RoomMessage, RepositoryError> {
        self.reject_insert()?;
        let stored = RoomMessage::from_new(self.next_id(), message);
        self.room_messages.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn list_room_messages(
        &self,
        room_id: RoomId,
    ) -> Result<Vec<RoomMessage>, RepositoryError> {
        let mut messages: Vec<_> = self
            .room_messages
            .lock()
            .unwrap()
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
        self.reject_insert()?;
        let stored = DirectMessage::from_new(self.next_id(), message);
        self.direct_messages.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<DirectMessage>, RepositoryError> {
        let mut messages: Vec<_> = self
            .direct_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|message| message.is_between(a, b))
            .cloned()
            .collect();
        messages.sort_by_key(|message| (message.created_at, message.id));
        Ok(messages)
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    pub published: Mutex<Vec<(Topic, EventPayload)>>,
    pub fail: AtomicBool,
}

impl RecordingBroadcaster {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<(Topic, EventPayload)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageBroadcaster for RecordingBroadcaster {
    async fn publish(
        &self,
        topic: Topic,
        payload: EventPayload,
    ) -> Result<PublishReport, BroadcastError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BroadcastError::failed("broker unavailable"));
        }
        self.published.lock().unwrap().push((topic, payload));
        Ok(PublishReport {
            delivered: 1,
            dropped: 0,
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<(String, String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn send_to_token(
        &self,
        token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        self.calls
            .lock()
            .unwrap()
            .push((token.to_owned(), title.to_owned(), body.to_owned()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("gateway down".into()));
        }
        Ok(())
    }
}

/// 固定时间的时钟，用于验证同一时间戳下按插入顺序排序
pub struct FixedClock(pub Timestamp);

impl Default for FixedClock {
    fn default() -> Self {
        Self(chrono::Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
