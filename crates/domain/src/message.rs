use serde::{Deserialize, Serialize};

use crate::value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId};

/// 待持久化的房间消息，id 由存储分配
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoomMessage {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

/// 已持久化的房间消息，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

impl RoomMessage {
    pub fn from_new(id: MessageId, message: NewRoomMessage) -> Self {
        Self {
            id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            content: message.content,
            created_at: message.created_at,
        }
    }
}

/// 待持久化的私信
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDirectMessage {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

/// 已持久化的私信，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

impl DirectMessage {
    pub fn from_new(id: MessageId, message: NewDirectMessage) -> Self {
        Self {
            id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            content: message.content,
            created_at: message.created_at,
        }
    }

    /// 该私信是否属于 a 与 b 之间的会话（不区分方向）
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.recipient_id == b)
            || (self.sender_id == b && self.recipient_id == a)
    }
}

/// 输入提示的目标：房间或某个用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypingTarget {
    Room(RoomId),
    User(String),
}

/// 输入提示事件，从不持久化，只作为代理负载存在
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub username: String,
    pub target: TypingTarget,
}
