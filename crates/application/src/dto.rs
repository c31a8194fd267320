use domain::{DirectMessage, Identity, RoomMessage, Timestamp};
use serde::{Deserialize, Serialize};

/// 房间消息的对外表示，`room.<roomId>` 主题与历史查询共用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessageDto {
    pub id: i64,
    pub room: i64,
    pub sender: i64,
    pub content: String,
    pub created_at: Timestamp,
}

impl From<&RoomMessage> for RoomMessageDto {
    fn from(message: &RoomMessage) -> Self {
        Self {
            id: message.id.value(),
            room: message.room_id.value(),
            sender: message.sender_id.value(),
            content: message.content.as_str().to_owned(),
            created_at: message.created_at,
        }
    }
}

/// 私信的对外表示，形如房间消息但以 `recipient` 代替 `room`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageDto {
    pub id: i64,
    pub recipient: i64,
    pub sender: i64,
    pub content: String,
    pub created_at: Timestamp,
}

impl From<&DirectMessage> for DirectMessageDto {
    fn from(message: &DirectMessage) -> Self {
        Self {
            id: message.id.value(),
            recipient: message.recipient_id.value(),
            sender: message.sender_id.value(),
            content: message.content.as_str().to_owned(),
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingDto {
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDto {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
}

impl From<&Identity> for IdentityDto {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.value(),
            username: identity.username.clone(),
            display_name: identity.display_name.clone(),
        }
    }
}
