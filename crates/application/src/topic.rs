//! 主题命名与入站目的地路由表
//!
//! 出站主题：`room.<roomId>`、`typing.<roomId>`、`typing.<username>`、`user.<userId>`。
//! 入站目的地：`chat.<roomId>`、`typing.<roomId|username>`、`dm.<userId>`。
//!
//! 用户名能被解析为整数或以 `@` 开头时写作 `typing.@<username>`，与房间主题区分。

use std::fmt;
use std::str::FromStr;

use domain::{DomainError, RoomId, TypingTarget, UserId};
use serde::{Deserialize, Serialize};

const ROOM_PREFIX: &str = "room.";
const TYPING_PREFIX: &str = "typing.";
const USER_PREFIX: &str = "user.";
const USERNAME_MARKER: char = '@';

/// 广播主题
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    Room(RoomId),
    TypingRoom(RoomId),
    TypingUser(String),
    User(UserId),
}

impl Topic {
    pub fn room(room_id: RoomId) -> Self {
        Self::Room(room_id)
    }

    pub fn typing_room(room_id: RoomId) -> Self {
        Self::TypingRoom(room_id)
    }

    pub fn typing_user(username: impl Into<String>) -> Self {
        Self::TypingUser(username.into())
    }

    pub fn user(user_id: UserId) -> Self {
        Self::User(user_id)
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if let Some(segment) = raw.strip_prefix(ROOM_PREFIX) {
            return Ok(Self::Room(segment.parse()?));
        }
        if let Some(segment) = raw.strip_prefix(USER_PREFIX) {
            return Ok(Self::User(segment.parse()?));
        }
        if let Some(segment) = raw.strip_prefix(TYPING_PREFIX) {
            return Ok(match typing_target(segment)? {
                TypingTarget::Room(room_id) => Self::TypingRoom(room_id),
                TypingTarget::User(username) => Self::TypingUser(username),
            });
        }
        Err(DomainError::invalid_argument("topic", "unknown topic"))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Room(room_id) => write!(f, "{ROOM_PREFIX}{room_id}"),
            Topic::TypingRoom(room_id) => write!(f, "{TYPING_PREFIX}{room_id}"),
            Topic::TypingUser(username) if needs_marker(username) => {
                write!(f, "{TYPING_PREFIX}{USERNAME_MARKER}{username}")
            }
            Topic::TypingUser(username) => write!(f, "{TYPING_PREFIX}{username}"),
            Topic::User(user_id) => write!(f, "{USER_PREFIX}{user_id}"),
        }
    }
}

impl FromStr for Topic {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Topic {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        value.to_string()
    }
}

fn needs_marker(username: &str) -> bool {
    username.starts_with(USERNAME_MARKER) || username.parse::<i64>().is_ok()
}

/// `typing.` 之后的片段：`@` 开头一律视为用户名，其余整数视为房间 id
fn typing_target(segment: &str) -> Result<TypingTarget, DomainError> {
    let invalid = || {
        DomainError::invalid_argument("destination", "typing target must be a room id or username")
    };
    if segment.is_empty() || segment.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    if let Some(username) = segment.strip_prefix(USERNAME_MARKER) {
        if username.is_empty() {
            return Err(invalid());
        }
        return Ok(TypingTarget::User(username.to_owned()));
    }
    match segment.parse::<i64>() {
        Ok(id) => Ok(TypingTarget::Room(RoomId(id))),
        Err(_) => Ok(TypingTarget::User(segment.to_owned())),
    }
}

/// 客户端发往服务端的应用目的地
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundDestination {
    Chat(RoomId),
    TypingInRoom(RoomId),
    TypingToUser(String),
    Direct(UserId),
}

type RouteParser = fn(&str) -> Result<InboundDestination, DomainError>;

/// 目的地前缀 -> 解析器，片段在这里被解析为带类型的参数
const INBOUND_ROUTES: &[(&str, RouteParser)] = &[
    ("chat.", parse_chat),
    (TYPING_PREFIX, parse_typing),
    ("dm.", parse_direct),
];

fn parse_chat(segment: &str) -> Result<InboundDestination, DomainError> {
    Ok(InboundDestination::Chat(segment.parse()?))
}

fn parse_typing(segment: &str) -> Result<InboundDestination, DomainError> {
    Ok(match typing_target(segment)? {
        TypingTarget::Room(room_id) => InboundDestination::TypingInRoom(room_id),
        TypingTarget::User(username) => InboundDestination::TypingToUser(username),
    })
}

fn parse_direct(segment: &str) -> Result<InboundDestination, DomainError> {
    Ok(InboundDestination::Direct(segment.parse()?))
}

impl FromStr for InboundDestination {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        INBOUND_ROUTES
            .iter()
            .find_map(|(prefix, parser)| s.strip_prefix(prefix).map(|segment| parser(segment)))
            .unwrap_or_else(|| {
                Err(DomainError::invalid_argument(
                    "destination",
                    format!("unknown destination {s}"),
                ))
            })
    }
}
