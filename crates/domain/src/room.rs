use serde::{Deserialize, Serialize};

use crate::value_objects::RoomId;

/// 聊天室。创建与维护由外部负责，消息只通过 id 引用它。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
}

impl Room {
    pub fn new(id: RoomId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
