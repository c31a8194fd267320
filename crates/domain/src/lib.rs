//! 聊天室实时消息核心领域模型
//!
//! 包含身份、聊天室、房间消息、私信等核心实体，以及消息内容校验规则。
//! 实体之间只通过标识符字段关联，关联实体由服务层通过仓储查询解析。

pub mod errors;
pub mod identity;
pub mod message;
pub mod room;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use identity::Identity;
pub use message::{DirectMessage, NewDirectMessage, NewRoomMessage, RoomMessage, TypingEvent, TypingTarget};
pub use room::Room;
pub use value_objects::*;
