use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::dto::{DirectMessageDto, RoomMessageDto, TypingDto};
use crate::topic::Topic;

/// 代理负载，序列化后即客户端收到的 `payload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Room(RoomMessageDto),
    Direct(DirectMessageDto),
    Typing(TypingDto),
}

/// 投递到单个会话出站队列的事件
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: Topic,
    pub payload: Arc<EventPayload>,
}

/// 一次发布的投递结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 发布端口。尽力而为、至多一次：无确认、无重投、无持久化。
#[async_trait]
pub trait MessageBroadcaster: Send + Sync {
    async fn publish(
        &self,
        topic: Topic,
        payload: EventPayload,
    ) -> Result<PublishReport, BroadcastError>;
}
