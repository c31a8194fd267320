use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("push gateway rejected notification: {0}")]
    Rejected(String),
    #[error("push transport failed: {0}")]
    Transport(String),
}

/// 推送通知分发器。
///
/// 纯副作用调用，失败对调用方不致命，不属于消息投递保证的一部分。
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_to_token(
        &self,
        token: &str,
        title: &str,
        body: &str,
    ) -> Result<(), NotificationError>;
}

/// 私信推送标题
pub fn direct_message_title(sender_username: &str) -> String {
    format!("New message from {sender_username}")
}
