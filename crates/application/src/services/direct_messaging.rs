use std::sync::Arc;

use domain::{
    DirectMessage, DomainError, Identity, MessageContent, NewDirectMessage, RepositoryError, UserId,
};
use tracing::{debug, info, warn};

use crate::{
    broadcaster::{EventPayload, MessageBroadcaster},
    clock::Clock,
    dto::DirectMessageDto,
    error::ApplicationError,
    notification::{direct_message_title, NotificationDispatcher},
    repository::{IdentityRepository, MessageStore},
    topic::Topic,
};

pub struct DirectMessagingDependencies {
    pub identity_repository: Arc<dyn IdentityRepository>,
    pub message_store: Arc<dyn MessageStore>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
}

/// 一对一私信：持久化、推给在线会话、再推送到设备
pub struct DirectMessagingService {
    deps: DirectMessagingDependencies,
}

impl DirectMessagingService {
    pub fn new(deps: DirectMessagingDependencies) -> Self {
        Self { deps }
    }

    pub async fn send(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        content: String,
    ) -> Result<DirectMessage, ApplicationError> {
        let content = MessageContent::new(content)?;

        let sender = self.find_identity(sender_id).await?;
        let recipient = self.find_identity(recipient_id).await?;

        let message = self
            .deps
            .message_store
            .create_direct_message(NewDirectMessage {
                sender_id,
                recipient_id,
                content,
                created_at: self.deps.clock.now(),
            })
            .await
            .map_err(user_not_found)?;

        info!(
            message_id = %message.id,
            user_id = %sender_id,
            recipient_id = %recipient_id,
            "私信已保存"
        );

        let payload = EventPayload::Direct(DirectMessageDto::from(&message));
        if let Err(err) = self
            .deps
            .broadcaster
            .publish(Topic::user(recipient_id), payload)
            .await
        {
            warn!(message_id = %message.id, error = %err, "私信实时投递失败");
        }

        // 无论接收方是否在线，只要登记了设备令牌就推送
        self.notify(&sender, &recipient, &message).await;

        Ok(message)
    }

    /// a 与 b 之间的完整会话，与参数顺序无关
    pub async fn get_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<DirectMessage>, ApplicationError> {
        Ok(self.deps.message_store.list_conversation(a, b).await?)
    }

    /// 以调用者身份读取会话，只有会话双方可以读取
    pub async fn get_conversation_for(
        &self,
        caller: UserId,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<DirectMessage>, ApplicationError> {
        if caller != a && caller != b {
            debug!(user_id = %caller, "conversation read by non-participant");
            return Err(ApplicationError::forbidden(
                "not a participant of this conversation",
            ));
        }
        self.get_conversation(a, b).await
    }

    /// 登记或替换设备推送令牌，空白令牌表示清除
    pub async fn register_device_token(
        &self,
        user_id: UserId,
        token: Option<String>,
    ) -> Result<(), ApplicationError> {
        let token = token
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty());
        let cleared = token.is_none();

        self.deps
            .identity_repository
            .update_device_token(user_id, token)
            .await
            .map_err(user_not_found)?;

        info!(user_id = %user_id, cleared, "device token updated");
        Ok(())
    }

    async fn find_identity(&self, id: UserId) -> Result<Identity, ApplicationError> {
        Ok(self
            .deps
            .identity_repository
            .find_by_id(id)
            .await?
            .ok_or(DomainError::UserNotFound)?)
    }

    async fn notify(&self, sender: &Identity, recipient: &Identity, message: &DirectMessage) {
        let Some(token) = recipient.push_token() else {
            debug!(recipient_id = %recipient.id, "recipient has no device token");
            return;
        };

        let title = direct_message_title(&sender.username);
        if let Err(err) = self
            .deps
            .notifier
            .send_to_token(token, &title, message.content.as_str())
            .await
        {
            warn!(
                message_id = %message.id,
                recipient_id = %recipient.id,
                error = %err,
                "推送通知发送失败"
            );
        }
    }
}

/// 私信只引用用户，记录缺失即用户不存在
fn user_not_found(err: RepositoryError) -> ApplicationError {
    match err {
        RepositoryError::NotFound => DomainError::UserNotFound.into(),
        other => other.into(),
    }
}
