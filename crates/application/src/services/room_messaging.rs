use std::sync::Arc;

use domain::{
    DomainError, MessageContent, NewRoomMessage, RepositoryError, RoomId, RoomMessage, UserId,
};
use tracing::{info, warn};

use crate::{
    broadcaster::{EventPayload, MessageBroadcaster},
    clock::Clock,
    dto::RoomMessageDto,
    error::ApplicationError,
    repository::{IdentityRepository, MessageStore, RoomRepository},
    topic::Topic,
};

pub struct RoomMessagingDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub identity_repository: Arc<dyn IdentityRepository>,
    pub message_store: Arc<dyn MessageStore>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub clock: Arc<dyn Clock>,
}

/// 房间消息：先持久化，再广播到 `room.<roomId>`
pub struct RoomMessagingService {
    deps: RoomMessagingDependencies,
}

impl RoomMessagingService {
    pub fn new(deps: RoomMessagingDependencies) -> Self {
        Self { deps }
    }

    pub async fn send_to_room(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        content: String,
    ) -> Result<RoomMessage, ApplicationError> {
        let content = MessageContent::new(content)?;

        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;
        self.deps
            .identity_repository
            .find_by_id(sender_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        let created = self
            .deps
            .message_store
            .create_room_message(NewRoomMessage {
                room_id,
                sender_id,
                content,
                created_at: self.deps.clock.now(),
            })
            .await;
        let message = match created {
            Ok(message) => message,
            // 外键冲突：房间或发送者在校验之后被删除
            Err(RepositoryError::NotFound) => return Err(self.missing_reference(room_id).await),
            Err(err) => return Err(err.into()),
        };

        info!(
            message_id = %message.id,
            room_id = %room_id,
            user_id = %sender_id,
            "房间消息已保存"
        );

        // 消息已落库，广播失败只记录日志，历史查询仍然可见
        let payload = EventPayload::Room(RoomMessageDto::from(&message));
        if let Err(err) = self
            .deps
            .broadcaster
            .publish(Topic::room(room_id), payload)
            .await
        {
            warn!(
                message_id = %message.id,
                room_id = %room_id,
                error = %err,
                "房间消息广播失败"
            );
        }

        Ok(message)
    }

    /// 房间全部历史消息，按时间升序
    pub async fn get_messages_for_room(
        &self,
        room_id: RoomId,
    ) -> Result<Vec<RoomMessage>, ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        Ok(self.deps.message_store.list_room_messages(room_id).await?)
    }

    async fn missing_reference(&self, room_id: RoomId) -> ApplicationError {
        match self.deps.room_repository.find_by_id(room_id).await {
            Ok(Some(_)) => DomainError::UserNotFound.into(),
            Ok(None) => DomainError::RoomNotFound.into(),
            Err(err) => err.into(),
        }
    }
}
