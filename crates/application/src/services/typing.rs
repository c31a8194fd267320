use std::sync::Arc;

use domain::{RoomId, TypingEvent, TypingTarget};
use tracing::{debug, warn};

use crate::{
    broadcaster::{EventPayload, MessageBroadcaster},
    dto::TypingDto,
    topic::Topic,
};

/// 输入提示：只广播，不持久化，不去重
#[derive(Clone)]
pub struct TypingNotifier {
    broadcaster: Arc<dyn MessageBroadcaster>,
}

impl TypingNotifier {
    pub fn new(broadcaster: Arc<dyn MessageBroadcaster>) -> Self {
        Self { broadcaster }
    }

    pub async fn notify_typing(&self, username: &str, room_id: RoomId) {
        self.publish(TypingEvent {
            username: username.to_owned(),
            target: TypingTarget::Room(room_id),
        })
        .await;
    }

    /// 私聊场景下提示对方正在输入，发往 `typing.<username>`
    pub async fn notify_typing_user(&self, username: &str, target_username: &str) {
        self.publish(TypingEvent {
            username: username.to_owned(),
            target: TypingTarget::User(target_username.to_owned()),
        })
        .await;
    }

    async fn publish(&self, event: TypingEvent) {
        let topic = match event.target {
            TypingTarget::Room(room_id) => Topic::typing_room(room_id),
            TypingTarget::User(target) => Topic::typing_user(target),
        };
        let payload = EventPayload::Typing(TypingDto {
            user: event.username,
        });

        match self.broadcaster.publish(topic.clone(), payload).await {
            Ok(report) => debug!(topic = %topic, delivered = report.delivered, "typing"),
            Err(err) => warn!(topic = %topic, error = %err, "输入提示广播失败"),
        }
    }
}
