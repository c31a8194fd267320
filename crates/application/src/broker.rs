// 进程内发布/订阅代理
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, warn};

use crate::broadcaster::{BroadcastError, Delivery, EventPayload, MessageBroadcaster, PublishReport};
use crate::session::{SessionError, SessionRegistry};
use crate::topic::Topic;
use domain::ConnectionId;

/// 按主题把事件扇出到订阅会话的出站队列。
///
/// 每个订阅者独立投递并带超时，慢消费者或已断开的会话只会丢失自己的那一份。
#[derive(Clone)]
pub struct PubSubBroker {
    registry: Arc<SessionRegistry>,
    delivery_timeout: Duration,
}

impl PubSubBroker {
    pub fn new(registry: Arc<SessionRegistry>, delivery_timeout: Duration) -> Self {
        Self {
            registry,
            delivery_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn subscribe(&self, connection_id: ConnectionId, topic: Topic) -> Result<bool, SessionError> {
        self.registry.subscribe(connection_id, topic)
    }

    pub fn unsubscribe(&self, connection_id: ConnectionId, topic: &Topic) -> bool {
        self.registry.unsubscribe(connection_id, topic)
    }

    pub async fn publish_to(&self, topic: Topic, payload: EventPayload) -> PublishReport {
        let subscribers = self.registry.sessions_for(&topic);
        if subscribers.is_empty() {
            debug!(topic = %topic, "no subscribers");
            return PublishReport::default();
        }

        let payload = Arc::new(payload);
        let sends = subscribers.into_iter().map(|connection_id| {
            let delivery = Delivery {
                topic: topic.clone(),
                payload: Arc::clone(&payload),
            };
            self.deliver(connection_id, delivery)
        });

        let mut report = PublishReport::default();
        for delivered in join_all(sends).await {
            if delivered {
                report.delivered += 1;
            } else {
                report.dropped += 1;
            }
        }

        if report.dropped > 0 {
            warn!(
                topic = %topic,
                delivered = report.delivered,
                dropped = report.dropped,
                "部分订阅者投递失败"
            );
        } else {
            debug!(topic = %topic, delivered = report.delivered, "event published");
        }
        report
    }

    async fn deliver(&self, connection_id: ConnectionId, delivery: Delivery) -> bool {
        // 快照之后注销的会话直接跳过
        let Some(session) = self.registry.session(connection_id) else {
            return false;
        };

        match session
            .outbound()
            .send_timeout(delivery, self.delivery_timeout)
            .await
        {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                debug!(connection_id = %connection_id, "outbound queue full, event dropped");
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!(connection_id = %connection_id, "outbound queue closed, event dropped");
                false
            }
        }
    }
}

#[async_trait]
impl MessageBroadcaster for PubSubBroker {
    async fn publish(
        &self,
        topic: Topic,
        payload: EventPayload,
    ) -> Result<PublishReport, BroadcastError> {
        Ok(self.publish_to(topic, payload).await)
    }
}
