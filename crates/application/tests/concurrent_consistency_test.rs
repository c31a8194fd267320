//! 并发一致性测试
//!
//! 验证高并发接入、订阅、发布、断开时会话注册表与主题索引保持一致

use std::sync::Arc;
use std::time::Duration;

use application::{
    ApplicationError, ConnectionGatekeeper, EventPayload, PrincipalResolver, PubSubBroker,
    SessionRegistry, Topic, TypingDto,
};
use async_trait::async_trait;
use domain::{Identity, RoomId, UserId};

/// 凭证 `user-<n>` 解析为 id 为 n 的用户
struct NumberedResolver;

#[async_trait]
impl PrincipalResolver for NumberedResolver {
    async fn resolve(&self, credential: &str) -> Result<Identity, ApplicationError> {
        let id = credential
            .strip_prefix("user-")
            .and_then(|n| n.parse::<i64>().ok())
            .ok_or(ApplicationError::Unauthenticated)?;
        Ok(Identity::new(UserId(id), format!("user{id}")))
    }
}

fn setup(buffer: usize) -> (ConnectionGatekeeper, PubSubBroker) {
    let registry = Arc::new(SessionRegistry::new());
    let broker = PubSubBroker::new(registry.clone(), Duration::from_millis(50));
    let gatekeeper = ConnectionGatekeeper::new(Arc::new(NumberedResolver), registry, buffer);
    (gatekeeper, broker)
}

fn typing(user: &str) -> EventPayload {
    EventPayload::Typing(TypingDto {
        user: user.to_string(),
    })
}

/// 并发接入并订阅同一房间，随后全部断开，注册表应回到空状态
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_admit_and_disconnect_consistency() {
    let (gatekeeper, broker) = setup(16);
    let room = Topic::room(RoomId(1));

    let tasks: Vec<_> = (1..=32)
        .map(|n| {
            let gatekeeper = gatekeeper.clone();
            let room = room.clone();
            tokio::spawn(async move {
                let admitted = gatekeeper
                    .admit(Some(&format!("user-{n}")))
                    .await
                    .expect("admit");
                admitted.guard.subscribe(room).expect("subscribe");
                admitted
            })
        })
        .collect();

    let mut sessions = Vec::new();
    for task in tasks {
        sessions.push(task.await.expect("join"));
    }

    assert_eq!(broker.registry().len(), 32);
    assert_eq!(broker.registry().sessions_for(&room).len(), 32);

    // 一半连接在发布过程中断开
    let leaving: Vec<_> = sessions.drain(..16).collect();
    let publisher = {
        let broker = broker.clone();
        let room = room.clone();
        tokio::spawn(async move { broker.publish_to(room, typing("someone")).await })
    };
    let dropper = tokio::spawn(async move { drop(leaving) });

    let report = publisher.await.expect("join");
    dropper.await.expect("join");

    assert!(report.delivered >= 16, "remaining sessions always receive: {report:?}");
    assert_eq!(broker.registry().len(), 16);
    assert_eq!(broker.registry().sessions_for(&room).len(), 16);

    for admitted in &mut sessions {
        let delivery = admitted.outbound.recv().await.expect("delivery");
        assert_eq!(delivery.topic, room);
    }

    drop(sessions);
    assert!(broker.registry().is_empty());
    assert!(broker.registry().sessions_for(&room).is_empty());
    assert!(broker
        .registry()
        .sessions_for(&Topic::user(UserId(1)))
        .is_empty());
}

/// 并发发布时每个订阅者按发布顺序收到同一发布者的事件
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_publisher_order_is_preserved_per_subscriber() {
    let (gatekeeper, broker) = setup(64);
    let room = Topic::room(RoomId(7));

    let mut subscribers = Vec::new();
    for n in 1..=4 {
        let admitted = gatekeeper
            .admit(Some(&format!("user-{n}")))
            .await
            .expect("admit");
        admitted.guard.subscribe(room.clone()).expect("subscribe");
        subscribers.push(admitted);
    }

    let publishers: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|name| {
            let broker = broker.clone();
            let room = room.clone();
            tokio::spawn(async move {
                for i in 0..10 {
                    broker.publish_to(room.clone(), typing(&format!("{name}{i}"))).await;
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.await.expect("join");
    }

    for admitted in &mut subscribers {
        let mut seen = Vec::new();
        while let Ok(delivery) = admitted.outbound.try_recv() {
            if let EventPayload::Typing(dto) = delivery.payload.as_ref() {
                seen.push(dto.user.clone());
            }
        }
        assert_eq!(seen.len(), 20);
        for name in ["a", "b"] {
            let order: Vec<_> = seen.iter().filter(|user| user.starts_with(name)).cloned().collect();
            let expected: Vec<_> = (0..10).map(|i| format!("{name}{i}")).collect();
            assert_eq!(order, expected);
        }
    }
}

/// 私有主题只允许本人订阅
#[tokio::test]
async fn test_private_topics_stay_private() {
    let (gatekeeper, broker) = setup(8);
    let alice = gatekeeper.admit(Some("user-1")).await.expect("admit");

    assert!(alice.guard.session().is_subscribed(&Topic::user(UserId(1))));
    assert!(alice.guard.subscribe(Topic::user(UserId(2))).is_err());
    assert!(alice.guard.subscribe(Topic::typing_user("user2")).is_err());

    let report = broker
        .publish_to(Topic::user(UserId(2)), typing("user1"))
        .await;
    assert_eq!(report.delivered, 0);

    assert!(matches!(
        gatekeeper.admit(Some("nobody")).await,
        Err(ApplicationError::Unauthenticated)
    ));
    assert_eq!(broker.registry().len(), 1);
}
