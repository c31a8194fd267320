use std::sync::Arc;

use application::{
    Clock, ConnectionGatekeeper, DirectMessagingDependencies, DirectMessagingService,
    MessageBroadcaster, PubSubBroker, RoomMessagingDependencies, RoomMessagingService,
    SessionRegistry, SystemClock, TypingNotifier,
};
use config::AppConfig;
use infrastructure::{Infrastructure, JwtPrincipalResolver};

#[derive(Clone)]
pub struct AppState {
    pub room_messaging: Arc<RoomMessagingService>,
    pub direct_messaging: Arc<DirectMessagingService>,
    pub typing: TypingNotifier,
    pub gatekeeper: ConnectionGatekeeper,
    pub broker: PubSubBroker,
}

impl AppState {
    /// 用基础设施适配器组装全部用例服务，所有服务共用同一个会话注册表和代理
    pub fn new(infra: Infrastructure, config: &AppConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let broker = PubSubBroker::new(registry.clone(), config.broker.delivery_timeout());
        let broadcaster: Arc<dyn MessageBroadcaster> = Arc::new(broker.clone());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let resolver = Arc::new(JwtPrincipalResolver::new(
            &config.jwt,
            infra.identity_repository.clone(),
        ));
        let gatekeeper =
            ConnectionGatekeeper::new(resolver, registry, config.broker.session_buffer);

        let room_messaging = RoomMessagingService::new(RoomMessagingDependencies {
            room_repository: infra.room_repository.clone(),
            identity_repository: infra.identity_repository.clone(),
            message_store: infra.message_store.clone(),
            broadcaster: broadcaster.clone(),
            clock: clock.clone(),
        });

        let direct_messaging = DirectMessagingService::new(DirectMessagingDependencies {
            identity_repository: infra.identity_repository,
            message_store: infra.message_store,
            broadcaster: broadcaster.clone(),
            notifier: infra.notifier,
            clock,
        });

        Self {
            room_messaging: Arc::new(room_messaging),
            direct_messaging: Arc::new(direct_messaging),
            typing: TypingNotifier::new(broadcaster),
            gatekeeper,
            broker,
        }
    }
}
