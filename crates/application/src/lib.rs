//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务（房间消息、私信、输入提示），
//! 以及会话注册表、发布/订阅代理、连接守门人，
//! 并抽象出对外部适配器（仓储、身份解析、推送网关、时钟）的依赖。

pub mod broadcaster;
pub mod broker;
pub mod clock;
pub mod dto;
pub mod error;
pub mod gatekeeper;
pub mod notification;
pub mod principal;
pub mod repository;
pub mod services;
pub mod session;
pub mod topic;

pub use broadcaster::{BroadcastError, Delivery, EventPayload, MessageBroadcaster, PublishReport};
pub use broker::PubSubBroker;
pub use clock::{Clock, SystemClock};
pub use dto::{DirectMessageDto, IdentityDto, RoomMessageDto, TypingDto};
pub use error::ApplicationError;
pub use gatekeeper::{bearer_token, AdmittedSession, ConnectionGatekeeper};
pub use notification::{direct_message_title, NotificationDispatcher, NotificationError};
pub use principal::PrincipalResolver;
pub use repository::{IdentityRepository, MessageStore, RoomRepository};
pub use services::{
    DirectMessagingDependencies, DirectMessagingService, RoomMessagingDependencies,
    RoomMessagingService, TypingNotifier,
};
pub use session::{Session, SessionError, SessionGuard, SessionRegistry};
pub use topic::{InboundDestination, Topic};
