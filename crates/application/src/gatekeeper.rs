//! 连接守门人
//!
//! 在升级为实时连接之前完成认证：凭证被拒绝时不创建任何会话。

use std::sync::Arc;

use domain::{ConnectionId, Identity};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::broadcaster::Delivery;
use crate::error::ApplicationError;
use crate::principal::PrincipalResolver;
use crate::session::{Session, SessionGuard, SessionRegistry};
use crate::topic::Topic;

/// 从 `Authorization` 头中取出 bearer 凭证
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 握手成功后交给连接任务的会话
pub struct AdmittedSession {
    pub guard: SessionGuard,
    pub outbound: mpsc::Receiver<Delivery>,
}

impl AdmittedSession {
    pub fn connection_id(&self) -> ConnectionId {
        self.guard.connection_id()
    }

    pub fn identity(&self) -> &Identity {
        self.guard.identity()
    }
}

#[derive(Clone)]
pub struct ConnectionGatekeeper {
    resolver: Arc<dyn PrincipalResolver>,
    registry: Arc<SessionRegistry>,
    session_buffer: usize,
}

impl ConnectionGatekeeper {
    pub fn new(
        resolver: Arc<dyn PrincipalResolver>,
        registry: Arc<SessionRegistry>,
        session_buffer: usize,
    ) -> Self {
        Self {
            resolver,
            registry,
            session_buffer: session_buffer.max(1),
        }
    }

    /// 只认证不建会话，REST 请求同样走这里
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Identity, ApplicationError> {
        let Some(credential) = credential.map(str::trim).filter(|c| !c.is_empty()) else {
            debug!("missing credential");
            return Err(ApplicationError::Unauthenticated);
        };
        self.resolver.resolve(credential).await
    }

    /// 认证并注册会话，同时订阅本人的私信与输入提示主题
    pub async fn admit(&self, credential: Option<&str>) -> Result<AdmittedSession, ApplicationError> {
        let identity = self.authenticate(credential).await?;

        let (tx, rx) = mpsc::channel(self.session_buffer);
        let own_topics = [
            Topic::user(identity.id),
            Topic::typing_user(identity.username.clone()),
        ];
        let session = self
            .registry
            .register(Session::new(ConnectionId::generate(), identity, tx));
        let guard = SessionGuard::new(Arc::clone(&self.registry), session);

        for topic in own_topics {
            guard.subscribe(topic)?;
        }

        info!(
            connection_id = %guard.connection_id(),
            username = %guard.identity().username,
            "连接已通过认证"
        );
        Ok(AdmittedSession {
            guard,
            outbound: rx,
        })
    }
}
