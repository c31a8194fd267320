//! 会话注册表
//!
//! 独占持有所有在线会话，并维护主题 -> 连接 id 的索引。两张表都是分片的
//! `DashMap`，不同主题的订阅与查询不会争用同一把锁。代理只通过连接 id
//! 引用会话，查找失败即跳过，从不持有会话的生命周期。

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use domain::{ConnectionId, Identity};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::broadcaster::Delivery;
use crate::topic::Topic;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
    #[error("topic {0} is not permitted for this session")]
    TopicNotPermitted(Topic),
}

/// 一个已认证连接的在线状态
#[derive(Debug)]
pub struct Session {
    connection_id: ConnectionId,
    identity: Identity,
    topics: DashSet<Topic>,
    outbound: mpsc::Sender<Delivery>,
}

impl Session {
    pub fn new(
        connection_id: ConnectionId,
        identity: Identity,
        outbound: mpsc::Sender<Delivery>,
    ) -> Self {
        Self {
            connection_id,
            identity,
            topics: DashSet::new(),
            outbound,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn subscribed_topics(&self) -> Vec<Topic> {
        self.topics.iter().map(|topic| topic.key().clone()).collect()
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.topics.contains(topic)
    }

    pub(crate) fn outbound(&self) -> &mpsc::Sender<Delivery> {
        &self.outbound
    }

    /// 私有主题（`user.<id>`、`typing.<username>`）只允许本人订阅
    pub fn may_subscribe(&self, topic: &Topic) -> bool {
        match topic {
            Topic::Room(_) | Topic::TypingRoom(_) => true,
            Topic::User(user_id) => *user_id == self.identity.id,
            Topic::TypingUser(username) => *username == self.identity.username,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, Arc<Session>>,
    topics: DashMap<Topic, HashSet<ConnectionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions
            .insert(session.connection_id(), Arc::clone(&session));

        info!(
            connection_id = %session.connection_id(),
            user_id = %session.identity().id,
            "session registered"
        );
        session
    }

    /// 注销会话并移除其全部订阅。重复调用是安全的，返回是否真的移除了会话。
    pub fn unregister(&self, connection_id: ConnectionId) -> bool {
        // 先从会话表移除：此后的发布查不到它，已在途的发布只会拿到已关闭的队列
        let Some((_, session)) = self.sessions.remove(&connection_id) else {
            return false;
        };

        for topic in session.subscribed_topics() {
            self.remove_member(&topic, connection_id);
        }
        session.topics.clear();

        info!(
            connection_id = %connection_id,
            user_id = %session.identity().id,
            "session unregistered"
        );
        true
    }

    /// 订阅主题。返回 `false` 表示此前已订阅。
    pub fn subscribe(&self, connection_id: ConnectionId, topic: Topic) -> Result<bool, SessionError> {
        let session = self
            .session(connection_id)
            .ok_or(SessionError::UnknownConnection(connection_id))?;

        if !session.may_subscribe(&topic) {
            return Err(SessionError::TopicNotPermitted(topic));
        }

        let added = self
            .topics
            .entry(topic.clone())
            .or_default()
            .insert(connection_id);
        session.topics.insert(topic.clone());

        // 与并发的注销竞争：会话已不在表中时回滚，保证订阅不会比会话活得更久
        if !self.sessions.contains_key(&connection_id) {
            self.remove_member(&topic, connection_id);
            session.topics.remove(&topic);
            return Err(SessionError::UnknownConnection(connection_id));
        }

        debug!(connection_id = %connection_id, topic = %topic, added, "subscribed");
        Ok(added)
    }

    pub fn unsubscribe(&self, connection_id: ConnectionId, topic: &Topic) -> bool {
        let removed = self.remove_member(topic, connection_id);
        if let Some(session) = self.session(connection_id) {
            session.topics.remove(topic);
        }
        debug!(connection_id = %connection_id, topic = %topic, removed, "unsubscribed");
        removed
    }

    /// 发布时刻订阅了该主题的连接快照
    pub fn sessions_for(&self, topic: &Topic) -> HashSet<ConnectionId> {
        self.topics
            .get(topic)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    pub fn session(&self, connection_id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions
            .get(&connection_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn remove_member(&self, topic: &Topic, connection_id: ConnectionId) -> bool {
        let removed = match self.topics.get_mut(topic) {
            Some(mut members) => members.remove(&connection_id),
            None => return false,
        };
        self.topics.remove_if(topic, |_, members| members.is_empty());
        removed
    }
}

/// 会话守卫：被丢弃时注销会话。
///
/// 连接任务正常结束、出错、被取消，或者握手升级从未完成，都会走到这里。
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
}

impl SessionGuard {
    pub fn new(registry: Arc<SessionRegistry>, session: Arc<Session>) -> Self {
        Self { registry, session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.session.connection_id()
    }

    pub fn identity(&self) -> &Identity {
        self.session.identity()
    }

    pub fn subscribe(&self, topic: Topic) -> Result<bool, SessionError> {
        self.registry.subscribe(self.connection_id(), topic)
    }

    pub fn unsubscribe(&self, topic: &Topic) -> bool {
        self.registry.unsubscribe(self.connection_id(), topic)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.session.connection_id());
    }
}
