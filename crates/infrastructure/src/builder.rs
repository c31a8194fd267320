use std::sync::Arc;

use application::{IdentityRepository, MessageStore, NotificationDispatcher, RoomRepository};
use config::AppConfig;
use thiserror::Error;
use tracing::info;

use crate::{
    memory::InMemoryStorage,
    migrations::MIGRATOR,
    push::{HttpPushDispatcher, LoggingNotificationDispatcher},
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("push dispatcher error: {0}")]
    Push(#[from] application::NotificationError),
}

/// 组装好的外部适配器
#[derive(Clone)]
pub struct Infrastructure {
    pub identity_repository: Arc<dyn IdentityRepository>,
    pub room_repository: Arc<dyn RoomRepository>,
    pub message_store: Arc<dyn MessageStore>,
    pub notifier: Arc<dyn NotificationDispatcher>,
}

impl Infrastructure {
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let notifier = notifier_from(config)?;

        if config.database.in_memory {
            info!("使用内存存储");
            return Ok(Self::in_memory(Arc::new(InMemoryStorage::new()), notifier));
        }

        let pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        info!("数据库迁移完成");

        let storage = PgStorage::new(pool);
        Ok(Self {
            identity_repository: storage.identity_repository,
            room_repository: storage.room_repository,
            message_store: storage.message_store,
            notifier,
        })
    }

    pub fn in_memory(
        storage: Arc<InMemoryStorage>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            identity_repository: storage.clone(),
            room_repository: storage.clone(),
            message_store: storage,
            notifier,
        }
    }
}

fn notifier_from(config: &AppConfig) -> Result<Arc<dyn NotificationDispatcher>, InfrastructureError> {
    if config.push.enabled {
        info!("推送网关已启用");
        Ok(Arc::new(HttpPushDispatcher::from_config(&config.push)?))
    } else {
        Ok(Arc::new(LoggingNotificationDispatcher))
    }
}
