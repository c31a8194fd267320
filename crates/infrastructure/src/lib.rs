//! 基础设施层实现。
//!
//! 提供数据库仓储（PostgreSQL / 内存）、JWT 身份解析、推送网关等适配器，
//! 实现应用层定义的接口。

pub mod auth;
pub mod builder;
pub mod memory;
pub mod migrations;
pub mod push;
pub mod repository;

pub use auth::{JwtPrincipalResolver, TokenIssuer};
pub use builder::{Infrastructure, InfrastructureError};
pub use memory::InMemoryStorage;
pub use migrations::MIGRATOR;
pub use push::{HttpPushDispatcher, LoggingNotificationDispatcher};
pub use repository::{
    create_pg_pool, PgIdentityRepository, PgMessageStore, PgRoomRepository, PgStorage,
};
