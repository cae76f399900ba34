//! 基础设施层实现。
//!
//! 提供 Postgres 仓储适配器，实现应用层定义的持久化端口。

pub mod repository;

pub use repository::{
    create_pg_pool, PgMembershipRepository, PgMessageRepository, PgRoomRepository, PgStorage,
    PgUserRepository,
};
