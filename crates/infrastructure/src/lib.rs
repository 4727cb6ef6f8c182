//! 基础设施层实现。
//!
//! 提供推送通道的分组广播中心，以及消息表的 Postgres 与内存两种存储后端，
//! 实现应用层定义的 `MessageBroadcaster` 与 `MessageTable` 接口。

pub mod hub;
pub mod memory;
pub mod repository;

pub use hub::{BroadcastHub, HubError, OutboundFrame, OutboundReceiver};
pub use memory::InMemoryMessageTable;
pub use repository::{create_pg_pool, PgMessageTable};
