//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：消息的持久化与历史查询、
//! 以及对外部适配器（键值表、消息广播）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod error;
pub mod repository;
pub mod services;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use broadcaster::{BroadcastError, DeliveryReport, MessageBroadcaster};
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use repository::MessageTable;
pub use services::{ChatService, ChatServiceDependencies, CreateMessageRequest};
pub use store::MessageStore;
