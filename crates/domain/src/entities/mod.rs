//! 领域实体定义
//!
//! 包含聊天消息、持久化行以及推送通道上传输的事件。

pub mod message;
pub mod websocket;

// 重新导出核心实体
pub use message::{ChatMessage, ChatMessageRow, CHAT_MESSAGES_PARTITION, CHAT_MESSAGES_TABLE};
pub use websocket::{ClientInvocation, FrameError, ServerEvent, CHAT_ROOM};
