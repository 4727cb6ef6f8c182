//! 聊天系统核心领域模型
//!
//! 包含聊天消息实体、推送通道的线路协议，以及各层共用的错误类型。

pub mod entities;
pub mod errors;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
