//! Web API 层。
//!
//! 提供 Axum 路由：消息的 REST 接口与 `/chathub` 推送通道，
//! 将请求委托给应用层的 `ChatService` 和基础设施层的 `BroadcastHub`。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
