//! 聊天客户端。
//!
//! `ClientConnector` 维护到 `/chathub` 的推送连接：解析端点、断线后按退避策略自动重连、
//! 重连后自动重新加入聊天室，并把服务端事件分发给按事件类型注册的处理函数。
//! `ChatApiClient` 封装消息的 HTTP 接口。

mod api;
mod connector;
mod endpoint;
mod error;
mod handlers;
mod reconnect;

pub use api::ChatApiClient;
pub use connector::{ClientConnector, ConnectionState, ConnectorOptions};
pub use endpoint::{derive_hub_url, resolve_hub_url};
pub use error::ClientError;
pub use handlers::{ClientEvent, EventKind, HandlerId};
pub use reconnect::{Backoff, ReconnectPolicy};
pub use reqwest::Url;
