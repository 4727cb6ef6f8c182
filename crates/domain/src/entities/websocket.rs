//! 推送通道线路协议
//!
//! 每一帧都是 JSON 文本：`{"target": "<事件名>", "arguments": <载荷>}`。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::message::ChatMessage;

/// 唯一的聊天室分组名
pub const CHAT_ROOM: &str = "ChatRoom";

/// 服务器推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "arguments")]
pub enum ServerEvent {
    ReceiveMessage(ChatMessage),
    UserJoined(String),
    UserLeft(String),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ReceiveMessage(_) => "ReceiveMessage",
            ServerEvent::UserJoined(_) => "UserJoined",
            ServerEvent::UserLeft(_) => "UserLeft",
        }
    }

    pub fn to_frame(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::from)
    }

    pub fn from_frame(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(FrameError::from)
    }
}

/// 客户端发起的调用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "arguments")]
pub enum ClientInvocation {
    JoinChat(String),
    LeaveChat(String),
}

impl ClientInvocation {
    pub fn name(&self) -> &'static str {
        match self {
            ClientInvocation::JoinChat(_) => "JoinChat",
            ClientInvocation::LeaveChat(_) => "LeaveChat",
        }
    }

    pub fn to_frame(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::from)
    }

    pub fn from_frame(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(FrameError::from)
    }
}

/// 帧编解码错误
#[derive(Debug, Error)]
#[error("malformed frame: {0}")]
pub struct FrameError(#[from] serde_json::Error);
