use domain::ChatMessage;
use reqwest::Url;
use serde::Serialize;

use crate::error::ClientError;

#[derive(Debug, Serialize)]
struct CreateMessageBody<'a> {
    sender: &'a str,
    message: &'a str,
}

/// 消息 REST 接口的客户端
#[derive(Debug, Clone)]
pub struct ChatApiClient {
    http: reqwest::Client,
    messages_url: Url,
}

impl ChatApiClient {
    pub fn new(base_url: &Url) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &Url) -> Result<Self, ClientError> {
        let messages_url = base_url
            .join("chat/messages")
            .map_err(|err| ClientError::InvalidEndpoint(err.to_string()))?;
        Ok(Self { http, messages_url })
    }

    /// 全部历史消息，最新的在前
    pub async fn get_messages(&self) -> Result<Vec<ChatMessage>, ClientError> {
        let messages = self
            .http
            .get(self.messages_url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(messages)
    }

    pub async fn send_message(&self, sender: &str, message: &str) -> Result<ChatMessage, ClientError> {
        let created = self
            .http
            .post(self.messages_url.clone())
            .json(&CreateMessageBody { sender, message })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tracing::debug!(sender, "消息已发送");
        Ok(created)
    }
}
