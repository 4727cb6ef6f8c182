use std::sync::Arc;

use domain::{ChatMessage, MessageId, ServerEvent, CHAT_ROOM};
use tokio_util::sync::CancellationToken;

use crate::{broadcaster::MessageBroadcaster, error::ApplicationError, store::MessageStore};

#[derive(Debug, Clone)]
pub struct CreateMessageRequest {
    pub sender: String,
    pub message: String,
}

pub struct ChatServiceDependencies {
    pub store: Arc<MessageStore>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 先持久化，再广播
    ///
    /// 持久化失败时不会广播。广播失败只记录日志，消息已保存，调用方仍然得到成功。
    pub async fn create_message(
        &self,
        request: CreateMessageRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage, ApplicationError> {
        ChatMessage::validate_input(&request.sender, &request.message)?;

        let message = self
            .deps
            .store
            .append(request.sender, request.message, cancel)
            .await?;

        match self
            .deps
            .broadcaster
            .publish(CHAT_ROOM, ServerEvent::ReceiveMessage(message.clone()), cancel)
            .await
        {
            Ok(report) if report.dropped > 0 => {
                tracing::warn!(
                    message_id = %message.id,
                    recipients = report.recipients,
                    dropped = report.dropped,
                    "部分订阅者未收到实时消息"
                );
            }
            Ok(report) => {
                tracing::debug!(
                    message_id = %message.id,
                    delivered = report.delivered,
                    "消息已广播"
                );
            }
            Err(broadcast_error) => {
                tracing::warn!(
                    message_id = %message.id,
                    error = %broadcast_error,
                    "消息已保存，但广播失败"
                );
            }
        }

        Ok(message)
    }

    pub async fn list_messages(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatMessage>, ApplicationError> {
        self.deps.store.list_all(cancel).await
    }

    pub async fn find_message(
        &self,
        id: MessageId,
        cancel: &CancellationToken,
    ) -> Result<Option<ChatMessage>, ApplicationError> {
        let messages = self.deps.store.list_all(cancel).await?;
        Ok(messages.into_iter().find(|message| message.id == id))
    }
}
