use async_trait::async_trait;
use domain::ServerEvent;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// 一次发布的投递结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// 发布时分组内的成员数
    pub recipients: usize,
    /// 成功放入出站队列的数量
    pub delivered: usize,
    /// 因队列已满或连接已关闭而丢弃的数量
    pub dropped: usize,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
    #[error("broadcast cancelled")]
    Cancelled,
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 向分组内所有成员发布事件
///
/// 实现必须是“发出即忘”的：慢速或已断开的接收方不能阻塞调用方，
/// 也不能拖慢其他接收方。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBroadcaster: Send + Sync {
    async fn publish(
        &self,
        group: &str,
        event: ServerEvent,
        cancel: &CancellationToken,
    ) -> Result<DeliveryReport, BroadcastError>;
}
