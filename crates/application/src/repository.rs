use async_trait::async_trait;
use domain::{ChatMessageRow, StoreError};

/// 键值表后端
///
/// 以固定分区键和消息 ID 作为行键寻址。重试（如果有）属于具体后端，
/// 不在这一层之上进行。
#[async_trait]
pub trait MessageTable: Send + Sync {
    /// 创建表；表已存在时必须返回 `StoreError::TableAlreadyExists`
    async fn create_table(&self) -> Result<(), StoreError>;

    async fn insert_row(&self, row: ChatMessageRow) -> Result<(), StoreError>;

    /// 全表扫描，不保证顺序
    async fn scan(&self) -> Result<Vec<ChatMessageRow>, StoreError>;
}
