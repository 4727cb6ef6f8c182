//! 内存消息表，用于开发环境和测试

use std::collections::HashMap;

use application::MessageTable;
use async_trait::async_trait;
use domain::{ChatMessageRow, StoreError, CHAT_MESSAGES_PARTITION, CHAT_MESSAGES_TABLE};
use tokio::sync::RwLock;

/// `None` 表示表尚未创建
#[derive(Default)]
pub struct InMemoryMessageTable {
    rows: RwLock<Option<HashMap<String, ChatMessageRow>>>,
}

impl InMemoryMessageTable {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing_table() -> StoreError {
    StoreError::unavailable(format!("table {CHAT_MESSAGES_TABLE} does not exist"))
}

#[async_trait]
impl MessageTable for InMemoryMessageTable {
    async fn create_table(&self) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if rows.is_some() {
            return Err(StoreError::TableAlreadyExists {
                table: CHAT_MESSAGES_TABLE.to_owned(),
            });
        }
        *rows = Some(HashMap::new());
        Ok(())
    }

    async fn insert_row(&self, row: ChatMessageRow) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let table = rows.as_mut().ok_or_else(missing_table)?;
        if table.contains_key(&row.row_key) {
            return Err(StoreError::invalid_row(row.row_key, "duplicate row key"));
        }
        table.insert(row.row_key.clone(), row);
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<ChatMessageRow>, StoreError> {
        let rows = self.rows.read().await;
        let table = rows.as_ref().ok_or_else(missing_table)?;
        Ok(table
            .values()
            .filter(|row| row.partition_key == CHAT_MESSAGES_PARTITION)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use application::{MessageStore, SystemClock};
    use tokio_util::sync::CancellationToken;

    use super::*;

    #[tokio::test]
    async fn second_create_reports_existing_table() {
        let table = InMemoryMessageTable::new();
        table.create_table().await.unwrap();

        let err = table.create_table().await.unwrap_err();
        assert!(matches!(err, StoreError::TableAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn writes_before_create_are_rejected() {
        let table = InMemoryMessageTable::new();
        assert!(matches!(table.scan().await, Err(StoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn store_round_trip_is_newest_first() {
        let store = MessageStore::new(Arc::new(InMemoryMessageTable::new()), Arc::new(SystemClock));
        let cancel = CancellationToken::new();

        let alice = store.append("alice".into(), "hi".into(), &cancel).await.unwrap();
        let bob = store.append("bob".into(), "yo".into(), &cancel).await.unwrap();

        let listed = store.list_all(&cancel).await.unwrap();
        assert_eq!(listed.len(), 2);
        // 同一毫秒内写入时，较新的时间戳排前面；相同则按 id 倒序
        if bob.created_at > alice.created_at {
            assert_eq!(listed, vec![bob, alice]);
        } else {
            assert_eq!(listed[0].created_at, listed[1].created_at);
            assert!(listed[0].id > listed[1].id);
        }
    }
}
