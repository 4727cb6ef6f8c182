//! 只追加的消息日志
//!
//! `MessageStore` 是消息表唯一的访问入口：负责幂等地建表、分配 ID 与时间戳、
//! 以及按时间倒序返回全部历史。

use std::future::Future;
use std::sync::{Arc, Mutex};

use domain::{ChatMessage, ChatMessageRow, MessageId, StoreError, Timestamp, CHAT_MESSAGES_TABLE};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::{clock::Clock, error::ApplicationError, repository::MessageTable};

pub struct MessageStore {
    table: Arc<dyn MessageTable>,
    clock: Arc<dyn Clock>,
    ready: OnceCell<()>,
    last_issued: Mutex<Option<Timestamp>>,
}

impl MessageStore {
    pub fn new(table: Arc<dyn MessageTable>, clock: Arc<dyn Clock>) -> Self {
        Self {
            table,
            clock,
            ready: OnceCell::new(),
            last_issued: Mutex::new(None),
        }
    }

    /// 确保消息表存在
    ///
    /// 并发的首次调用只有一个会真正建表，其余调用等待同一个结果。
    /// 表已存在（例如由另一个进程创建）视为成功。失败不会被缓存，下次调用会重试。
    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<(), ApplicationError> {
        let init = self.ready.get_or_try_init(|| async {
            match self.table.create_table().await {
                Ok(()) => {
                    tracing::info!(table = CHAT_MESSAGES_TABLE, "消息表已创建");
                    Ok(())
                }
                Err(StoreError::TableAlreadyExists { table }) => {
                    tracing::debug!(table = %table, "消息表已存在");
                    Ok(())
                }
                Err(err) => {
                    tracing::error!(table = CHAT_MESSAGES_TABLE, error = %err, "消息表初始化失败");
                    Err(err)
                }
            }
        });

        run_cancellable(cancel, init).await.map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// 追加一条消息并返回它
    pub async fn append(
        &self,
        sender: String,
        body: String,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage, ApplicationError> {
        self.initialize(cancel).await?;

        let message = ChatMessage::new(MessageId::generate(), sender, body, self.next_timestamp());
        run_cancellable(cancel, self.table.insert_row(ChatMessageRow::from(&message))).await?;

        tracing::debug!(message_id = %message.id, sender = %message.sender, "消息已持久化");
        Ok(message)
    }

    /// 返回全部消息，按 `created_at` 倒序，时间相同时按 ID 倒序
    pub async fn list_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatMessage>, ApplicationError> {
        self.initialize(cancel).await?;

        let rows = run_cancellable(cancel, self.table.scan()).await?;
        let mut messages = rows
            .into_iter()
            .map(ChatMessage::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        messages.sort_by(ChatMessage::newest_first);
        Ok(messages)
    }

    /// 服务端时钟回拨时沿用上一次的时间戳，保证单调不减
    fn next_timestamp(&self) -> Timestamp {
        let now = self.clock.now();
        let mut last = self
            .last_issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let issued = match *last {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        *last = Some(issued);
        issued
    }
}

async fn run_cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T, ApplicationError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApplicationError::Cancelled),
        result = operation => result.map_err(ApplicationError::from),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::test_support::{FakeTable, FixedClock};

    fn store_with(table: Arc<FakeTable>) -> MessageStore {
        MessageStore::new(table, Arc::new(crate::SystemClock))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_initialization_creates_table_once() {
        let table = Arc::new(FakeTable::new().with_create_delay(Duration::from_millis(20)));
        let store = Arc::new(store_with(table.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.initialize(&CancellationToken::new()).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert!(result.expect("join").is_ok());
        }
        assert_eq!(table.create_calls(), 1);
        assert!(store.is_ready());
    }

    #[tokio::test]
    async fn table_created_elsewhere_counts_as_ready() {
        let table = Arc::new(FakeTable::new());
        table.mark_existing();
        let store = store_with(table.clone());

        store.initialize(&CancellationToken::new()).await.expect("init");
        store.initialize(&CancellationToken::new()).await.expect("second init");

        assert_eq!(table.create_calls(), 1);
        assert!(store.is_ready());
    }

    #[tokio::test]
    async fn failed_initialization_is_retried_on_next_call() {
        let table = Arc::new(FakeTable::new());
        table.set_unavailable(true);
        let store = store_with(table.clone());

        let err = store.initialize(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Store(StoreError::Unavailable { .. })));
        assert!(!store.is_ready());

        table.set_unavailable(false);
        store.initialize(&CancellationToken::new()).await.expect("retry init");
        assert_eq!(table.create_calls(), 2);
    }

    #[tokio::test]
    async fn append_assigns_unique_ids_and_persists() {
        let table = Arc::new(FakeTable::new());
        let store = store_with(table.clone());
        let cancel = CancellationToken::new();

        let first = store.append("alice".into(), "hi".into(), &cancel).await.unwrap();
        let second = store.append("alice".into(), "hi".into(), &cancel).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(table.row_count(), 2);
    }

    #[tokio::test]
    async fn list_all_is_newest_first() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
        let store = MessageStore::new(Arc::new(FakeTable::new()), clock.clone());
        let cancel = CancellationToken::new();

        let alice = store.append("alice".into(), "hi".into(), &cancel).await.unwrap();
        clock.advance(chrono::Duration::milliseconds(1));
        let bob = store.append("bob".into(), "yo".into(), &cancel).await.unwrap();

        let listed = store.list_all(&cancel).await.unwrap();
        assert_eq!(listed, vec![bob, alice]);
    }

    #[tokio::test]
    async fn identical_timestamps_sort_deterministically() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
        let store = MessageStore::new(Arc::new(FakeTable::new()), clock);
        let cancel = CancellationToken::new();

        let alice = store.append("alice".into(), "hi".into(), &cancel).await.unwrap();
        let bob = store.append("bob".into(), "yo".into(), &cancel).await.unwrap();
        assert_eq!(alice.created_at, bob.created_at);

        let first = store.list_all(&cancel).await.unwrap();
        let second = store.list_all(&cancel).await.unwrap();
        assert_eq!(first, second);
        assert!(first[0].id > first[1].id);
    }

    #[tokio::test]
    async fn timestamps_never_go_backwards() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
        let store = MessageStore::new(Arc::new(FakeTable::new()), clock.clone());
        let cancel = CancellationToken::new();

        let before = store.append("alice".into(), "hi".into(), &cancel).await.unwrap();
        clock.advance(chrono::Duration::seconds(-30));
        let after = store.append("bob".into(), "yo".into(), &cancel).await.unwrap();

        assert!(after.created_at >= before.created_at);
    }

    #[tokio::test]
    async fn unavailable_backend_fails_append() {
        let table = Arc::new(FakeTable::new());
        let store = store_with(table.clone());
        store.initialize(&CancellationToken::new()).await.unwrap();
        table.set_unavailable(true);

        let err = store
            .append("alice".into(), "hi".into(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Store(StoreError::Unavailable { .. })));
        assert_eq!(table.row_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_slow_write() {
        let table = Arc::new(FakeTable::new().with_insert_delay(Duration::from_secs(30)));
        let store = store_with(table);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            store.append("alice".into(), "hi".into(), &cancel),
        )
        .await
        .expect("append should return promptly");
        assert!(matches!(result, Err(ApplicationError::Cancelled)));
    }
}
