//! 单元测试共用的假实现

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use domain::{ChatMessageRow, StoreError, Timestamp, CHAT_MESSAGES_TABLE};

use crate::{clock::Clock, repository::MessageTable};

/// 内存假表，可注入延迟和故障
#[derive(Default)]
pub struct FakeTable {
    exists: AtomicBool,
    unavailable: AtomicBool,
    create_calls: AtomicUsize,
    create_delay: Option<Duration>,
    insert_delay: Option<Duration>,
    rows: Mutex<HashMap<String, ChatMessageRow>>,
}

impl FakeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    pub fn mark_existing(&self) {
        self.exists.store(true, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("backend offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageTable for FakeTable {
    async fn create_table(&self) -> Result<(), StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;
        if self.exists.swap(true, Ordering::SeqCst) {
            return Err(StoreError::TableAlreadyExists {
                table: CHAT_MESSAGES_TABLE.to_owned(),
            });
        }
        Ok(())
    }

    async fn insert_row(&self, row: ChatMessageRow) -> Result<(), StoreError> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;
        self.rows.lock().unwrap().insert(row.row_key.clone(), row);
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<ChatMessageRow>, StoreError> {
        self.check_available()?;
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }
}

/// 手动推进的时钟
pub struct FixedClock {
    now: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}
