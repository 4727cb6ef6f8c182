//! Postgres 消息表
//!
//! 键值表语义：固定分区键加行键作为主键。建表不使用 `IF NOT EXISTS`，
//! 由 SQLSTATE 识别“表已存在”，交给上层的幂等初始化处理。

use application::MessageTable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{ChatMessageRow, StoreError, CHAT_MESSAGES_PARTITION, CHAT_MESSAGES_TABLE};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

/// 重复建表
const DUPLICATE_TABLE: &str = "42P07";
/// 并发建表时系统目录上的唯一约束冲突
const UNIQUE_VIOLATION: &str = "23505";

fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    StoreError::unavailable(err.to_string())
}

fn is_table_exists(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some(DUPLICATE_TABLE | UNIQUE_VIOLATION))
        }
        _ => false,
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    partition_key: String,
    row_key: String,
    id: Uuid,
    sender: String,
    message: String,
    created_on: DateTime<Utc>,
}

impl From<MessageRecord> for ChatMessageRow {
    fn from(value: MessageRecord) -> Self {
        ChatMessageRow {
            partition_key: value.partition_key,
            row_key: value.row_key,
            id: value.id,
            sender: value.sender,
            message: value.message,
            created_on: value.created_on,
        }
    }
}

#[derive(Clone)]
pub struct PgMessageTable {
    pool: PgPool,
}

impl PgMessageTable {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageTable for PgMessageTable {
    async fn create_table(&self) -> Result<(), StoreError> {
        let statement = format!(
            r#"CREATE TABLE {CHAT_MESSAGES_TABLE} (
                partition_key TEXT NOT NULL,
                row_key TEXT NOT NULL,
                id UUID NOT NULL,
                sender TEXT NOT NULL,
                message TEXT NOT NULL,
                created_on TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (partition_key, row_key)
            )"#
        );

        match sqlx::query(&statement).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(err) if is_table_exists(&err) => Err(StoreError::TableAlreadyExists {
                table: CHAT_MESSAGES_TABLE.to_owned(),
            }),
            Err(err) => Err(map_sqlx_err(err)),
        }
    }

    async fn insert_row(&self, row: ChatMessageRow) -> Result<(), StoreError> {
        let statement = format!(
            r#"INSERT INTO {CHAT_MESSAGES_TABLE}
                (partition_key, row_key, id, sender, message, created_on)
               VALUES ($1, $2, $3, $4, $5, $6)"#
        );

        sqlx::query(&statement)
            .bind(&row.partition_key)
            .bind(&row.row_key)
            .bind(row.id)
            .bind(&row.sender)
            .bind(&row.message)
            .bind(row.created_on)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<ChatMessageRow>, StoreError> {
        let statement = format!(
            r#"SELECT partition_key, row_key, id, sender, message, created_on
               FROM {CHAT_MESSAGES_TABLE}
               WHERE partition_key = $1"#
        );

        let records = sqlx::query_as::<_, MessageRecord>(&statement)
            .bind(CHAT_MESSAGES_PARTITION)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(ChatMessageRow::from).collect())
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
