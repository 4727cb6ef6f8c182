//! 聊天消息实体
//!
//! `ChatMessage` 一经创建即不可变；`ChatMessageRow` 是它在键值表中的存储形态。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, StoreError};
use crate::value_objects::{MessageId, Timestamp};

/// 存放聊天消息的表名
pub const CHAT_MESSAGES_TABLE: &str = "chatmessages";

/// 所有消息共用的固定分区键
pub const CHAT_MESSAGES_PARTITION: &str = "ChatMessages";

const MAX_SENDER_LEN: usize = 64;
const MAX_BODY_LEN: usize = 4000;

/// 聊天消息
///
/// 线路格式为 `{id, sender, message, createdOn}`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "createdOn")]
    pub created_at: Timestamp,
}

impl ChatMessage {
    pub fn new(id: MessageId, sender: String, body: String, created_at: Timestamp) -> Self {
        Self {
            id,
            sender,
            body,
            created_at,
        }
    }

    /// 校验发送者和正文。
    pub fn validate_input(sender: &str, body: &str) -> Result<(), DomainError> {
        if sender.trim().is_empty() {
            return Err(DomainError::invalid_argument("sender", "cannot be empty"));
        }
        if sender.chars().count() > MAX_SENDER_LEN {
            return Err(DomainError::invalid_argument("sender", "too long"));
        }
        if body.trim().is_empty() {
            return Err(DomainError::invalid_argument("message", "cannot be empty"));
        }
        if body.chars().count() > MAX_BODY_LEN {
            return Err(DomainError::invalid_argument("message", "too long"));
        }
        Ok(())
    }

    /// 按存储顺序比较：`created_at` 降序，时间相同时按 id 降序。
    pub fn newest_first(a: &ChatMessage, b: &ChatMessage) -> std::cmp::Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// 表中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessageRow {
    pub partition_key: String,
    pub row_key: String,
    pub id: Uuid,
    pub sender: String,
    pub message: String,
    pub created_on: Timestamp,
}

impl From<&ChatMessage> for ChatMessageRow {
    fn from(value: &ChatMessage) -> Self {
        Self {
            partition_key: CHAT_MESSAGES_PARTITION.to_owned(),
            row_key: value.id.to_string(),
            id: value.id.into(),
            sender: value.sender.clone(),
            message: value.body.clone(),
            created_on: value.created_at,
        }
    }
}

impl TryFrom<ChatMessageRow> for ChatMessage {
    type Error = StoreError;

    fn try_from(value: ChatMessageRow) -> Result<Self, Self::Error> {
        let row_id = Uuid::parse_str(&value.row_key)
            .map_err(|err| StoreError::invalid_row(&value.row_key, err.to_string()))?;
        if row_id != value.id {
            return Err(StoreError::invalid_row(
                &value.row_key,
                "row key does not match id",
            ));
        }

        Ok(ChatMessage {
            id: MessageId::from(value.id),
            sender: value.sender,
            body: value.message,
            created_at: value.created_on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> ChatMessage {
        ChatMessage::new(
            MessageId::generate(),
            "alice".into(),
            "hi".into(),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let message = sample();
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["id"], message.id.to_string());
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["message"], "hi");
        assert!(json["createdOn"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));
        assert!(json.get("body").is_none());
    }

    #[test]
    fn row_uses_fixed_partition_and_id_row_key() {
        let message = sample();
        let row = ChatMessageRow::from(&message);

        assert_eq!(row.partition_key, CHAT_MESSAGES_PARTITION);
        assert_eq!(row.row_key, message.id.to_string());
        assert_eq!(ChatMessage::try_from(row).unwrap(), message);
    }

    #[test]
    fn row_with_mismatched_key_is_rejected() {
        let mut row = ChatMessageRow::from(&sample());
        row.row_key = Uuid::new_v4().to_string();

        assert!(matches!(
            ChatMessage::try_from(row),
            Err(StoreError::InvalidRow { .. })
        ));
    }

    #[test]
    fn blank_sender_or_body_is_invalid() {
        assert!(ChatMessage::validate_input("  ", "hi").is_err());
        assert!(ChatMessage::validate_input("bob", "").is_err());
        assert!(ChatMessage::validate_input("bob", &"x".repeat(4001)).is_err());
        assert!(ChatMessage::validate_input("bob", "yo").is_ok());
    }

    #[test]
    fn newest_first_breaks_ties_by_id() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let low = ChatMessage::new(MessageId::new(Uuid::from_u128(1)), "a".into(), "x".into(), at);
        let high = ChatMessage::new(MessageId::new(Uuid::from_u128(2)), "b".into(), "y".into(), at);

        let mut items = vec![low.clone(), high.clone()];
        items.sort_by(ChatMessage::newest_first);
        assert_eq!(items, vec![high, low]);
    }
}
