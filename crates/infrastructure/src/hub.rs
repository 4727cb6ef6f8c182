//! 推送通道的分组广播中心
//!
//! `BroadcastHub` 独占所有连接的出站队列与分组成员关系。连接表与分组表放在同一把
//! 读写锁下：成员变更持有写锁，广播持有读锁完成入队，因此断开连接返回之后，
//! 任何广播都不会再投递到该连接。

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use application::{BroadcastError, DeliveryReport, MessageBroadcaster};
use async_trait::async_trait;
use domain::{ConnectionId, FrameError, ServerEvent};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 已序列化的出站帧，同一次广播的所有接收方共享一份
pub type OutboundFrame = Arc<str>;

/// 连接的出站队列接收端，由传输层负责写入 socket
pub type OutboundReceiver = mpsc::Receiver<OutboundFrame>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("connection {0} is not registered")]
    ConnectionNotFound(ConnectionId),
    #[error("hub operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

struct ConnectionEntry {
    sender: mpsc::Sender<OutboundFrame>,
    groups: HashSet<String>,
    username: Option<String>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    groups: HashMap<String, HashSet<ConnectionId>>,
}

impl HubState {
    /// 非阻塞地把帧放入分组内每个成员的出站队列
    fn fan_out(&self, group: &str, event_name: &str, frame: &OutboundFrame) -> DeliveryReport {
        let Some(members) = self.groups.get(group) else {
            return DeliveryReport::default();
        };

        let mut report = DeliveryReport {
            recipients: members.len(),
            ..DeliveryReport::default()
        };

        for connection_id in members {
            let Some(entry) = self.connections.get(connection_id) else {
                report.dropped += 1;
                continue;
            };
            match entry.sender.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    warn!(
                        connection_id = %connection_id,
                        group,
                        event = event_name,
                        "出站队列已满，丢弃事件"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    debug!(
                        connection_id = %connection_id,
                        group,
                        event = event_name,
                        "连接已关闭，丢弃事件"
                    );
                }
            }
        }

        report
    }
}

/// 进程内的分组广播中心
#[derive(Default)]
pub struct BroadcastHub {
    state: RwLock<HubState>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为新建立的传输连接创建有界出站队列
    ///
    /// 同一连接重复注册时旧的队列会被关闭，分组成员关系保留。
    pub async fn register(&self, connection_id: ConnectionId, capacity: usize) -> OutboundReceiver {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let mut state = self.state.write().await;
        let replaced = match state.connections.entry(connection_id) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().sender = sender;
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ConnectionEntry {
                    sender,
                    groups: HashSet::new(),
                    username: None,
                });
                false
            }
        };
        if replaced {
            warn!(connection_id = %connection_id, "连接重复注册，替换出站队列");
        } else {
            info!(
                connection_id = %connection_id,
                connections = state.connections.len(),
                "连接已注册"
            );
        }
        receiver
    }

    /// 把连接加入分组
    ///
    /// 返回 `true` 表示本次是新加入。只有新加入才会向分组全体成员（包括加入者自己）
    /// 广播 `UserJoined`，重复加入不产生任何事件。
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        group: &str,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, HubError> {
        let mut state = self.write_state(cancel).await?;
        let state = &mut *state;

        let entry = state
            .connections
            .get_mut(&connection_id)
            .ok_or(HubError::ConnectionNotFound(connection_id))?;
        entry.username = Some(username.to_owned());
        let inserted = entry.groups.insert(group.to_owned());
        state
            .groups
            .entry(group.to_owned())
            .or_default()
            .insert(connection_id);

        if !inserted {
            debug!(connection_id = %connection_id, group, "连接已在分组中");
            return Ok(false);
        }

        let event = ServerEvent::UserJoined(username.to_owned());
        let frame: OutboundFrame = Arc::from(event.to_frame()?);
        let report = state.fan_out(group, event.name(), &frame);
        info!(
            connection_id = %connection_id,
            group,
            username,
            delivered = report.delivered,
            "用户加入分组"
        );
        Ok(true)
    }

    /// 把连接移出分组
    ///
    /// 返回 `true` 表示确实发生了移除，此时向剩余成员广播 `UserLeft`。
    pub async fn leave(
        &self,
        connection_id: ConnectionId,
        group: &str,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, HubError> {
        let mut state = self.write_state(cancel).await?;
        let state = &mut *state;

        let entry = state
            .connections
            .get_mut(&connection_id)
            .ok_or(HubError::ConnectionNotFound(connection_id))?;
        if !entry.groups.remove(group) {
            debug!(connection_id = %connection_id, group, "连接不在分组中");
            return Ok(false);
        }
        remove_member(&mut state.groups, group, connection_id);

        let event = ServerEvent::UserLeft(username.to_owned());
        let frame: OutboundFrame = Arc::from(event.to_frame()?);
        let report = state.fan_out(group, event.name(), &frame);
        info!(
            connection_id = %connection_id,
            group,
            username,
            delivered = report.delivered,
            "用户离开分组"
        );
        Ok(true)
    }

    /// 传输连接断开后的清理
    ///
    /// 从所有分组和连接表中移除，并关闭出站队列。不广播任何事件。
    /// 不接受取消令牌：清理必须完成。
    pub async fn on_disconnect(&self, connection_id: ConnectionId) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.remove(&connection_id) else {
            return false;
        };
        for group in &entry.groups {
            remove_member(&mut state.groups, group, connection_id);
        }
        info!(
            connection_id = %connection_id,
            username = entry.username.as_deref().unwrap_or("-"),
            groups = entry.groups.len(),
            connections = state.connections.len(),
            "连接已断开"
        );
        true
    }

    /// 向分组内所有成员发布事件
    ///
    /// 事件只序列化一次。投递使用 `try_send`，慢速或已关闭的接收方只计入 `dropped`。
    pub async fn publish(
        &self,
        group: &str,
        event: &ServerEvent,
        cancel: &CancellationToken,
    ) -> Result<DeliveryReport, HubError> {
        if cancel.is_cancelled() {
            return Err(HubError::Cancelled);
        }
        let frame: OutboundFrame = Arc::from(event.to_frame()?);
        let state = self.read_state(cancel).await?;
        Ok(state.fan_out(group, event.name(), &frame))
    }

    pub async fn members(&self, group: &str) -> Vec<ConnectionId> {
        let state = self.state.read().await;
        state
            .groups
            .get(group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// 连接当前所在的分组，未注册时返回 `None`
    pub async fn groups_of(&self, connection_id: ConnectionId) -> Option<Vec<String>> {
        let state = self.state.read().await;
        state.connections.get(&connection_id).map(|entry| {
            let mut groups: Vec<String> = entry.groups.iter().cloned().collect();
            groups.sort();
            groups
        })
    }

    async fn read_state(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RwLockReadGuard<'_, HubState>, HubError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HubError::Cancelled),
            guard = self.state.read() => Ok(guard),
        }
    }

    async fn write_state(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RwLockWriteGuard<'_, HubState>, HubError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HubError::Cancelled),
            guard = self.state.write() => Ok(guard),
        }
    }
}

fn remove_member(
    groups: &mut HashMap<String, HashSet<ConnectionId>>,
    group: &str,
    connection_id: ConnectionId,
) {
    if let Some(members) = groups.get_mut(group) {
        members.remove(&connection_id);
        if members.is_empty() {
            groups.remove(group);
        }
    }
}

#[async_trait]
impl MessageBroadcaster for BroadcastHub {
    async fn publish(
        &self,
        group: &str,
        event: ServerEvent,
        cancel: &CancellationToken,
    ) -> Result<DeliveryReport, BroadcastError> {
        BroadcastHub::publish(self, group, &event, cancel)
            .await
            .map_err(|err| match err {
                HubError::Cancelled => BroadcastError::Cancelled,
                other => BroadcastError::failed(other.to_string()),
            })
    }
}
