//! 按事件类型注册的处理函数表

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use domain::{ChatMessage, ServerEvent};

/// 分发给应用的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    MessageReceived(ChatMessage),
    UserJoined(String),
    UserLeft(String),
    Reconnecting,
    Reconnected,
    /// 重试耗尽后放弃连接，附带最后一次断开的原因
    Closed(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageReceived,
    UserJoined,
    UserLeft,
    Reconnecting,
    Reconnected,
    Closed,
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::MessageReceived(_) => EventKind::MessageReceived,
            ClientEvent::UserJoined(_) => EventKind::UserJoined,
            ClientEvent::UserLeft(_) => EventKind::UserLeft,
            ClientEvent::Reconnecting => EventKind::Reconnecting,
            ClientEvent::Reconnected => EventKind::Reconnected,
            ClientEvent::Closed(_) => EventKind::Closed,
        }
    }
}

impl From<ServerEvent> for ClientEvent {
    fn from(value: ServerEvent) -> Self {
        match value {
            ServerEvent::ReceiveMessage(message) => ClientEvent::MessageReceived(message),
            ServerEvent::UserJoined(username) => ClientEvent::UserJoined(username),
            ServerEvent::UserLeft(username) => ClientEvent::UserLeft(username),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<EventKind, Vec<(HandlerId, Handler)>>>,
}

impl HandlerRegistry {
    pub(crate) fn register<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub(crate) fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        for registered in handlers.values_mut() {
            if let Some(index) = registered.iter().position(|(existing, _)| *existing == id) {
                registered.remove(index);
                return true;
            }
        }
        false
    }

    /// 按注册顺序同步调用处理函数
    ///
    /// 调用前先复制快照并释放锁，处理函数内部可以再注册或移除处理函数。
    pub(crate) fn dispatch(&self, event: &ClientEvent) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            handlers
                .get(&event.kind())
                .map(|registered| registered.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        for handler in snapshot {
            handler(event);
        }
    }
}
