#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::{ChatService, ChatServiceDependencies, MessageStore, SystemClock};
use chat_client::{ClientConnector, ClientEvent, ConnectorOptions, EventKind, Url};
use infrastructure::{BroadcastHub, InMemoryMessageTable};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use web_api::{router, AppState};

pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: Arc<BroadcastHub>,
    shutdown: CancellationToken,
}

impl TestServer {
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("base url")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// 以内存消息表启动真实的服务端
pub async fn spawn_server() -> TestServer {
    let hub = Arc::new(BroadcastHub::new());
    let store = Arc::new(MessageStore::new(
        Arc::new(InMemoryMessageTable::new()),
        Arc::new(SystemClock),
    ));
    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        store,
        broadcaster: hub.clone(),
    }));
    let shutdown = CancellationToken::new();
    let state = AppState::new(
        chat_service,
        hub.clone(),
        shutdown.clone(),
        64,
        Duration::from_secs(5),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let signal = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, router(state))
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
            .ok();
    });

    TestServer {
        addr,
        hub,
        shutdown,
    }
}

pub fn fast_options(base_url: Url) -> ConnectorOptions {
    let mut options = ConnectorOptions::new(base_url);
    options.connect_timeout = Duration::from_secs(2);
    options
}

/// 把指定类型的事件转发到通道
pub fn collect(connector: &ClientConnector, kinds: &[EventKind]) -> mpsc::UnboundedReceiver<ClientEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for kind in kinds {
        let tx = tx.clone();
        connector.on(*kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }
    rx
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("event channel closed")
}
