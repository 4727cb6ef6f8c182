#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::{ChatService, ChatServiceDependencies, MessageStore, SystemClock};
use futures_util::StreamExt;
use infrastructure::{BroadcastHub, InMemoryMessageTable};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: Arc<BroadcastHub>,
    shutdown: CancellationToken,
}

impl TestServer {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/chathub", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// 以内存消息表构造应用状态
pub fn build_state(shutdown: CancellationToken) -> AppState {
    let hub = Arc::new(BroadcastHub::new());
    let store = Arc::new(MessageStore::new(
        Arc::new(InMemoryMessageTable::new()),
        Arc::new(SystemClock),
    ));
    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        store,
        broadcaster: hub.clone(),
    }));
    AppState::new(chat_service, hub, shutdown, 64, Duration::from_secs(5))
}

/// 启动一个真实的服务端
pub async fn spawn_server() -> TestServer {
    let shutdown = CancellationToken::new();
    let state = build_state(shutdown.clone());
    let hub = state.hub.clone();

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

/// 读取下一帧文本事件
pub async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

/// 在给定时间内没有收到任何文本帧
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(window, ws.next()).await {
        panic!("unexpected frame: {text}");
    }
}
