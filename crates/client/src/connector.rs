//! 推送连接的状态机
//!
//! `Disconnected → Connecting → Connected`；传输中断后进入 `Reconnecting`，
//! 重连成功回到 `Connected` 并自动重新加入聊天室，重试耗尽则回到 `Disconnected`
//! 并分发 `Closed` 事件。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use config::ClientConfig;
use domain::{ClientInvocation, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoint::resolve_hub_url;
use crate::error::ClientError;
use crate::handlers::{ClientEvent, EventKind, HandlerId, HandlerRegistry};
use crate::reconnect::ReconnectPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    pub base_url: Url,
    pub hub_path: String,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ConnectorOptions {
    pub fn new(base_url: Url) -> Self {
        let defaults = ClientConfig::default();
        Self {
            base_url,
            hub_path: defaults.hub_path.clone(),
            connect_timeout: defaults.connect_timeout(),
            reconnect: ReconnectPolicy::from(&defaults.reconnect),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|err| ClientError::InvalidEndpoint(format!("{}: {err}", config.base_url)))?;
        Ok(Self {
            base_url,
            hub_path: config.hub_path.clone(),
            connect_timeout: config.connect_timeout(),
            reconnect: ReconnectPolicy::from(&config.reconnect),
        })
    }
}

/// 连接器与后台任务共享的状态
struct Shared {
    handlers: HandlerRegistry,
    state: watch::Sender<ConnectionState>,
    username: Mutex<Option<String>>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "连接状态变更");
        }
    }

    /// 为新的传输连接安装出站队列
    fn attach(&self) -> mpsc::Receiver<String> {
        let (sender, receiver) = mpsc::channel(OUTBOUND_CAPACITY);
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
        receiver
    }

    fn detach(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn outbound_sender(&self) -> Option<mpsc::Sender<String>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember(&self, username: Option<String>) {
        *self.username.lock().unwrap_or_else(PoisonError::into_inner) = username;
    }

    fn remembered(&self) -> Option<String> {
        self.username
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ClientConnector {
    options: ConnectorOptions,
    http: reqwest::Client,
    shared: Arc<Shared>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl ClientConnector {
    pub fn new(options: ConnectorOptions) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.connect_timeout)
            .build()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            options,
            http,
            shared: Arc::new(Shared {
                handlers: HandlerRegistry::default(),
                state,
                username: Mutex::new(None),
                outbound: Mutex::new(None),
            }),
            session: tokio::sync::Mutex::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// 注册事件处理函数，处理函数在连接的后台任务中同步执行
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.shared.handlers.register(kind, handler)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.shared.handlers.remove(id)
    }

    /// 解析端点并建立连接
    ///
    /// 已在运行时直接返回。首次连接失败不会自动重试，错误交给调用方。
    pub async fn start(&self) -> Result<(), ClientError> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("连接器已在运行");
            return Ok(());
        }

        self.shared.set_state(ConnectionState::Connecting);
        let connected = async {
            let url = resolve_hub_url(&self.http, &self.options.base_url, &self.options.hub_path)
                .await?;
            let ws = connect(&url, self.options.connect_timeout).await?;
            Ok::<_, ClientError>((url, ws))
        }
        .await;
        let (url, ws) = match connected {
            Ok(connected) => connected,
            Err(err) => {
                self.shared.set_state(ConnectionState::Disconnected);
                warn!(error = %err, "推送通道连接失败");
                return Err(err);
            }
        };

        let outbound = self.shared.attach();
        self.shared.set_state(ConnectionState::Connected);
        info!(url = %url, "推送通道已连接");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(
            self.shared.clone(),
            ws,
            outbound,
            url,
            self.options.clone(),
            cancel.clone(),
        ));
        *session = Some(Session { cancel, task });
        Ok(())
    }

    /// 关闭连接并等待后台任务退出
    pub async fn stop(&self) {
        let session = self.session.lock().await.take();
        if let Some(Session { cancel, task }) = session {
            cancel.cancel();
            if let Err(err) = task.await {
                warn!(error = %err, "连接任务异常退出");
            }
        }
        self.shared.detach();
        self.shared.set_state(ConnectionState::Disconnected);
        info!("推送通道已关闭");
    }

    /// 加入聊天室，重连后会自动以同一用户名重新加入
    ///
    /// 未连接时只记录诊断日志并返回成功。
    pub async fn join(&self, username: &str) -> Result<(), ClientError> {
        let frame = ClientInvocation::JoinChat(username.to_owned()).to_frame()?;
        if self.send_when_connected("JoinChat", frame).await {
            self.shared.remember(Some(username.to_owned()));
        }
        Ok(())
    }

    pub async fn leave(&self, username: &str) -> Result<(), ClientError> {
        let frame = ClientInvocation::LeaveChat(username.to_owned()).to_frame()?;
        if self.send_when_connected("LeaveChat", frame).await {
            self.shared.remember(None);
        }
        Ok(())
    }

    async fn send_when_connected(&self, invocation: &'static str, frame: String) -> bool {
        let state = self.state();
        if state == ConnectionState::Connected {
            if let Some(sender) = self.shared.outbound_sender() {
                if sender.send(frame).await.is_ok() {
                    return true;
                }
            }
        }
        warn!(
            invocation,
            state = ?state,
            "ConnectionNotReady: 推送通道未连接，忽略调用"
        );
        false
    }
}

impl Drop for ClientConnector {
    /// 未调用 `stop()` 就被丢弃时，通知后台任务关闭连接
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}

async fn connect(url: &Url, timeout: Duration) -> Result<WsStream, ClientError> {
    let (ws, _) = tokio::time::timeout(timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| ClientError::Timeout(timeout))??;
    Ok(ws)
}

enum SessionEnd {
    Stopped,
    Lost(String),
}

/// 后台任务：驱动当前连接，断线后按策略重连
async fn supervise(
    shared: Arc<Shared>,
    mut ws: WsStream,
    mut outbound: mpsc::Receiver<String>,
    url: Url,
    options: ConnectorOptions,
    cancel: CancellationToken,
) {
    loop {
        let reason = match drive(&shared, ws, outbound, &cancel).await {
            SessionEnd::Stopped => return,
            SessionEnd::Lost(reason) => reason,
        };
        shared.detach();
        if cancel.is_cancelled() {
            return;
        }

        warn!(reason = %reason, "推送通道中断，开始重连");
        shared.set_state(ConnectionState::Reconnecting);
        shared.handlers.dispatch(&ClientEvent::Reconnecting);

        let Some(mut next) = reconnect(&url, &options, &cancel).await else {
            if cancel.is_cancelled() {
                return;
            }
            warn!(attempts = options.reconnect.max_attempts, "重连次数耗尽，放弃连接");
            shared.set_state(ConnectionState::Disconnected);
            shared.handlers.dispatch(&ClientEvent::Closed(Some(reason)));
            return;
        };

        if let Some(username) = shared.remembered() {
            match ClientInvocation::JoinChat(username.clone()).to_frame() {
                Ok(frame) => {
                    if let Err(err) = next.send(Message::text(frame)).await {
                        warn!(error = %err, "重新加入聊天室失败");
                    } else {
                        debug!(username = %username, "已重新加入聊天室");
                    }
                }
                Err(err) => warn!(error = %err, "无法编码 JoinChat"),
            }
        }

        ws = next;
        outbound = shared.attach();
        shared.set_state(ConnectionState::Connected);
        info!(url = %url, "推送通道已重连");
        shared.handlers.dispatch(&ClientEvent::Reconnected);
    }
}

async fn drive(
    shared: &Shared,
    ws: WsStream,
    mut outbound: mpsc::Receiver<String>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Stopped;
            }
            Some(frame) = outbound.recv() => {
                if let Err(err) = sink.send(Message::text(frame)).await {
                    return SessionEnd::Lost(err.to_string());
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_frame(shared, text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| frame.reason.to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "closed by server".to_owned());
                    return SessionEnd::Lost(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return SessionEnd::Lost(err.to_string()),
                None => return SessionEnd::Lost("connection closed".to_owned()),
            }
        }
    }
}

fn handle_frame(shared: &Shared, text: &str) {
    match ServerEvent::from_frame(text) {
        Ok(event) => shared.handlers.dispatch(&ClientEvent::from(event)),
        Err(err) => warn!(error = %err, "忽略无法解析的服务端帧"),
    }
}

/// 按退避策略重连，取消或重试耗尽时返回 `None`
async fn reconnect(
    url: &Url,
    options: &ConnectorOptions,
    cancel: &CancellationToken,
) -> Option<WsStream> {
    let policy = &options.reconnect;
    for attempt in 1..=policy.max_attempts {
        let delay = policy.backoff.delay_at(attempt);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            connected = connect(url, options.connect_timeout) => connected,
        };
        match connected {
            Ok(ws) => return Some(ws),
            Err(err) => warn!(attempt, max_attempts = policy.max_attempts, error = %err, "重连失败"),
        }
    }
    None
}
