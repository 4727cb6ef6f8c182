use std::ops::ControlFlow;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientInvocation, ConnectionId, CHAT_ROOM};
use futures_util::{SinkExt, StreamExt};
use infrastructure::BroadcastHub;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// 单个推送通道连接
///
/// 建连时在 `BroadcastHub` 注册出站队列，运行期间：
/// - 把出站队列里的帧写入 socket
/// - 解析客户端的 `JoinChat` / `LeaveChat` 调用
/// - 断开时从所有分组中移除
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    connection_id: ConnectionId,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState) -> Self {
        Self {
            socket,
            state,
            connection_id: ConnectionId::generate(),
        }
    }

    pub async fn run(self) {
        let Self {
            socket,
            state,
            connection_id,
        } = self;

        let mut outbound = state
            .hub
            .register(connection_id, state.outbound_capacity)
            .await;
        let cancel = state.request_token();
        let (mut sender, mut incoming) = socket.split();

        let mut send_task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = sender.send(WsMessage::Close(None)).await;
                            break;
                        }
                        frame = outbound.recv() => {
                            let Some(frame) = frame else {
                                break;
                            };
                            if sender.send(WsMessage::Text(frame.as_ref().into())).await.is_err() {
                                tracing::warn!(connection_id = %connection_id, "推送帧写入失败");
                                break;
                            }
                        }
                    }
                }
                tracing::debug!(connection_id = %connection_id, "WebSocket发送任务结束");
            }
        });

        let mut recv_task = tokio::spawn({
            let hub = state.hub.clone();
            let cancel = cancel.clone();
            async move {
                while let Some(Ok(message)) = incoming.next().await {
                    if handle_incoming(message, &hub, connection_id, &cancel)
                        .await
                        .is_break()
                    {
                        break;
                    }
                }
                tracing::debug!(connection_id = %connection_id, "WebSocket接收任务结束");
            }
        });

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }
        cancel.cancel();

        state.hub.on_disconnect(connection_id).await;
        tracing::info!(connection_id = %connection_id, "WebSocket连接已断开");
    }
}

async fn handle_incoming(
    message: WsMessage,
    hub: &Arc<BroadcastHub>,
    connection_id: ConnectionId,
    cancel: &CancellationToken,
) -> ControlFlow<()> {
    match message {
        WsMessage::Text(text) => match ClientInvocation::from_frame(text.as_str()) {
            Ok(ClientInvocation::JoinChat(username)) => {
                if let Err(err) = hub.join(connection_id, CHAT_ROOM, &username, cancel).await {
                    tracing::warn!(connection_id = %connection_id, error = %err, "加入聊天室失败");
                }
            }
            Ok(ClientInvocation::LeaveChat(username)) => {
                if let Err(err) = hub.leave(connection_id, CHAT_ROOM, &username, cancel).await {
                    tracing::warn!(connection_id = %connection_id, error = %err, "离开聊天室失败");
                }
            }
            Err(err) => {
                tracing::warn!(connection_id = %connection_id, error = %err, "忽略无法解析的客户端帧");
            }
        },
        WsMessage::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "收到关闭帧");
            return ControlFlow::Break(());
        }
        // ping 由底层 socket 自动应答
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) => {}
    }
    ControlFlow::Continue(())
}
