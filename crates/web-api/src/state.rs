use std::sync::Arc;
use std::time::Duration;

use application::ChatService;
use infrastructure::BroadcastHub;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub hub: Arc<BroadcastHub>,
    /// 进程关闭令牌，每个请求派生子令牌
    pub shutdown: CancellationToken,
    /// 每个推送连接的出站队列容量
    pub outbound_capacity: usize,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        hub: Arc<BroadcastHub>,
        shutdown: CancellationToken,
        outbound_capacity: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            chat_service,
            hub,
            shutdown,
            outbound_capacity,
            request_timeout,
        }
    }

    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
