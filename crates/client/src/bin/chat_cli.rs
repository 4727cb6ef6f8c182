//! 命令行聊天客户端
//!
//! 用法：`chat-cli <用户名>`。标准输入的每一行作为一条消息发送，Ctrl-C 退出。

use anyhow::Context;
use chat_client::{ChatApiClient, ClientConnector, ClientEvent, ConnectorOptions, EventKind};
use config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::MessageReceived(message) => println!(
            "[{}] {}: {}",
            message.created_at.format("%H:%M:%S"),
            message.sender,
            message.body
        ),
        ClientEvent::UserJoined(username) => println!("* {username} joined"),
        ClientEvent::UserLeft(username) => println!("* {username} left"),
        ClientEvent::Reconnecting => println!("* reconnecting..."),
        ClientEvent::Reconnected => println!("* reconnected"),
        ClientEvent::Closed(reason) => {
            println!("* connection closed: {}", reason.as_deref().unwrap_or("unknown"))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let username = std::env::args()
        .nth(1)
        .context("usage: chat-cli <username>")?;
    let config = AppConfig::load()?;
    let options = ConnectorOptions::from_config(&config.client)?;
    let api = ChatApiClient::new(&options.base_url)?;

    for message in api.get_messages().await?.iter().rev() {
        print_event(&ClientEvent::MessageReceived(message.clone()));
    }

    let connector = ClientConnector::new(options)?;
    for kind in [
        EventKind::MessageReceived,
        EventKind::UserJoined,
        EventKind::UserLeft,
        EventKind::Reconnecting,
        EventKind::Reconnected,
        EventKind::Closed,
    ] {
        connector.on(kind, print_event);
    }
    connector.start().await?;
    connector.join(&username).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(err) = api.send_message(&username, &line).await {
                    eprintln!("send failed: {err}");
                }
            }
        }
    }

    connector.leave(&username).await?;
    connector.stop().await;
    Ok(())
}
