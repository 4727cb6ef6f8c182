//! 推送通道端点解析

use reqwest::Url;

use crate::error::ClientError;

/// 由 HTTP 基础地址推导推送通道地址：`http` 换成 `ws`，`https` 换成 `wss`
pub fn derive_hub_url(base: &Url, hub_path: &str) -> Result<Url, ClientError> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::InvalidEndpoint(format!(
                "unsupported scheme {other} in {base}"
            )))
        }
    };

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|()| ClientError::InvalidEndpoint(format!("cannot use {scheme} for {base}")))?;
    url.set_path(hub_path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// 探测服务端实际地址后再推导推送通道地址
///
/// 请求 `{base}/chat/messages`，取跟随重定向后的最终响应地址的源（协议、主机、端口）。
/// 探测失败时退回到直接由 `base` 推导。
pub async fn resolve_hub_url(
    http: &reqwest::Client,
    base: &Url,
    hub_path: &str,
) -> Result<Url, ClientError> {
    match probe_origin(http, base).await {
        Ok(origin) => {
            tracing::debug!(origin = %origin, "已解析服务端地址");
            derive_hub_url(&origin, hub_path)
        }
        Err(err) => {
            tracing::warn!(base = %base, error = %err, "服务端地址探测失败，使用配置的地址");
            derive_hub_url(base, hub_path)
        }
    }
}

async fn probe_origin(http: &reqwest::Client, base: &Url) -> Result<Url, ClientError> {
    let probe = base
        .join("chat/messages")
        .map_err(|err| ClientError::InvalidEndpoint(err.to_string()))?;
    let response = http.get(probe).send().await?.error_for_status()?;

    let mut origin = response.url().clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    Ok(origin)
}
