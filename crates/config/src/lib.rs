//! 统一配置中心
//!
//! 提供服务端与客户端的配置管理，包括：
//! - HTTP 服务监听
//! - 消息存储后端
//! - 广播中心的出站队列
//! - 客户端连接与重连策略
//!
//! 加载顺序：默认值 -> 可选配置文件（`APP_CONFIG_FILE`）-> 环境变量（`APP_*`，层级用 `__` 分隔）。

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub storage: StorageConfig,
    #[validate(nested)]
    pub hub: HubConfig,
    #[validate(nested)]
    pub client: ClientConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    /// 单个请求的最长处理时间
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// 消息存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// 进程内存，仅用于开发和测试
    Memory,
    Postgres,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_storage"))]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ValidationError> {
    if storage.backend == StorageBackend::Postgres
        && storage
            .database_url
            .as_deref()
            .map_or(true, |url| url.trim().is_empty())
    {
        return Err(ValidationError::new("postgres_requires_database_url"));
    }
    Ok(())
}

/// 广播中心配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HubConfig {
    /// 每个连接的出站队列容量，队列满时丢弃该连接的新事件
    #[validate(range(min = 1, max = 65536))]
    pub outbound_capacity: usize,
}

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClientConfig {
    #[validate(url)]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub hub_path: String,
    #[validate(range(min = 1))]
    pub connect_timeout_ms: u64,
    #[validate(nested)]
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// 自动重连策略：指数退避，达到上限后放弃
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    #[validate(range(min = 1))]
    pub base_delay_ms: u64,
    #[validate(range(min = 1))]
    pub max_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                request_timeout_ms: 10_000,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                database_url: None,
                max_connections: 5,
            },
            hub: HubConfig {
                outbound_capacity: 256,
            },
            client: ClientConfig::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".into(),
            hub_path: "/chathub".into(),
            connect_timeout_ms: 5_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl AppConfig {
    /// 组装默认的配置来源
    pub fn figment() -> Figment {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(Env::prefixed("APP_").split("__"))
    }

    /// 按默认顺序加载并验证配置
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|err| ConfigError::Load(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 在默认值之上叠加一段 TOML 文本
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(AppConfig::default()))
                .merge(Toml::string(source)),
        )
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
