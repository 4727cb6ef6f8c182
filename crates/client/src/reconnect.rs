use std::time::Duration;

use config::ReconnectConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Backoff {
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential { base, max }
    }

    /// 第 `attempt` 次重试前的等待时间，从 1 开始计数
    pub fn delay_at(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { base, max } => {
                let exp = std::cmp::min(attempt.saturating_sub(1), 20);
                let factor = 1u32 << exp;
                base.saturating_mul(factor).min(*max)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(value: &ReconnectConfig) -> Self {
        Self {
            max_attempts: value.max_attempts,
            backoff: Backoff::exponential(
                Duration::from_millis(value.base_delay_ms),
                Duration::from_millis(value.max_delay_ms),
            ),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}
