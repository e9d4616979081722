//! Settings for the connection to the real API.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Accept any upstream certificate (self-signed development APIs)
    #[serde(default)]
    pub tls_skip_verify: bool,
}

const MAX_IDLE_PER_HOST: usize = 100;
const IDLE_TIMEOUT_SECS: u64 = 90;
const KEEPALIVE_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Pooling of forwarded connections. Every field may be omitted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    pub max_idle_per_host: usize,
    pub idle_timeout_secs: u64,
    pub keepalive_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: MAX_IDLE_PER_HOST,
            idle_timeout_secs: IDLE_TIMEOUT_SECS,
            keepalive_timeout_secs: KEEPALIVE_SECS,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
        }
    }
}

impl ConnectionPoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_pool_keeps_other_defaults() {
        let pool: ConnectionPoolConfig = serde_yaml::from_str("connect_timeout_secs: 2").unwrap();
        assert_eq!(pool.connect_timeout(), Duration::from_secs(2));
        assert_eq!(pool.idle_timeout(), Duration::from_secs(90));
        assert_eq!(pool.keepalive(), Duration::from_secs(60));
        assert_eq!(pool.max_idle_per_host, 100);
    }
}
