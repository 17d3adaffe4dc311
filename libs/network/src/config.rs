//! Server configuration
//!
//! Every section carries serde defaults so a config file only has to name
//! what it overrides. [`ServerConfig::validate`] rejects values the server
//! cannot run with before any socket is bound.

use crate::error::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Hard ceiling for `max_frame_size`
pub const MAX_FRAME_SIZE_LIMIT: usize = 1024 * 1024 * 1024;

/// Where the server accepts connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ListenAddress {
    Tcp { address: SocketAddr },
    Unix { path: PathBuf },
}

impl Default for ListenAddress {
    fn default() -> Self {
        Self::Tcp {
            address: SocketAddr::from(([127, 0, 0, 1], 7400)),
        }
    }
}

impl std::fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp { address } => write!(f, "tcp://{address}"),
            Self::Unix { path } => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Order in which responses are written back on one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseOrdering {
    /// Write each response as soon as its request completes
    #[default]
    Completion,
    /// Hold early completions until every earlier request has been answered
    Receipt,
}

/// Latency/throughput tracker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Number of most recent samples averaged
    pub window_size: usize,
    /// Length of one throughput counting window
    pub rate_interval_ms: u64,
    /// Period of the stats log line; 0 disables it
    pub report_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            rate_interval_ms: 1000,
            report_interval_secs: 60,
        }
    }
}

impl StatsConfig {
    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.rate_interval_ms)
    }

    pub fn report_interval(&self) -> Option<Duration> {
        (self.report_interval_secs > 0).then(|| Duration::from_secs(self.report_interval_secs))
    }
}

/// Business-logic worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub worker_threads: usize,
    /// Handlers allowed to run concurrently
    pub max_in_flight: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            max_in_flight: 1024,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: ListenAddress,
    /// Largest accepted length-prefixed frame, in bytes
    pub max_frame_size: usize,
    pub response_ordering: ResponseOrdering,
    pub stats: StatsConfig,
    pub executor: ExecutorConfig,
    /// Connections beyond this are refused at accept time
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ListenAddress::default(),
            max_frame_size: 16 * 1024 * 1024,
            response_ordering: ResponseOrdering::default(),
            stats: StatsConfig::default(),
            executor: ExecutorConfig::default(),
            max_connections: 1024,
        }
    }
}

impl ServerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_size == 0 {
            return Err(TransportError::configuration(
                "Max frame size must be greater than 0",
                Some("max_frame_size"),
            ));
        }

        if self.max_frame_size > MAX_FRAME_SIZE_LIMIT {
            return Err(TransportError::configuration(
                format!("Max frame size cannot exceed {MAX_FRAME_SIZE_LIMIT} bytes"),
                Some("max_frame_size"),
            ));
        }

        if self.stats.window_size == 0 {
            return Err(TransportError::configuration(
                "Stats window size must be greater than 0",
                Some("stats.window_size"),
            ));
        }

        if self.stats.rate_interval_ms == 0 {
            return Err(TransportError::configuration(
                "Rate interval must be greater than 0",
                Some("stats.rate_interval_ms"),
            ));
        }

        if self.executor.worker_threads == 0 {
            return Err(TransportError::configuration(
                "Executor needs at least one worker thread",
                Some("executor.worker_threads"),
            ));
        }

        if self.executor.max_in_flight == 0 {
            return Err(TransportError::configuration(
                "Max in-flight requests must be greater than 0",
                Some("executor.max_in_flight"),
            ));
        }

        if self.max_connections == 0 {
            return Err(TransportError::configuration(
                "Max connections must be greater than 0",
                Some("max_connections"),
            ));
        }

        if let ListenAddress::Unix { path } = &self.listen {
            if path.as_os_str().is_empty() {
                return Err(TransportError::configuration(
                    "Unix socket path cannot be empty",
                    Some("listen.path"),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stats.window_size, 100);
        assert_eq!(config.response_ordering, ResponseOrdering::Completion);
    }

    #[test]
    fn test_validation_names_the_field() {
        let mut config = ServerConfig::default();
        config.max_frame_size = 0;

        match config.validate() {
            Err(TransportError::Configuration { field, .. }) => {
                assert_eq!(field.as_deref(), Some("max_frame_size"));
            }
            other => panic!("Expected configuration error, got {other:?}"),
        }

        config.max_frame_size = MAX_FRAME_SIZE_LIMIT + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_report_interval_disables_reporting() {
        let stats = StatsConfig {
            report_interval_secs: 0,
            ..StatsConfig::default()
        };
        assert_eq!(stats.report_interval(), None);
        assert_eq!(stats.rate_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_listen_address_serde_shape() {
        let json = r#"{"transport":"unix","path":"/tmp/rpc.sock"}"#;
        let listen: ListenAddress = serde_json::from_str(json).unwrap();
        assert_eq!(
            listen,
            ListenAddress::Unix {
                path: PathBuf::from("/tmp/rpc.sock")
            }
        );
        assert_eq!(listen.to_string(), "unix:///tmp/rpc.sock");

        let partial: ServerConfig =
            serde_json::from_str(r#"{"response_ordering":"receipt"}"#).unwrap();
        assert_eq!(partial.response_ordering, ResponseOrdering::Receipt);
        assert_eq!(partial.max_connections, 1024);
    }
}
