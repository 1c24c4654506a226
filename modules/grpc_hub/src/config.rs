use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// gRPC host settings (`grpc` section of the application config).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrpcHubConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// HTTP/2 keepalive ping interval; `None` disables pings.
    #[serde(default = "default_keepalive_interval", with = "humantime_serde")]
    pub keepalive_interval: Option<Duration>,
    #[serde(default = "default_keepalive_timeout", with = "humantime_serde")]
    pub keepalive_timeout: Duration,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl Default for GrpcHubConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            keepalive_interval: default_keepalive_interval(),
            keepalive_timeout: default_keepalive_timeout(),
            tls: None,
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:50051".to_string()
}

fn default_keepalive_interval() -> Option<Duration> {
    Some(Duration::from_secs(60))
}

fn default_keepalive_timeout() -> Duration {
    Duration::from_secs(20)
}
