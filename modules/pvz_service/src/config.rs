use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the pvz_service module (`modules.pvz_service`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PvzServiceConfig {
    /// Page size of `GET /pvz` when the caller gives none.
    #[serde(default = "default_page_limit")]
    pub default_page_limit: u32,
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u32,
    /// Deadline applied to every engine call made by the transport adapters.
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for PvzServiceConfig {
    fn default() -> Self {
        Self {
            default_page_limit: default_page_limit(),
            max_page_limit: default_max_page_limit(),
            operation_timeout: default_operation_timeout(),
        }
    }
}

fn default_page_limit() -> u32 {
    10
}

fn default_max_page_limit() -> u32 {
    100
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Token signing settings handed over by the host application.
#[derive(Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"***")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}
