//! Demo server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys: `BIND_ADDR`, `IDM__CLIENT_ID`,
//! `IDM__COOKIE_PASSWORD` and so on.
//!
//! See [`IdmConfig`] for the broker options.

use idm_identity::IdmConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Interval between sweeps of expired store entries, in seconds.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Organisation every demo contact is enrolled in.
    #[serde(default)]
    pub demo: DemoConfig,

    /// Login broker configuration.
    pub idm: IdmConfig,
}

/// Settings for the demo CRM.
#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_org_id")]
    pub org_id: String,
    #[serde(default = "default_org_name")]
    pub org_name: String,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_purge_interval_secs() -> u64 {
    300
}

fn default_org_id() -> String {
    "demo-org".to_string()
}

fn default_org_name() -> String {
    "Demo Organisation".to_string()
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            org_id: default_org_id(),
            org_name: default_org_name(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}
