// Console front end configuration
//
// Design Decision: Plain struct with builders; the binary fills it from clap
// arguments, which already carry the environment fallbacks.

use std::time::Duration;

use anyhow::{bail, Result};
use chatflow::RegistryConfig;

/// Default base URL of the placeholder image service
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://dummyimage.com";

/// Settings for the console router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// How long a `/generate` conversation may run before it is cleared
    pub flow_timeout: Duration,

    /// How often idle flows are evicted
    pub sweep_interval: Duration,

    /// Idle time after which a flow's state is dropped
    pub idle_ttl: Duration,

    /// Base URL the generated image links point at
    pub image_base_url: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            flow_timeout: Duration::from_secs(180),
            sweep_interval: Duration::from_secs(60),
            idle_ttl: Duration::from_secs(600),
            image_base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
        }
    }
}

impl ConsoleConfig {
    pub fn with_flow_timeout(mut self, timeout: Duration) -> Self {
        self.flow_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    pub fn with_image_base_url(mut self, url: impl Into<String>) -> Self {
        self.image_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Reject settings the router cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.flow_timeout.is_zero() {
            bail!("flow timeout must be greater than zero");
        }
        if self.sweep_interval.is_zero() {
            bail!("sweep interval must be greater than zero");
        }
        if self.idle_ttl.is_zero() {
            bail!("idle TTL must be greater than zero");
        }
        if self.image_base_url.is_empty() {
            bail!("image base URL must not be empty");
        }
        Ok(())
    }

    /// Registry settings derived from this configuration
    ///
    /// The registry name still comes from `CHATFLOW_REGISTRY_NAME`; the idle
    /// TTL set here wins over the environment.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::from_env().with_idle_ttl(self.idle_ttl)
    }
}
