//! Registry configuration

use std::time::Duration;

use crate::error::FlowError;

/// Configuration for a [`FlowRegistry`](crate::FlowRegistry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Name used in log output
    pub name: String,

    /// How long a flow must sit idle before [`evict_idle`] drops it
    ///
    /// `None` disables eviction: flow state is kept for the lifetime of the
    /// registry and only reset between batches.
    ///
    /// [`evict_idle`]: crate::FlowRegistry::evict_idle
    pub idle_ttl: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: "chatflow".to_string(),
            idle_ttl: None,
        }
    }
}

impl RegistryConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from environment variables
    ///
    /// - `CHATFLOW_REGISTRY_NAME`: name used in logs (default: `chatflow`)
    /// - `CHATFLOW_IDLE_TTL_SECS`: idle eviction threshold, `0` or unset disables it
    pub fn from_env() -> Self {
        let name =
            std::env::var("CHATFLOW_REGISTRY_NAME").unwrap_or_else(|_| "chatflow".to_string());

        let idle_ttl = std::env::var("CHATFLOW_IDLE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self { name, idle_ttl }
    }

    /// Set the registry name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable idle eviction after `ttl`
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    /// Disable idle eviction
    pub fn without_idle_ttl(mut self) -> Self {
        self.idle_ttl = None;
        self
    }

    /// Check the configuration for values the registry cannot honour
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.name.trim().is_empty() {
            return Err(FlowError::InvalidConfig("name must not be empty".into()));
        }
        if self.idle_ttl == Some(Duration::ZERO) {
            return Err(FlowError::InvalidConfig(
                "idle_ttl must be greater than zero; use without_idle_ttl() to disable eviction"
                    .into(),
            ));
        }
        Ok(())
    }
}
