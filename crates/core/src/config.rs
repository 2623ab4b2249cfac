//! Provider configuration.

use thiserror::Error;
use webprefs_domain::constants::{DEFAULT_FAILURE_THRESHOLD, REQUEST_QUEUE_CAPACITY};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration for a [`crate::Provider`].
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Accumulated failure severity that permanently trips the provider.
    pub failure_threshold: u32,
    /// Capacity of the outbound request queue.
    pub queue_capacity: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            queue_capacity: REQUEST_QUEUE_CAPACITY,
        }
    }
}

impl ProviderConfig {
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "queue_capacity must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`ProviderConfig`].
#[derive(Debug, Default)]
pub struct ProviderConfigBuilder {
    config: Option<ProviderConfig>,
}

impl ProviderConfigBuilder {
    fn config(&mut self) -> &mut ProviderConfig {
        self.config.get_or_insert_with(ProviderConfig::default)
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config().failure_threshold = threshold;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config().queue_capacity = capacity;
        self
    }

    pub fn build(mut self) -> Result<ProviderConfig, ConfigError> {
        let config = self.config().clone();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_constants() {
        let config = ProviderConfig::default();
        assert_eq!(config.failure_threshold, 50);
        assert_eq!(config.queue_capacity, 2048);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides_fields() {
        let config = ProviderConfig::builder()
            .failure_threshold(5)
            .queue_capacity(16)
            .build()
            .expect("valid config");
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.queue_capacity, 16);
    }

    #[test]
    fn zero_threshold_fails_validation() {
        assert!(ProviderConfig::builder().failure_threshold(0).build().is_err());
        assert!(ProviderConfig::builder().queue_capacity(0).build().is_err());
    }
}
