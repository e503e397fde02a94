//! Driver configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Settings for [`FixedStepDriver`](crate::driver::FixedStepDriver).
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Milliseconds between ticks. Must be greater than zero.
    pub tick_interval_ms: u64,

    /// Event emitted on every tick.
    pub update_event: String,

    /// Event emitted after the update event, if any.
    pub render_event: Option<String>,

    /// Stop after this many ticks. `None` runs until the root is disposed.
    pub max_ticks: Option<u64>,

    /// Fields copied back from the tick event's subtree to the driver.
    pub global_fields: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            update_event: "update".to_owned(),
            render_event: Some("render".to_owned()),
            max_ticks: None,
            global_fields: Vec::new(),
        }
    }
}

impl DriverConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.update_event.is_empty() {
            return Err(ConfigError::Invalid("update_event must not be empty".to_owned()));
        }
        if self.render_event.as_deref() == Some("") {
            return Err(ConfigError::Invalid("render_event must not be empty".to_owned()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
