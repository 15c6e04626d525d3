//! Session controller configuration.

use crate::error::{Error, Result};
use crate::types::MAX_INTENSITY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for a [`SessionController`](crate::session::SessionController).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Elapsed-time tick period in milliseconds (default: 1000)
    pub tick_interval_ms: u64,

    /// Number of recent temperature samples kept (default: 30)
    pub temperature_buffer_capacity: usize,

    /// Intensity before the user touches the control (default: 50)
    pub default_intensity: u8,

    /// Temperature shown before the first reading arrives, °C (default: 37.0)
    pub initial_temperature: f64,

    /// Reject intensity changes while no session is active (default: false)
    pub intensity_requires_active: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            temperature_buffer_capacity: 30,
            default_intensity: 50,
            initial_temperature: 37.0,
            intensity_requires_active: false,
        }
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Set the starting intensity
    pub fn with_default_intensity(mut self, intensity: u8) -> Self {
        self.default_intensity = intensity;
        self
    }

    /// Only allow intensity changes during an active session
    pub fn with_intensity_requires_active(mut self, required: bool) -> Self {
        self.intensity_requires_active = required;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::validation("tick_interval_ms", "must be greater than 0"));
        }
        if self.temperature_buffer_capacity == 0 {
            return Err(Error::validation(
                "temperature_buffer_capacity",
                "must be greater than 0",
            ));
        }
        if self.default_intensity > MAX_INTENSITY {
            return Err(Error::validation(
                "default_intensity",
                "must be between 0 and 100",
            ));
        }
        if !self.initial_temperature.is_finite() {
            return Err(Error::validation(
                "initial_temperature",
                "must be a finite number",
            ));
        }
        Ok(())
    }
}
