//! Session configuration.

use std::time::Duration;

use crate::ble::transport::UNNAMED_DEVICE;

/// Tunables for a band session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Interval between heart rate monitoring keep-alives.
    pub keep_alive_period: Duration,
    /// Discovered devices whose name starts with this prefix are ignored.
    pub ignored_name_prefix: String,
    /// Capacity of the command and transport event channels.
    pub channel_capacity: usize,
    /// Capacity of the reading broadcast channel.
    pub reading_capacity: usize,
}

impl SessionConfig {
    /// Default keep-alive period (5 minutes).
    pub const DEFAULT_KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(5 * 60);

    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the keep-alive period.
    pub fn with_keep_alive_period(mut self, period: Duration) -> Self {
        self.keep_alive_period = period;
        self
    }

    /// Set the ignored device name prefix.
    pub fn with_ignored_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_name_prefix = prefix.into();
        self
    }

    /// Set the command and event channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set the reading broadcast capacity.
    pub fn with_reading_capacity(mut self, capacity: usize) -> Self {
        self.reading_capacity = capacity.max(1);
        self
    }

    /// Check whether a device with this name should be listed.
    pub fn accepts_device_name(&self, name: &str) -> bool {
        self.ignored_name_prefix.is_empty() || !name.starts_with(&self.ignored_name_prefix)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_period: Self::DEFAULT_KEEP_ALIVE_PERIOD,
            ignored_name_prefix: UNNAMED_DEVICE.to_string(),
            channel_capacity: 64,
            reading_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.keep_alive_period, Duration::from_secs(300));
        assert_eq!(config.ignored_name_prefix, "Unnamed");
    }

    #[test]
    fn test_accepts_device_name() {
        let config = SessionConfig::default();
        assert!(config.accepts_device_name("MI Band 2"));
        assert!(!config.accepts_device_name("Unnamed"));
        assert!(!config.accepts_device_name("Unnamed device"));

        let config = config.with_ignored_name_prefix("");
        assert!(config.accepts_device_name("Unnamed"));
    }

    #[test]
    fn test_capacity_is_never_zero() {
        let config = SessionConfig::new()
            .with_channel_capacity(0)
            .with_reading_capacity(0);
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.reading_capacity, 1);
    }
}
