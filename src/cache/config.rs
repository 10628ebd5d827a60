//! Cache configuration.
//!
//! Controls the metrics event log and settings freshness via `vellum.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_EVENT_LOG_CAPACITY: usize = 100;

/// Cache configuration from the `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of recent cache events retained for debugging.
    pub event_log_capacity: usize,
    /// Maximum age of loaded settings before async reads reload them.
    /// `None` keeps settings until explicitly invalidated.
    pub settings_ttl_seconds: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            settings_ttl_seconds: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            event_log_capacity: settings.event_log_capacity.get(),
            settings_ttl_seconds: settings.settings_ttl.map(|ttl| ttl.as_secs()),
        }
    }
}

impl CacheConfig {
    /// Returns the event log capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn event_log_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.event_log_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn settings_ttl(&self) -> Option<Duration> {
        self.settings_ttl_seconds.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.event_log_capacity, 100);
        assert!(config.settings_ttl().is_none());
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            event_log_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.event_log_capacity_non_zero().get(), 1);
    }

    #[test]
    fn ttl_converts_to_duration() {
        let config = CacheConfig {
            settings_ttl_seconds: Some(30),
            ..Default::default()
        };
        assert_eq!(config.settings_ttl(), Some(Duration::from_secs(30)));
    }
}
