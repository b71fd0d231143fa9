//! Compile cache configuration.
//!
//! Controlled by the `[cache]` section of `tplstore.toml`.

use std::time::Duration;

const DEFAULT_TTL_SECONDS: u64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a compiled entry stays live after it was filled.
    pub ttl: Duration,
    /// How often the sweeper purges expired slots.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            ttl: Duration::from_secs(settings.ttl_seconds.get()),
            sweep_interval: Duration::from_secs(settings.sweep_interval_seconds.get()),
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use super::*;
    use crate::config::CacheSettings;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(600));
    }

    #[test]
    fn from_settings_converts_seconds() {
        let settings = CacheSettings {
            ttl_seconds: NonZeroU64::new(5).unwrap(),
            sweep_interval_seconds: NonZeroU64::new(7).unwrap(),
        };
        let config = CacheConfig::from(&settings);
        assert_eq!(config.ttl, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Duration::from_secs(7));
    }
}
