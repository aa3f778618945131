//! Engine configuration types.

use std::time::Duration;

/// Default interval between keepalive checks.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Default time an IDLE may stay open before it is refreshed.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(300);

/// Default value at which the numeric tag counter wraps back to zero.
pub const DEFAULT_TAG_CEILING: u64 = 1 << 53;

/// Default maximum size of a buffered literal (100 MiB).
pub const DEFAULT_MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Default maximum length of a single response line (1 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Default amount of undelivered body data before reading pauses (64 KiB).
pub const DEFAULT_BODY_HIGH_WATER: usize = 64 * 1024;

/// Keepalive behaviour while the connection is otherwise quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    /// How often the keepalive timer fires.
    pub interval: Duration,
    /// How long one IDLE may run before DONE is sent and IDLE re-entered.
    pub idle_interval: Duration,
    /// Use NOOP even when the server supports IDLE.
    pub force_noop: bool,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            interval: DEFAULT_KEEPALIVE_INTERVAL,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            force_noop: false,
        }
    }
}

/// IMAP engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Keepalive settings, or `None` to disable NOOP/IDLE keepalive.
    pub keepalive: Option<Keepalive>,
    /// Value at which the numeric tag counter wraps.
    pub tag_ceiling: u64,
    /// Largest literal the parser will buffer.
    pub max_literal_size: usize,
    /// Longest response line the parser will buffer.
    pub max_line_length: usize,
    /// Unread bytes a streamed body may hold before parsing pauses; used by
    /// [`Engine::streaming_observer`](crate::session::Engine::streaming_observer).
    pub body_high_water: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keepalive: Some(Keepalive::default()),
            tag_ceiling: DEFAULT_TAG_CEILING,
            max_literal_size: DEFAULT_MAX_LITERAL_SIZE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            body_high_water: DEFAULT_BODY_HIGH_WATER,
        }
    }
}

impl Config {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for engine configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the keepalive timer interval, enabling keepalive if disabled.
    #[must_use]
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive.get_or_insert_with(Keepalive::default).interval = interval;
        self
    }

    /// Sets how long one IDLE may run, enabling keepalive if disabled.
    #[must_use]
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive.get_or_insert_with(Keepalive::default).idle_interval = interval;
        self
    }

    /// Forces NOOP keepalives even when IDLE is available.
    #[must_use]
    pub fn force_noop(mut self, force: bool) -> Self {
        self.config.keepalive.get_or_insert_with(Keepalive::default).force_noop = force;
        self
    }

    /// Disables keepalive entirely.
    #[must_use]
    pub fn no_keepalive(mut self) -> Self {
        self.config.keepalive = None;
        self
    }

    /// Sets the tag counter ceiling.
    #[must_use]
    pub const fn tag_ceiling(mut self, ceiling: u64) -> Self {
        self.config.tag_ceiling = ceiling;
        self
    }

    /// Sets the largest literal the parser will buffer.
    #[must_use]
    pub const fn max_literal_size(mut self, size: usize) -> Self {
        self.config.max_literal_size = size;
        self
    }

    /// Sets the longest response line the parser will buffer.
    #[must_use]
    pub const fn max_line_length(mut self, length: usize) -> Self {
        self.config.max_line_length = length;
        self
    }

    /// Sets how many unread body bytes pause parsing.
    #[must_use]
    pub const fn body_high_water(mut self, bytes: usize) -> Self {
        self.config.body_high_water = bytes;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        let mut config = self.config;
        config.tag_ceiling = config.tag_ceiling.max(1);
        config
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new();
        let keepalive = config.keepalive.unwrap();
        assert_eq!(keepalive.interval, Duration::from_secs(10));
        assert_eq!(keepalive.idle_interval, Duration::from_secs(300));
        assert!(!keepalive.force_noop);
        assert_eq!(config.tag_ceiling, 9_007_199_254_740_992);
        assert_eq!(config.max_line_length, 1024 * 1024);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .idle_interval(Duration::from_secs(60))
            .force_noop(true)
            .tag_ceiling(100)
            .max_literal_size(1024)
            .build();
        let keepalive = config.keepalive.unwrap();
        assert_eq!(keepalive.idle_interval, Duration::from_secs(60));
        assert!(keepalive.force_noop);
        assert_eq!(config.tag_ceiling, 100);
        assert_eq!(config.max_literal_size, 1024);
    }

    #[test]
    fn test_config_builder_no_keepalive() {
        let config = Config::builder().no_keepalive().build();
        assert!(config.keepalive.is_none());

        let config = Config::builder().no_keepalive().keepalive_interval(Duration::from_secs(1)).build();
        assert_eq!(config.keepalive.unwrap().interval, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_ceiling_clamped() {
        assert_eq!(Config::builder().tag_ceiling(0).build().tag_ceiling, 1);
    }
}
