use std::{default::Default, env};

use crate::constants::{
    DEBUG_LEVEL_ENV, DEFAULT_CAPTURE_LEN, DEFAULT_MAX_REDIRECTS, DEFAULT_RETRIES,
    DEFAULT_TIMEOUT_MS,
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// Configuration options to tune retry, timeout and diagnostic behavior.
pub struct Config {
    /// Attempts per exchange. Values below 1 are replaced by the default when a context opens.
    pub retries: i32,
    /// Per-attempt timeout in milliseconds, used when a request carries no override.
    pub timeout_ms: i32,
    /// Diagnostic verbosity. 0 is quiet, 2 dumps buffers, 3 also dumps receive addresses.
    pub debug_level: i32,
    /// Report exchange failures at `warn` level even when `debug_level` is 0.
    pub show_errors: bool,
    /// Redirect hops a single request may follow.
    pub max_redirects: u32,
    /// Bytes copied into a capture when the capture is armed without an explicit length.
    pub capture_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            debug_level: 0,
            show_errors: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            capture_len: DEFAULT_CAPTURE_LEN,
        }
    }
}

impl Config {
    /// Default configuration with the debug level taken from the environment.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overrides `debug_level` from `MADRPC_DEBUG_LEVEL` when it holds an integer.
    pub fn with_env(mut self) -> Self {
        if let Some(level) = env::var(DEBUG_LEVEL_ENV).ok().and_then(|v| v.trim().parse().ok()) {
            self.debug_level = level;
        }
        self
    }

    /// Whether failures should be reported loudly.
    #[inline]
    pub fn errors_visible(&self) -> bool {
        self.show_errors || self.debug_level > 0
    }

    /// Whether raw send/receive buffers should be dumped.
    #[inline]
    pub fn dump_buffers(&self) -> bool {
        self.debug_level > 1
    }

    /// Whether receive addresses should be dumped.
    #[inline]
    pub fn dump_addresses(&self) -> bool {
        self.debug_level > 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.retries, 3);
        assert_eq!(config.timeout_ms, 1000);
        assert_eq!(config.max_redirects, 8);
        assert_eq!(config.capture_len, 256);
        assert!(!config.errors_visible());
    }

    #[test]
    fn test_errors_visible_follows_debug_level() {
        let mut config = Config::default();
        config.debug_level = 1;
        assert!(config.errors_visible());
        assert!(!config.dump_buffers());

        config.debug_level = 3;
        assert!(config.dump_buffers());
        assert!(config.dump_addresses());
    }

    #[test]
    fn test_show_errors_independent_of_debug() {
        let mut config = Config::default();
        config.show_errors = true;
        assert!(config.errors_visible());
        assert!(!config.dump_buffers());
    }
}
