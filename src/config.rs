//! Configuration Module
//!
//! Loads client defaults and garbage-collection settings from environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::models::{DefaultOptions, GcTime, PartialQueryOptions, DEFAULT_STALE_TIME};

/// Client configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Retention for entries without observers
    pub default_gc_time: GcTime,
    /// Window during which fetched data is considered fresh
    pub default_stale_time: Duration,
    /// Interval between garbage collection sweeps
    pub gc_interval: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `QUERY_GC_TIME` - Retention in milliseconds, or `infinity` (default: 300000)
    /// - `QUERY_STALE_TIME_MS` - Staleness window in milliseconds (default: 0)
    /// - `GC_INTERVAL_MS` - Sweep frequency in milliseconds (default: 1000)
    ///
    /// Unparseable values, and a zero `GC_INTERVAL_MS`, are logged and
    /// replaced by the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_gc_time: parse_var("QUERY_GC_TIME").unwrap_or(defaults.default_gc_time),
            default_stale_time: parse_var("QUERY_STALE_TIME_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_stale_time),
            gc_interval: parse_var("GC_INTERVAL_MS")
                .and_then(|ms: u64| {
                    if ms == 0 {
                        warn!("Ignoring GC_INTERVAL_MS: interval must be positive");
                        None
                    } else {
                        Some(Duration::from_millis(ms))
                    }
                })
                .unwrap_or(defaults.gc_interval),
        }
    }

    /// Client default options derived from this configuration.
    pub fn default_options(&self) -> DefaultOptions {
        DefaultOptions::with_queries(
            PartialQueryOptions::new()
                .with_gc_time(self.default_gc_time)
                .with_stale_time(self.default_stale_time),
        )
    }
}

/// Reads and parses `name`, warning when it is set but unparseable.
fn parse_var<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let value = env::var(name).ok()?;
    value
        .parse()
        .map_err(|err| warn!("Ignoring {}={:?}: {}", name, value, err))
        .ok()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_gc_time: GcTime::default(),
            default_stale_time: DEFAULT_STALE_TIME,
            gc_interval: Duration::from_secs(1),
        }
    }
}
