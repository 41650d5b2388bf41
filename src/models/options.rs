//! Query option types and default-option merging.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Retention used when neither the caller nor the client defaults set one.
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// Staleness window used when neither the caller nor the client defaults set one.
pub const DEFAULT_STALE_TIME: Duration = Duration::ZERO;

// == GC Time ==
/// How long an entry is retained once it has no active observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcTime {
    /// Evict after the given duration without observers
    Finite(Duration),
    /// Never evict
    Infinite,
}

impl GcTime {
    /// Shorthand for a finite retention in milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        GcTime::Finite(Duration::from_millis(ms))
    }

    /// Returns the finite duration, or None when unbounded.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            GcTime::Finite(duration) => Some(*duration),
            GcTime::Infinite => None,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, GcTime::Infinite)
    }
}

impl Default for GcTime {
    fn default() -> Self {
        GcTime::Finite(DEFAULT_GC_TIME)
    }
}

impl fmt::Display for GcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcTime::Finite(duration) => write!(f, "{}ms", duration.as_millis()),
            GcTime::Infinite => f.write_str("infinity"),
        }
    }
}

impl FromStr for GcTime {
    type Err = QueryError;

    /// Parses `"infinity"` (or `"inf"`) or a number of milliseconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("infinity") || trimmed.eq_ignore_ascii_case("inf") {
            return Ok(GcTime::Infinite);
        }

        trimmed
            .parse::<u64>()
            .map(GcTime::from_millis)
            .map_err(|_| QueryError::InvalidConfig(format!("invalid gc_time: {:?}", s)))
    }
}

// == Partial Options ==
/// Options where every field is optional; used for defaults and caller overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialQueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_time: Option<GcTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_time: Option<Duration>,
}

impl PartialQueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retention duration.
    pub fn with_gc_time(mut self, gc_time: GcTime) -> Self {
        self.gc_time = Some(gc_time);
        self
    }

    /// Sets the staleness window.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// Layers `overrides` on top of `self`, field by field.
    pub fn merge(&self, overrides: &PartialQueryOptions) -> PartialQueryOptions {
        PartialQueryOptions {
            gc_time: overrides.gc_time.or(self.gc_time),
            stale_time: overrides.stale_time.or(self.stale_time),
        }
    }

    /// Fills any remaining gaps from the built-in baseline.
    pub fn resolve(&self) -> QueryOptions {
        QueryOptions {
            gc_time: self.gc_time.unwrap_or_default(),
            stale_time: self.stale_time.unwrap_or(DEFAULT_STALE_TIME),
        }
    }
}

// == Effective Options ==
/// Fully resolved options attached to an entry at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub gc_time: GcTime,
    pub stale_time: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        PartialQueryOptions::default().resolve()
    }
}

// == Default Options ==
/// Client-level defaults, grouped by entry type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultOptions {
    #[serde(default)]
    pub queries: PartialQueryOptions,
}

impl DefaultOptions {
    pub fn with_queries(queries: PartialQueryOptions) -> Self {
        Self { queries }
    }
}
