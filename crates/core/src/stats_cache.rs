//! Execution-count cache policy.
//!
//! Two tiers hold the same logical count: a device-local tier read
//! synchronously at startup (possibly empty) and the shared
//! `workflow_stats_cache` table. Both use the same time-to-live: an entry
//! whose age is at least the TTL is stale and gets refreshed in the
//! background while the old value keeps being shown.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Default time-to-live of a cached count, in hours.
pub const STATS_TTL_HOURS: i64 = 24;

/// Key prefix of entries in the local tier.
pub const LOCAL_KEY_PREFIX: &str = "workflow_stats_";

pub fn default_ttl() -> chrono::Duration {
    chrono::Duration::hours(STATS_TTL_HOURS)
}

/// Local-tier key for a workflow.
pub fn local_key(workflow_name: &str) -> String {
    format!("{LOCAL_KEY_PREFIX}{workflow_name}")
}

/// Whether an entry cached at `cached_at` must be refreshed at `now`.
///
/// The boundary is inclusive: an entry exactly one TTL old is stale.
pub fn is_stale(cached_at: Timestamp, now: Timestamp, ttl: chrono::Duration) -> bool {
    now - cached_at >= ttl
}

/// Whether the server should go upstream instead of answering from the row.
pub fn should_refresh(
    cached_at: Option<Timestamp>,
    force_refresh: bool,
    now: Timestamp,
    ttl: chrono::Duration,
) -> bool {
    match cached_at {
        _ if force_refresh => true,
        None => true,
        Some(at) => is_stale(at, now, ttl),
    }
}

/// A count together with the time it was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedCount {
    pub count: i64,
    pub cached_at: Timestamp,
}

/// Body of a stats function call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatsRequest {
    #[serde(default)]
    pub workflow_deployment_name: String,
    #[serde(default)]
    pub force_refresh: bool,
}

/// Answer of the stats function. `cached` is true when the count came from
/// the shared tier rather than a fresh upstream query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatsResponse {
    pub count: i64,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Client-side counter state machine
// ---------------------------------------------------------------------------

/// What the counter currently knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterState {
    /// Nothing cached locally and no fetch has succeeded yet.
    Unknown,
    /// A local-tier value is shown while the shared tier is consulted.
    LocalHintShown(CachedCount),
    /// A value younger than the TTL.
    Fresh(CachedCount),
    /// A value at least one TTL old; still shown.
    Stale(CachedCount),
}

/// What to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterDisplay {
    Count(i64),
    /// Pulsing placeholder while the first fetch is outstanding.
    Placeholder,
}

impl CounterState {
    /// State after the synchronous local-tier read.
    pub fn on_mount(local: Option<CachedCount>, now: Timestamp, ttl: chrono::Duration) -> Self {
        match local {
            None => CounterState::Unknown,
            Some(entry) if is_stale(entry.cached_at, now, ttl) => CounterState::Stale(entry),
            Some(entry) => CounterState::LocalHintShown(entry),
        }
    }

    /// State after a successful fetch. A result older than the TTL
    /// (a stale shared-tier row) is kept as [`CounterState::Stale`].
    pub fn on_fetched(self, fetched: CachedCount, now: Timestamp, ttl: chrono::Duration) -> Self {
        if is_stale(fetched.cached_at, now, ttl) {
            CounterState::Stale(fetched)
        } else {
            CounterState::Fresh(fetched)
        }
    }

    /// Age the current value; `Fresh` and `LocalHintShown` become `Stale`
    /// once the TTL has elapsed.
    pub fn on_tick(self, now: Timestamp, ttl: chrono::Duration) -> Self {
        match self {
            CounterState::Fresh(entry) | CounterState::LocalHintShown(entry)
                if is_stale(entry.cached_at, now, ttl) =>
            {
                CounterState::Stale(entry)
            }
            other => other,
        }
    }

    pub fn entry(&self) -> Option<CachedCount> {
        match self {
            CounterState::Unknown => None,
            CounterState::LocalHintShown(entry)
            | CounterState::Fresh(entry)
            | CounterState::Stale(entry) => Some(*entry),
        }
    }

    /// Whether a background refresh should be issued.
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, CounterState::Fresh(_))
    }

    pub fn display(&self) -> CounterDisplay {
        match self.entry() {
            Some(entry) => CounterDisplay::Count(entry.count),
            None => CounterDisplay::Placeholder,
        }
    }
}
