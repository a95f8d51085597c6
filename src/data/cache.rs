//! TTL cache, injectable clock and cache key layout.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use time::{Date, OffsetDateTime};

use crate::config::Config;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current UTC time.
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    unix_seconds: AtomicI64,
}

impl ManualClock {
    /// Clock frozen at `at` (sub-second precision is dropped).
    pub fn new(at: OffsetDateTime) -> Self {
        Self {
            unix_seconds: AtomicI64::new(at.unix_timestamp()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let secs = i64::try_from(by.as_secs()).unwrap_or(i64::MAX);
        self.unix_seconds.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(self.unix_seconds.load(Ordering::SeqCst))
    }
}

/// Key-value cache of JSON payloads with per-entry TTL.
pub trait Cache: Send + Sync {
    /// Fresh value for `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key` for `ttl`.
    fn set(&self, key: &str, value: Value, ttl: Duration);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: OffsetDateTime,
}

/// In-process cache backed by a concurrent map.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    /// Empty cache reading expiry from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let fresh = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));

        match fresh {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        let ttl = time::Duration::try_from(ttl).unwrap_or(time::Duration::ZERO);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: self.clock.now() + ttl,
            },
        );
    }
}

/// TTL per data kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheTtls {
    /// Fixture listings.
    pub fixtures: Duration,
    /// Team averages.
    pub team_stats: Duration,
    /// Odds.
    pub odds: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Config::default().cache_ttls()
    }
}

fn day_bucket(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

fn hour_bucket(at: OffsetDateTime) -> String {
    format!("{}T{:02}", day_bucket(at.date()), at.hour())
}

fn key_part(raw: &str) -> String {
    raw.trim().to_lowercase().replace(':', "_")
}

/// `fixtures:<date>:<day bucket>`.
pub fn fixtures_key(date: Date, now: OffsetDateTime) -> String {
    format!("fixtures:{}:{}", day_bucket(date), day_bucket(now.date()))
}

/// `team_stats:<competition>:<team>:<day bucket>`.
pub fn team_stats_key(competition: &str, team: &str, now: OffsetDateTime) -> String {
    format!(
        "team_stats:{}:{}:{}",
        key_part(competition),
        key_part(team),
        day_bucket(now.date())
    )
}

/// `odds:<sport>:<hour bucket>`.
pub fn odds_key(sport: &str, now: OffsetDateTime) -> String {
    format!("odds:{}:{}", key_part(sport), hour_bucket(now))
}
