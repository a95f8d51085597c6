//! Cached, retried access to every external data source.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use time::Date;
use tracing::{debug, instrument, warn};

use super::cache::{fixtures_key, odds_key, team_stats_key, Cache, CacheTtls, Clock};
use super::provider::{FixtureProvider, OddsProvider, StatsProvider};
use super::retry::RetryPolicy;
use crate::error::FetchError;
use crate::market::{Match, OddsEvent, TeamStats};
use crate::metrics;

/// Payloads that can come back empty. Empty results are not cached.
trait Payload: Serialize + DeserializeOwned + Default {
    fn is_empty(&self) -> bool;
}

impl<T: Serialize + DeserializeOwned> Payload for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl<T: Serialize + DeserializeOwned> Payload for Option<T> {
    fn is_empty(&self) -> bool {
        self.is_none()
    }
}

/// Providers plus the cache, clock and retry policy wrapped around them.
///
/// Every method degrades to an empty result when the data is unavailable,
/// whatever the cause.
#[derive(Clone)]
pub struct DataAccess {
    fixtures: Arc<dyn FixtureProvider>,
    odds: Arc<dyn OddsProvider>,
    stats: Arc<dyn StatsProvider>,
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    ttls: CacheTtls,
}

impl DataAccess {
    /// Wire providers to a cache and clock with default retry and TTLs.
    pub fn new(
        fixtures: Arc<dyn FixtureProvider>,
        odds: Arc<dyn OddsProvider>,
        stats: Arc<dyn StatsProvider>,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fixtures,
            odds,
            stats,
            cache,
            clock,
            retry: RetryPolicy::default(),
            ttls: CacheTtls::default(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the cache TTLs.
    pub fn with_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    /// The injected clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn cached<T, F, Fut>(
        &self,
        kind: &'static str,
        key: String,
        ttl: Duration,
        provider: &str,
        fetch: F,
    ) -> T
    where
        T: Payload,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        if let Some(value) = self.cache.get(&key) {
            match serde_json::from_value::<T>(value) {
                Ok(hit) => {
                    metrics::inc_cache_hit(kind);
                    debug!(key = %key, "Cache hit");
                    return hit;
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding undecodable cache entry"),
            }
        }
        metrics::inc_cache_miss(kind);

        match self.retry.execute(provider, fetch).await {
            Ok(fresh) => {
                if !fresh.is_empty() {
                    match serde_json::to_value(&fresh) {
                        Ok(value) => self.cache.set(&key, value, ttl),
                        Err(e) => warn!(key = %key, error = %e, "Could not cache payload"),
                    }
                }
                fresh
            }
            Err(e) => {
                metrics::inc_fetch_exhausted(provider);
                warn!(provider, key = %key, error = %e, "Data unavailable, continuing with none");
                T::default()
            }
        }
    }

    /// Open and closed fixtures on one day, as the provider reports them.
    #[instrument(skip(self))]
    pub async fn fixtures_on(&self, date: Date) -> Vec<Match> {
        let key = fixtures_key(date, self.clock.now());
        let provider = self.fixtures.name().to_string();
        self.cached("fixtures", key, self.ttls.fixtures, &provider, || {
            self.fixtures.fixtures_on(date)
        })
        .await
    }

    /// Fixtures from today through `days - 1` days ahead, fetched
    /// concurrently. Duplicate ids are dropped.
    #[instrument(skip(self))]
    pub async fn fixtures_ahead(&self, days: u32) -> Vec<Match> {
        let today = self.clock.now().date();
        let dates: Vec<Date> = (0..days.max(1))
            .filter_map(|offset| today.checked_add(time::Duration::days(i64::from(offset))))
            .collect();

        let mut seen = std::collections::HashSet::new();
        join_all(dates.into_iter().map(|date| self.fixtures_on(date)))
            .await
            .into_iter()
            .flatten()
            .filter(|m| seen.insert(m.match_id.clone()))
            .collect()
    }

    /// Raw odds for one sport.
    #[instrument(skip(self))]
    pub async fn odds_for(&self, sport: &str) -> Vec<OddsEvent> {
        let key = odds_key(sport, self.clock.now());
        let provider = self.odds.name().to_string();
        self.cached("odds", key, self.ttls.odds, &provider, || self.odds.odds_for(sport))
            .await
    }

    /// Raw odds for several sports, fetched concurrently and concatenated in
    /// the order given.
    #[instrument(skip(self))]
    pub async fn odds_for_all(&self, sports: &[String]) -> Vec<OddsEvent> {
        join_all(sports.iter().map(|sport| self.odds_for(sport)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Season averages for a team.
    #[instrument(skip(self))]
    pub async fn team_stats(&self, team: &str, competition: &str) -> Option<TeamStats> {
        let key = team_stats_key(competition, team, self.clock.now());
        let provider = self.stats.name().to_string();
        self.cached("team_stats", key, self.ttls.team_stats, &provider, || {
            self.stats.team_stats(team, competition)
        })
        .await
    }
}
