//! Provider seams for fixtures, odds and team averages.

use async_trait::async_trait;
use time::Date;

use crate::error::FetchError;
use crate::market::{Match, OddsEvent, TeamStats};

/// Source of scheduled fixtures.
#[async_trait]
pub trait FixtureProvider: Send + Sync {
    /// Provider name used in logs, metrics and cache keys.
    fn name(&self) -> &str;

    /// Fixtures kicking off on `date` (UTC).
    async fn fixtures_on(&self, date: Date) -> Result<Vec<Match>, FetchError>;
}

/// Source of raw bookmaker odds.
#[async_trait]
pub trait OddsProvider: Send + Sync {
    /// Provider name used in logs, metrics and cache keys.
    fn name(&self) -> &str;

    /// Upcoming events for a sport key, with every bookmaker's prices.
    async fn odds_for(&self, sport: &str) -> Result<Vec<OddsEvent>, FetchError>;
}

/// Source of per-team scoring averages.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Provider name used in logs, metrics and cache keys.
    fn name(&self) -> &str;

    /// Season averages for a team, `None` when the provider does not know it.
    async fn team_stats(&self, team: &str, competition: &str) -> Result<Option<TeamStats>, FetchError>;
}
