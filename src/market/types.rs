//! Fixture, quote and market types shared across the engine.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Fixture status as reported by the fixture provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
pub enum MatchStatus {
    /// Not started.
    #[default]
    #[strum(serialize = "NS")]
    NotStarted,
    /// Kick-off time to be defined.
    #[strum(serialize = "TBD")]
    TimeToBeDefined,
    /// First half.
    #[strum(serialize = "1H")]
    FirstHalf,
    /// Half time.
    #[strum(serialize = "HT")]
    HalfTime,
    /// Second half.
    #[strum(serialize = "2H")]
    SecondHalf,
    /// Extra time.
    #[strum(serialize = "ET")]
    ExtraTime,
    /// Penalty shoot-out.
    #[strum(serialize = "P")]
    Penalties,
    /// In play, no finer detail.
    #[strum(serialize = "LIVE")]
    Live,
    /// Finished, postponed, cancelled or any other terminal status.
    #[strum(serialize = "OTHER")]
    Other,
}

impl MatchStatus {
    /// Parse a provider short code; unknown codes become [`MatchStatus::Other`].
    pub fn from_code(code: &str) -> Self {
        code.trim().to_uppercase().parse().unwrap_or(MatchStatus::Other)
    }

    /// Scheduled or in progress, i.e. still worth scoring.
    pub fn is_open(&self) -> bool {
        !matches!(self, MatchStatus::Other)
    }
}

/// A football fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Provider-scoped identifier (e.g. "apif_1035001").
    pub match_id: String,
    /// Home team name as the fixture provider spells it.
    pub home_team: String,
    /// Away team name as the fixture provider spells it.
    pub away_team: String,
    /// Competition name.
    pub competition: String,
    /// Kick-off time.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Fixture status.
    pub status: MatchStatus,
}

impl Match {
    /// "Home x Away" label.
    pub fn label(&self) -> String {
        format!("{} x {}", self.home_team, self.away_team)
    }
}

/// Average goals per match for one team.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    /// Goals scored per match.
    pub avg_scored: f64,
    /// Goals conceded per match.
    pub avg_conceded: f64,
}

impl TeamStats {
    /// League-wide fallback used when a provider omits an average.
    pub const FALLBACK_AVERAGE: f64 = 1.5;

    /// Create stats, clamping negative or non-finite averages to zero.
    pub fn new(avg_scored: f64, avg_conceded: f64) -> Self {
        let clean = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        Self {
            avg_scored: clean(avg_scored),
            avg_conceded: clean(avg_conceded),
        }
    }
}

/// Side of a totals line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TotalSide {
    /// More goals than the line.
    Over,
    /// At most the line.
    Under,
}

/// Team a handicap line applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum HandicapSide {
    /// Home team.
    Home,
    /// Away team.
    Away,
}

/// A market selection a price can be quoted for.
///
/// The textual key form (`over_2.5`, `btts_yes`, `spread_-1.5`) is produced
/// and parsed in [`crate::market::odds`]; everything inside the engine works
/// with this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarketKind {
    /// Total goals over/under a line.
    OverUnder {
        /// Over or under.
        side: TotalSide,
        /// Goal line (2.5, 3.0, ...).
        line: Decimal,
    },
    /// Both teams to score, yes or no.
    BothTeamsScore {
        /// `true` for "yes".
        yes: bool,
    },
    /// Asian handicap for one team.
    Handicap {
        /// Team the handicap is applied to.
        side: HandicapSide,
        /// Handicap line.
        line: Decimal,
    },
}

impl MarketKind {
    /// Totals line as a float, if this is a totals market.
    pub fn total_line(&self) -> Option<f64> {
        match self {
            MarketKind::OverUnder { line, .. } => line.to_f64(),
            _ => None,
        }
    }
}

/// Best available prices for one game.
#[derive(Debug, Clone, PartialEq)]
pub struct OddsQuote {
    /// Odds provider's event identifier.
    pub match_id: String,
    /// Home team name as the odds provider spells it.
    pub home_team: String,
    /// Away team name as the odds provider spells it.
    pub away_team: String,
    /// Scheduled kick-off, when known.
    pub commence_time: Option<OffsetDateTime>,
    /// Maximum price observed across bookmakers per selection.
    pub markets: HashMap<MarketKind, f64>,
}

impl OddsQuote {
    /// Selections sorted by key so iteration order is stable.
    pub fn sorted_markets(&self) -> Vec<(MarketKind, f64)> {
        let mut markets: Vec<_> = self.markets.iter().map(|(k, v)| (*k, *v)).collect();
        markets.sort_by(|a, b| a.0.cmp(&b.0));
        markets
    }
}
