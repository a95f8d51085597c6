//! Deterministic substitute dataset and an in-memory provider.
//!
//! The substitute dataset is what development mode runs on when provider
//! credentials are missing or providers return nothing. [`MockProvider`]
//! serves any dataset through the provider traits, with optional failure
//! injection for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use time::{Date, Duration, OffsetDateTime, Time};

use crate::data::{FixtureProvider, OddsProvider, StatsProvider};
use crate::error::FetchError;
use crate::matching::TeamMatcher;

use super::odds::{Bookmaker, BookmakerMarket, OddsEvent, PricedOutcome};
use super::types::{Match, MatchStatus, TeamStats};

/// Fixtures, raw odds and team averages served together.
#[derive(Debug, Clone, Default)]
pub struct SubstituteDataset {
    /// Fixtures.
    pub matches: Vec<Match>,
    /// Raw odds events, as an odds provider would return them.
    pub odds: Vec<OddsEvent>,
    /// Team averages keyed by the fixture provider's spelling.
    pub stats: HashMap<String, TeamStats>,
}

struct Fixture {
    id: u32,
    sport: &'static str,
    competition: &'static str,
    day: i64,
    kick_off: (u8, u8),
    // (fixture spelling, odds spelling, avg scored, avg conceded)
    home: (&'static str, &'static str, f64, f64),
    away: (&'static str, &'static str, f64, f64),
    over_2_5: &'static [f64],
    under_2_5: f64,
    over_3_5: &'static [f64],
    under_3_5: f64,
    btts_yes: &'static [f64],
    btts_no: f64,
}

const FIXTURES: &[Fixture] = &[
    Fixture {
        id: 900_001,
        sport: "soccer_epl",
        competition: "Premier League",
        day: 0,
        kick_off: (19, 30),
        home: ("Arsenal", "Arsenal", 2.1, 0.9),
        away: ("Chelsea", "Chelsea", 1.7, 1.2),
        over_2_5: &[1.42, 1.45],
        under_2_5: 2.85,
        over_3_5: &[2.20],
        under_3_5: 1.66,
        btts_yes: &[1.50, 1.52],
        btts_no: 2.45,
    },
    Fixture {
        id: 900_002,
        sport: "soccer_epl",
        competition: "Premier League",
        day: 1,
        kick_off: (16, 30),
        home: ("Manchester United FC", "Man Utd", 1.5, 1.4),
        away: ("Tottenham Hotspur", "Spurs", 1.9, 1.5),
        over_2_5: &[1.55, 1.58],
        under_2_5: 2.40,
        over_3_5: &[2.30],
        under_3_5: 1.60,
        btts_yes: &[1.48],
        btts_no: 2.55,
    },
    Fixture {
        id: 900_003,
        sport: "soccer_spain_la_liga",
        competition: "La Liga",
        day: 1,
        kick_off: (20, 0),
        home: ("Real Madrid", "Real Madrid", 2.4, 0.9),
        away: ("Athletic Club", "Athletic Bilbao", 1.4, 1.0),
        over_2_5: &[1.36],
        under_2_5: 3.10,
        over_3_5: &[1.85, 1.90],
        under_3_5: 1.95,
        btts_yes: &[1.62],
        btts_no: 2.20,
    },
    Fixture {
        id: 900_004,
        sport: "soccer_spain_la_liga",
        competition: "La Liga",
        day: 2,
        kick_off: (18, 0),
        home: ("Barcelona", "Barcelona", 2.6, 1.0),
        away: ("Sevilla", "Sevilla FC", 1.2, 1.3),
        over_2_5: &[1.30],
        under_2_5: 3.40,
        over_3_5: &[1.75],
        under_3_5: 2.05,
        btts_yes: &[1.72],
        btts_no: 2.05,
    },
    Fixture {
        id: 900_005,
        sport: "soccer_portugal_primeira_liga",
        competition: "Primeira Liga",
        day: 2,
        kick_off: (20, 30),
        home: ("Benfica", "Benfica", 2.3, 0.8),
        away: ("Sporting CP", "Sporting Lisbon", 2.2, 0.9),
        over_2_5: &[1.25],
        under_2_5: 3.90,
        over_3_5: &[1.62],
        under_3_5: 2.25,
        btts_yes: &[1.30],
        btts_no: 3.20,
    },
    Fixture {
        id: 900_006,
        sport: "soccer_portugal_primeira_liga",
        competition: "Primeira Liga",
        day: 0,
        kick_off: (21, 15),
        home: ("FC Porto", "Porto", 2.0, 0.8),
        away: ("SC Braga", "Braga", 1.6, 1.1),
        over_2_5: &[1.40],
        under_2_5: 2.90,
        over_3_5: &[2.05],
        under_3_5: 1.75,
        btts_yes: &[1.55],
        btts_no: 2.35,
    },
];

impl SubstituteDataset {
    /// Build the dataset with fixtures on `today` and the two following days.
    pub fn generate(today: Date) -> Self {
        let mut dataset = SubstituteDataset::default();

        for f in FIXTURES {
            let kick_off = Time::from_hms(f.kick_off.0, f.kick_off.1, 0).unwrap_or(Time::MIDNIGHT);
            let date = (today + Duration::days(f.day)).with_time(kick_off).assume_utc();

            dataset.matches.push(Match {
                match_id: format!("mock_{}", f.id),
                home_team: f.home.0.to_string(),
                away_team: f.away.0.to_string(),
                competition: f.competition.to_string(),
                date,
                status: MatchStatus::NotStarted,
            });

            let mut builder = MockOddsEventBuilder::new(format!("odds_{}", f.id), f.home.1, f.away.1)
                .sport(f.sport)
                .commence(date);
            for (i, over) in f.over_2_5.iter().enumerate() {
                let under = if i == 0 { f.under_2_5 } else { f.under_2_5 - 0.05 };
                builder = builder.totals(&format!("book{}", i + 1), 2.5, *over, under);
            }
            for (i, over) in f.over_3_5.iter().enumerate() {
                let under = if i == 0 { f.under_3_5 } else { f.under_3_5 - 0.05 };
                builder = builder.totals(&format!("book{}", i + 1), 3.5, *over, under);
            }
            for (i, yes) in f.btts_yes.iter().enumerate() {
                builder = builder.btts(&format!("book{}", i + 1), *yes, f.btts_no);
            }
            dataset.odds.push(builder.build());

            for (name, _, scored, conceded) in [f.home, f.away] {
                dataset
                    .stats
                    .insert(name.to_string(), TeamStats::new(scored, conceded));
            }
        }

        dataset
    }
}

/// Builder for raw odds events with common market shapes.
pub struct MockOddsEventBuilder {
    event: OddsEvent,
}

impl MockOddsEventBuilder {
    /// Start an event between two teams.
    pub fn new(id: impl Into<String>, home: impl Into<String>, away: impl Into<String>) -> Self {
        Self {
            event: OddsEvent {
                id: id.into(),
                sport_key: "soccer_epl".to_string(),
                commence_time: None,
                home_team: home.into(),
                away_team: away.into(),
                bookmakers: Vec::new(),
            },
        }
    }

    /// Set the sport key.
    pub fn sport(mut self, sport: &str) -> Self {
        self.event.sport_key = sport.to_string();
        self
    }

    /// Set the kick-off time.
    pub fn commence(mut self, at: OffsetDateTime) -> Self {
        self.event.commence_time = Some(at);
        self
    }

    fn market(&mut self, bookmaker: &str, key: &str, outcomes: Vec<PricedOutcome>) {
        let book = match self.event.bookmakers.iter().position(|b| b.key == bookmaker) {
            Some(i) => &mut self.event.bookmakers[i],
            None => {
                self.event.bookmakers.push(Bookmaker {
                    key: bookmaker.to_string(),
                    title: bookmaker.to_string(),
                    markets: Vec::new(),
                });
                let last = self.event.bookmakers.len() - 1;
                &mut self.event.bookmakers[last]
            }
        };
        book.markets.push(BookmakerMarket {
            key: key.to_string(),
            outcomes,
        });
    }

    /// Add an over/under pair at a line.
    pub fn totals(mut self, bookmaker: &str, line: f64, over: f64, under: f64) -> Self {
        self.market(
            bookmaker,
            "totals",
            vec![
                PricedOutcome {
                    name: "Over".to_string(),
                    price: over,
                    point: Some(line),
                },
                PricedOutcome {
                    name: "Under".to_string(),
                    price: under,
                    point: Some(line),
                },
            ],
        );
        self
    }

    /// Add a both-teams-to-score pair.
    pub fn btts(mut self, bookmaker: &str, yes: f64, no: f64) -> Self {
        self.market(
            bookmaker,
            "btts",
            vec![
                PricedOutcome {
                    name: "Yes".to_string(),
                    price: yes,
                    point: None,
                },
                PricedOutcome {
                    name: "No".to_string(),
                    price: no,
                    point: None,
                },
            ],
        );
        self
    }

    /// Add a handicap pair, line given from the home side.
    pub fn spreads(mut self, bookmaker: &str, home_line: f64, home: f64, away: f64) -> Self {
        let (home_team, away_team) = (self.event.home_team.clone(), self.event.away_team.clone());
        self.market(
            bookmaker,
            "spreads",
            vec![
                PricedOutcome {
                    name: home_team,
                    price: home,
                    point: Some(home_line),
                },
                PricedOutcome {
                    name: away_team,
                    price: away,
                    point: Some(-home_line),
                },
            ],
        );
        self
    }

    /// Build the event.
    pub fn build(self) -> OddsEvent {
        self.event
    }
}

/// Configuration for mock provider behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Number of initial calls answered with a rate limit.
    pub rate_limited_calls: u32,
    /// Whether fixture requests fail.
    pub fail_fixtures: bool,
    /// Whether odds requests fail.
    pub fail_odds: bool,
    /// Whether stats requests fail.
    pub fail_stats: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

/// In-memory provider serving a [`SubstituteDataset`].
#[derive(Debug, Default)]
pub struct MockProvider {
    config: MockConfig,
    dataset: SubstituteDataset,
    calls: AtomicU32,
}

impl MockProvider {
    /// Serve the given dataset.
    pub fn new(dataset: SubstituteDataset) -> Self {
        Self {
            config: MockConfig::default(),
            dataset,
            calls: AtomicU32::new(0),
        }
    }

    /// Serve the given dataset with custom behavior.
    pub fn with_config(dataset: SubstituteDataset, config: MockConfig) -> Self {
        Self {
            config,
            dataset,
            calls: AtomicU32::new(0),
        }
    }

    /// Total calls received so far, failed ones included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, fail: bool) -> Result<(), FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }

        if call < self.config.rate_limited_calls {
            return Err(FetchError::RateLimited {
                provider: "mock".to_string(),
                retry_after_seconds: None,
            });
        }

        if fail {
            return Err(FetchError::Status {
                provider: "mock".to_string(),
                status: 500,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl FixtureProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fixtures_on(&self, date: Date) -> Result<Vec<Match>, FetchError> {
        self.enter(self.config.fail_fixtures).await?;
        Ok(self
            .dataset
            .matches
            .iter()
            .filter(|m| m.date.date() == date)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OddsProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn odds_for(&self, sport: &str) -> Result<Vec<OddsEvent>, FetchError> {
        self.enter(self.config.fail_odds).await?;
        Ok(self
            .dataset
            .odds
            .iter()
            .filter(|e| e.sport_key == sport)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StatsProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn team_stats(
        &self,
        team: &str,
        _competition: &str,
    ) -> Result<Option<TeamStats>, FetchError> {
        self.enter(self.config.fail_stats).await?;
        if let Some(stats) = self.dataset.stats.get(team) {
            return Ok(Some(*stats));
        }
        let wanted = TeamMatcher::canonical(team);
        Ok(self
            .dataset
            .stats
            .iter()
            .find(|(name, _)| TeamMatcher::canonical(name) == wanted)
            .map(|(_, stats)| *stats))
    }
}
