//! HTTP clients for the odds and fixture providers.
//!
//! These stay thin: one request per call, status mapping into [`FetchError`],
//! payload decoding. Caching and retries live in [`super::DataAccess`].

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime, UtcOffset};
use tracing::{debug, instrument, warn};

use super::provider::{FixtureProvider, OddsProvider, StatsProvider};
use crate::config::Config;
use crate::error::FetchError;
use crate::market::{Match, MatchStatus, OddsEvent, TeamStats};
use crate::matching::TeamMatcher;

const ODDS_PROVIDER: &str = "odds_api";
const FOOTBALL_PROVIDER: &str = "api_football";

/// Markets requested from the odds provider.
const ODDS_MARKETS: &str = "totals,btts,spreads";

fn build_http(config: &Config) -> Result<reqwest::Client, FetchError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.http_timeout_ms))
        .connect_timeout(Duration::from_secs(5))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?;
    Ok(http)
}

fn transport_error(provider: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        FetchError::Http(e)
    }
}

/// Map 429 to a rate limit and any other non-success status to an error.
fn check_status(provider: &str, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_seconds = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok());
        return Err(FetchError::RateLimited {
            provider: provider.to_string(),
            retry_after_seconds,
        });
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

async fn read_body(provider: &str, response: Response) -> Result<String, FetchError> {
    let response = check_status(provider, response)?;
    response.text().await.map_err(|e| transport_error(provider, e))
}

/// Client for The Odds API.
#[derive(Debug, Clone)]
pub struct OddsApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    regions: String,
}

impl OddsApiClient {
    /// Create a client using the configured base URL, regions and timeout.
    pub fn new(config: &Config, api_key: &str) -> Result<Self, FetchError> {
        Ok(Self {
            http: build_http(config)?,
            base_url: config.odds_api_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            regions: config.odds_regions.clone(),
        })
    }
}

#[async_trait]
impl OddsProvider for OddsApiClient {
    fn name(&self) -> &str {
        ODDS_PROVIDER
    }

    #[instrument(skip(self), fields(provider = ODDS_PROVIDER))]
    async fn odds_for(&self, sport: &str) -> Result<Vec<OddsEvent>, FetchError> {
        let url = format!("{}/sports/{}/odds", self.base_url, sport);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("regions", self.regions.as_str()),
                ("markets", ODDS_MARKETS),
                ("oddsFormat", "decimal"),
            ])
            .send()
            .await
            .map_err(|e| transport_error(ODDS_PROVIDER, e))?;

        let body = read_body(ODDS_PROVIDER, response).await?;
        let events = parse_odds_payload(sport, &body)?;
        debug!(sport, events = events.len(), "Fetched odds");
        Ok(events)
    }
}

/// Decode an odds response, stamping the sport key where it is missing.
pub fn parse_odds_payload(sport: &str, body: &str) -> Result<Vec<OddsEvent>, FetchError> {
    let mut events: Vec<OddsEvent> = serde_json::from_str(body).map_err(|e| FetchError::Parse {
        provider: ODDS_PROVIDER.to_string(),
        reason: e.to_string(),
    })?;
    for event in &mut events {
        if event.sport_key.is_empty() {
            event.sport_key = sport.to_string();
        }
    }
    Ok(events)
}

// API-Football payloads.

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    errors: Value,
    response: Option<T>,
}

#[derive(Debug, Deserialize)]
struct FixtureItem {
    fixture: FixtureInfo,
    league: LeagueInfo,
    teams: Teams,
}

#[derive(Debug, Deserialize)]
struct FixtureInfo {
    id: u64,
    date: String,
    status: StatusInfo,
}

#[derive(Debug, Deserialize)]
struct StatusInfo {
    short: String,
}

#[derive(Debug, Deserialize)]
struct LeagueInfo {
    id: u64,
    name: String,
    #[serde(default)]
    season: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Teams {
    home: TeamInfo,
    away: TeamInfo,
}

#[derive(Debug, Deserialize)]
struct TeamInfo {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatisticsItem {
    goals: Option<Goals>,
}

#[derive(Debug, Deserialize)]
struct Goals {
    #[serde(rename = "for")]
    scored: Option<GoalSide>,
    against: Option<GoalSide>,
}

#[derive(Debug, Deserialize)]
struct GoalSide {
    average: Option<GoalAverage>,
}

#[derive(Debug, Deserialize)]
struct GoalAverage {
    total: Option<Value>,
}

/// Where to ask for a team's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamRef {
    /// Provider team id.
    pub team_id: u64,
    /// Provider league id.
    pub league_id: u64,
    /// Season year.
    pub season: u32,
}

/// Fixtures parsed from one response, with the team references they carry.
#[derive(Debug, Clone, Default)]
pub struct ParsedFixtures {
    /// Open fixtures.
    pub matches: Vec<Match>,
    /// `(team name, reference)` for every team seen, open fixture or not.
    pub teams: Vec<(String, TeamRef)>,
}

fn parse_envelope<T: for<'de> Deserialize<'de>>(body: &str) -> Result<Option<T>, FetchError> {
    let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| FetchError::Parse {
        provider: FOOTBALL_PROVIDER.to_string(),
        reason: e.to_string(),
    })?;

    // Quota errors arrive as HTTP 200 with a populated `errors` field.
    let has_errors = match &envelope.errors {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    };
    if has_errors {
        let text = envelope.errors.to_string();
        let lowered = text.to_lowercase();
        if lowered.contains("rate") || lowered.contains("requests") {
            return Err(FetchError::RateLimited {
                provider: FOOTBALL_PROVIDER.to_string(),
                retry_after_seconds: None,
            });
        }
        return Err(FetchError::Parse {
            provider: FOOTBALL_PROVIDER.to_string(),
            reason: text,
        });
    }
    Ok(envelope.response)
}

/// Decode a fixtures response, keeping scheduled and in-progress games.
pub fn parse_fixtures_payload(body: &str) -> Result<ParsedFixtures, FetchError> {
    let items: Vec<FixtureItem> = parse_envelope(body)?.unwrap_or_default();
    let mut parsed = ParsedFixtures::default();

    for item in items {
        if let Some(season) = item.league.season {
            for team in [&item.teams.home, &item.teams.away] {
                parsed.teams.push((
                    team.name.clone(),
                    TeamRef {
                        team_id: team.id,
                        league_id: item.league.id,
                        season,
                    },
                ));
            }
        }

        let status = MatchStatus::from_code(&item.fixture.status.short);
        if !status.is_open() {
            continue;
        }
        let date = match OffsetDateTime::parse(&item.fixture.date, &Rfc3339) {
            Ok(date) => date.to_offset(UtcOffset::UTC),
            Err(e) => {
                warn!(fixture_id = item.fixture.id, error = %e, "Skipping fixture with bad date");
                continue;
            }
        };
        parsed.matches.push(Match {
            match_id: format!("apif_{}", item.fixture.id),
            home_team: item.teams.home.name,
            away_team: item.teams.away.name,
            competition: item.league.name,
            date,
            status,
        });
    }
    Ok(parsed)
}

fn average(side: Option<&GoalSide>) -> f64 {
    side.and_then(|s| s.average.as_ref())
        .and_then(|a| a.total.as_ref())
        .and_then(|v| match v {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        })
        .unwrap_or(TeamStats::FALLBACK_AVERAGE)
}

/// Decode a team statistics response. Missing averages fall back to the
/// league-typical value.
pub fn parse_team_stats_payload(body: &str) -> Result<Option<TeamStats>, FetchError> {
    let item: Option<StatisticsItem> = parse_envelope(body)?;
    Ok(item.map(|item| {
        let goals = item.goals.as_ref();
        TeamStats::new(
            average(goals.and_then(|g| g.scored.as_ref())),
            average(goals.and_then(|g| g.against.as_ref())),
        )
    }))
}

/// Client for API-Football.
///
/// Team statistics are looked up by provider ids, so the client remembers
/// every team it has seen in a fixtures response.
#[derive(Debug)]
pub struct FootballApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    teams: DashMap<String, TeamRef>,
}

impl FootballApiClient {
    /// Create a client using the configured base URL and timeout.
    pub fn new(config: &Config, api_key: &str) -> Result<Self, FetchError> {
        Ok(Self {
            http: build_http(config)?,
            base_url: config.football_api_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            teams: DashMap::new(),
        })
    }

    /// Number of teams with a known statistics reference.
    pub fn known_teams(&self) -> usize {
        self.teams.len()
    }

    fn team_ref(&self, team: &str) -> Option<TeamRef> {
        let key = TeamMatcher::canonical(team);
        self.teams.get(&key).map(|r| *r)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("x-apisports-key", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(FOOTBALL_PROVIDER, e))?;
        read_body(FOOTBALL_PROVIDER, response).await
    }
}

#[async_trait]
impl FixtureProvider for FootballApiClient {
    fn name(&self) -> &str {
        FOOTBALL_PROVIDER
    }

    #[instrument(skip(self), fields(provider = FOOTBALL_PROVIDER))]
    async fn fixtures_on(&self, date: Date) -> Result<Vec<Match>, FetchError> {
        let day = format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day());
        let body = self.get("/fixtures", &[("date", day)]).await?;
        let parsed = parse_fixtures_payload(&body)?;

        for (name, team_ref) in parsed.teams {
            self.teams.insert(TeamMatcher::canonical(&name), team_ref);
        }
        debug!(fixtures = parsed.matches.len(), "Fetched fixtures");
        Ok(parsed.matches)
    }
}

#[async_trait]
impl StatsProvider for FootballApiClient {
    fn name(&self) -> &str {
        FOOTBALL_PROVIDER
    }

    #[instrument(skip(self), fields(provider = FOOTBALL_PROVIDER))]
    async fn team_stats(&self, team: &str, competition: &str) -> Result<Option<TeamStats>, FetchError> {
        let Some(team_ref) = self.team_ref(team) else {
            debug!(team, "No statistics reference for team");
            return Ok(None);
        };
        let body = self
            .get(
                "/teams/statistics",
                &[
                    ("team", team_ref.team_id.to_string()),
                    ("league", team_ref.league_id.to_string()),
                    ("season", team_ref.season.to_string()),
                ],
            )
            .await?;
        parse_team_stats_payload(&body)
    }
}
