//! Odds provider payloads, the market-key codec and best-price flattening.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use tracing::debug;

use super::types::{HandicapSide, MarketKind, OddsQuote, TotalSide};

/// Totals line assumed when a bookmaker omits `point`.
fn default_total_line() -> Decimal {
    Decimal::new(25, 1)
}

/// One game as returned by the odds provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsEvent {
    /// Provider event identifier.
    pub id: String,
    /// Sport key (e.g. "soccer_epl").
    #[serde(default)]
    pub sport_key: String,
    /// Scheduled kick-off.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub commence_time: Option<OffsetDateTime>,
    /// Home team.
    pub home_team: String,
    /// Away team.
    pub away_team: String,
    /// Per-bookmaker prices.
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

/// A bookmaker's markets for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmaker {
    /// Bookmaker key.
    pub key: String,
    /// Display name.
    #[serde(default)]
    pub title: String,
    /// Markets offered.
    #[serde(default)]
    pub markets: Vec<BookmakerMarket>,
}

/// A market offered by one bookmaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmakerMarket {
    /// Market type ("totals", "btts", "spreads", ...).
    pub key: String,
    /// Outcome prices.
    #[serde(default)]
    pub outcomes: Vec<PricedOutcome>,
}

/// One priced outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedOutcome {
    /// Outcome label ("Over", "Yes", a team name, ...).
    pub name: String,
    /// Decimal odds.
    pub price: f64,
    /// Line, for totals and spreads.
    #[serde(default)]
    pub point: Option<f64>,
}

/// Error returned when a market key cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMarketKey(pub String);

impl fmt::Display for UnknownMarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown market key: {}", self.0)
    }
}

impl std::error::Error for UnknownMarketKey {}

fn format_line(line: Decimal) -> String {
    let line = if line.is_zero() {
        Decimal::ZERO
    } else {
        line.normalize()
    };
    if line.fract().is_zero() {
        format!("{:.1}", line)
    } else {
        line.to_string()
    }
}

fn parse_line(raw: &str, key: &str) -> Result<Decimal, UnknownMarketKey> {
    Decimal::from_str(raw)
        .map(|d| d.normalize())
        .map_err(|_| UnknownMarketKey(key.to_string()))
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::OverUnder { side, line } => write!(f, "{}_{}", side, format_line(*line)),
            MarketKind::BothTeamsScore { yes: true } => f.write_str("btts_yes"),
            MarketKind::BothTeamsScore { yes: false } => f.write_str("btts_no"),
            MarketKind::Handicap {
                side: HandicapSide::Home,
                line,
            } => write!(f, "spread_{}", format_line(*line)),
            MarketKind::Handicap {
                side: HandicapSide::Away,
                line,
            } => write!(f, "spread_away_{}", format_line(*line)),
        }
    }
}

impl FromStr for MarketKind {
    type Err = UnknownMarketKey;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key {
            "btts_yes" => return Ok(MarketKind::BothTeamsScore { yes: true }),
            "btts_no" => return Ok(MarketKind::BothTeamsScore { yes: false }),
            _ => {}
        }

        if let Some(raw) = key.strip_prefix("over_") {
            return Ok(MarketKind::OverUnder {
                side: TotalSide::Over,
                line: parse_line(raw, key)?,
            });
        }
        if let Some(raw) = key.strip_prefix("under_") {
            return Ok(MarketKind::OverUnder {
                side: TotalSide::Under,
                line: parse_line(raw, key)?,
            });
        }
        if let Some(raw) = key.strip_prefix("spread_away_") {
            return Ok(MarketKind::Handicap {
                side: HandicapSide::Away,
                line: parse_line(raw, key)?,
            });
        }
        if let Some(raw) = key.strip_prefix("spread_") {
            return Ok(MarketKind::Handicap {
                side: HandicapSide::Home,
                line: parse_line(raw, key)?,
            });
        }

        Err(UnknownMarketKey(key.to_string()))
    }
}

impl Serialize for MarketKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MarketKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(serde::de::Error::custom)
    }
}

fn point_to_line(point: Option<f64>) -> Option<Decimal> {
    point
        .and_then(Decimal::from_f64)
        .map(|d| d.round_dp(2).normalize())
}

/// Decode one bookmaker outcome into a selection.
fn outcome_kind(market_key: &str, outcome: &PricedOutcome, event: &OddsEvent) -> Option<MarketKind> {
    match market_key {
        "totals" => {
            let line = point_to_line(outcome.point).unwrap_or_else(default_total_line);
            let side = match outcome.name.as_str() {
                "Over" => TotalSide::Over,
                "Under" => TotalSide::Under,
                _ => return None,
            };
            Some(MarketKind::OverUnder { side, line })
        }
        "btts" => match outcome.name.as_str() {
            "Yes" => Some(MarketKind::BothTeamsScore { yes: true }),
            "No" => Some(MarketKind::BothTeamsScore { yes: false }),
            _ => None,
        },
        "spreads" => {
            let line = point_to_line(outcome.point)?;
            let side = if outcome.name == event.home_team {
                HandicapSide::Home
            } else if outcome.name == event.away_team {
                HandicapSide::Away
            } else {
                return None;
            };
            Some(MarketKind::Handicap { side, line })
        }
        _ => None,
    }
}

/// Collapse all bookmakers' prices for one game into the best price per selection.
pub fn flatten_event(event: &OddsEvent) -> OddsQuote {
    let mut quote = OddsQuote {
        match_id: event.id.clone(),
        home_team: event.home_team.clone(),
        away_team: event.away_team.clone(),
        commence_time: event.commence_time,
        markets: Default::default(),
    };

    for bookmaker in &event.bookmakers {
        for market in &bookmaker.markets {
            for outcome in &market.outcomes {
                if !outcome.price.is_finite() || outcome.price < 1.0 {
                    continue;
                }
                let Some(kind) = outcome_kind(&market.key, outcome, event) else {
                    debug!(
                        bookmaker = %bookmaker.key,
                        market = %market.key,
                        outcome = %outcome.name,
                        "Skipping unsupported outcome"
                    );
                    continue;
                };
                quote
                    .markets
                    .entry(kind)
                    .and_modify(|best| {
                        if outcome.price > *best {
                            *best = outcome.price;
                        }
                    })
                    .or_insert(outcome.price);
            }
        }
    }

    quote
}

/// Flatten a batch of events, keeping only games with at least one price.
pub fn flatten_events(events: &[OddsEvent]) -> Vec<OddsQuote> {
    events
        .iter()
        .map(flatten_event)
        .filter(|q| !q.markets.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn outcome(name: &str, price: f64, point: Option<f64>) -> PricedOutcome {
        PricedOutcome {
            name: name.to_string(),
            price,
            point,
        }
    }

    fn event(bookmakers: Vec<Bookmaker>) -> OddsEvent {
        OddsEvent {
            id: "evt-1".to_string(),
            sport_key: "soccer_epl".to_string(),
            commence_time: None,
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            bookmakers,
        }
    }

    fn bookmaker(key: &str, markets: Vec<BookmakerMarket>) -> Bookmaker {
        Bookmaker {
            key: key.to_string(),
            title: key.to_string(),
            markets,
        }
    }

    fn market(key: &str, outcomes: Vec<PricedOutcome>) -> BookmakerMarket {
        BookmakerMarket {
            key: key.to_string(),
            outcomes,
        }
    }

    #[test]
    fn keys_follow_provider_convention() {
        let over = MarketKind::OverUnder {
            side: TotalSide::Over,
            line: dec!(2.5),
        };
        let under_whole = MarketKind::OverUnder {
            side: TotalSide::Under,
            line: dec!(2),
        };
        let spread = MarketKind::Handicap {
            side: HandicapSide::Home,
            line: dec!(-1.5),
        };
        assert_eq!(over.to_string(), "over_2.5");
        assert_eq!(under_whole.to_string(), "under_2.0");
        assert_eq!(spread.to_string(), "spread_-1.5");
        assert_eq!(MarketKind::BothTeamsScore { yes: true }.to_string(), "btts_yes");
    }

    #[test]
    fn keys_decode_to_the_same_selection() {
        for key in ["over_2.5", "under_3.0", "btts_no", "spread_-1.5", "spread_away_0.5"] {
            let kind: MarketKind = key.parse().unwrap();
            assert_eq!(kind.to_string(), key);
        }
        assert!("corners_9.5".parse::<MarketKind>().is_err());
        assert!("over_abc".parse::<MarketKind>().is_err());
    }

    #[test]
    fn market_kind_serializes_as_key() {
        let kind = MarketKind::OverUnder {
            side: TotalSide::Over,
            line: dec!(1.5),
        };
        assert_eq!(serde_json::to_value(kind).unwrap(), "over_1.5");
        let back: MarketKind = serde_json::from_value(serde_json::json!("over_1.5")).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn flatten_keeps_maximum_price_per_key() {
        let evt = event(vec![
            bookmaker(
                "bet365",
                vec![
                    market(
                        "totals",
                        vec![outcome("Over", 1.90, Some(2.5)), outcome("Under", 1.95, Some(2.5))],
                    ),
                    market("btts", vec![outcome("Yes", 1.70, None), outcome("No", 2.10, None)]),
                ],
            ),
            bookmaker(
                "pinnacle",
                vec![
                    market(
                        "totals",
                        vec![outcome("Over", 2.02, Some(2.5)), outcome("Under", 1.85, Some(2.5))],
                    ),
                    market("btts", vec![outcome("Yes", 1.65, None)]),
                ],
            ),
        ]);

        let quote = flatten_event(&evt);
        let get = |key: &str| quote.markets[&key.parse::<MarketKind>().unwrap()];
        assert_eq!(get("over_2.5"), 2.02);
        assert_eq!(get("under_2.5"), 1.95);
        assert_eq!(get("btts_yes"), 1.70);
        assert_eq!(get("btts_no"), 2.10);
        assert_eq!(quote.markets.len(), 4);
    }

    #[test]
    fn totals_without_point_default_to_two_and_a_half() {
        let evt = event(vec![bookmaker(
            "b",
            vec![market("totals", vec![outcome("Over", 1.8, None)])],
        )]);
        let quote = flatten_event(&evt);
        assert!(quote.markets.contains_key(&"over_2.5".parse().unwrap()));
    }

    #[test]
    fn spreads_resolve_team_side() {
        let evt = event(vec![bookmaker(
            "b",
            vec![market(
                "spreads",
                vec![outcome("Arsenal", 1.9, Some(-1.0)), outcome("Chelsea", 1.95, Some(1.0))],
            )],
        )]);
        let quote = flatten_event(&evt);
        assert_eq!(quote.markets[&"spread_-1.0".parse().unwrap()], 1.9);
        assert_eq!(quote.markets[&"spread_away_1.0".parse().unwrap()], 1.95);
    }

    #[test]
    fn unknown_markets_and_bad_prices_are_dropped() {
        let evt = event(vec![bookmaker(
            "b",
            vec![
                market("h2h", vec![outcome("Arsenal", 2.1, None)]),
                market("totals", vec![outcome("Over", 0.5, Some(2.5))]),
            ],
        )]);
        assert!(flatten_event(&evt).markets.is_empty());
        assert!(flatten_events(&[evt]).is_empty());
    }

    #[test]
    fn odds_event_parses_provider_json() {
        let json = serde_json::json!({
            "id": "abc",
            "sport_key": "soccer_epl",
            "commence_time": "2025-03-01T15:00:00Z",
            "home_team": "Arsenal",
            "away_team": "Chelsea",
            "bookmakers": [{
                "key": "unibet",
                "title": "Unibet",
                "markets": [{"key": "totals", "outcomes": [
                    {"name": "Over", "price": 1.95, "point": 2.5}
                ]}]
            }]
        });
        let evt: OddsEvent = serde_json::from_value(json).unwrap();
        assert!(evt.commence_time.is_some());
        assert_eq!(evt.bookmakers[0].markets[0].outcomes[0].point, Some(2.5));
    }
}
