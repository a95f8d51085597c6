//! Fixtures, odds quotes and the substitute dataset.
//!
//! This module handles:
//! - Match, team statistics and market selection types
//! - Odds provider payloads and best-price flattening
//! - Deterministic substitute data and an in-memory provider

pub mod mock;
pub mod odds;
pub mod types;

pub use mock::{MockConfig, MockOddsEventBuilder, MockProvider, SubstituteDataset};
pub use odds::{flatten_event, flatten_events, OddsEvent, UnknownMarketKey};
pub use types::{HandicapSide, MarketKind, Match, MatchStatus, OddsQuote, TeamStats, TotalSide};
