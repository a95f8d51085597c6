//! One evaluation pass: fetch, reconcile, value, size, gate and combine.
//!
//! This module handles:
//! - Choosing live or substitute data from the environment and credentials
//! - Turning quotes into sized, risk-gated opportunities
//! - Multiple suggestions for the early phases
//! - Session risk bookkeeping between passes

pub mod report;

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use strum::Display;
use tracing::{debug, info, instrument, warn};

use crate::bankroll::{BankrollManager, BetResult, Phase, RiskManager, RiskState};
use crate::config::{Config, Environment};
use crate::data::{
    Cache, Clock, DataAccess, FootballApiClient, MemoryCache, OddsApiClient, RetryPolicy, SystemClock,
};
use crate::error::{EngineError, Rejection, Result};
use crate::market::{flatten_events, MarketKind, Match, MockProvider, OddsEvent, SubstituteDataset};
use crate::matching::TeamMatcher;
use crate::metrics;
use crate::valuation::{
    check_opportunity, model_probability, MultipleBet, MultipleDetector, Opportunity, ProbabilityModel,
};

pub use report::{BetRecord, BetStats, ChatContext};

/// Where a pass got its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataMode {
    /// Real providers.
    Live,
    /// Deterministic substitute dataset.
    Substitute,
}

/// Output of one evaluation pass.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// Accepted opportunities, best EV first.
    pub opportunities: Vec<Opportunity>,
    /// Suggested multiples, best combined EV first.
    pub multiples: Vec<MultipleBet>,
    /// Risk state after the accepted stakes.
    pub risk: RiskState,
    /// Phase the pass was sized in.
    pub phase: Phase,
    /// Data source used.
    pub mode: DataMode,
    /// Candidates that reached valuation.
    pub candidates: usize,
    /// Candidates rejected.
    pub rejected: usize,
    /// Amount to withdraw when the phase target has been reached.
    pub withdraw: Option<Decimal>,
}

/// A priced selection the model has a view on, before sizing.
#[derive(Debug, Clone)]
struct Candidate {
    fixture: Match,
    market: MarketKind,
    odds: f64,
    probability: f64,
}

fn to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// The opportunity valuation and staking engine.
pub struct ValueEngine {
    environment: Environment,
    live: Option<DataAccess>,
    clock: Arc<dyn Clock>,
    model: ProbabilityModel,
    matcher: TeamMatcher,
    risk: RiskManager,
    multiples: MultipleDetector,
    sports: Vec<String>,
    lookahead_days: u32,
}

impl ValueEngine {
    /// Build the engine from configuration, wiring real providers when
    /// credentials are present.
    ///
    /// In production missing credentials abort construction; in development
    /// the engine runs on the substitute dataset instead.
    pub fn from_config(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let missing = config.missing_credentials();

        let live = match (&config.football_api_key, &config.odds_api_key) {
            (Some(football_key), Some(odds_key)) if missing.is_empty() => {
                let football = Arc::new(FootballApiClient::new(config, football_key)?);
                let odds = Arc::new(OddsApiClient::new(config, odds_key)?);
                let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(clock.clone()));
                Some(
                    DataAccess::new(football.clone(), odds, football, cache, clock.clone())
                        .with_retry(config.retry_policy())
                        .with_ttls(config.cache_ttls()),
                )
            }
            _ => None,
        };

        Self::new(config, live, clock)
    }

    /// Build the engine around injected data access.
    ///
    /// `live = None` means no usable credentials.
    pub fn new(config: &Config, live: Option<DataAccess>, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;

        if live.is_none() {
            let mut missing = config.missing_credentials();
            if missing.is_empty() {
                missing = vec!["FOOTBALL_API_KEY", "ODDS_API_KEY"];
            }
            let missing = missing.join(", ");
            if config.is_production() {
                return Err(EngineError::ConfigurationMissing { missing });
            }
            warn!(missing = %missing, "Provider credentials missing, using substitute data");
        }

        Ok(Self {
            environment: config.environment,
            live,
            clock,
            model: ProbabilityModel::default(),
            matcher: TeamMatcher::new(config.match_threshold),
            risk: RiskManager::new(config.risk_policy()),
            multiples: MultipleDetector::new(config.multiple_policy()),
            sports: config.sports(),
            lookahead_days: config.lookahead_days,
        })
    }

    /// Runtime environment.
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Whether real providers are wired.
    pub fn has_live_data(&self) -> bool {
        self.live.is_some()
    }

    /// Risk controller used for gating.
    pub fn risk_manager(&self) -> &RiskManager {
        &self.risk
    }

    fn substitute_access(&self) -> DataAccess {
        let provider = Arc::new(MockProvider::new(SubstituteDataset::generate(self.clock.now().date())));
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(self.clock.clone()));
        DataAccess::new(provider.clone(), provider.clone(), provider, cache, self.clock.clone())
            .with_retry(RetryPolicy::no_retry())
    }

    async fn gather(&self) -> (DataAccess, Vec<Match>, Vec<OddsEvent>, DataMode) {
        if let Some(live) = &self.live {
            let (fixtures, events) = futures::join!(
                live.fixtures_ahead(self.lookahead_days),
                live.odds_for_all(&self.sports)
            );
            let usable = !fixtures.is_empty() && !events.is_empty();
            if usable || self.environment == Environment::Production {
                return (live.clone(), fixtures, events, DataMode::Live);
            }
            warn!(
                fixtures = fixtures.len(),
                events = events.len(),
                "Live data empty, falling back to substitute data"
            );
        }

        metrics::inc_substitute_runs();
        let access = self.substitute_access();
        let (fixtures, events) = futures::join!(
            access.fixtures_ahead(self.lookahead_days),
            access.odds_for_all(&self.sports)
        );
        (access, fixtures, events, DataMode::Substitute)
    }

    /// Reconcile quotes with fixtures and price every market the model covers.
    async fn candidates(&self, access: &DataAccess, fixtures: &[Match], events: &[OddsEvent]) -> Vec<Candidate> {
        let open: Vec<Match> = fixtures.iter().filter(|m| m.status.is_open()).cloned().collect();
        let quotes = flatten_events(events);
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for quote in &quotes {
            let Some(matched) = self
                .matcher
                .match_teams(&quote.home_team, &quote.away_team, &open)
            else {
                continue;
            };
            let fixture = matched.fixture;
            if !seen.insert(fixture.match_id.clone()) {
                debug!(match_id = %fixture.match_id, "Fixture already priced, skipping quote");
                continue;
            }

            let (home, away) = futures::join!(
                access.team_stats(&fixture.home_team, &fixture.competition),
                access.team_stats(&fixture.away_team, &fixture.competition)
            );
            let (Some(home), Some(away)) = (home, away) else {
                debug!(fixture = %fixture.label(), "Team statistics unavailable, skipping");
                continue;
            };

            for (market, odds) in quote.sorted_markets() {
                let Some(probability) = model_probability(&self.model, market, &home, &away) else {
                    continue;
                };
                candidates.push(Candidate {
                    fixture: fixture.clone(),
                    market,
                    odds,
                    probability,
                });
            }
        }
        candidates
    }

    fn value(
        &self,
        bankroll: &BankrollManager,
        state: &RiskState,
        candidate: &Candidate,
        ev: f64,
        min_ev: f64,
        adjustment: Decimal,
    ) -> std::result::Result<Opportunity, Rejection> {
        let stake = to_cents(bankroll.calculate_stake(candidate.probability, candidate.odds, ev) * adjustment);
        self.risk.check_daily_limit(state, stake)?;
        Opportunity::new(
            &candidate.fixture,
            candidate.market,
            candidate.odds,
            candidate.probability,
            min_ev,
            stake,
            bankroll.phase(),
        )
    }

    /// Run one evaluation pass against a bankroll and the session's risk state.
    ///
    /// Candidates are gated in EV order, so the daily cap is spent on the best
    /// edges first.
    #[instrument(skip_all, fields(bankroll = %bankroll.bankroll(), phase = %bankroll.phase()))]
    pub async fn evaluate(&self, bankroll: &BankrollManager, risk: RiskState) -> Result<Evaluation> {
        let _timer = metrics::timer_evaluation();
        let phase = bankroll.phase();
        let min_ev = bankroll.policy().min_ev(phase);

        let (completed, withdraw) = bankroll.check_phase_completion();
        let withdraw = completed.then_some(withdraw);

        let (access, fixtures, events, mode) = self.gather().await;
        let candidates = self.candidates(&access, &fixtures, &events).await;

        let mut valued = Vec::new();
        let mut rejected = 0usize;
        for candidate in &candidates {
            match check_opportunity(candidate.probability, candidate.odds, min_ev) {
                Ok(ev) => valued.push((candidate, ev)),
                Err(rejection) => {
                    rejected += 1;
                    metrics::inc_opportunities_rejected(rejection.kind());
                    debug!(
                        fixture = %candidate.fixture.label(),
                        market = %candidate.market,
                        odds = candidate.odds,
                        reason = %rejection,
                        "Candidate rejected"
                    );
                }
            }
        }
        valued.sort_by(|a, b| b.1.total_cmp(&a.1));

        let adjustment = Decimal::from_f64(self.risk.get_stake_adjustment(&risk)).unwrap_or(Decimal::ONE);
        let mut state = if risk.is_sized_for(bankroll) {
            risk
        } else {
            debug!(
                state_bankroll = %risk.bankroll,
                state_phase = %risk.phase,
                "Risk state rebased onto the current bankroll"
            );
            risk.rebase(bankroll)
        };
        let mut opportunities = Vec::new();
        for (candidate, ev) in valued {
            match self.value(bankroll, &state, candidate, ev, min_ev, adjustment) {
                Ok(opportunity) => {
                    state = state.add_stake(opportunity.stake);
                    metrics::inc_opportunities_accepted();
                    info!(
                        fixture = %opportunity.match_label,
                        market = %opportunity.market,
                        odds = opportunity.odds,
                        ev = opportunity.ev,
                        stake = %opportunity.stake,
                        "Value opportunity accepted"
                    );
                    opportunities.push(opportunity);
                }
                Err(rejection) => {
                    rejected += 1;
                    metrics::inc_opportunities_rejected(rejection.kind());
                    info!(
                        fixture = %candidate.fixture.label(),
                        market = %candidate.market,
                        ev,
                        reason = %rejection,
                        "Candidate rejected"
                    );
                }
            }
        }

        let multiples = self.suggest_multiples(bankroll, &opportunities);

        info!(
            mode = %mode,
            candidates = candidates.len(),
            accepted = opportunities.len(),
            rejected,
            multiples = multiples.len(),
            daily_staked = %state.daily_staked,
            "Evaluation finished"
        );

        Ok(Evaluation {
            opportunities,
            multiples,
            risk: state,
            phase,
            mode,
            candidates: candidates.len(),
            rejected,
            withdraw,
        })
    }

    /// Multiples for the early phases, staked at a fixed share of bankroll
    /// never above the phase stake cap.
    fn suggest_multiples(&self, bankroll: &BankrollManager, opportunities: &[Opportunity]) -> Vec<MultipleBet> {
        let policy = self.multiples.policy();
        let Some(pct) = policy.stake_pct(bankroll.phase()) else {
            return Vec::new();
        };

        let share = Decimal::from_f64(pct / 100.0).unwrap_or(Decimal::ZERO);
        let stake = to_cents(bankroll.bankroll() * share).min(bankroll.max_stake());
        if stake <= Decimal::ZERO {
            return Vec::new();
        }

        let multiples: Vec<MultipleBet> = self
            .multiples
            .detect(opportunities, policy.limit)
            .iter()
            .map(|combination| self.multiples.format_multiple(combination, stake))
            .collect();
        metrics::add_multiples_found(multiples.len());
        multiples
    }

    /// Record a stake placed outside an evaluation pass.
    pub fn register_stake(&self, state: &RiskState, stake: Decimal) -> std::result::Result<RiskState, Rejection> {
        self.risk.check_daily_limit(state, stake)?;
        Ok(state.add_stake(stake))
    }

    /// Record a settled bet.
    pub fn settle(&self, state: &RiskState, result: BetResult) -> RiskState {
        state.update_sequence(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bankroll::PhasePolicy;
    use crate::data::ManualClock;
    use crate::market::{MockConfig, TotalSide};
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(datetime!(2025-03-01 09:00 UTC)))
    }

    fn session(bankroll: Decimal) -> (BankrollManager, RiskState) {
        let manager = BankrollManager::new(PhasePolicy::default(), bankroll);
        let state = RiskState::new(&manager);
        (manager, state)
    }

    #[tokio::test]
    async fn development_without_credentials_uses_substitute_data() {
        let engine = ValueEngine::new(&Config::default(), None, clock()).unwrap();
        assert!(!engine.has_live_data());

        let (manager, state) = session(dec!(100));
        let evaluation = engine.evaluate(&manager, state).await.unwrap();

        assert_eq!(evaluation.mode, DataMode::Substitute);
        assert!(!evaluation.opportunities.is_empty());
        assert_eq!(evaluation.opportunities.len() + evaluation.rejected, evaluation.candidates);
        assert!(evaluation
            .opportunities
            .windows(2)
            .all(|w| w[0].ev >= w[1].ev));
        assert!(evaluation.opportunities.iter().all(|o| o.ev >= 8.0));
    }

    #[tokio::test]
    async fn daily_cap_bounds_total_stake() {
        let engine = ValueEngine::new(&Config::default(), None, clock()).unwrap();
        let (manager, state) = session(dec!(100));
        let evaluation = engine.evaluate(&manager, state).await.unwrap();

        let total: Decimal = evaluation.opportunities.iter().map(|o| o.stake).sum();
        assert_eq!(evaluation.risk.daily_staked, total);
        assert!(total <= dec!(30));
        assert!(evaluation.opportunities.iter().all(|o| o.stake <= dec!(15)));
    }

    #[tokio::test]
    async fn resumed_session_reports_withdrawal() {
        let engine = ValueEngine::new(&Config::default(), None, clock()).unwrap();
        let manager = Config::default().bankroll_manager(dec!(1200));
        let evaluation = engine.evaluate(&manager, RiskState::new(&manager)).await.unwrap();
        assert_eq!(evaluation.phase, Phase::Two);
        assert_eq!(evaluation.withdraw, Some(dec!(100)));

        let (manager, state) = session(dec!(1200));
        let fresh = engine.evaluate(&manager, state).await.unwrap();
        assert_eq!(fresh.withdraw, None);
    }

    #[tokio::test]
    async fn stale_risk_state_is_capped_by_current_bankroll() {
        let engine = ValueEngine::new(&Config::default(), None, clock()).unwrap();
        // Opened at 1000 (phase 2, cap 250) with 240 already staked; the
        // bankroll has since dropped to 100 (phase 1, cap 30).
        let (_, stale) = session(dec!(1000));
        let stale = stale.add_stake(dec!(240));
        let manager = BankrollManager::new(PhasePolicy::default(), dec!(100));

        let evaluation = engine.evaluate(&manager, stale).await.unwrap();
        assert_eq!(evaluation.risk.bankroll, dec!(100));
        assert_eq!(evaluation.risk.phase, Phase::One);
        assert_eq!(evaluation.risk.daily_staked, dec!(240));
        assert!(evaluation.opportunities.is_empty());
    }

    #[tokio::test]
    async fn best_edge_comes_first() {
        let engine = ValueEngine::new(&Config::default(), None, clock()).unwrap();
        let (manager, state) = session(dec!(100));
        let evaluation = engine.evaluate(&manager, state).await.unwrap();

        let top = &evaluation.opportunities[0];
        assert_eq!(top.match_label, "Arsenal x Chelsea");
        assert_eq!(
            top.market,
            MarketKind::OverUnder {
                side: TotalSide::Over,
                line: dec!(3.5)
            }
        );
        assert_eq!(top.odds, 2.2);
    }

    #[tokio::test]
    async fn losing_streak_halves_stakes() {
        let engine = ValueEngine::new(&Config::default(), None, clock()).unwrap();
        let (manager, state) = session(dec!(100));
        let fresh = engine.evaluate(&manager, state.clone()).await.unwrap();

        let streak = (0..3).fold(state, |s, _| engine.settle(&s, BetResult::Lost));
        let damped = engine.evaluate(&manager, streak).await.unwrap();

        let first = &fresh.opportunities[0];
        let same = damped
            .opportunities
            .iter()
            .find(|o| o.match_id == first.match_id && o.market == first.market)
            .unwrap();
        assert!(same.stake < first.stake);
        assert!(same.stake >= to_cents(first.stake / dec!(2)) - dec!(0.01));
    }

    #[tokio::test]
    async fn multiples_only_in_early_phases() {
        let engine = ValueEngine::new(&Config::default(), None, clock()).unwrap();

        let (manager, state) = session(dec!(100));
        let early = engine.evaluate(&manager, state).await.unwrap();
        assert!(!early.multiples.is_empty());
        assert!(early.multiples.len() <= 3);
        assert!(early.multiples.iter().all(|m| m.stake == dec!(8)));

        let (manager, state) = session(dec!(10000));
        assert_eq!(manager.phase(), Phase::Three);
        let later = engine.evaluate(&manager, state).await.unwrap();
        assert!(later.multiples.is_empty());
    }

    #[tokio::test]
    async fn production_without_credentials_refuses_to_start() {
        let config = Config {
            environment: Environment::Production,
            ..Config::default()
        };
        let err = ValueEngine::new(&config, None, clock()).err().unwrap();
        assert!(matches!(err, EngineError::ConfigurationMissing { .. }));
        assert!(matches!(
            ValueEngine::from_config(&config),
            Err(EngineError::ConfigurationMissing { .. })
        ));
    }

    #[tokio::test]
    async fn production_with_empty_live_data_finds_nothing() {
        let config = Config {
            environment: Environment::Production,
            ..Config::default()
        };
        let provider = Arc::new(MockProvider::with_config(
            SubstituteDataset::default(),
            MockConfig::default(),
        ));
        let clock = clock();
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(clock.clone()));
        let live = DataAccess::new(provider.clone(), provider.clone(), provider, cache, clock.clone());

        let engine = ValueEngine::new(&config, Some(live), clock).unwrap();
        let (manager, state) = session(dec!(100));
        let evaluation = engine.evaluate(&manager, state).await.unwrap();

        assert_eq!(evaluation.mode, DataMode::Live);
        assert!(evaluation.opportunities.is_empty());
        assert!(evaluation.multiples.is_empty());
    }

    #[tokio::test]
    async fn development_falls_back_when_live_data_is_empty() {
        let provider = Arc::new(MockProvider::new(SubstituteDataset::default()));
        let clock = clock();
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(clock.clone()));
        let live = DataAccess::new(provider.clone(), provider.clone(), provider, cache, clock.clone());

        let engine = ValueEngine::new(&Config::default(), Some(live), clock).unwrap();
        let (manager, state) = session(dec!(100));
        let evaluation = engine.evaluate(&manager, state).await.unwrap();
        assert_eq!(evaluation.mode, DataMode::Substitute);
        assert!(!evaluation.opportunities.is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = Config {
            target_bankroll_phase_2: dec!(500),
            ..Config::default()
        };
        assert!(matches!(
            ValueEngine::new(&config, None, clock()),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn register_stake_respects_cap() {
        let engine = ValueEngine::new(&Config::default(), None, clock()).unwrap();
        let (_, state) = session(dec!(100));

        let state = engine.register_stake(&state, dec!(25)).unwrap();
        assert_eq!(state.daily_staked, dec!(25));
        let err = engine.register_stake(&state, dec!(6)).unwrap_err();
        assert!(matches!(err, Rejection::DailyCapExceeded { .. }));
    }

    #[test]
    fn settle_tracks_streak() {
        let engine = ValueEngine::new(&Config::default(), None, clock()).unwrap();
        let (_, state) = session(dec!(100));
        let state = engine.settle(&state, BetResult::Lost);
        assert_eq!(state.consecutive_losses, 1);
        let state = engine.settle(&state, BetResult::Won);
        assert_eq!(state.consecutive_losses, 0);
    }
}
