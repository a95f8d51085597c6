//! Daily stake cap and loss-streak damping.
//!
//! [`RiskState`] is a plain value: every mutation returns a new state, so a
//! session threads it through explicitly. The check-then-act pair
//! [`RiskManager::check_daily_limit`] / [`RiskState::add_stake`] is not
//! atomic; concurrent sessions must not share a state without a lock.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, warn};

use super::phase::{BankrollManager, Phase};
use crate::config::Config;
use crate::error::Rejection;

/// Outcome of a settled bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BetResult {
    /// Bet won.
    Won,
    /// Bet lost.
    Lost,
    /// Bet voided; stake returned.
    Void,
}

/// Immutable risk configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPolicy {
    /// Daily stake cap (% of bankroll) per growth phase.
    pub daily_cap_pct: [f64; 4],
    /// Daily stake cap (% of bankroll) in consolidation.
    pub consolidation_daily_cap_pct: f64,
    /// Consecutive losses before stakes are damped.
    pub loss_streak_threshold: u32,
    /// Stake multiplier once the streak threshold is reached.
    pub damping_factor: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Config::default().risk_policy()
    }
}

impl RiskPolicy {
    /// Daily cap (% of bankroll) for a phase.
    pub fn daily_cap_pct(&self, phase: Phase) -> f64 {
        match phase.index() {
            Some(i) => self.daily_cap_pct[i],
            None => self.consolidation_daily_cap_pct,
        }
    }
}

/// Risk state for one betting session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskState {
    /// Bankroll the session is sized against.
    pub bankroll: Decimal,
    /// Phase of that bankroll.
    pub phase: Phase,
    /// Total staked today.
    pub daily_staked: Decimal,
    /// Losses in a row since the last win.
    pub consecutive_losses: u32,
}

impl RiskState {
    /// Fresh state for a bankroll.
    pub fn new(bankroll: &BankrollManager) -> Self {
        Self {
            bankroll: bankroll.bankroll(),
            phase: bankroll.phase(),
            daily_staked: Decimal::ZERO,
            consecutive_losses: 0,
        }
    }

    /// State with `amount` added to today's stakes.
    pub fn add_stake(&self, amount: Decimal) -> Self {
        if amount < Decimal::ZERO {
            warn!(amount = %amount, "Ignoring negative stake");
            return self.clone();
        }
        Self {
            daily_staked: self.daily_staked + amount,
            ..self.clone()
        }
    }

    /// State after a bet settles. A void leaves the streak untouched.
    pub fn update_sequence(&self, result: BetResult) -> Self {
        let consecutive_losses = match result {
            BetResult::Won => 0,
            BetResult::Lost => self.consecutive_losses.saturating_add(1),
            BetResult::Void => self.consecutive_losses,
        };
        debug!(result = %result, consecutive_losses, "Sequence updated");
        Self {
            consecutive_losses,
            ..self.clone()
        }
    }

    /// Same day against an updated bankroll: stakes and streak carried over,
    /// cap recomputed from the manager's bankroll and phase.
    pub fn rebase(&self, bankroll: &BankrollManager) -> Self {
        Self {
            bankroll: bankroll.bankroll(),
            phase: bankroll.phase(),
            ..self.clone()
        }
    }

    /// Whether this state was sized against the manager's bankroll.
    pub fn is_sized_for(&self, bankroll: &BankrollManager) -> bool {
        self.bankroll == bankroll.bankroll() && self.phase == bankroll.phase()
    }

    /// State for a new day: stakes reset, streak carried over.
    pub fn new_day(&self, bankroll: &BankrollManager) -> Self {
        Self {
            bankroll: bankroll.bankroll(),
            phase: bankroll.phase(),
            daily_staked: Decimal::ZERO,
            consecutive_losses: self.consecutive_losses,
        }
    }
}

/// Snapshot of today's exposure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSummary {
    /// Staked so far today.
    pub daily_staked: Decimal,
    /// Today's cap.
    pub daily_limit: Decimal,
    /// Cap minus stakes, never negative.
    pub remaining: Decimal,
    /// Losses in a row.
    pub consecutive_losses: u32,
    /// Current stake multiplier.
    pub stake_adjustment: f64,
}

/// Applies the risk policy to a [`RiskState`].
#[derive(Debug, Clone, Default)]
pub struct RiskManager {
    policy: RiskPolicy,
}

impl RiskManager {
    /// Create a manager for a policy.
    pub fn new(policy: RiskPolicy) -> Self {
        Self { policy }
    }

    /// Risk configuration.
    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    /// Today's stake cap.
    pub fn daily_limit(&self, state: &RiskState) -> Decimal {
        let pct = Decimal::from_f64(self.policy.daily_cap_pct(state.phase) / 100.0)
            .unwrap_or(Decimal::ZERO);
        (state.bankroll * pct).round_dp_with_strategy(2, RoundingStrategy::ToZero)
    }

    /// Allow a stake if today's total stays within the cap.
    pub fn check_daily_limit(&self, state: &RiskState, stake: Decimal) -> Result<(), Rejection> {
        if stake <= Decimal::ZERO {
            return Err(Rejection::NonPositiveStake);
        }
        let limit = self.daily_limit(state);
        if state.daily_staked + stake > limit {
            return Err(Rejection::DailyCapExceeded {
                daily_staked: state.daily_staked,
                proposed: stake,
                limit,
            });
        }
        Ok(())
    }

    /// Stake multiplier in `(0, 1]`, reduced after a run of losses.
    pub fn get_stake_adjustment(&self, state: &RiskState) -> f64 {
        if state.consecutive_losses >= self.policy.loss_streak_threshold {
            self.policy.damping_factor
        } else {
            1.0
        }
    }

    /// Exposure summary.
    pub fn summary(&self, state: &RiskState) -> RiskSummary {
        let daily_limit = self.daily_limit(state);
        RiskSummary {
            daily_staked: state.daily_staked,
            daily_limit,
            remaining: (daily_limit - state.daily_staked).max(Decimal::ZERO),
            consecutive_losses: state.consecutive_losses,
            stake_adjustment: self.get_stake_adjustment(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bankroll::PhasePolicy;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn session(bankroll: Decimal) -> (RiskManager, RiskState) {
        let manager = BankrollManager::new(PhasePolicy::default(), bankroll);
        (RiskManager::default(), RiskState::new(&manager))
    }

    #[test]
    fn daily_limit_scales_with_phase() {
        let (risk, state) = session(dec!(100));
        assert_eq!(risk.daily_limit(&state), dec!(30));

        let (risk, state) = session(dec!(60000));
        assert_eq!(state.phase, Phase::Consolidation);
        assert_eq!(risk.daily_limit(&state), dec!(3000));
    }

    #[test]
    fn stakes_accumulate_until_cap() {
        let (risk, state) = session(dec!(100));
        assert!(risk.check_daily_limit(&state, dec!(20)).is_ok());

        let state = state.add_stake(dec!(20));
        assert_eq!(state.daily_staked, dec!(20));
        assert!(risk.check_daily_limit(&state, dec!(10)).is_ok());

        let err = risk.check_daily_limit(&state, dec!(10.01)).unwrap_err();
        assert!(matches!(err, Rejection::DailyCapExceeded { .. }));
        assert!(err.to_string().contains("would exceed daily cap"));
    }

    #[test]
    fn zero_stake_is_not_a_cap_breach() {
        let (risk, state) = session(dec!(100));
        assert_eq!(
            risk.check_daily_limit(&state, Decimal::ZERO),
            Err(Rejection::NonPositiveStake)
        );
    }

    #[test]
    fn add_stake_returns_new_state() {
        let (_, state) = session(dec!(100));
        let next = state.add_stake(dec!(5));
        assert_eq!(state.daily_staked, Decimal::ZERO);
        assert_eq!(next.daily_staked, dec!(5));
        assert_eq!(next.add_stake(dec!(-3)), next);
    }

    #[test]
    fn losing_streak_damps_stakes() {
        let (risk, state) = session(dec!(100));
        let state = state
            .update_sequence(BetResult::Lost)
            .update_sequence(BetResult::Lost);
        assert_eq!(risk.get_stake_adjustment(&state), 1.0);

        let state = state.update_sequence(BetResult::Lost);
        assert_eq!(state.consecutive_losses, 3);
        assert_eq!(risk.get_stake_adjustment(&state), 0.5);

        let state = state.update_sequence(BetResult::Void);
        assert_eq!(state.consecutive_losses, 3);

        let state = state.update_sequence(BetResult::Won);
        assert_eq!(state.consecutive_losses, 0);
        assert_eq!(risk.get_stake_adjustment(&state), 1.0);
    }

    #[test]
    fn new_day_resets_stakes_but_keeps_streak() {
        let manager = BankrollManager::new(PhasePolicy::default(), dec!(100));
        let state = RiskState::new(&manager)
            .add_stake(dec!(25))
            .update_sequence(BetResult::Lost);

        let tomorrow = state.new_day(&manager.with_bankroll(dec!(1200)));
        assert_eq!(tomorrow.daily_staked, Decimal::ZERO);
        assert_eq!(tomorrow.consecutive_losses, 1);
        assert_eq!(tomorrow.phase, Phase::Two);
    }

    #[test]
    fn rebase_keeps_stakes_and_recomputes_cap() {
        let manager = BankrollManager::new(PhasePolicy::default(), dec!(100));
        let state = RiskState::new(&manager)
            .add_stake(dec!(25))
            .update_sequence(BetResult::Lost);

        let grown = manager.with_bankroll(dec!(1200));
        assert!(state.is_sized_for(&manager));
        assert!(!state.is_sized_for(&grown));

        let rebased = state.rebase(&grown);
        assert!(rebased.is_sized_for(&grown));
        assert_eq!(rebased.daily_staked, dec!(25));
        assert_eq!(rebased.consecutive_losses, 1);
        assert_eq!(RiskManager::default().daily_limit(&rebased), dec!(300));
    }

    #[test]
    fn summary_reports_remaining_room() {
        let (risk, state) = session(dec!(100));
        let summary = risk.summary(&state.add_stake(dec!(12.5)));
        assert_eq!(summary.daily_limit, dec!(30));
        assert_eq!(summary.remaining, dec!(17.5));
        assert_eq!(summary.stake_adjustment, 1.0);
    }

    #[test]
    fn bet_result_parses() {
        assert_eq!(BetResult::from_str("won").unwrap(), BetResult::Won);
        assert_eq!(BetResult::Void.to_string(), "void");
    }
}
