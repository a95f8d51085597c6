//! Phase state machine over bankroll size and single-bet stake sizing.

use std::fmt;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::config::Config;

/// Bankroll growth phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// First growth phase.
    One,
    /// Second growth phase.
    Two,
    /// Third growth phase.
    Three,
    /// Fourth growth phase.
    Four,
    /// Capital preservation above the consolidation threshold.
    Consolidation,
}

impl Phase {
    /// Growth phases in order.
    pub const GROWTH: [Phase; 4] = [Phase::One, Phase::Two, Phase::Three, Phase::Four];

    /// Zero-based index of a growth phase; `None` in consolidation.
    pub fn index(&self) -> Option<usize> {
        match self {
            Phase::One => Some(0),
            Phase::Two => Some(1),
            Phase::Three => Some(2),
            Phase::Four => Some(3),
            Phase::Consolidation => None,
        }
    }

    /// Whether this is the consolidation regime.
    pub fn is_consolidation(&self) -> bool {
        matches!(self, Phase::Consolidation)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(i) => write!(f, "{}", i + 1),
            None => f.write_str("consolidation"),
        }
    }
}

// Persisted as 1..=4 or "consolidation".
impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.index() {
            Some(i) => serializer.serialize_u8(i as u8 + 1),
            None => serializer.serialize_str("consolidation"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PhaseRepr {
    Number(u8),
    Label(String),
}

impl<'de> Deserialize<'de> for Phase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let phase = match PhaseRepr::deserialize(deserializer)? {
            PhaseRepr::Number(n @ 1..=4) => Phase::GROWTH[usize::from(n - 1)],
            PhaseRepr::Label(label) if label.eq_ignore_ascii_case("consolidation") => {
                Phase::Consolidation
            }
            PhaseRepr::Label(label) => match label.parse::<u8>() {
                Ok(n @ 1..=4) => Phase::GROWTH[usize::from(n - 1)],
                _ => return Err(serde::de::Error::custom(format!("unknown phase: {}", label))),
            },
            PhaseRepr::Number(n) => {
                return Err(serde::de::Error::custom(format!("unknown phase: {}", n)))
            }
        };
        Ok(phase)
    }
}

/// Target and limits for one growth phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseRule {
    /// Bankroll that completes the phase.
    pub target: Decimal,
    /// Minimum EV (%) for a bet to qualify.
    pub min_ev: f64,
    /// Maximum single stake (% of bankroll).
    pub max_stake_pct: f64,
}

impl PhaseRule {
    /// Create a phase rule.
    pub fn new(target: Decimal, min_ev: f64, max_stake_pct: f64) -> Self {
        Self {
            target,
            min_ev,
            max_stake_pct,
        }
    }
}

/// Immutable phase configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PhasePolicy {
    /// Bankroll at or above which consolidation applies.
    pub consolidation_threshold: Decimal,
    /// Growth phase rules, strictly ascending targets.
    pub phases: [PhaseRule; 4],
    /// Minimum EV (%) in consolidation.
    pub consolidation_min_ev: f64,
    /// Maximum single stake (% of bankroll) in consolidation.
    pub consolidation_max_stake_pct: f64,
    /// Share (%) of the surplus over a reached target marked for withdrawal.
    pub withdraw_pct: f64,
    /// Fraction of Kelly used for sizing.
    pub kelly_multiplier: f64,
}

impl Default for PhasePolicy {
    fn default() -> Self {
        Config::default().phase_policy()
    }
}

impl PhasePolicy {
    /// Phase for a bankroll: consolidation at or above the threshold, else the
    /// first phase whose target has not been reached.
    pub fn phase_for(&self, bankroll: Decimal) -> Phase {
        if bankroll >= self.consolidation_threshold {
            return Phase::Consolidation;
        }
        Phase::GROWTH
            .iter()
            .zip(self.phases.iter())
            .find(|(_, rule)| bankroll < rule.target)
            .map(|(phase, _)| *phase)
            .unwrap_or(Phase::Four)
    }

    /// Target for a growth phase.
    pub fn target(&self, phase: Phase) -> Option<Decimal> {
        phase.index().map(|i| self.phases[i].target)
    }

    /// Minimum EV (%) for a phase.
    pub fn min_ev(&self, phase: Phase) -> f64 {
        match phase.index() {
            Some(i) => self.phases[i].min_ev,
            None => self.consolidation_min_ev,
        }
    }

    /// Maximum single stake (% of bankroll) for a phase.
    pub fn max_stake_pct(&self, phase: Phase) -> f64 {
        match phase.index() {
            Some(i) => self.phases[i].max_stake_pct,
            None => self.consolidation_max_stake_pct,
        }
    }
}

/// Snapshot of bankroll and the limits that follow from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankrollState {
    /// Current bankroll.
    pub bankroll: Decimal,
    /// Phase derived from the bankroll.
    pub phase: Phase,
    /// Phase target (absent in consolidation).
    pub target: Option<Decimal>,
    /// Minimum EV (%).
    pub min_ev: f64,
    /// Maximum single stake (%).
    pub max_stake_pct: f64,
}

/// Phase summary with progress toward the target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseInfo {
    /// Current phase.
    pub phase: Phase,
    /// Current bankroll.
    pub bankroll: Decimal,
    /// Phase target (absent in consolidation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Decimal>,
    /// Minimum EV (%).
    pub min_ev: f64,
    /// Maximum single stake (%).
    pub max_stake_pct: f64,
    /// `100 * bankroll / target` (absent in consolidation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<f64>,
    /// `target - bankroll`, never negative (absent in consolidation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<Decimal>,
}

fn to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Phase-aware bankroll manager.
///
/// The manager never changes the bankroll itself; callers derive a new
/// manager with [`BankrollManager::with_bankroll`] after settling bets.
#[derive(Debug, Clone)]
pub struct BankrollManager {
    policy: PhasePolicy,
    bankroll: Decimal,
    opened_in: Phase,
}

impl BankrollManager {
    /// Start a manager at the given bankroll; negative amounts clamp to zero.
    pub fn new(policy: PhasePolicy, bankroll: Decimal) -> Self {
        let bankroll = bankroll.max(Decimal::ZERO);
        let opened_in = policy.phase_for(bankroll);
        Self {
            policy,
            bankroll,
            opened_in,
        }
    }

    /// Resume a session that opened in `opened_in`, such as the operator's
    /// declared current phase after a restart. Completion is then checked
    /// against that phase's target even if the bankroll has already passed it.
    pub fn resume(policy: PhasePolicy, bankroll: Decimal, opened_in: Phase) -> Self {
        Self {
            policy,
            bankroll: bankroll.max(Decimal::ZERO),
            opened_in,
        }
    }

    /// Phase the session opened in.
    pub fn opened_in(&self) -> Phase {
        self.opened_in
    }

    /// Same session with an updated bankroll.
    pub fn with_bankroll(&self, bankroll: Decimal) -> Self {
        Self {
            policy: self.policy.clone(),
            bankroll: bankroll.max(Decimal::ZERO),
            opened_in: self.opened_in,
        }
    }

    /// Start a new phase session from the current bankroll.
    pub fn begin_next_phase(&self, withdrawn: Decimal) -> Self {
        Self::new(self.policy.clone(), self.bankroll - withdrawn)
    }

    /// Current bankroll.
    pub fn bankroll(&self) -> Decimal {
        self.bankroll
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.policy.phase_for(self.bankroll)
    }

    /// Phase configuration.
    pub fn policy(&self) -> &PhasePolicy {
        &self.policy
    }

    /// Bankroll plus the limits of its phase.
    pub fn state(&self) -> BankrollState {
        let phase = self.phase();
        BankrollState {
            bankroll: self.bankroll,
            phase,
            target: self.policy.target(phase),
            min_ev: self.policy.min_ev(phase),
            max_stake_pct: self.policy.max_stake_pct(phase),
        }
    }

    /// Phase summary with progress toward the target.
    pub fn get_phase_info(&self) -> PhaseInfo {
        let state = self.state();

        let (progress_pct, remaining) = match state.target {
            Some(target) if target > Decimal::ZERO => {
                let progress = (self.bankroll / target * Decimal::ONE_HUNDRED)
                    .round_dp(2)
                    .to_f64();
                let remaining = (target - self.bankroll).max(Decimal::ZERO);
                (progress, Some(remaining))
            }
            _ => (None, None),
        };

        PhaseInfo {
            phase: state.phase,
            bankroll: state.bankroll,
            target: state.target,
            min_ev: state.min_ev,
            max_stake_pct: state.max_stake_pct,
            progress_pct,
            remaining,
        }
    }

    /// Largest single stake the current phase allows.
    pub fn max_stake(&self) -> Decimal {
        let pct = self.policy.max_stake_pct(self.phase()) / 100.0;
        let cap = self.bankroll * Decimal::from_f64(pct).unwrap_or(Decimal::ZERO);
        to_cents(cap)
    }

    /// Stake for a single bet.
    ///
    /// Fractional Kelly: `kelly_multiplier * (ev / 100) / (odds - 1)` of the
    /// bankroll, which grows with EV at fixed odds, hard-capped at the phase's
    /// maximum stake and rounded down to cents. Invalid inputs or a
    /// non-positive EV give zero.
    pub fn calculate_stake(&self, probability: f64, odds: f64, ev_percent: f64) -> Decimal {
        if !odds.is_finite() || odds <= 1.0 {
            return Decimal::ZERO;
        }
        if !ev_percent.is_finite() || ev_percent <= 0.0 {
            return Decimal::ZERO;
        }
        if !(probability > 0.0 && probability <= 1.0) {
            return Decimal::ZERO;
        }

        let cap_fraction = self.policy.max_stake_pct(self.phase()) / 100.0;
        let fraction = (self.policy.kelly_multiplier * (ev_percent / 100.0) / (odds - 1.0))
            .clamp(0.0, cap_fraction);

        let stake = self.bankroll * Decimal::from_f64(fraction).unwrap_or(Decimal::ZERO);
        let stake = to_cents(stake).min(self.max_stake());

        debug!(
            probability,
            odds,
            ev = ev_percent,
            fraction,
            stake = %stake,
            "Stake sized"
        );
        stake
    }

    /// Whether the session's phase target has been reached, and how much of
    /// the surplus to withdraw.
    ///
    /// The phase is the one the session opened in, so growing past a target
    /// reports completion until [`BankrollManager::begin_next_phase`] starts a
    /// new session. Never completes in consolidation.
    pub fn check_phase_completion(&self) -> (bool, Decimal) {
        let Some(target) = self.policy.target(self.opened_in) else {
            return (false, Decimal::ZERO);
        };
        if self.bankroll < target {
            return (false, Decimal::ZERO);
        }

        let share = Decimal::from_f64(self.policy.withdraw_pct / 100.0).unwrap_or(Decimal::ZERO);
        let withdraw = to_cents((self.bankroll - target) * share);

        info!(
            phase = %self.opened_in,
            bankroll = %self.bankroll,
            target = %target,
            withdraw = %withdraw,
            "Phase target reached"
        );
        (true, withdraw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rust_decimal_macros::dec;

    fn manager(bankroll: Decimal) -> BankrollManager {
        BankrollManager::new(PhasePolicy::default(), bankroll)
    }

    #[test]
    fn phase_follows_bankroll() {
        let policy = PhasePolicy::default();
        assert_eq!(policy.phase_for(dec!(100)), Phase::One);
        assert_eq!(policy.phase_for(dec!(999.99)), Phase::One);
        assert_eq!(policy.phase_for(dec!(1000)), Phase::Two);
        assert_eq!(policy.phase_for(dec!(1500)), Phase::Two);
        assert_eq!(policy.phase_for(dec!(24999)), Phase::Three);
        assert_eq!(policy.phase_for(dec!(30000)), Phase::Four);
        assert_eq!(policy.phase_for(dec!(60000)), Phase::Consolidation);
    }

    #[test]
    fn phase_stays_four_between_last_target_and_threshold() {
        let policy = PhasePolicy {
            consolidation_threshold: dec!(200000),
            ..PhasePolicy::default()
        };
        assert_eq!(policy.phase_for(dec!(150000)), Phase::Four);
    }

    #[test]
    fn consolidation_is_strictest() {
        let policy = PhasePolicy::default();
        for phase in Phase::GROWTH {
            assert!(policy.min_ev(Phase::Consolidation) >= policy.min_ev(phase));
            assert!(policy.max_stake_pct(Phase::Consolidation) < policy.max_stake_pct(phase));
        }
    }

    #[test]
    fn phase_serializes_as_number_or_label() {
        assert_eq!(serde_json::to_value(Phase::Two).unwrap(), serde_json::json!(2));
        assert_eq!(
            serde_json::to_value(Phase::Consolidation).unwrap(),
            serde_json::json!("consolidation")
        );
        let back: Phase = serde_json::from_value(serde_json::json!(3)).unwrap();
        assert_eq!(back, Phase::Three);
        let back: Phase = serde_json::from_value(serde_json::json!("consolidation")).unwrap();
        assert_eq!(back, Phase::Consolidation);
        assert!(serde_json::from_value::<Phase>(serde_json::json!(7)).is_err());
    }

    #[test]
    fn phase_info_reports_progress() {
        let info = manager(dec!(250)).get_phase_info();
        assert_eq!(info.phase, Phase::One);
        assert_eq!(info.target, Some(dec!(1000)));
        assert_eq!(info.progress_pct, Some(25.0));
        assert_eq!(info.remaining, Some(dec!(750)));
        assert_eq!(info.min_ev, 8.0);
        assert_eq!(info.max_stake_pct, 15.0);
    }

    #[test]
    fn phase_info_omits_target_in_consolidation() {
        let info = manager(dec!(60000)).get_phase_info();
        assert_eq!(info.phase, Phase::Consolidation);
        assert_eq!(info.target, None);
        assert_eq!(info.progress_pct, None);
        assert_eq!(info.remaining, None);

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("target").is_none());
        assert_eq!(json["phase"], "consolidation");
    }

    #[test]
    fn stake_grows_with_ev() {
        let m = manager(dec!(100));
        let low = m.calculate_stake(0.55, 2.0, 10.0);
        let high = m.calculate_stake(0.6, 2.0, 20.0);
        assert!(high > low);
        // 0.25 * 0.10 / 1.0 = 2.5% of 100
        assert_eq!(low, dec!(2.50));
    }

    #[test]
    fn stake_is_capped_by_phase() {
        let m = manager(dec!(100));
        // Kelly fraction well above 15%
        assert_eq!(m.calculate_stake(0.95, 3.0, 185.0), dec!(15.00));
        assert_eq!(m.max_stake(), dec!(15.00));
    }

    #[test]
    fn invalid_inputs_give_zero_stake() {
        let m = manager(dec!(100));
        assert_eq!(m.calculate_stake(0.5, 1.0, 10.0), Decimal::ZERO);
        assert_eq!(m.calculate_stake(0.5, 2.0, -3.0), Decimal::ZERO);
        assert_eq!(m.calculate_stake(f64::NAN, 2.0, 10.0), Decimal::ZERO);
        assert_eq!(m.calculate_stake(0.5, f64::INFINITY, 10.0), Decimal::ZERO);
        assert_eq!(manager(Decimal::ZERO).calculate_stake(0.6, 2.0, 20.0), Decimal::ZERO);
    }

    #[test]
    fn stake_never_exceeds_phase_cap() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..2_000 {
            let bankroll = Decimal::from_f64(rng.gen_range(0.0..120_000.0))
                .unwrap()
                .round_dp(2);
            let probability: f64 = rng.gen_range(0.0..=1.0);
            let odds: f64 = rng.gen_range(1.01..25.0);
            let ev = (probability * odds - 1.0) * 100.0;

            let m = manager(bankroll);
            let stake = m.calculate_stake(probability, odds, ev);
            let pct = Decimal::from_f64(m.state().max_stake_pct / 100.0).unwrap();

            assert!(stake >= Decimal::ZERO);
            assert!(
                stake <= bankroll * pct,
                "stake {} above cap for bankroll {}",
                stake,
                bankroll
            );
        }
    }

    #[test]
    fn completion_is_detected_against_opening_phase() {
        let start = manager(dec!(800));
        assert_eq!(start.check_phase_completion(), (false, Decimal::ZERO));

        let grown = start.with_bankroll(dec!(1200));
        assert_eq!(grown.phase(), Phase::Two);
        assert_eq!(grown.check_phase_completion(), (true, dec!(100)));

        let next = grown.begin_next_phase(dec!(100));
        assert_eq!(next.bankroll(), dec!(1100));
        assert_eq!(next.check_phase_completion(), (false, Decimal::ZERO));
    }

    #[test]
    fn resumed_session_over_target_reports_completion() {
        // A restart at 1200 with phase 1 declared: the 1000 target was passed
        // while the process was down.
        let resumed = BankrollManager::resume(PhasePolicy::default(), dec!(1200), Phase::One);
        assert_eq!(resumed.phase(), Phase::Two);
        assert_eq!(resumed.opened_in(), Phase::One);
        assert_eq!(resumed.check_phase_completion(), (true, dec!(100)));

        let far = BankrollManager::resume(PhasePolicy::default(), dec!(5500), Phase::One);
        assert_eq!(far.check_phase_completion(), (true, dec!(2250)));

        // A fresh manager opens in the bankroll's own phase.
        assert_eq!(manager(dec!(1200)).check_phase_completion(), (false, Decimal::ZERO));
    }

    #[test]
    fn resumed_session_below_target_does_not_complete() {
        let resumed = BankrollManager::resume(PhasePolicy::default(), dec!(3000), Phase::Two);
        assert_eq!(resumed.check_phase_completion(), (false, Decimal::ZERO));
    }

    #[test]
    fn consolidation_never_completes() {
        let m = manager(dec!(75000)).with_bankroll(dec!(500000));
        assert_eq!(m.check_phase_completion(), (false, Decimal::ZERO));
    }
}
