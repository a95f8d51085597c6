//! Multi-leg bet detection.
//!
//! Legs are priced as independent events: combined odds and probability are
//! plain products. Correlation between selections is not modelled.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use super::opportunity::Opportunity;
use crate::bankroll::Phase;
use crate::config::Config;
use crate::market::MarketKind;

/// Immutable multiple-detection configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiplePolicy {
    /// Minimum joint probability.
    pub min_combined_probability: f64,
    /// Maximum legs per multiple.
    pub max_legs: usize,
    /// Multiples suggested per pass.
    pub limit: usize,
    /// Stake (% of bankroll) in phase 1.
    pub stake_pct_phase_1: f64,
    /// Stake (% of bankroll) in phase 2.
    pub stake_pct_phase_2: f64,
}

impl Default for MultiplePolicy {
    fn default() -> Self {
        Config::default().multiple_policy()
    }
}

impl MultiplePolicy {
    /// Stake percentage for multiples; `None` where multiples are not offered.
    pub fn stake_pct(&self, phase: Phase) -> Option<f64> {
        match phase {
            Phase::One => Some(self.stake_pct_phase_1),
            Phase::Two => Some(self.stake_pct_phase_2),
            _ => None,
        }
    }
}

/// A candidate combination of opportunities.
#[derive(Debug, Clone, PartialEq)]
pub struct Combination<'a> {
    /// Legs, in input order.
    pub legs: SmallVec<[&'a Opportunity; 3]>,
    /// Product of leg odds.
    pub combined_odds: f64,
    /// Product of leg probabilities.
    pub combined_probability: f64,
    /// `(combined_probability * combined_odds - 1) * 100`.
    pub combined_ev: f64,
}

/// One leg of a formatted multiple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleLeg {
    /// Fixture identifier.
    pub match_id: String,
    /// "Home x Away".
    #[serde(rename = "match")]
    pub match_label: String,
    /// Selection.
    pub market: MarketKind,
    /// Leg odds.
    pub odds: f64,
    /// Leg probability.
    pub probability: f64,
}

/// A multi-leg bet ready to hand to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleBet {
    /// Legs.
    pub legs: Vec<MultipleLeg>,
    /// Product of leg odds.
    pub combined_odds: f64,
    /// Product of leg probabilities.
    pub combined_probability: f64,
    /// Expected value in percent.
    pub ev: f64,
    /// Stake.
    pub stake: Decimal,
    /// `stake * combined_odds`.
    pub potential_return: Decimal,
}

/// Finds multiples among independently valued opportunities.
#[derive(Debug, Clone, Default)]
pub struct MultipleDetector {
    policy: MultiplePolicy,
}

impl MultipleDetector {
    /// Create a detector.
    pub fn new(policy: MultiplePolicy) -> Self {
        Self { policy }
    }

    /// Detection configuration.
    pub fn policy(&self) -> &MultiplePolicy {
        &self.policy
    }

    /// Enumerate 2..=max_legs combinations from distinct matches, keep those
    /// at or above the joint probability floor, best combined EV first.
    pub fn detect<'a>(&self, opportunities: &'a [Opportunity], limit: usize) -> Vec<Combination<'a>> {
        let mut found = Vec::new();
        let mut stack: SmallVec<[usize; 3]> = SmallVec::new();
        self.extend(opportunities, 0, &mut stack, &mut found);

        found.sort_by(|a, b| b.combined_ev.total_cmp(&a.combined_ev));
        found.truncate(limit);

        debug!(
            candidates = opportunities.len(),
            found = found.len(),
            "Multiple detection finished"
        );
        found
    }

    fn extend<'a>(
        &self,
        opportunities: &'a [Opportunity],
        start: usize,
        stack: &mut SmallVec<[usize; 3]>,
        found: &mut Vec<Combination<'a>>,
    ) {
        if !stack.is_empty() {
            let combined_probability: f64 =
                stack.iter().map(|&i| opportunities[i].probability).product();
            // Adding legs can only lower the joint probability.
            if combined_probability < self.policy.min_combined_probability {
                return;
            }
            if stack.len() >= 2 {
                let legs: SmallVec<[&'a Opportunity; 3]> =
                    stack.iter().map(|&i| &opportunities[i]).collect();
                let combined_odds: f64 = legs.iter().map(|o| o.odds).product();
                found.push(Combination {
                    legs,
                    combined_odds,
                    combined_probability,
                    combined_ev: (combined_probability * combined_odds - 1.0) * 100.0,
                });
            }
        }
        if stack.len() >= self.policy.max_legs {
            return;
        }

        for i in start..opportunities.len() {
            let candidate = &opportunities[i];
            if stack
                .iter()
                .any(|&j| opportunities[j].match_id == candidate.match_id)
            {
                continue;
            }
            stack.push(i);
            self.extend(opportunities, i + 1, stack, found);
            stack.pop();
        }
    }

    /// Turn a combination into a bet with the given stake.
    pub fn format_multiple(&self, combination: &Combination<'_>, stake: Decimal) -> MultipleBet {
        let odds = Decimal::from_f64(combination.combined_odds).unwrap_or(Decimal::ZERO);
        MultipleBet {
            legs: combination
                .legs
                .iter()
                .map(|o| MultipleLeg {
                    match_id: o.match_id.clone(),
                    match_label: o.match_label.clone(),
                    market: o.market,
                    odds: o.odds,
                    probability: o.probability,
                })
                .collect(),
            combined_odds: combination.combined_odds,
            combined_probability: combination.combined_probability,
            ev: (combination.combined_ev * 100.0).round() / 100.0,
            stake,
            potential_return: stake * odds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Match, MatchStatus, TotalSide};
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn opportunity(match_id: &str, probability: f64, odds: f64) -> Opportunity {
        let fixture = Match {
            match_id: match_id.to_string(),
            home_team: format!("{} Home", match_id),
            away_team: format!("{} Away", match_id),
            competition: "Premier League".to_string(),
            date: datetime!(2025-03-01 15:00 UTC),
            status: MatchStatus::NotStarted,
        };
        let market = MarketKind::OverUnder {
            side: TotalSide::Over,
            line: dec!(2.5),
        };
        Opportunity::new(&fixture, market, odds, probability, 0.0, dec!(1), Phase::One).unwrap()
    }

    fn ladder() -> Vec<Opportunity> {
        [0.6, 0.55, 0.5, 0.45, 0.4]
            .iter()
            .enumerate()
            .map(|(i, p)| opportunity(&format!("m{}", i), *p, 1.0 / p + 0.2))
            .collect()
    }

    fn detector(max_legs: usize) -> MultipleDetector {
        MultipleDetector::new(MultiplePolicy {
            min_combined_probability: 0.30,
            max_legs,
            ..MultiplePolicy::default()
        })
    }

    fn has_pair(found: &[Combination<'_>], a: f64, b: f64) -> bool {
        found.iter().any(|c| {
            let probs: Vec<f64> = c.legs.iter().map(|o| o.probability).collect();
            probs == vec![a, b] || probs == vec![b, a]
        })
    }

    #[test]
    fn pairs_respect_joint_probability_floor() {
        let opps = ladder();
        let found = detector(2).detect(&opps, usize::MAX);

        assert!(has_pair(&found, 0.6, 0.55));
        assert!(!has_pair(&found, 0.4, 0.45));
        assert!(found.iter().all(|c| c.legs.len() == 2));
        assert!(found.iter().all(|c| c.combined_probability >= 0.30));
    }

    #[test]
    fn legs_never_share_a_match() {
        let mut opps = ladder();
        opps.push(opportunity("m0", 0.7, 1.6));
        opps.push(opportunity("m1", 0.65, 1.7));

        let found = detector(3).detect(&opps, usize::MAX);
        assert!(!found.is_empty());
        for combination in &found {
            let mut ids: Vec<&str> = combination.legs.iter().map(|o| o.match_id.as_str()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), combination.legs.len());
        }
    }

    #[test]
    fn results_are_ranked_and_limited() {
        let opps: Vec<_> = [0.9, 0.85, 0.8, 0.75]
            .iter()
            .enumerate()
            .map(|(i, p)| opportunity(&format!("m{}", i), *p, 1.0 / p + 0.1))
            .collect();
        let found = detector(3).detect(&opps, 3);
        assert_eq!(found.len(), 3);
        assert!(found.windows(2).all(|w| w[0].combined_ev >= w[1].combined_ev));
    }

    #[test]
    fn combined_values_are_products() {
        let opps = vec![opportunity("a", 0.7, 1.6), opportunity("b", 0.6, 1.9)];
        let found = detector(2).detect(&opps, 1);
        let c = &found[0];
        assert!((c.combined_odds - 1.6 * 1.9).abs() < 1e-12);
        assert!((c.combined_probability - 0.42).abs() < 1e-12);
        assert!((c.combined_ev - (0.42 * 3.04 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn potential_return_is_stake_times_combined_odds() {
        let opps = ladder();
        let d = detector(3);
        let found = d.detect(&opps, 3);
        let bet = d.format_multiple(&found[0], dec!(10));

        let expected = 10.0 * found[0].combined_odds;
        assert!((bet.potential_return.to_f64().unwrap() - expected).abs() < 1e-9);
        assert_eq!(bet.legs.len(), found[0].legs.len());
        assert_eq!(bet.stake, dec!(10));
    }

    #[test]
    fn single_opportunity_yields_nothing() {
        let opps = vec![opportunity("a", 0.9, 1.3)];
        assert!(detector(3).detect(&opps, 3).is_empty());
    }

    #[test]
    fn multiples_only_in_early_phases() {
        let policy = MultiplePolicy::default();
        assert_eq!(policy.stake_pct(Phase::One), Some(8.0));
        assert_eq!(policy.stake_pct(Phase::Two), Some(5.0));
        assert_eq!(policy.stake_pct(Phase::Three), None);
        assert_eq!(policy.stake_pct(Phase::Consolidation), None);
    }
}
