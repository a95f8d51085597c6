//! Value opportunities and market scoring.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::probability::{check_opportunity, ProbabilityModel};
use crate::bankroll::Phase;
use crate::error::Rejection;
use crate::market::{MarketKind, Match, TeamStats, TotalSide};

/// An accepted single bet.
///
/// Field names and scales (probability in `[0, 1]`, EV in percent, stake in
/// currency units, phase as 1..4 or "consolidation") are what downstream
/// consumers persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Fixture identifier.
    pub match_id: String,
    /// "Home x Away".
    #[serde(rename = "match")]
    pub match_label: String,
    /// Competition name.
    pub competition: String,
    /// Kick-off.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Selection.
    pub market: MarketKind,
    /// Best available decimal odds.
    pub odds: f64,
    /// Model probability.
    pub probability: f64,
    /// Expected value in percent.
    pub ev: f64,
    /// Stake.
    pub stake: Decimal,
    /// `stake * odds`.
    pub potential_return: Decimal,
    /// Phase the stake was sized in.
    pub phase: Phase,
}

impl Opportunity {
    /// Build an opportunity. The EV is derived from `probability` and `odds`;
    /// the selection must beat the implied probability and reach `min_ev`, and
    /// the stake must be positive.
    pub fn new(
        fixture: &Match,
        market: MarketKind,
        odds: f64,
        probability: f64,
        min_ev: f64,
        stake: Decimal,
        phase: Phase,
    ) -> Result<Self, Rejection> {
        let ev = check_opportunity(probability, odds, min_ev)?;
        if stake <= Decimal::ZERO {
            return Err(Rejection::NonPositiveStake);
        }

        let potential_return = (stake * Decimal::from_f64(odds).unwrap_or(Decimal::ONE))
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);

        Ok(Self {
            match_id: fixture.match_id.clone(),
            match_label: fixture.label(),
            competition: fixture.competition.clone(),
            date: fixture.date,
            market,
            odds,
            probability,
            ev,
            stake,
            potential_return,
            phase,
        })
    }
}

/// Model probability for a selection, or `None` when the model has no view.
pub fn model_probability(
    model: &ProbabilityModel,
    market: MarketKind,
    home: &TeamStats,
    away: &TeamStats,
) -> Option<f64> {
    match market {
        MarketKind::OverUnder { side, .. } => {
            let line = market.total_line()?;
            let probs = model.score_over_under(home.avg_scored, away.avg_scored, line);
            Some(match side {
                TotalSide::Over => probs.prob_over,
                TotalSide::Under => probs.prob_under,
            })
        }
        MarketKind::BothTeamsScore { yes } => {
            let p = model.score_both_teams_to_score(
                home.avg_scored,
                home.avg_conceded,
                away.avg_scored,
                away.avg_conceded,
            );
            Some(if yes { p } else { ((1.0 - p) * 10_000.0).round() / 10_000.0 })
        }
        MarketKind::Handicap { .. } => None,
    }
}

/// Sort opportunities by EV, highest first; equal EVs keep their order.
pub fn sort_by_ev(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| b.ev.total_cmp(&a.ev));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{HandicapSide, MatchStatus};
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    fn fixture() -> Match {
        Match {
            match_id: "apif_10".to_string(),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            competition: "Premier League".to_string(),
            date: datetime!(2025-03-01 15:00 UTC),
            status: MatchStatus::NotStarted,
        }
    }

    fn over(line: Decimal) -> MarketKind {
        MarketKind::OverUnder {
            side: TotalSide::Over,
            line,
        }
    }

    #[test]
    fn opportunity_carries_fixture_fields() {
        let opp = Opportunity::new(&fixture(), over(dec!(2.5)), 1.45, 0.7783, 8.0, dec!(7.14), Phase::One)
            .unwrap();
        assert_eq!(opp.match_label, "Arsenal x Chelsea");
        assert_eq!(opp.ev, 12.85);
        assert_eq!(opp.potential_return, dec!(10.35));

        let json = serde_json::to_value(&opp).unwrap();
        assert_eq!(json["match"], "Arsenal x Chelsea");
        assert_eq!(json["market"], "over_2.5");
        assert_eq!(json["phase"], 1);
        assert_eq!(json["probability"], 0.7783);
    }

    #[test]
    fn opportunity_requires_edge_and_stake() {
        let no_edge = Opportunity::new(&fixture(), over(dec!(2.5)), 2.0, 0.5, 0.0, dec!(5), Phase::One);
        assert!(matches!(no_edge, Err(Rejection::NoEdge { .. })));

        let no_stake = Opportunity::new(&fixture(), over(dec!(2.5)), 2.0, 0.6, 8.0, dec!(0), Phase::One);
        assert_eq!(no_stake, Err(Rejection::NonPositiveStake));
    }

    #[test]
    fn opportunity_below_ev_floor_is_rejected() {
        // 0.51 * 2.0 gives 2% EV: an edge, but under an 8% floor.
        let thin = Opportunity::new(&fixture(), over(dec!(2.5)), 2.0, 0.51, 8.0, dec!(5), Phase::One);
        assert_eq!(thin, Err(Rejection::EvBelowMinimum { ev: 2.0, min_ev: 8.0 }));

        let accepted = Opportunity::new(&fixture(), over(dec!(2.5)), 2.0, 0.51, 2.0, dec!(5), Phase::One).unwrap();
        assert_eq!(accepted.ev, 2.0);
    }

    #[test]
    fn opportunity_rejects_invalid_odds() {
        let even = Opportunity::new(&fixture(), over(dec!(2.5)), 1.0, 0.9, 0.0, dec!(5), Phase::One);
        assert!(matches!(even, Err(Rejection::InvalidInput(_))));
    }

    #[test]
    fn model_scores_totals_and_btts() {
        let model = ProbabilityModel::default();
        let home = TeamStats::new(2.1, 0.9);
        let away = TeamStats::new(1.7, 1.2);

        assert_eq!(model_probability(&model, over(dec!(2.5)), &home, &away), Some(0.7783));
        let under = MarketKind::OverUnder {
            side: TotalSide::Under,
            line: dec!(2.5),
        };
        assert_eq!(model_probability(&model, under, &home, &away), Some(0.2217));
        assert_eq!(
            model_probability(&model, MarketKind::BothTeamsScore { yes: true }, &home, &away),
            Some(0.7443)
        );
        assert_eq!(
            model_probability(&model, MarketKind::BothTeamsScore { yes: false }, &home, &away),
            Some(0.2557)
        );
    }

    #[test]
    fn handicap_has_no_model() {
        let model = ProbabilityModel::default();
        let stats = TeamStats::new(1.5, 1.5);
        let spread = MarketKind::Handicap {
            side: HandicapSide::Home,
            line: dec!(-1.5),
        };
        assert_eq!(model_probability(&model, spread, &stats, &stats), None);
    }

    #[test]
    fn sort_puts_best_ev_first() {
        // 0.545, 0.575 and 0.555 at evens: 9%, 15% and 11% EV.
        let mut opps: Vec<_> = [0.545, 0.575, 0.555]
            .iter()
            .map(|p| {
                Opportunity::new(&fixture(), over(dec!(2.5)), 2.0, *p, 0.0, dec!(1), Phase::One).unwrap()
            })
            .collect();
        sort_by_ev(&mut opps);
        let evs: Vec<f64> = opps.iter().map(|o| o.ev).collect();
        assert_eq!(evs, vec![15.0, 11.0, 9.0]);
    }
}
