//! Poisson scoring model and expected-value checks.

use crate::error::Rejection;

/// Multiplier applied to the home side's scoring rate.
pub const HOME_ADVANTAGE: f64 = 1.15;

/// Over/under probabilities for one line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverUnderProbabilities {
    /// P(total goals > line).
    pub prob_over: f64,
    /// P(total goals <= floor(line)).
    pub prob_under: f64,
    /// Expected total goals (λ).
    pub expected_goals: f64,
}

fn round_to(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

/// Poisson probability mass at `k` for rate `lambda`.
pub fn poisson_pmf(k: u32, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    let mut term = (-lambda).exp();
    for i in 1..=k {
        term *= lambda / f64::from(i);
    }
    term
}

/// Poisson cumulative probability P(X <= k).
///
/// Runs in at most `lambda + 50 * sqrt(lambda) + 50` steps whatever `k` is;
/// the mass above that bound is below f64 precision.
pub fn poisson_cdf(k: u32, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    if !lambda.is_finite() {
        return 0.0;
    }
    if f64::from(k) >= lambda + 50.0 * lambda.sqrt() + 50.0 {
        return 1.0;
    }
    let mut term = (-lambda).exp();
    let mut total = term;
    for i in 1..=k {
        term *= lambda / f64::from(i);
        // Past the mode the remaining terms no longer move the sum.
        if f64::from(i) > lambda && term <= total * f64::EPSILON {
            break;
        }
        total += term;
    }
    total.min(1.0)
}

/// Expected value of a bet in percent: `(p * odds - 1) * 100`, two decimals.
pub fn compute_ev(probability: f64, odds: f64) -> f64 {
    round_to((probability * odds - 1.0) * 100.0, 2)
}

/// Poisson goal model for football matches.
#[derive(Debug, Clone, Copy)]
pub struct ProbabilityModel {
    home_advantage: f64,
}

impl Default for ProbabilityModel {
    fn default() -> Self {
        Self {
            home_advantage: HOME_ADVANTAGE,
        }
    }
}

impl ProbabilityModel {
    /// Model with a custom home advantage multiplier.
    pub fn with_home_advantage(home_advantage: f64) -> Self {
        Self { home_advantage }
    }

    /// Total-goals probabilities for a line, from each side's scoring average.
    pub fn score_over_under(&self, home_avg: f64, away_avg: f64, line: f64) -> OverUnderProbabilities {
        let lambda = (home_avg * self.home_advantage + away_avg).max(0.0);

        let prob_under = if line.is_finite() && line >= 0.0 {
            poisson_cdf(line.floor() as u32, lambda)
        } else {
            0.0
        };

        OverUnderProbabilities {
            prob_over: round_to(1.0 - prob_under, 4),
            prob_under: round_to(prob_under, 4),
            expected_goals: round_to(lambda, 2),
        }
    }

    /// Probability that both sides score at least once.
    ///
    /// Conceded averages are accepted for interface symmetry but the model
    /// only uses scoring rates.
    pub fn score_both_teams_to_score(
        &self,
        home_scored: f64,
        _home_conceded: f64,
        away_scored: f64,
        _away_conceded: f64,
    ) -> f64 {
        let home_scores = 1.0 - poisson_pmf(0, (home_scored * self.home_advantage).max(0.0));
        let away_scores = 1.0 - poisson_pmf(0, away_scored.max(0.0));
        round_to(home_scores * away_scores, 4)
    }
}

/// Accept a candidate when `ev >= min_ev` and the model beats the implied probability.
pub fn validate_opportunity(probability: f64, odds: f64, min_ev: f64) -> (bool, f64) {
    match check_opportunity(probability, odds, min_ev) {
        Ok(ev) => (true, ev),
        Err(_) => (false, compute_ev(probability, odds)),
    }
}

/// Like [`validate_opportunity`] but reports why a candidate failed.
pub fn check_opportunity(probability: f64, odds: f64, min_ev: f64) -> Result<f64, Rejection> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(Rejection::InvalidInput(format!("odds {} must exceed 1.0", odds)));
    }
    if !(0.0..=1.0).contains(&probability) {
        return Err(Rejection::InvalidInput(format!(
            "probability {} outside [0, 1]",
            probability
        )));
    }

    let ev = compute_ev(probability, odds);
    let implied = 1.0 / odds;

    if probability <= implied {
        return Err(Rejection::NoEdge {
            probability,
            implied,
        });
    }
    if ev < min_ev {
        return Err(Rejection::EvBelowMinimum { ev, min_ev });
    }

    Ok(ev)
}
