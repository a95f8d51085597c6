//! Reporting snapshot handed to the chat collaborator.

use std::fmt::Write as _;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Evaluation;
use crate::bankroll::{BankrollManager, BetResult, PhaseInfo, RiskManager, RiskSummary};
use crate::market::MarketKind;
use crate::valuation::{MultipleBet, Opportunity};

/// Opportunities included in a chat snapshot.
pub const CHAT_OPPORTUNITIES: usize = 5;
/// Multiples included in a chat snapshot.
pub const CHAT_MULTIPLES: usize = 2;

/// A bet from the caller's history. Pending bets have no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecord {
    /// "Home x Away".
    #[serde(rename = "match")]
    pub match_label: String,
    /// Selection.
    pub market: MarketKind,
    /// Decimal odds taken.
    pub odds: f64,
    /// Stake.
    pub stake: Decimal,
    /// Outcome once settled.
    #[serde(default)]
    pub result: Option<BetResult>,
}

impl BetRecord {
    /// Profit of a settled bet; `None` while pending.
    pub fn profit(&self) -> Option<Decimal> {
        let odds = Decimal::from_f64(self.odds).unwrap_or(Decimal::ONE);
        self.result.map(|result| match result {
            BetResult::Won => self.stake * (odds - Decimal::ONE),
            BetResult::Lost => -self.stake,
            BetResult::Void => Decimal::ZERO,
        })
    }
}

/// Summary over settled bets.
///
/// Voids count as bets but stake nothing; win rate is over won and lost.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BetStats {
    /// Settled bets.
    pub total_bets: usize,
    /// Won bets.
    pub won: usize,
    /// Lost bets.
    pub lost: usize,
    /// Voided bets.
    pub void: usize,
    /// `100 * won / (won + lost)`.
    pub win_rate: f64,
    /// Total at risk on won and lost bets.
    pub total_staked: Decimal,
    /// Net profit.
    pub total_profit: Decimal,
    /// `100 * total_profit / total_staked`.
    pub roi: f64,
    /// Mean odds of settled bets.
    pub avg_odds: f64,
    /// Mean stake of won and lost bets.
    pub avg_stake: Decimal,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl BetStats {
    /// Summarize the settled records; pending ones are ignored.
    pub fn from_records(records: &[BetRecord]) -> Self {
        let mut stats = BetStats::default();
        let mut odds_sum = 0.0;

        for record in records {
            let (Some(result), Some(profit)) = (record.result, record.profit()) else {
                continue;
            };
            stats.total_bets += 1;
            odds_sum += record.odds;
            stats.total_profit += profit;
            match result {
                BetResult::Won => stats.won += 1,
                BetResult::Lost => stats.lost += 1,
                BetResult::Void => {
                    stats.void += 1;
                    continue;
                }
            }
            stats.total_staked += record.stake;
        }

        let decided = stats.won + stats.lost;
        if decided > 0 {
            stats.win_rate = round2(stats.won as f64 / decided as f64 * 100.0);
            stats.avg_stake = (stats.total_staked / Decimal::from(decided)).round_dp(2);
        }
        if stats.total_bets > 0 {
            stats.avg_odds = round2(odds_sum / stats.total_bets as f64);
        }
        if stats.total_staked > Decimal::ZERO {
            stats.roi = (stats.total_profit / stats.total_staked * Decimal::ONE_HUNDRED)
                .round_dp(2)
                .to_f64()
                .unwrap_or(0.0);
        }
        stats.total_profit = stats.total_profit.round_dp(2);
        stats
    }
}

/// What the chat collaborator receives.
#[derive(Debug, Clone, Serialize)]
pub struct ChatContext {
    /// Current bankroll.
    pub bankroll: Decimal,
    /// Phase summary.
    pub phase: PhaseInfo,
    /// Best opportunities.
    pub opportunities: Vec<Opportunity>,
    /// Best multiples.
    pub multiples: Vec<MultipleBet>,
    /// History summary.
    pub stats: BetStats,
    /// Today's exposure.
    pub risk: RiskSummary,
}

impl ChatContext {
    /// Snapshot after an evaluation pass.
    pub fn new(
        bankroll: &BankrollManager,
        risk: &RiskManager,
        evaluation: &Evaluation,
        history: &[BetRecord],
    ) -> Self {
        Self {
            bankroll: bankroll.bankroll(),
            phase: bankroll.get_phase_info(),
            opportunities: evaluation
                .opportunities
                .iter()
                .take(CHAT_OPPORTUNITIES)
                .cloned()
                .collect(),
            multiples: evaluation.multiples.iter().take(CHAT_MULTIPLES).cloned().collect(),
            stats: BetStats::from_records(history),
            risk: risk.summary(&evaluation.risk),
        }
    }

    /// Plain-text rendering.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Bankroll: {} (phase {})", self.bankroll, self.phase.phase);
        if let (Some(target), Some(progress)) = (self.phase.target, self.phase.progress_pct) {
            let _ = writeln!(out, "Target: {} ({:.2}% reached)", target, progress);
        }
        let _ = writeln!(
            out,
            "Minimum EV: {:.1}% | Max stake: {:.1}%",
            self.phase.min_ev, self.phase.max_stake_pct
        );
        let _ = writeln!(
            out,
            "Today: staked {} of {} (remaining {}), losing streak {}",
            self.risk.daily_staked,
            self.risk.daily_limit,
            self.risk.remaining,
            self.risk.consecutive_losses
        );

        let _ = writeln!(out, "\nOpportunities:");
        if self.opportunities.is_empty() {
            let _ = writeln!(out, "  none");
        }
        for (i, o) in self.opportunities.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} [{}] {} @ {:.2} | p={:.2}% EV={:.2}% stake {}",
                i + 1,
                o.match_label,
                o.competition,
                o.market,
                o.odds,
                o.probability * 100.0,
                o.ev,
                o.stake
            );
        }

        if !self.multiples.is_empty() {
            let _ = writeln!(out, "\nMultiples:");
            for (i, m) in self.multiples.iter().enumerate() {
                let legs: Vec<String> = m
                    .legs
                    .iter()
                    .map(|l| format!("{} {}", l.match_label, l.market))
                    .collect();
                let _ = writeln!(
                    out,
                    "  {}. {} @ {:.2} | p={:.2}% EV={:.2}% stake {}",
                    i + 1,
                    legs.join(" + "),
                    m.combined_odds,
                    m.combined_probability * 100.0,
                    m.ev,
                    m.stake
                );
            }
        }

        let s = &self.stats;
        let _ = writeln!(
            out,
            "\nHistory: {} bets, {}W/{}L/{}V, win rate {:.2}%, profit {}, ROI {:.2}%",
            s.total_bets, s.won, s.lost, s.void, s.win_rate, s.total_profit, s.roi
        );
        out
    }
}
