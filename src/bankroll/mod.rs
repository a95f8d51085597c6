//! Bankroll phases, stake sizing and session risk limits.

pub mod phase;
pub mod risk;

pub use phase::{BankrollManager, BankrollState, Phase, PhaseInfo, PhasePolicy, PhaseRule};
pub use risk::{BetResult, RiskManager, RiskPolicy, RiskState, RiskSummary};
