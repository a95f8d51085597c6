//! Application configuration loaded from environment variables.
//!
//! The flat [`Config`] is read once at startup; each component then receives
//! its own immutable policy value derived from it ([`PhasePolicy`],
//! [`RiskPolicy`], [`MultiplePolicy`], [`RetryPolicy`], [`CacheTtls`]).

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::bankroll::{BankrollManager, Phase, PhasePolicy, PhaseRule, RiskPolicy};
use crate::data::{CacheTtls, RetryPolicy};
use crate::valuation::MultiplePolicy;

/// Placeholder value shipped in sample `.env` files; treated as absent.
const PLACEHOLDER_KEY: &str = "your_api_key_here";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// Substitute data allowed when providers are unavailable.
    #[default]
    #[serde(alias = "dev")]
    #[strum(serialize = "development", serialize = "dev")]
    Development,
    /// Real capital: never operate on substitute data.
    #[serde(alias = "prod")]
    #[strum(serialize = "production", serialize = "prod")]
    Production,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Mode ===
    /// development or production.
    #[serde(default)]
    pub environment: Environment,

    // === Bankroll ===
    /// Bankroll the session starts with.
    #[serde(default = "default_initial_bankroll")]
    pub initial_bankroll: Decimal,

    /// Phase the operator declares the bankroll to be in (1..=4 or
    /// "consolidation"). Completion is checked against its target.
    #[serde(default = "default_current_phase")]
    pub current_phase: Phase,

    /// Bankroll at or above which the consolidation regime applies.
    #[serde(default = "default_consolidation_threshold")]
    pub consolidation_threshold: Decimal,

    /// Phase 1 target.
    #[serde(default = "default_target_1")]
    pub target_bankroll_phase_1: Decimal,
    /// Phase 2 target.
    #[serde(default = "default_target_2")]
    pub target_bankroll_phase_2: Decimal,
    /// Phase 3 target.
    #[serde(default = "default_target_3")]
    pub target_bankroll_phase_3: Decimal,
    /// Phase 4 target.
    #[serde(default = "default_target_4")]
    pub target_bankroll_phase_4: Decimal,

    /// Minimum EV (%) per phase.
    #[serde(default = "default_min_ev_1")]
    pub min_ev_phase_1: f64,
    #[serde(default = "default_min_ev_2")]
    pub min_ev_phase_2: f64,
    #[serde(default = "default_min_ev_3")]
    pub min_ev_phase_3: f64,
    #[serde(default = "default_min_ev_4")]
    pub min_ev_phase_4: f64,
    #[serde(default = "default_min_ev_consolidation")]
    pub min_ev_consolidation: f64,

    /// Maximum single stake (% of bankroll) per phase.
    #[serde(default = "default_max_stake_1")]
    pub max_stake_phase_1: f64,
    #[serde(default = "default_max_stake_2")]
    pub max_stake_phase_2: f64,
    #[serde(default = "default_max_stake_3")]
    pub max_stake_phase_3: f64,
    #[serde(default = "default_max_stake_4")]
    pub max_stake_phase_4: f64,
    #[serde(default = "default_max_stake_consolidation")]
    pub max_stake_consolidation: f64,

    /// Share (%) of the surplus over a reached target marked for withdrawal.
    #[serde(default = "default_withdraw_pct")]
    pub phase_withdraw_pct: f64,

    /// Fraction of Kelly used for single-bet sizing.
    #[serde(default = "default_kelly_multiplier")]
    pub kelly_multiplier: f64,

    // === Risk ===
    /// Daily stake cap (% of bankroll) per phase.
    #[serde(default = "default_daily_cap_1")]
    pub daily_cap_phase_1: f64,
    #[serde(default = "default_daily_cap_2")]
    pub daily_cap_phase_2: f64,
    #[serde(default = "default_daily_cap_3")]
    pub daily_cap_phase_3: f64,
    #[serde(default = "default_daily_cap_4")]
    pub daily_cap_phase_4: f64,
    #[serde(default = "default_daily_cap_consolidation")]
    pub daily_cap_consolidation: f64,

    /// Consecutive losses before stakes are damped.
    #[serde(default = "default_loss_streak")]
    pub loss_streak_threshold: u32,

    /// Stake multiplier applied once the loss streak is reached.
    #[serde(default = "default_loss_damping")]
    pub loss_damping_factor: f64,

    // === Multiples ===
    /// Minimum joint probability for a multiple.
    #[serde(default = "default_multiple_min_prob")]
    pub multiple_min_combined_prob: f64,

    /// Maximum legs per multiple.
    #[serde(default = "default_multiple_max_legs")]
    pub multiple_max_legs: usize,

    /// Number of multiples suggested per pass.
    #[serde(default = "default_multiple_limit")]
    pub multiple_limit: usize,

    /// Multiple stake (% of bankroll) in phase 1.
    #[serde(default = "default_multiple_stake_1")]
    pub multiple_stake_phase_1: f64,

    /// Multiple stake (% of bankroll) in phase 2.
    #[serde(default = "default_multiple_stake_2")]
    pub multiple_stake_phase_2: f64,

    // === Providers ===
    /// API-Football key.
    #[serde(default)]
    pub football_api_key: Option<String>,

    /// API-Football base URL.
    #[serde(default = "default_football_url")]
    pub football_api_base_url: String,

    /// The Odds API key.
    #[serde(default)]
    pub odds_api_key: Option<String>,

    /// The Odds API base URL.
    #[serde(default = "default_odds_url")]
    pub odds_api_base_url: String,

    /// Comma-separated sport keys to pull odds for.
    #[serde(default = "default_odds_sports")]
    pub odds_sports: String,

    /// Comma-separated bookmaker regions.
    #[serde(default = "default_odds_regions")]
    pub odds_regions: String,

    /// Days of fixtures to scan, today included.
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,

    /// Minimum per-team similarity when reconciling provider names.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    // === Retry / cache ===
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub retry_backoff_multiplier: f64,
    #[serde(default = "default_retry_max_delay_s")]
    pub retry_max_delay_s: u64,

    #[serde(default = "default_fixtures_ttl")]
    pub fixtures_ttl_s: u64,
    #[serde(default = "default_team_stats_ttl")]
    pub team_stats_ttl_s: u64,
    #[serde(default = "default_odds_ttl")]
    pub odds_ttl_s: u64,

    // === Logging ===
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_initial_bankroll() -> Decimal {
    Decimal::new(100, 0)
}

fn default_current_phase() -> Phase {
    Phase::One
}

fn default_consolidation_threshold() -> Decimal {
    Decimal::new(50_000, 0)
}

fn default_target_1() -> Decimal {
    Decimal::new(1_000, 0)
}

fn default_target_2() -> Decimal {
    Decimal::new(5_000, 0)
}

fn default_target_3() -> Decimal {
    Decimal::new(25_000, 0)
}

fn default_target_4() -> Decimal {
    Decimal::new(100_000, 0)
}

fn default_min_ev_1() -> f64 {
    8.0
}

fn default_min_ev_2() -> f64 {
    9.0
}

fn default_min_ev_3() -> f64 {
    10.0
}

fn default_min_ev_4() -> f64 {
    12.0
}

fn default_min_ev_consolidation() -> f64 {
    12.0
}

fn default_max_stake_1() -> f64 {
    15.0
}

fn default_max_stake_2() -> f64 {
    10.0
}

fn default_max_stake_3() -> f64 {
    6.0
}

fn default_max_stake_4() -> f64 {
    4.0
}

fn default_max_stake_consolidation() -> f64 {
    1.5
}

fn default_withdraw_pct() -> f64 {
    50.0
}

fn default_kelly_multiplier() -> f64 {
    0.25
}

fn default_daily_cap_1() -> f64 {
    30.0
}

fn default_daily_cap_2() -> f64 {
    25.0
}

fn default_daily_cap_3() -> f64 {
    18.0
}

fn default_daily_cap_4() -> f64 {
    12.0
}

fn default_daily_cap_consolidation() -> f64 {
    5.0
}

fn default_loss_streak() -> u32 {
    3
}

fn default_loss_damping() -> f64 {
    0.5
}

fn default_multiple_min_prob() -> f64 {
    0.30
}

fn default_multiple_max_legs() -> usize {
    3
}

fn default_multiple_limit() -> usize {
    3
}

fn default_multiple_stake_1() -> f64 {
    8.0
}

fn default_multiple_stake_2() -> f64 {
    5.0
}

fn default_football_url() -> String {
    "https://v3.football.api-sports.io".to_string()
}

fn default_odds_url() -> String {
    "https://api.the-odds-api.com/v4".to_string()
}

fn default_odds_sports() -> String {
    "soccer_epl,soccer_spain_la_liga,soccer_portugal_primeira_liga".to_string()
}

fn default_odds_regions() -> String {
    "br,uk".to_string()
}

fn default_lookahead_days() -> u32 {
    3
}

fn default_match_threshold() -> f64 {
    0.7
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    1_000
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_retry_max_delay_s() -> u64 {
    30
}

fn default_fixtures_ttl() -> u64 {
    6 * 3600
}

fn default_team_stats_ttl() -> u64 {
    24 * 3600
}

fn default_odds_ttl() -> u64 {
    15 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            initial_bankroll: default_initial_bankroll(),
            current_phase: default_current_phase(),
            consolidation_threshold: default_consolidation_threshold(),
            target_bankroll_phase_1: default_target_1(),
            target_bankroll_phase_2: default_target_2(),
            target_bankroll_phase_3: default_target_3(),
            target_bankroll_phase_4: default_target_4(),
            min_ev_phase_1: default_min_ev_1(),
            min_ev_phase_2: default_min_ev_2(),
            min_ev_phase_3: default_min_ev_3(),
            min_ev_phase_4: default_min_ev_4(),
            min_ev_consolidation: default_min_ev_consolidation(),
            max_stake_phase_1: default_max_stake_1(),
            max_stake_phase_2: default_max_stake_2(),
            max_stake_phase_3: default_max_stake_3(),
            max_stake_phase_4: default_max_stake_4(),
            max_stake_consolidation: default_max_stake_consolidation(),
            phase_withdraw_pct: default_withdraw_pct(),
            kelly_multiplier: default_kelly_multiplier(),
            daily_cap_phase_1: default_daily_cap_1(),
            daily_cap_phase_2: default_daily_cap_2(),
            daily_cap_phase_3: default_daily_cap_3(),
            daily_cap_phase_4: default_daily_cap_4(),
            daily_cap_consolidation: default_daily_cap_consolidation(),
            loss_streak_threshold: default_loss_streak(),
            loss_damping_factor: default_loss_damping(),
            multiple_min_combined_prob: default_multiple_min_prob(),
            multiple_max_legs: default_multiple_max_legs(),
            multiple_limit: default_multiple_limit(),
            multiple_stake_phase_1: default_multiple_stake_1(),
            multiple_stake_phase_2: default_multiple_stake_2(),
            football_api_key: None,
            football_api_base_url: default_football_url(),
            odds_api_key: None,
            odds_api_base_url: default_odds_url(),
            odds_sports: default_odds_sports(),
            odds_regions: default_odds_regions(),
            lookahead_days: default_lookahead_days(),
            match_threshold: default_match_threshold(),
            http_timeout_ms: default_http_timeout_ms(),
            retry_max_attempts: default_retry_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_backoff_multiplier: default_retry_multiplier(),
            retry_max_delay_s: default_retry_max_delay_s(),
            fixtures_ttl_s: default_fixtures_ttl(),
            team_stats_ttl_s: default_team_stats_ttl(),
            odds_ttl_s: default_odds_ttl(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        let targets = [
            self.target_bankroll_phase_1,
            self.target_bankroll_phase_2,
            self.target_bankroll_phase_3,
            self.target_bankroll_phase_4,
        ];
        if targets[0] <= Decimal::ZERO {
            return Err("TARGET_BANKROLL_PHASE_1 must be positive".to_string());
        }
        if targets.windows(2).any(|w| w[0] >= w[1]) {
            return Err("phase targets must be strictly ascending".to_string());
        }
        if self.consolidation_threshold <= Decimal::ZERO {
            return Err("CONSOLIDATION_THRESHOLD must be positive".to_string());
        }
        if self.initial_bankroll < Decimal::ZERO {
            return Err("INITIAL_BANKROLL must not be negative".to_string());
        }

        let min_ev = [
            self.min_ev_phase_1,
            self.min_ev_phase_2,
            self.min_ev_phase_3,
            self.min_ev_phase_4,
            self.min_ev_consolidation,
        ];
        if min_ev.windows(2).any(|w| w[0] > w[1]) {
            return Err("minimum EV must not loosen as phases advance".to_string());
        }

        let max_stake = [
            self.max_stake_phase_1,
            self.max_stake_phase_2,
            self.max_stake_phase_3,
            self.max_stake_phase_4,
            self.max_stake_consolidation,
        ];
        if max_stake.iter().any(|p| !(*p > 0.0 && *p <= 100.0)) {
            return Err("MAX_STAKE_* must be within (0, 100]".to_string());
        }
        if max_stake.windows(2).any(|w| w[0] < w[1]) {
            return Err("maximum stake must not grow as phases advance".to_string());
        }

        let daily_caps = [
            self.daily_cap_phase_1,
            self.daily_cap_phase_2,
            self.daily_cap_phase_3,
            self.daily_cap_phase_4,
            self.daily_cap_consolidation,
        ];
        if daily_caps.iter().any(|p| !(*p > 0.0 && *p <= 100.0)) {
            return Err("DAILY_CAP_* must be within (0, 100]".to_string());
        }

        if !(0.0..=100.0).contains(&self.phase_withdraw_pct) {
            return Err("PHASE_WITHDRAW_PCT must be within [0, 100]".to_string());
        }
        if !(self.kelly_multiplier > 0.0 && self.kelly_multiplier <= 1.0) {
            return Err("KELLY_MULTIPLIER must be within (0, 1]".to_string());
        }
        if self.loss_streak_threshold == 0 {
            return Err("LOSS_STREAK_THRESHOLD must be at least 1".to_string());
        }
        if !(self.loss_damping_factor > 0.0 && self.loss_damping_factor <= 1.0) {
            return Err("LOSS_DAMPING_FACTOR must be within (0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.multiple_min_combined_prob) {
            return Err("MULTIPLE_MIN_COMBINED_PROB must be within [0, 1]".to_string());
        }
        if self.multiple_max_legs < 2 {
            return Err("MULTIPLE_MAX_LEGS must be at least 2".to_string());
        }
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            return Err("MATCH_THRESHOLD must be within (0, 1]".to_string());
        }
        if self.retry_max_attempts == 0 {
            return Err("RETRY_MAX_ATTEMPTS must be at least 1".to_string());
        }

        Ok(())
    }

    /// Whether the process is running against real capital.
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Names of provider credentials that are absent or still placeholders.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let present = |key: &Option<String>| {
            key.as_deref()
                .map(|k| !k.trim().is_empty() && k != PLACEHOLDER_KEY)
                .unwrap_or(false)
        };

        let mut missing = Vec::new();
        if !present(&self.football_api_key) {
            missing.push("FOOTBALL_API_KEY");
        }
        if !present(&self.odds_api_key) {
            missing.push("ODDS_API_KEY");
        }
        missing
    }

    /// Sport keys to pull odds for.
    pub fn sports(&self) -> Vec<String> {
        self.odds_sports
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Bankroll phase policy.
    pub fn phase_policy(&self) -> PhasePolicy {
        PhasePolicy {
            consolidation_threshold: self.consolidation_threshold,
            phases: [
                PhaseRule::new(self.target_bankroll_phase_1, self.min_ev_phase_1, self.max_stake_phase_1),
                PhaseRule::new(self.target_bankroll_phase_2, self.min_ev_phase_2, self.max_stake_phase_2),
                PhaseRule::new(self.target_bankroll_phase_3, self.min_ev_phase_3, self.max_stake_phase_3),
                PhaseRule::new(self.target_bankroll_phase_4, self.min_ev_phase_4, self.max_stake_phase_4),
            ],
            consolidation_min_ev: self.min_ev_consolidation,
            consolidation_max_stake_pct: self.max_stake_consolidation,
            withdraw_pct: self.phase_withdraw_pct,
            kelly_multiplier: self.kelly_multiplier,
        }
    }

    /// Bankroll manager for a session resumed in the declared phase.
    pub fn bankroll_manager(&self, bankroll: Decimal) -> BankrollManager {
        BankrollManager::resume(self.phase_policy(), bankroll, self.current_phase)
    }

    /// Daily cap and streak damping policy.
    pub fn risk_policy(&self) -> RiskPolicy {
        RiskPolicy {
            daily_cap_pct: [
                self.daily_cap_phase_1,
                self.daily_cap_phase_2,
                self.daily_cap_phase_3,
                self.daily_cap_phase_4,
            ],
            consolidation_daily_cap_pct: self.daily_cap_consolidation,
            loss_streak_threshold: self.loss_streak_threshold,
            damping_factor: self.loss_damping_factor,
        }
    }

    /// Multiple detection policy.
    pub fn multiple_policy(&self) -> MultiplePolicy {
        MultiplePolicy {
            min_combined_probability: self.multiple_min_combined_prob,
            max_legs: self.multiple_max_legs,
            limit: self.multiple_limit,
            stake_pct_phase_1: self.multiple_stake_phase_1,
            stake_pct_phase_2: self.multiple_stake_phase_2,
        }
    }

    /// Retry policy for provider calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            initial_delay_ms: self.retry_initial_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
            max_delay_s: self.retry_max_delay_s,
        }
    }

    /// Cache TTLs per data kind.
    pub fn cache_ttls(&self) -> CacheTtls {
        CacheTtls {
            fixtures: Duration::from_secs(self.fixtures_ttl_s),
            team_stats: Duration::from_secs(self.team_stats_ttl_s),
            odds: Duration::from_secs(self.odds_ttl_s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn default_values_are_sensible() {
        let config = Config::default();
        assert_eq!(config.initial_bankroll, dec!(100));
        assert_eq!(config.consolidation_threshold, dec!(50000));
        assert_eq!(config.environment, Environment::Development);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_from_env_pairs() {
        let vars = vec![
            ("ENVIRONMENT".to_string(), "production".to_string()),
            ("INITIAL_BANKROLL".to_string(), "250.50".to_string()),
            ("MIN_EV_PHASE_1".to_string(), "7.5".to_string()),
            ("ODDS_API_KEY".to_string(), "abc".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        assert!(config.is_production());
        assert_eq!(config.initial_bankroll, dec!(250.50));
        assert_eq!(config.min_ev_phase_1, 7.5);
        assert_eq!(config.odds_api_key.as_deref(), Some("abc"));
        assert_eq!(config.max_stake_phase_1, 15.0);
        assert_eq!(config.current_phase, Phase::One);
    }

    #[test]
    fn current_phase_resumes_the_session() {
        let vars = vec![("CURRENT_PHASE".to_string(), "1".to_string())];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.current_phase, Phase::One);

        let manager = config.bankroll_manager(dec!(1200));
        assert_eq!(manager.opened_in(), Phase::One);
        assert_eq!(manager.check_phase_completion(), (true, dec!(100)));

        let vars = vec![("CURRENT_PHASE".to_string(), "consolidation".to_string())];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.current_phase, Phase::Consolidation);

        let vars = vec![("CURRENT_PHASE".to_string(), "9".to_string())];
        assert!(envy::from_iter::<_, Config>(vars).is_err());
    }

    #[test]
    fn validate_rejects_unordered_targets() {
        let config = Config {
            target_bankroll_phase_2: dec!(900),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_loosening_policy() {
        let config = Config {
            max_stake_phase_3: 12.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            min_ev_consolidation: 5.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn placeholder_keys_count_as_missing() {
        let config = Config {
            football_api_key: Some(PLACEHOLDER_KEY.to_string()),
            odds_api_key: Some("real-key".to_string()),
            ..Config::default()
        };
        assert_eq!(config.missing_credentials(), vec!["FOOTBALL_API_KEY"]);
    }

    #[test]
    fn sports_are_split_and_trimmed() {
        let config = Config {
            odds_sports: " soccer_epl, ,soccer_italy_serie_a ".to_string(),
            ..Config::default()
        };
        assert_eq!(config.sports(), vec!["soccer_epl", "soccer_italy_serie_a"]);
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!(Environment::from_str("prod").unwrap(), Environment::Production);
        assert_eq!(
            Environment::from_str("development").unwrap(),
            Environment::Development
        );
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
