//! Unified error types for the value engine.

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the value engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Provider credentials absent while running in production.
    #[error("provider credentials missing in production: {missing}")]
    ConfigurationMissing {
        /// Names of the missing settings.
        missing: String,
    },

    /// Data fetch error that escaped the retry boundary.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while talking to external data providers.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Provider signalled a rate limit (HTTP 429 or quota exhausted).
    #[error("rate limited by {provider}: retry after {retry_after_seconds:?}s")]
    RateLimited {
        /// Provider name.
        provider: String,
        /// Seconds the provider asked us to wait, if given.
        retry_after_seconds: Option<u64>,
    },

    /// Request did not complete in time.
    #[error("request to {provider} timed out")]
    Timeout {
        /// Provider name.
        provider: String,
    },

    /// Provider returned a non-success status.
    #[error("{provider} returned HTTP {status}")]
    Status {
        /// Provider name.
        provider: String,
        /// HTTP status code.
        status: u16,
    },

    /// Payload could not be parsed.
    #[error("failed to parse {provider} payload: {reason}")]
    Parse {
        /// Provider name.
        provider: String,
        /// Reason for failure.
        reason: String,
    },

    /// Transport-level HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    /// Whether the retry policy should try again after this error.
    ///
    /// Only rate-limit-class failures are retried; everything else fails fast
    /// and degrades to an empty result.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } | FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status == 503,
            FetchError::Http(e) => e.is_timeout(),
            FetchError::Parse { .. } => false,
        }
    }
}

/// Why a candidate bet was not turned into an opportunity.
///
/// Rejections are expected and frequent. They are logged, never raised.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// EV below the phase floor.
    EvBelowMinimum {
        /// Candidate EV in percent.
        ev: f64,
        /// Phase minimum EV in percent.
        min_ev: f64,
    },

    /// Model probability does not beat the market's implied probability.
    NoEdge {
        /// Model probability.
        probability: f64,
        /// Implied probability (1/odds).
        implied: f64,
    },

    /// Stake would push the day's total above the daily cap.
    DailyCapExceeded {
        /// Already staked today.
        daily_staked: Decimal,
        /// Proposed stake.
        proposed: Decimal,
        /// Daily cap.
        limit: Decimal,
    },

    /// Stake is zero or negative after sizing and damping.
    NonPositiveStake,

    /// Odds or probability outside their valid domain.
    InvalidInput(String),
}

impl Rejection {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::EvBelowMinimum { .. } => "ev_below_minimum",
            Rejection::NoEdge { .. } => "no_edge",
            Rejection::DailyCapExceeded { .. } => "daily_cap",
            Rejection::NonPositiveStake => "non_positive_stake",
            Rejection::InvalidInput(_) => "invalid_input",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::EvBelowMinimum { ev, min_ev } => {
                write!(f, "EV {:.2}% below phase minimum {:.2}%", ev, min_ev)
            }
            Rejection::NoEdge {
                probability,
                implied,
            } => write!(
                f,
                "model probability {:.4} does not beat implied {:.4}",
                probability, implied
            ),
            Rejection::DailyCapExceeded {
                daily_staked,
                proposed,
                limit,
            } => write!(
                f,
                "would exceed daily cap: staked {} + proposed {} > limit {}",
                daily_staked, proposed, limit
            ),
            Rejection::NonPositiveStake => write!(f, "stake rounds to zero"),
            Rejection::InvalidInput(reason) => write!(f, "invalid input: {}", reason),
        }
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rate_limit_is_retryable() {
        let err = FetchError::RateLimited {
            provider: "odds-api".to_string(),
            retry_after_seconds: Some(2),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn parse_and_client_errors_fail_fast() {
        let parse = FetchError::Parse {
            provider: "api-football".to_string(),
            reason: "missing field".to_string(),
        };
        let forbidden = FetchError::Status {
            provider: "api-football".to_string(),
            status: 403,
        };
        assert!(!parse.is_retryable());
        assert!(!forbidden.is_retryable());
    }

    #[test]
    fn too_many_requests_status_is_retryable() {
        let err = FetchError::Status {
            provider: "odds-api".to_string(),
            status: 429,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn daily_cap_reason_is_distinguishable() {
        let reason = Rejection::DailyCapExceeded {
            daily_staked: dec!(20),
            proposed: dec!(15),
            limit: dec!(30),
        }
        .to_string();
        assert!(reason.contains("daily cap"));
        assert!(!Rejection::NonPositiveStake.to_string().contains("daily cap"));
    }

    #[test]
    fn configuration_missing_names_settings() {
        let err = EngineError::ConfigurationMissing {
            missing: "ODDS_API_KEY".to_string(),
        };
        assert!(err.to_string().contains("ODDS_API_KEY"));
    }
}
