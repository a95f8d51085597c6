//! Opportunity valuation.
//!
//! This module handles:
//! - Poisson probabilities and EV checks
//! - Accepted single-bet opportunities
//! - Multi-leg combinations

pub mod multiple;
pub mod opportunity;
pub mod probability;

pub use multiple::{Combination, MultipleBet, MultipleDetector, MultipleLeg, MultiplePolicy};
pub use opportunity::{model_probability, sort_by_ev, Opportunity};
pub use probability::{
    check_opportunity, compute_ev, validate_opportunity, OverUnderProbabilities, ProbabilityModel,
    HOME_ADVANTAGE,
};
