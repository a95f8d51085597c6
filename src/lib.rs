//! Value betting opportunity engine.
//!
//! Scores football betting markets with a Poisson goals model, keeps the
//! selections whose model probability beats the bookmaker's price by the
//! current phase's EV floor, and sizes stakes under a phase-based bankroll
//! policy with a daily cap and loss-streak damping.
//!
//! # Flow
//!
//! ```text
//! fixtures + odds ──► team matching ──► Poisson scoring ──► EV gate
//!        ──► stake sizing ──► daily cap ──► opportunities ──► multiples
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Error types and rejection reasons
//! - [`market`]: Fixtures, odds quotes and substitute data
//! - [`matching`]: Team-name reconciliation across providers
//! - [`valuation`]: Probability model, opportunities and multiples
//! - [`bankroll`]: Phase state machine and session risk limits
//! - [`data`]: Provider clients with caching and retries
//! - [`engine`]: The evaluation pass and reporting snapshot
//! - [`metrics`]: Metrics facade helpers

pub mod bankroll;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod market;
pub mod matching;
pub mod metrics;
pub mod valuation;

pub use config::Config;
pub use engine::{Evaluation, ValueEngine};
pub use error::{EngineError, Result};
