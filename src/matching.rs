//! Team-name reconciliation across data providers.
//!
//! Fixture and odds providers spell clubs differently ("Man Utd",
//! "Manchester United FC"). Names are normalized, folded through a static
//! alias table, then compared with a character-level similarity ratio.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use strsim::normalized_levenshtein;
use tracing::debug;

use crate::market::Match;

/// Default minimum similarity for a name to count as the same team.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

/// Tokens that carry no identity ("FC", "United", ...).
const GENERIC_TOKENS: &[&str] = &["fc", "cf", "sc", "afc", "bfc", "united", "city"];

/// Alias groups: canonical spelling first, then the spellings folded into it.
const ALIAS_GROUPS: &[(&str, &[&str])] = &[
    // England
    ("manchester united", &["man utd", "man united", "manchester utd"]),
    ("manchester city", &["man city"]),
    ("tottenham", &["spurs", "tottenham hotspur"]),
    ("wolverhampton wanderers", &["wolves"]),
    ("nottingham forest", &["nott'm forest", "nottm forest"]),
    // Spain
    ("athletic club", &["athletic bilbao"]),
    ("atletico madrid", &["atlético madrid", "atletico de madrid"]),
    // Italy
    ("milan", &["ac milan"]),
    ("inter", &["inter milan", "internazionale"]),
    // Germany
    ("bayern munich", &["bayern munchen", "bayern münchen"]),
    // Portugal
    ("sporting cp", &["sporting lisbon", "sporting clube de portugal"]),
    // Brazil
    ("sao paulo", &["são paulo"]),
    ("atletico mineiro", &["atlético mineiro"]),
    ("athletico paranaense", &["atletico paranaense"]),
];

/// Normalized alias -> normalized canonical form.
static ALIASES: Lazy<HashMap<String, String>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (canonical, aliases) in ALIAS_GROUPS {
        let canonical = TeamMatcher::normalize(canonical);
        for alias in *aliases {
            let alias = TeamMatcher::normalize(alias);
            if alias != canonical {
                map.insert(alias, canonical.clone());
            }
        }
    }
    map
});

/// A fixture reconciled with an odds quote.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedFixture<'a> {
    /// The fixture that matched.
    pub fixture: &'a Match,
    /// Similarity of the home names.
    pub home_score: f64,
    /// Similarity of the away names.
    pub away_score: f64,
    /// Mean of both scores.
    pub score: f64,
}

/// Fuzzy team-name matcher.
#[derive(Debug, Clone, Copy)]
pub struct TeamMatcher {
    threshold: f64,
}

impl Default for TeamMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl TeamMatcher {
    /// Create a matcher with the given per-team threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Per-team threshold in use.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Lowercase, drop punctuation and generic tokens, collapse whitespace.
    pub fn normalize(name: &str) -> String {
        let lowered = name.trim().to_lowercase().replace('-', " ");
        let cleaned: String = lowered
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();

        cleaned
            .split_whitespace()
            .filter(|token| !GENERIC_TOKENS.contains(token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Normalized form folded through the alias table.
    pub fn canonical(name: &str) -> String {
        let normalized = Self::normalize(name);
        match ALIASES.get(&normalized) {
            Some(canonical) => canonical.clone(),
            None => normalized,
        }
    }

    /// Similarity in `[0, 1]`; exactly 1.0 when canonical forms agree.
    pub fn similarity(a: &str, b: &str) -> f64 {
        let a = Self::canonical(a);
        let b = Self::canonical(b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        normalized_levenshtein(&a, &b)
    }

    /// Best-scoring candidate at or above the threshold; ties keep the first seen.
    pub fn find_best_match<'a, T, F>(
        &self,
        name: &str,
        candidates: &'a [T],
        name_of: F,
    ) -> Option<(&'a T, f64)>
    where
        F: Fn(&T) -> &str,
    {
        let mut best: Option<(&'a T, f64)> = None;
        for candidate in candidates {
            let score = Self::similarity(name, name_of(candidate));
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        best.filter(|(_, score)| *score >= self.threshold)
    }

    /// First fixture, in provider order, whose home and away names both clear
    /// the threshold. Manchester United and Manchester City fold to the same
    /// name, so fixture order decides between them.
    pub fn match_teams<'a>(
        &self,
        home: &str,
        away: &str,
        fixtures: &'a [Match],
    ) -> Option<MatchedFixture<'a>> {
        let matched = fixtures.iter().find_map(|fixture| {
            let home_score = Self::similarity(home, &fixture.home_team);
            if home_score < self.threshold {
                return None;
            }
            let away_score = Self::similarity(away, &fixture.away_team);
            if away_score < self.threshold {
                return None;
            }
            Some(MatchedFixture {
                fixture,
                home_score,
                away_score,
                score: (home_score + away_score) / 2.0,
            })
        });

        if matched.is_none() {
            debug!(home = %home, away = %away, "No fixture matched quote");
        }
        matched
    }
}
