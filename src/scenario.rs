// src/scenario.rs

//! Static demo scenarios. Each profile describes the synthetic transaction
//! shown to the user and the confidence distribution the institutions draw
//! their votes from.

use thiserror::Error;

pub const DEFAULT_SCENARIO_ID: &str = "high";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("Unknown scenario id: '{0}'")]
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioProfile {
    pub id: &'static str,
    pub label: &'static str,
    pub title: &'static str,
    pub customer: &'static str,
    pub base_confidence: f64,
    pub variance: f64,
    /// Whole US dollars.
    pub display_amount: u64,
    pub destination: &'static str,
    pub risk_flags: &'static [&'static str],
}

impl ScenarioProfile {
    pub fn flags(&self) -> Vec<String> {
        self.risk_flags.iter().map(|f| f.to_string()).collect()
    }
}

static SCENARIOS: [ScenarioProfile; 3] = [
    ScenarioProfile {
        id: "high",
        label: "High Risk",
        title: "Crypto Wire Transfer",
        customer: "Customer #4821",
        base_confidence: 0.85,
        variance: 0.08,
        display_amount: 25_000,
        destination: "Binance (Crypto Exchange)",
        risk_flags: &[
            "New account (< 30 days)",
            "First crypto transaction",
            "High-risk jurisdiction",
        ],
    },
    ScenarioProfile {
        id: "medium",
        label: "Medium Risk",
        title: "International Wire",
        customer: "Customer #7293",
        base_confidence: 0.70,
        variance: 0.08,
        display_amount: 12_500,
        destination: "Dubai Investment LLC",
        risk_flags: &["Unusual amount pattern", "New beneficiary"],
    },
    ScenarioProfile {
        id: "low",
        label: "Low Risk",
        title: "Domestic Transfer",
        customer: "Customer #1156",
        base_confidence: 0.28,
        variance: 0.12,
        display_amount: 3_200,
        destination: "Verified Merchant",
        risk_flags: &["Slightly above average"],
    },
];

pub fn all() -> &'static [ScenarioProfile] {
    &SCENARIOS
}

fn default_profile() -> &'static ScenarioProfile {
    &SCENARIOS[0]
}

/// Returns the profile for `id`, or the high-risk profile for unknown ids.
pub fn lookup(id: &str) -> &'static ScenarioProfile {
    find(id).unwrap_or_else(default_profile)
}

/// Like [`lookup`] but reports unknown ids instead of substituting.
pub fn lookup_strict(id: &str) -> Result<&'static ScenarioProfile, ScenarioError> {
    find(id).ok_or_else(|| ScenarioError::Unknown(id.to_string()))
}

fn find(id: &str) -> Option<&'static ScenarioProfile> {
    SCENARIOS.iter().find(|s| s.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_ids_fall_back_to_high() {
        assert_eq!(lookup("nonexistent-id"), lookup("high"));
        assert_eq!(lookup("").id, DEFAULT_SCENARIO_ID);
    }

    #[test]
    fn strict_lookup_reports_unknown_ids() {
        assert_eq!(
            lookup_strict("typo"),
            Err(ScenarioError::Unknown("typo".to_string()))
        );
        assert_eq!(lookup_strict("low").map(|s| s.id), Ok("low"));
    }

    #[test]
    fn profiles_are_well_formed() {
        for profile in all() {
            assert!((0.0..=1.0).contains(&profile.base_confidence));
            assert!(profile.variance >= 0.0);
            assert!(!profile.risk_flags.is_empty());
        }
        assert_eq!(lookup("medium").destination, "Dubai Investment LLC");
    }
}
