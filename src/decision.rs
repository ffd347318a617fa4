// src/decision.rs

//! Maps an aggregated risk score onto the network's recommended action.
//! Every consumer of a score goes through [`classify`]; the thresholds live
//! here and nowhere else.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scores at or above this value block the transaction.
pub const BLOCK_THRESHOLD: f64 = 80.0;
/// Scores at or above this value (and below [`BLOCK_THRESHOLD`]) go to review.
pub const REVIEW_THRESHOLD: f64 = 60.0;
/// Scores at or above this value also produce a SAR.
pub const SAR_THRESHOLD: f64 = BLOCK_THRESHOLD;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Approve,
    Review,
    Block,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Approve => "APPROVE",
            Action::Review => "REVIEW",
            Action::Block => "BLOCK",
        }
    }

    /// Human-facing label used by the dashboards.
    pub fn headline(&self) -> &'static str {
        match self {
            Action::Approve => "APPROVE TRANSACTION",
            Action::Review => "ENHANCED DUE DILIGENCE",
            Action::Block => "BLOCK TRANSACTION",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(risk_score: f64) -> Action {
    if risk_score >= BLOCK_THRESHOLD {
        Action::Block
    } else if risk_score >= REVIEW_THRESHOLD {
        Action::Review
    } else {
        Action::Approve
    }
}
