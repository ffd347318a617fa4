// src/types.rs

use crate::decision::Action;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Institution,
    Observer,
}

/// A configured market participant. Observers never carry weight.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    pub weight: f64,
}

impl Participant {
    pub fn institution(id: &str, display_name: &str, weight: f64) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            role: Role::Institution,
            weight: sanitize_weight(weight),
        }
    }

    pub fn observer(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            role: Role::Observer,
            weight: 0.0,
        }
    }

    pub fn is_observer(&self) -> bool {
        self.role == Role::Observer
    }

    /// Returns a copy carrying `weight`; observers stay at zero.
    pub fn with_weight(&self, weight: f64) -> Self {
        let mut participant = self.clone();
        participant.weight = if self.is_observer() {
            0.0
        } else {
            sanitize_weight(weight)
        };
        participant
    }
}

/// Negative and non-finite weights collapse to zero.
pub fn sanitize_weight(weight: f64) -> f64 {
    if weight.is_finite() {
        weight.max(0.0)
    } else {
        0.0
    }
}

/// One participant's signal for one run. `confidence` is a percentage.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub participant_id: String,
    pub display_name: String,
    pub confidence: f64,
    pub weight: f64,
    pub is_observer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
}

impl Vote {
    pub fn new(participant: &Participant, confidence: f64) -> Self {
        let is_observer = participant.is_observer();
        Self {
            participant_id: participant.id.clone(),
            display_name: participant.display_name.clone(),
            confidence: if is_observer { 0.0 } else { confidence },
            weight: if is_observer { 0.0 } else { participant.weight },
            is_observer,
            external_ref: None,
        }
    }
}

/// Suspicious-activity report derived from a blocking score.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SarRecord {
    pub sar_id: String,
    pub transaction_id: String,
    pub filed_by: String,
    pub risk_score: f64,
    pub detail: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub transaction_id: String,
    pub market_id: String,
    pub scenario_id: String,
    pub scenario_label: String,
    pub title: String,
    pub customer: String,
    pub amount: u64,
    pub destination: String,
    pub risk_flags: Vec<String>,
    pub votes: Vec<Vote>,
    /// Score after each non-observer vote, in vote order.
    pub running_scores: Vec<f64>,
    pub risk_score: f64,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sar: Option<SarRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_ref: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_votes_carry_no_weight() {
        let regulator = Participant::observer("Regulator", "Regulator").with_weight(300.0);
        assert_eq!(regulator.weight, 0.0);

        let vote = Vote::new(&regulator, 88.0);
        assert!(vote.is_observer);
        assert_eq!(vote.confidence, 0.0);
        assert_eq!(vote.weight, 0.0);
    }

    #[test]
    fn invalid_weights_are_zeroed() {
        assert_eq!(sanitize_weight(-1.0), 0.0);
        assert_eq!(sanitize_weight(f64::NAN), 0.0);
        assert_eq!(sanitize_weight(f64::INFINITY), 0.0);
        assert_eq!(sanitize_weight(1.5), 1.5);
    }

    #[test]
    fn vote_serializes_camel_case() {
        let bank = Participant::institution("Bank_A", "Bank A", 2.0);
        let json = serde_json::to_value(Vote::new(&bank, 87.0)).unwrap();
        assert_eq!(json["participantId"], "Bank_A");
        assert_eq!(json["isObserver"], false);
        assert!(json.get("externalRef").is_none());
    }
}
