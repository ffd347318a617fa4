// src/aggregation.rs

//! --- Weighted Belief Aggregation ---
//!
//! Combines institutional votes into a single risk score:
//!
//! `score = round((Σ conf/100 · w) / (Σ w) · 1000) / 10`
//!
//! taken over non-observer votes only. A zero total weight yields `0.0`.
//! The batch score and the running ("live") score share one accumulator, so
//! the running value after the last vote is bit-for-bit the batch value.

use crate::decision::{classify, Action};
use crate::types::{sanitize_weight, Vote};

/// Incremental weighted average. Sums stay unrounded; only [`score`] rounds.
///
/// [`score`]: RunningScore::score
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningScore {
    weighted_sum: f64,
    total_weight: f64,
    counted: usize,
}

impl RunningScore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one vote in. Observers are ignored; returns whether it counted.
    pub fn push(&mut self, vote: &Vote) -> bool {
        if vote.is_observer {
            return false;
        }
        let weight = sanitize_weight(vote.weight);
        let confidence = if vote.confidence.is_finite() {
            vote.confidence.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.weighted_sum += (confidence / 100.0) * weight;
        self.total_weight += weight;
        self.counted += 1;
        true
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Number of non-observer votes seen so far.
    pub fn counted(&self) -> usize {
        self.counted
    }

    pub fn score(&self) -> f64 {
        // Overflowed sums score 0 rather than NaN.
        if !self.total_weight.is_finite() || !self.weighted_sum.is_finite() {
            return 0.0;
        }
        if self.total_weight <= 0.0 {
            return 0.0;
        }
        ((self.weighted_sum / self.total_weight) * 1000.0).round() / 10.0
    }
}

/// Stateless front door over [`RunningScore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationEngine;

impl AggregationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, votes: &[Vote]) -> f64 {
        votes
            .iter()
            .fold(RunningScore::new(), |mut acc, vote| {
                acc.push(vote);
                acc
            })
            .score()
    }

    /// Score after each non-observer vote, in order. The last entry equals
    /// [`aggregate`](Self::aggregate) over the same votes.
    pub fn running_scores(&self, votes: &[Vote]) -> Vec<f64> {
        let mut acc = RunningScore::new();
        votes
            .iter()
            .filter_map(|vote| acc.push(vote).then(|| acc.score()))
            .collect()
    }

    pub fn aggregate_and_classify(&self, votes: &[Vote]) -> (f64, Action) {
        let score = self.aggregate(votes);
        (score, classify(score))
    }
}
