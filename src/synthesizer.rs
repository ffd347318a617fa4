// src/synthesizer.rs

//! Draws one confidence per institution from a scenario's distribution.
//! The caller owns the RNG, so a seeded `StdRng` replays a run exactly.

use crate::scenario::ScenarioProfile;
use crate::types::{Participant, Vote};
use rand::Rng;
use tracing::debug;

/// Draws are clamped into this band before conversion to a percentage.
pub const MIN_CONFIDENCE: f64 = 0.15;
pub const MAX_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, Copy, Default)]
pub struct VoteSynthesizer;

impl VoteSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// One vote per participant, in participant order. Observers get a
    /// zero-weight, zero-confidence vote and consume no randomness.
    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        participants: &[Participant],
        profile: &ScenarioProfile,
        rng: &mut R,
    ) -> Vec<Vote> {
        participants
            .iter()
            .map(|participant| {
                if participant.is_observer() {
                    return Vote::new(participant, 0.0);
                }
                let confidence = self.draw(profile, rng);
                debug!(
                    participant = %participant.id,
                    confidence,
                    weight = participant.weight,
                    "synthesized vote"
                );
                Vote::new(participant, confidence)
            })
            .collect()
    }

    /// A whole percentage in `[15, 95]`.
    pub fn draw<R: Rng + ?Sized>(&self, profile: &ScenarioProfile, rng: &mut R) -> f64 {
        let jitter = (rng.gen::<f64>() - 0.5) * profile.variance * 2.0;
        let raw = (profile.base_confidence + jitter).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
        (raw * 100.0).round()
    }
}
