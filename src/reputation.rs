// src/reputation.rs

//! --- Participant Weight Resolution ---
//!
//! Two interchangeable strategies decide how much a vote counts:
//!
//! 1.  **Fixed stake**: the configured dollar stake is the weight.
//! 2.  **Reputation derived**: a 0–100 reputation score, fetched from the
//!     ledger and cached for a short TTL, is bucketed into a multiplier.
//!
//! Resolution never fails. An unreachable source falls back to the last
//! cached scores, then to the configured default table.

use crate::ledger::LedgerError;
use crate::types::{sanitize_weight, Participant};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
/// Score assumed for a participant the source knows nothing about.
pub const DEFAULT_REPUTATION_SCORE: f64 = 50.0;
pub const DEFAULT_ACCURACY: f64 = 0.5;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct ReputationRecord {
    pub score: f64,
    pub accuracy: f64,
}

impl Default for ReputationRecord {
    fn default() -> Self {
        Self {
            score: DEFAULT_REPUTATION_SCORE,
            accuracy: DEFAULT_ACCURACY,
        }
    }
}

pub type ReputationTable = HashMap<String, ReputationRecord>;

/// External reputation lookup keyed by participant id.
#[async_trait]
pub trait ReputationSource: Send + Sync {
    async fn fetch_reputations(&self) -> Result<ReputationTable, LedgerError>;
}

pub fn reputation_to_weight(score: f64) -> f64 {
    if score >= 90.0 {
        2.0
    } else if score >= 75.0 {
        1.5
    } else if score >= 50.0 {
        1.0
    } else if score >= 25.0 {
        0.75
    } else {
        0.5
    }
}

#[derive(Debug, Clone)]
struct CachedReputations {
    table: ReputationTable,
    fetched_at: Instant,
}

pub struct ReputationResolver {
    source: Option<Arc<dyn ReputationSource>>,
    cache: RwLock<Option<CachedReputations>>,
    ttl: Duration,
    fallback: ReputationTable,
}

impl ReputationResolver {
    pub fn new(
        source: Option<Arc<dyn ReputationSource>>,
        ttl: Duration,
        fallback: ReputationTable,
    ) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
            ttl,
            fallback,
        }
    }

    /// Current reputation table: fresh cache, else a new fetch, else stale
    /// cache, else the fallback table.
    #[instrument(skip(self))]
    pub async fn reputations(&self) -> ReputationTable {
        let stale = {
            let cache = self.cache.read().await;
            match cache.as_ref() {
                Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                    debug!("reputation cache hit");
                    return entry.table.clone();
                }
                Some(entry) => Some(entry.table.clone()),
                None => None,
            }
        };

        let Some(source) = &self.source else {
            return self.fallback.clone();
        };

        match source.fetch_reputations().await {
            Ok(table) => {
                debug!(entries = table.len(), "reputation cache refreshed");
                // Concurrent refreshes overwrite each other; last writer wins.
                *self.cache.write().await = Some(CachedReputations {
                    table: table.clone(),
                    fetched_at: Instant::now(),
                });
                table
            }
            Err(e) => match stale {
                Some(table) => {
                    warn!("Reputation lookup failed, serving stale cache: {e}");
                    table
                }
                None => {
                    warn!("Reputation lookup failed, using fallback scores: {e}");
                    self.fallback.clone()
                }
            },
        }
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

/// How participant weights are obtained.
pub enum WeightSource {
    FixedStake(HashMap<String, f64>),
    ReputationDerived(ReputationResolver),
}

impl WeightSource {
    /// Weight per participant id. Observers always map to zero.
    pub async fn resolve_weights(&self, participants: &[Participant]) -> HashMap<String, f64> {
        match self {
            WeightSource::FixedStake(stakes) => participants
                .iter()
                .map(|p| {
                    let stake = if p.is_observer() {
                        0.0
                    } else {
                        stakes.get(&p.id).copied().unwrap_or_else(|| {
                            warn!(participant = %p.id, "no stake configured, weight 0");
                            0.0
                        })
                    };
                    (p.id.clone(), sanitize_weight(stake))
                })
                .collect(),
            WeightSource::ReputationDerived(resolver) => {
                let table = resolver.reputations().await;
                participants
                    .iter()
                    .map(|p| {
                        let weight = if p.is_observer() {
                            0.0
                        } else {
                            let score = table
                                .get(&p.id)
                                .map(|r| r.score)
                                .unwrap_or(DEFAULT_REPUTATION_SCORE);
                            reputation_to_weight(score)
                        };
                        (p.id.clone(), weight)
                    })
                    .collect()
            }
        }
    }

    /// Participants with their resolved weights, in the given order.
    pub async fn weighted(&self, participants: &[Participant]) -> Vec<Participant> {
        let weights = self.resolve_weights(participants).await;
        participants
            .iter()
            .map(|p| p.with_weight(weights.get(&p.id).copied().unwrap_or(0.0)))
            .collect()
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            WeightSource::FixedStake(_) => "stake",
            WeightSource::ReputationDerived(_) => "reputation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ReputationSource for CountingSource {
        async fn fetch_reputations(&self) -> Result<ReputationTable, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(LedgerError::Unavailable("down".to_string()));
            }
            let mut table = ReputationTable::new();
            table.insert(
                "Bank_A".to_string(),
                ReputationRecord { score: 95.0, accuracy: 0.9 },
            );
            Ok(table)
        }
    }

    fn fallback() -> ReputationTable {
        let mut table = ReputationTable::new();
        table.insert(
            "Bank_A".to_string(),
            ReputationRecord { score: 60.0, accuracy: 0.7 },
        );
        table
    }

    #[test]
    fn buckets() {
        assert_eq!(reputation_to_weight(100.0), 2.0);
        assert_eq!(reputation_to_weight(90.0), 2.0);
        assert_eq!(reputation_to_weight(89.9), 1.5);
        assert_eq!(reputation_to_weight(75.0), 1.5);
        assert_eq!(reputation_to_weight(50.0), 1.0);
        assert_eq!(reputation_to_weight(25.0), 0.75);
        assert_eq!(reputation_to_weight(24.9), 0.5);
        assert_eq!(reputation_to_weight(0.0), 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_is_reused_until_ttl_expires() {
        let source = Arc::new(CountingSource::new());
        let resolver = ReputationResolver::new(
            Some(source.clone() as Arc<dyn ReputationSource>),
            DEFAULT_CACHE_TTL,
            fallback(),
        );

        resolver.reputations().await;
        resolver.reputations().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        resolver.reputations().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cache_beats_fallback_on_failure() {
        let source = Arc::new(CountingSource::new());
        let resolver = ReputationResolver::new(
            Some(source.clone() as Arc<dyn ReputationSource>),
            DEFAULT_CACHE_TTL,
            fallback(),
        );
        resolver.reputations().await;

        source.fail.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(120)).await;
        let table = resolver.reputations().await;
        assert_eq!(table["Bank_A"].score, 95.0);

        resolver.invalidate().await;
        let table = resolver.reputations().await;
        assert_eq!(table["Bank_A"].score, 60.0);
    }

    #[tokio::test]
    async fn observers_and_unknowns_resolve_sensibly() {
        let resolver = ReputationResolver::new(None, DEFAULT_CACHE_TTL, fallback());
        let source = WeightSource::ReputationDerived(resolver);
        let participants = vec![
            Participant::institution("Bank_A", "Bank A", 0.0),
            Participant::institution("Bank_Z", "Bank Z", 0.0),
            Participant::observer("Regulator", "Regulator"),
        ];
        let weights = source.resolve_weights(&participants).await;
        assert_eq!(weights["Bank_A"], 1.0);
        assert_eq!(weights["Bank_Z"], 1.0);
        assert_eq!(weights["Regulator"], 0.0);
    }

    #[tokio::test]
    async fn fixed_stakes_are_used_directly() {
        let stakes = HashMap::from([
            ("Bank_A".to_string(), 200.0),
            ("Regulator".to_string(), 300.0),
        ]);
        let source = WeightSource::FixedStake(stakes);
        let participants = vec![
            Participant::institution("Bank_A", "Bank A", 0.0),
            Participant::institution("Bank_B", "Bank B", 0.0),
            Participant::observer("Regulator", "Regulator"),
        ];
        let weighted = source.weighted(&participants).await;
        assert_eq!(weighted[0].weight, 200.0);
        assert_eq!(weighted[1].weight, 0.0);
        assert_eq!(weighted[2].weight, 0.0);
        assert_eq!(source.strategy_name(), "stake");
    }
}
