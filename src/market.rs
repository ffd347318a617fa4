// src/market.rs

//! --- Demo Market Orchestration ---
//!
//! `MarketContext` owns every piece of process-wide state a demo run needs:
//! the participant roster, the weight source (and with it the reputation
//! cache), the vote RNG and the market counter. A run resolves weights,
//! synthesizes one vote per participant, aggregates, classifies and emits.

use crate::aggregation::AggregationEngine;
use crate::config::{Config, WeightStrategy};
use crate::emitter::{AuditHandle, AuditSink, RecordEmitter};
use crate::ledger::{LedgerClient, LedgerError};
use crate::reputation::{ReputationResolver, ReputationSource, WeightSource, DEFAULT_CACHE_TTL};
use crate::scenario::{self, ScenarioError, ScenarioProfile};
use crate::synthesizer::VoteSynthesizer;
use crate::types::{AggregationResult, Participant};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Transaction ids are `TX-` followed by a number below this bound.
const TX_ID_SPACE: u64 = 100_000_000;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<ScenarioError> for MarketError {
    fn from(e: ScenarioError) -> Self {
        MarketError::InvalidArgument(e.to_string())
    }
}

pub struct MarketContext {
    roster: Vec<Participant>,
    weights: WeightSource,
    synthesizer: VoteSynthesizer,
    engine: AggregationEngine,
    emitter: RecordEmitter,
    ledger: Option<Arc<LedgerClient>>,
    rng: Mutex<StdRng>,
    market_count: AtomicU64,
    strict_scenarios: bool,
    await_market_creation: bool,
}

impl MarketContext {
    pub fn builder(roster: Vec<Participant>) -> MarketBuilder {
        MarketBuilder::new(roster)
    }

    /// Wires the ledger client in as reputation source and audit sink when
    /// the ledger is enabled.
    pub fn from_config(config: &Config) -> Result<Self, MarketError> {
        let mut builder = MarketBuilder::new(config.roster())
            .initial_market_count(config.initial_market_count)
            .strict_scenarios(config.strict_scenarios)
            .await_market_creation(config.ledger.await_market_creation)
            .observer(&config.ledger.observer_party);
        if let Some(seed) = config.rng_seed {
            builder = builder.rng_seed(seed);
        }

        let ledger = if config.ledger.enabled {
            Some(Arc::new(LedgerClient::new(config.ledger.clone())?))
        } else {
            None
        };

        let weights = match config.weights.strategy {
            WeightStrategy::Stake => WeightSource::FixedStake(config.stakes()),
            WeightStrategy::Reputation => {
                let source = ledger
                    .clone()
                    .map(|client| client as Arc<dyn ReputationSource>);
                WeightSource::ReputationDerived(ReputationResolver::new(
                    source,
                    config.cache_ttl(),
                    config.fallback_reputations(),
                ))
            }
        };
        builder = builder.weights(weights);

        if let Some(client) = ledger {
            builder = builder
                .audit_sink(client.clone() as Arc<dyn AuditSink>)
                .ledger(client);
        }
        Ok(builder.build())
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn ledger(&self) -> Option<&Arc<LedgerClient>> {
        self.ledger.as_ref()
    }

    pub fn weight_strategy(&self) -> &'static str {
        self.weights.strategy_name()
    }

    pub fn current_market_count(&self) -> u64 {
        self.market_count.load(Ordering::SeqCst)
    }

    fn profile(&self, scenario_id: &str) -> Result<&'static ScenarioProfile, MarketError> {
        if self.strict_scenarios {
            return Ok(scenario::lookup_strict(scenario_id)?);
        }
        let profile = scenario::lookup(scenario_id);
        if profile.id != scenario_id {
            debug!(requested = scenario_id, used = profile.id, "unknown scenario, using default");
        }
        Ok(profile)
    }

    pub async fn run_demo(&self, scenario_id: &str) -> Result<AggregationResult, MarketError> {
        self.run_demo_with_audit(scenario_id)
            .await
            .map(|(result, _)| result)
    }

    /// Same as [`run_demo`](Self::run_demo), also handing back the detached
    /// persistence task, if one was started.
    #[instrument(skip(self))]
    pub async fn run_demo_with_audit(
        &self,
        scenario_id: &str,
    ) -> Result<(AggregationResult, Option<AuditHandle>), MarketError> {
        let profile = self.profile(scenario_id)?;
        let participants = self.weights.weighted(&self.roster).await;

        let (transaction_id, votes) = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let transaction_id = format!("TX-{}", rng.gen_range(0..TX_ID_SPACE));
            let votes = self.synthesizer.synthesize(&participants, profile, &mut *rng);
            (transaction_id, votes)
        };

        let (risk_score, action) = self.engine.aggregate_and_classify(&votes);
        let record = self
            .emitter
            .market_record(&transaction_id, &votes, Utc::now());
        let mut result = self
            .emitter
            .emit(&transaction_id, profile, votes, risk_score, action);

        let handle = if self.await_market_creation {
            result.ledger_ref = self.emitter.persist(&record).await?;
            None
        } else {
            self.emitter.persist_detached(record)
        };

        let count = self.market_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            tx = %transaction_id,
            scenario = profile.id,
            risk_score,
            %action,
            market_count = count,
            "demo market closed"
        );
        Ok((result, handle))
    }
}

pub struct MarketBuilder {
    roster: Vec<Participant>,
    weights: Option<WeightSource>,
    sink: Option<Arc<dyn AuditSink>>,
    ledger: Option<Arc<LedgerClient>>,
    observer: Option<String>,
    seed: Option<u64>,
    initial_market_count: u64,
    strict_scenarios: bool,
    await_market_creation: bool,
}

impl MarketBuilder {
    fn new(roster: Vec<Participant>) -> Self {
        Self {
            roster,
            weights: None,
            sink: None,
            ledger: None,
            observer: None,
            seed: None,
            initial_market_count: 0,
            strict_scenarios: false,
            await_market_creation: false,
        }
    }

    pub fn weights(mut self, weights: WeightSource) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn ledger(mut self, ledger: Arc<LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn observer(mut self, observer: &str) -> Self {
        self.observer = Some(observer.to_string());
        self
    }

    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn initial_market_count(mut self, count: u64) -> Self {
        self.initial_market_count = count;
        self
    }

    pub fn strict_scenarios(mut self, strict: bool) -> Self {
        self.strict_scenarios = strict;
        self
    }

    pub fn await_market_creation(mut self, await_creation: bool) -> Self {
        self.await_market_creation = await_creation;
        self
    }

    /// Without an explicit weight source, each participant's configured
    /// weight is used as a fixed stake.
    pub fn build(self) -> MarketContext {
        let weights = self.weights.unwrap_or_else(|| {
            let stakes: HashMap<String, f64> = self
                .roster
                .iter()
                .map(|p| (p.id.clone(), p.weight))
                .collect();
            WeightSource::FixedStake(stakes)
        });
        let observer = self.observer.unwrap_or_else(|| {
            self.roster
                .iter()
                .find(|p| p.is_observer())
                .map(|p| p.id.clone())
                .unwrap_or_default()
        });
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        MarketContext {
            roster: self.roster,
            weights,
            synthesizer: VoteSynthesizer::new(),
            engine: AggregationEngine::new(),
            emitter: RecordEmitter::new(self.sink, &observer),
            ledger: self.ledger,
            rng: Mutex::new(rng),
            market_count: AtomicU64::new(self.initial_market_count),
            strict_scenarios: self.strict_scenarios,
            await_market_creation: self.await_market_creation,
        }
    }
}

impl Default for MarketContext {
    /// Offline context over the default roster with reputation fallbacks.
    fn default() -> Self {
        let config = Config::default();
        MarketBuilder::new(config.roster())
            .initial_market_count(config.initial_market_count)
            .weights(WeightSource::ReputationDerived(ReputationResolver::new(
                None,
                DEFAULT_CACHE_TTL,
                config.fallback_reputations(),
            )))
            .build()
    }
}
