// src/emitter.rs

//! Packages a finished run into an [`AggregationResult`] and hands the
//! matching market record to the audit sink.
//!
//! Persistence is a one-shot spawned task. Its outcome is reported on a
//! oneshot channel that the run itself never awaits; sink failures are
//! logged and dropped, never retried.

use crate::aggregation::AggregationEngine;
use crate::decision::{Action, SAR_THRESHOLD};
use crate::ledger::LedgerError;
use crate::scenario::ScenarioProfile;
use crate::types::{AggregationResult, SarRecord, Vote};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Markets stay open for voting this long after creation.
pub const MARKET_OPEN_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketRecord {
    pub transaction_id: String,
    pub market_id: String,
    pub creator: String,
    pub participants: Vec<String>,
    pub observer: String,
    pub deadline: DateTime<Utc>,
    pub is_open: bool,
}

/// Persists market records somewhere durable.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Returns the sink's reference for the write, if it issues one.
    async fn record_market(&self, record: &MarketRecord) -> Result<Option<String>, LedgerError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuditOutcome {
    Recorded(Option<String>),
    Failed(String),
}

/// Receiving end of a detached persistence task.
#[derive(Debug)]
pub struct AuditHandle {
    rx: oneshot::Receiver<AuditOutcome>,
}

impl AuditHandle {
    /// `None` if the task was dropped before reporting.
    pub async fn outcome(self) -> Option<AuditOutcome> {
        self.rx.await.ok()
    }
}

pub fn market_id(transaction_id: &str) -> String {
    format!("MARKET-{transaction_id}")
}

pub fn sar_id(transaction_id: &str) -> String {
    format!("SAR-{transaction_id}")
}

pub struct RecordEmitter {
    sink: Option<Arc<dyn AuditSink>>,
    observer: String,
}

impl RecordEmitter {
    pub fn new(sink: Option<Arc<dyn AuditSink>>, observer: &str) -> Self {
        Self {
            sink,
            observer: observer.to_string(),
        }
    }

    pub fn emit(
        &self,
        transaction_id: &str,
        profile: &ScenarioProfile,
        votes: Vec<Vote>,
        risk_score: f64,
        action: Action,
    ) -> AggregationResult {
        let sar = (risk_score >= SAR_THRESHOLD).then(|| SarRecord {
            sar_id: sar_id(transaction_id),
            transaction_id: transaction_id.to_string(),
            filed_by: votes
                .iter()
                .find(|v| !v.is_observer)
                .map(|v| v.display_name.clone())
                .unwrap_or_default(),
            risk_score,
            detail: format!(
                "Auto-filed SAR due to risk score {:.2}",
                risk_score / 100.0
            ),
        });
        let running_scores = AggregationEngine::new().running_scores(&votes);

        AggregationResult {
            transaction_id: transaction_id.to_string(),
            market_id: market_id(transaction_id),
            scenario_id: profile.id.to_string(),
            scenario_label: profile.label.to_string(),
            title: profile.title.to_string(),
            customer: profile.customer.to_string(),
            amount: profile.display_amount,
            destination: profile.destination.to_string(),
            risk_flags: profile.flags(),
            votes,
            running_scores,
            risk_score,
            action,
            sar,
            ledger_ref: None,
        }
    }

    /// The market record for a run; the first institution is the creator.
    pub fn market_record(
        &self,
        transaction_id: &str,
        votes: &[Vote],
        now: DateTime<Utc>,
    ) -> MarketRecord {
        let participants: Vec<String> = votes
            .iter()
            .filter(|v| !v.is_observer)
            .map(|v| v.participant_id.clone())
            .collect();
        MarketRecord {
            transaction_id: transaction_id.to_string(),
            market_id: market_id(transaction_id),
            creator: participants.first().cloned().unwrap_or_default(),
            participants,
            observer: self.observer.clone(),
            deadline: now + ChronoDuration::hours(MARKET_OPEN_HOURS),
            is_open: true,
        }
    }

    /// Awaited persistence for the synchronous variant.
    pub async fn persist(&self, record: &MarketRecord) -> Result<Option<String>, LedgerError> {
        match &self.sink {
            Some(sink) => sink.record_market(record).await,
            None => Ok(None),
        }
    }

    /// Spawns a single best-effort write. Must be called inside a runtime.
    pub fn persist_detached(&self, record: MarketRecord) -> Option<AuditHandle> {
        let sink = self.sink.clone()?;
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = match sink.record_market(&record).await {
                Ok(reference) => {
                    info!(tx = %record.transaction_id, "market record persisted");
                    AuditOutcome::Recorded(reference)
                }
                Err(e) => {
                    warn!(tx = %record.transaction_id, "Failed to persist market record: {e}");
                    AuditOutcome::Failed(e.to_string())
                }
            };
            // Nobody may be listening any more.
            let _ = tx.send(outcome);
        });
        Some(AuditHandle { rx })
    }
}
