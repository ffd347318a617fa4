//! In-memory stand-ins for the ledger collaborators.

use aml_market::emitter::{AuditSink, MarketRecord};
use aml_market::ledger::LedgerError;
use aml_market::reputation::{ReputationRecord, ReputationSource, ReputationTable};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Serves a fixed reputation table, or fails on demand.
pub struct MockReputationSource {
    table: ReputationTable,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl MockReputationSource {
    pub fn new(scores: &[(&str, f64)]) -> Self {
        let table = scores
            .iter()
            .map(|(id, score)| {
                (
                    id.to_string(),
                    ReputationRecord {
                        score: *score,
                        accuracy: 0.9,
                    },
                )
            })
            .collect();
        Self {
            table,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReputationSource for MockReputationSource {
    async fn fetch_reputations(&self) -> Result<ReputationTable, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("mock outage".to_string()));
        }
        Ok(self.table.clone())
    }
}

/// Records every market it is asked to persist.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<MarketRecord>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn recorded(&self) -> Vec<MarketRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn record_market(&self, record: &MarketRecord) -> Result<Option<String>, LedgerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("mock sink down".to_string()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(Some(format!("update-{}", record.transaction_id)))
    }
}

/// Never completes a write within any test's lifetime.
pub struct StalledSink;

#[async_trait]
impl AuditSink for StalledSink {
    async fn record_market(&self, _record: &MarketRecord) -> Result<Option<String>, LedgerError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(None)
    }
}
