// src/ledger.rs

//! HTTP client for the ledger JSON API.
//!
//! Serves as both external collaborators of the market: the reputation
//! source (BankReputation contracts) and the audit sink (PredictionMarket
//! creation). Reads use the short read timeout, writes the longer one.

use crate::config::LedgerConfig;
use crate::emitter::{AuditSink, MarketRecord};
use crate::reputation::{
    ReputationRecord, ReputationSource, ReputationTable, DEFAULT_ACCURACY,
    DEFAULT_REPUTATION_SCORE,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

const REPUTATION_TEMPLATE: &str = ":BankReputation:";
const MARKET_TEMPLATE: &str = ":PredictionMarket:";
const VALIDATOR_PREFIX: &str = "amlprediction-validator";
const CONTRACT_ID_DISPLAY_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Ledger returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed ledger response: {0}")]
    Malformed(String),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// One active contract as returned by the state API.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractEntry {
    pub template_id: String,
    pub contract_id: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartySummary {
    pub name: String,
    pub party_id: String,
    pub is_regulator: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ContractDetails {
    #[serde(rename_all = "camelCase")]
    Reputation {
        bank: String,
        reputation_score: f64,
        accuracy: f64,
    },
    #[serde(rename_all = "camelCase")]
    Market {
        transaction_id: Option<String>,
        is_open: Option<bool>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractSummary {
    pub contract_id: String,
    pub template: String,
    #[serde(flatten)]
    pub details: ContractDetails,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractListing {
    pub total_contracts: usize,
    pub contracts: Vec<ContractSummary>,
}

#[derive(Debug, Clone)]
pub struct LedgerClient {
    client: Client,
    config: LedgerConfig,
}

impl LedgerClient {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn party_id(&self, participant_id: &str) -> String {
        format!("{participant_id}{}", self.config.party_suffix)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    async fn get(&self, path: &str) -> Result<Value, LedgerError> {
        let response = self
            .client
            .get(self.url(path))
            .timeout(self.config.read_timeout())
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, LedgerError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .timeout(timeout)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<Value, LedgerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn ledger_end(&self) -> Result<Value, LedgerError> {
        let data = self.get("/v2/state/ledger-end").await?;
        data.get("offset")
            .cloned()
            .ok_or_else(|| LedgerError::Malformed("ledger-end without offset".to_string()))
    }

    pub async fn active_contracts(
        &self,
        timeout: Duration,
    ) -> Result<Vec<ContractEntry>, LedgerError> {
        let offset = self.ledger_end().await?;
        let body = json!({
            "filter": {
                "filtersByParty": {},
                "filtersForAnyParty": {
                    "cumulative": [{
                        "identifierFilter": {
                            "WildcardFilter": { "value": { "includeCreatedEventBlob": false } }
                        }
                    }]
                }
            },
            "verbose": true,
            "activeAtOffset": offset
        });
        let data = self.post("/v2/state/active-contracts", &body, timeout).await?;
        Ok(parse_contract_entries(&data))
    }

    #[instrument(skip(self))]
    pub async fn parties(&self) -> Result<Vec<PartySummary>, LedgerError> {
        let data = self.get("/v2/parties").await?;
        Ok(parse_parties(&data, &self.config.observer_party))
    }

    #[instrument(skip(self))]
    pub async fn contracts(&self) -> Result<ContractListing, LedgerError> {
        let entries = self.active_contracts(self.config.list_timeout()).await?;
        Ok(summarize_contracts(&entries))
    }

    /// Number of known demo users present on the ledger.
    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<usize, LedgerError> {
        let data = self.get("/v2/users").await?;
        let users = data
            .get("users")
            .and_then(Value::as_array)
            .map(|users| {
                users
                    .iter()
                    .filter_map(|u| u.get("id").and_then(Value::as_str))
                    .filter(|id| self.config.demo_users.iter().any(|known| known == id))
                    .count()
            })
            .unwrap_or(0);
        Ok(users)
    }

    pub fn market_command(&self, record: &MarketRecord) -> Value {
        let creator = self.party_id(&record.creator);
        let participants: Vec<String> = record
            .participants
            .iter()
            .map(|p| self.party_id(p))
            .collect();
        let template_id = format!("#{}:PredictionMarket:PredictionMarket", self.config.package);
        json!({
            "userId": self.config.user_id,
            "commandId": format!("market-{}", record.transaction_id),
            "actAs": [creator],
            "commands": [{
                "CreateCommand": {
                    "templateId": template_id,
                    "createArguments": {
                        "marketId": record.market_id,
                        "transactionId": record.transaction_id,
                        "creator": creator,
                        "participants": participants,
                        "deadline": record.deadline.to_rfc3339(),
                        "votes": {},
                        "regulator": self.party_id(&record.observer),
                        "isOpen": record.is_open
                    }
                }
            }]
        })
    }
}

#[async_trait]
impl ReputationSource for LedgerClient {
    #[instrument(skip(self))]
    async fn fetch_reputations(&self) -> Result<ReputationTable, LedgerError> {
        let entries = self.active_contracts(self.config.write_timeout()).await?;
        let table = parse_reputations(&entries);
        debug!(entries = entries.len(), reputations = table.len(), "fetched reputations");
        Ok(table)
    }
}

#[async_trait]
impl AuditSink for LedgerClient {
    #[instrument(skip(self, record), fields(tx = %record.transaction_id))]
    async fn record_market(&self, record: &MarketRecord) -> Result<Option<String>, LedgerError> {
        let body = self.market_command(record);
        let data = self
            .post("/v2/commands/submit-and-wait", &body, self.config.write_timeout())
            .await?;
        Ok(data
            .get("updateId")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

/// Accepts numbers and numeric strings.
pub fn parse_number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// Drops the `::namespace` suffix of a party id.
pub fn strip_namespace(party: &str) -> &str {
    party.split("::").next().unwrap_or(party)
}

pub fn parse_contract_entries(data: &Value) -> Vec<ContractEntry> {
    let Some(items) = data.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let entry = item.get("contractEntry")?.as_object()?;
            let (_, inner) = entry.iter().next()?;
            let event = inner.get("createdEvent").cloned().unwrap_or(Value::Null);
            Some(ContractEntry {
                template_id: event
                    .get("templateId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                contract_id: event
                    .get("contractId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                args: event.get("createArgument").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

pub fn parse_reputations(entries: &[ContractEntry]) -> ReputationTable {
    entries
        .iter()
        .filter(|e| e.template_id.contains(REPUTATION_TEMPLATE))
        .map(|e| {
            let bank = e.args.get("bank").and_then(Value::as_str).unwrap_or_default();
            (
                strip_namespace(bank).to_string(),
                ReputationRecord {
                    score: parse_number(e.args.get("reputationScore"))
                        .unwrap_or(DEFAULT_REPUTATION_SCORE),
                    accuracy: parse_number(e.args.get("accuracy")).unwrap_or(DEFAULT_ACCURACY),
                },
            )
        })
        .collect()
}

pub fn parse_parties(data: &Value, observer_party: &str) -> Vec<PartySummary> {
    data.get("partyDetails")
        .and_then(Value::as_array)
        .map(|parties| {
            parties
                .iter()
                .filter_map(|p| p.get("party").and_then(Value::as_str))
                .filter(|party| !party.starts_with(VALIDATOR_PREFIX))
                .map(|party| PartySummary {
                    name: strip_namespace(party).replace('_', " "),
                    party_id: party.to_string(),
                    is_regulator: party.starts_with(observer_party),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn summarize_contracts(entries: &[ContractEntry]) -> ContractListing {
    let contracts = entries
        .iter()
        .filter(|e| {
            e.template_id.contains(REPUTATION_TEMPLATE) || e.template_id.contains(MARKET_TEMPLATE)
        })
        .map(|e| {
            let template = e.template_id.split(':').nth(1).unwrap_or_default().to_string();
            let details = if e.template_id.contains(REPUTATION_TEMPLATE) {
                let bank = e.args.get("bank").and_then(Value::as_str).unwrap_or_default();
                ContractDetails::Reputation {
                    bank: strip_namespace(bank).replace('_', " "),
                    reputation_score: parse_number(e.args.get("reputationScore")).unwrap_or(0.0),
                    accuracy: parse_number(e.args.get("accuracy")).unwrap_or(0.0),
                }
            } else {
                ContractDetails::Market {
                    transaction_id: e
                        .args
                        .get("transactionId")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    is_open: e.args.get("isOpen").and_then(Value::as_bool),
                }
            };
            ContractSummary {
                contract_id: e.contract_id.chars().take(CONTRACT_ID_DISPLAY_LEN).collect(),
                template,
                details,
            }
        })
        .collect();
    ContractListing {
        total_contracts: entries.len(),
        contracts,
    }
}
