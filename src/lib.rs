// The modules that make up the AML prediction-market backend.
pub mod aggregation;
pub mod api;
pub mod config;
pub mod decision;
pub mod emitter;
pub mod ledger;
pub mod market;
pub mod reputation;
pub mod scenario;
pub mod synthesizer;
pub mod types;

pub use aggregation::{AggregationEngine, RunningScore};
pub use decision::Action;
pub use market::{MarketContext, MarketError};
pub use scenario::ScenarioProfile;
pub use types::{AggregationResult, Participant, Role, SarRecord, Vote};
