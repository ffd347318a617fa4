// src/api.rs

//! HTTP surface for the dashboards. Every endpoint answers 200 with a
//! `success`/`status` flag; ledger trouble is reported in the body. A demo
//! request body that is present but not valid JSON is a 400.

use crate::ledger::PartySummary;
use crate::market::MarketContext;
use axum::{
    body::Bytes, extract::State, http::StatusCode, response::Json, routing::get, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub const LEDGER_MODE: &str = "canton-devnet";
pub const OFFLINE_MODE: &str = "offline";

#[derive(Clone)]
struct ApiState {
    market: Arc<MarketContext>,
}

impl ApiState {
    fn mode(&self) -> &'static str {
        if self.market.ledger().is_some() {
            LEDGER_MODE
        } else {
            OFFLINE_MODE
        }
    }
}

#[derive(Debug, Deserialize)]
struct DemoRequest {
    #[serde(default = "default_scenario")]
    scenario: String,
}

fn default_scenario() -> String {
    crate::scenario::DEFAULT_SCENARIO_ID.to_string()
}

async fn health_check(State(state): State<ApiState>) -> Json<Value> {
    let mode = state.mode();
    let Some(ledger) = state.market.ledger() else {
        return Json(json!({
            "status": "ok",
            "mode": mode,
            "parties": state.market.roster().len()
        }));
    };
    match ledger.health().await {
        Ok(parties) => Json(json!({ "status": "ok", "mode": mode, "parties": parties })),
        Err(e) => {
            warn!("Ledger health check failed: {e}");
            Json(json!({ "status": "error", "mode": mode }))
        }
    }
}

async fn parties_handler(State(state): State<ApiState>) -> Json<Value> {
    let mode = state.mode();
    let Some(ledger) = state.market.ledger() else {
        let parties: Vec<PartySummary> = state
            .market
            .roster()
            .iter()
            .map(|p| PartySummary {
                name: p.display_name.clone(),
                party_id: p.id.clone(),
                is_regulator: p.is_observer(),
            })
            .collect();
        return Json(json!({ "success": true, "mode": mode, "parties": parties }));
    };
    match ledger.parties().await {
        Ok(parties) => Json(json!({ "success": true, "mode": mode, "parties": parties })),
        Err(e) => Json(json!({ "success": false, "error": e.to_string() })),
    }
}

async fn contracts_handler(State(state): State<ApiState>) -> Json<Value> {
    let mode = state.mode();
    let Some(ledger) = state.market.ledger() else {
        return Json(json!({
            "success": true,
            "mode": mode,
            "totalContracts": 0,
            "contracts": []
        }));
    };
    match ledger.contracts().await {
        Ok(listing) => Json(json!({
            "success": true,
            "mode": mode,
            "totalContracts": listing.total_contracts,
            "contracts": listing.contracts
        })),
        Err(e) => Json(json!({ "success": false, "error": e.to_string(), "totalContracts": 0 })),
    }
}

async fn market_count_handler(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({ "marketCount": state.market.current_market_count() }))
}

/// An empty body selects the default scenario.
fn parse_demo_request(body: &[u8]) -> Result<DemoRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(DemoRequest {
            scenario: default_scenario(),
        });
    }
    serde_json::from_slice(body)
}

async fn demo_handler(State(state): State<ApiState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let mode = state.mode();
    let scenario = match parse_demo_request(&body) {
        Ok(req) => req.scenario,
        Err(e) => {
            warn!("Rejected demo request body: {e}");
            let body = json!({
                "success": false,
                "error": format!("Invalid request body: {e}"),
                "mode": mode,
            });
            return (StatusCode::BAD_REQUEST, Json(body));
        }
    };
    let body = match state.market.run_demo(&scenario).await {
        Ok(result) => json!({
            "success": true,
            "mode": mode,
            "ledger": state.market.ledger().is_some(),
            "transactionId": result.transaction_id,
            "marketCount": state.market.current_market_count(),
            "riskScore": result.risk_score,
            "action": result.action,
            "headline": result.action.headline(),
            "parties": state.market.roster().len(),
            "market": result,
        }),
        Err(e) => {
            warn!(scenario = %scenario, "Demo run failed: {e}");
            json!({ "success": false, "error": e.to_string(), "mode": mode })
        }
    };
    (StatusCode::OK, Json(body))
}

pub fn router(market: Arc<MarketContext>) -> Router {
    let state = ApiState { market };
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/parties", get(parties_handler))
        .route("/api/contracts", get(contracts_handler))
        .route("/api/demo", get(market_count_handler).post(demo_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, market: Arc<MarketContext>) -> anyhow::Result<()> {
    let app = router(market);
    let listener = TcpListener::bind(addr).await?;
    info!("AML market API serving on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
