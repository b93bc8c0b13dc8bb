//! Request/response surface.
//!
//! Big integers travel as decimal strings, proofs and signals as hex, and
//! the payload field names are frozen at this boundary.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use darkpool_crypto::{fr_from_decimal, fr_to_decimal, fr_to_hex};

use crate::book::BookSnapshot;
use crate::error::NodeError;
use crate::gateway::ws_handler;
use crate::order::{now_ms, Match, Side};
use crate::service::{NodeService, SubmitOrderCommand};
use crate::settlement::{Role, SettlementRecord, SignatureAck};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<NodeService>,
}

pub fn node_router(service: Arc<NodeService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/telemetry", get(telemetry))
        .route("/orders", post(submit_order))
        .route("/orders/prepare", post(prepare_order))
        .route("/orderbook/:asset", get(order_book))
        .route("/matches", get(list_matches))
        .route("/settlements", get(list_settlements))
        .route("/signatures", post(submit_signature))
        .route("/admin/process-matches", post(process_matches))
        .route("/admin/whitelist", post(rebuild_whitelist))
        .route("/ws", get(ws_handler))
        .with_state(ApiState { service })
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        let status = match err {
            NodeError::InvalidInput(_) | NodeError::Crypto(_) => StatusCode::BAD_REQUEST,
            NodeError::UnknownMatch(_) => StatusCode::NOT_FOUND,
            NodeError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitOrderRequest {
    symbol: String,
    trader: String,
    asset_address: String,
    side: Side,
    quantity: u64,
    price: u64,
    commitment: String,
    secret: String,
    nonce: String,
    expiry: u64,
    whitelist_index: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitOrderResponse {
    accepted: bool,
    pending_matches: usize,
    order_book: OrderBookResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    no_match_reason: Option<String>,
    matches: Vec<MatchResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderBookResponse {
    buys: usize,
    sells: usize,
    buy_quantities: Vec<String>,
    sell_quantities: Vec<String>,
    buy_prices: Vec<String>,
    sell_prices: Vec<String>,
}

impl From<BookSnapshot> for OrderBookResponse {
    fn from(snapshot: BookSnapshot) -> Self {
        Self {
            buys: snapshot.buys.len(),
            sells: snapshot.sells.len(),
            buy_quantities: snapshot
                .buys
                .iter()
                .map(|entry| entry.quantity.to_string())
                .collect(),
            sell_quantities: snapshot
                .sells
                .iter()
                .map(|entry| entry.quantity.to_string())
                .collect(),
            buy_prices: snapshot
                .buys
                .iter()
                .map(|entry| entry.price.to_string())
                .collect(),
            sell_prices: snapshot
                .sells
                .iter()
                .map(|entry| entry.price.to_string())
                .collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchResponse {
    match_id: String,
    asset: String,
    buyer: String,
    seller: String,
    buy_commitment: String,
    sell_commitment: String,
    execution_price: String,
    execution_quantity: String,
    timestamp: u64,
}

impl From<&Match> for MatchResponse {
    fn from(matched: &Match) -> Self {
        Self {
            match_id: matched.match_id.clone(),
            asset: matched.asset().to_string(),
            buyer: matched.buyer().to_string(),
            seller: matched.seller().to_string(),
            buy_commitment: fr_to_decimal(matched.buy_order.commitment),
            sell_commitment: fr_to_decimal(matched.sell_order.commitment),
            execution_price: matched.execution_price.to_string(),
            execution_quantity: matched.execution_quantity.to_string(),
            timestamp: matched.timestamp,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettlementResponse {
    match_id: String,
    status: crate::settlement::SettlementStatus,
    buyer: String,
    seller: String,
    asset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    nullifier_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proof: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_signals: Option<String>,
    buyer_signed: bool,
    seller_signed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    updated_at: u64,
}

impl From<SettlementRecord> for SettlementResponse {
    fn from(record: SettlementRecord) -> Self {
        Self {
            match_id: record.match_id,
            status: record.status,
            buyer: record.buyer,
            seller: record.seller,
            asset: record.asset,
            nullifier_hash: record.nullifier.map(fr_to_hex),
            proof: record.proof_bytes.as_deref().map(hex::encode),
            public_signals: record.public_signals_bytes.as_deref().map(hex::encode),
            buyer_signed: record.buyer_signed,
            seller_signed: record.seller_signed,
            tx_hash: record.tx_hash,
            error: record.error,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareOrderRequest {
    asset_address: String,
    side: Side,
    quantity: u64,
    price: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrepareOrderResponse {
    commitment: String,
    secret: String,
    nonce: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureRequest {
    match_id: String,
    role: Role,
    signature: String,
}

#[derive(Deserialize)]
struct SettlementsQuery {
    trader: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessMatchesResponse {
    dispatched: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RebuildWhitelistRequest {
    participants: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RebuildWhitelistResponse {
    root: String,
    participants: usize,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "timestamp": now_ms() }))
}

async fn telemetry(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.service.telemetry_snapshot())
}

fn parse_field(name: &str, value: &str) -> Result<ark_bn254::Fr, ApiError> {
    fr_from_decimal(value).map_err(|_| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: format!("{name} must be a decimal field element"),
    })
}

async fn submit_order(
    State(state): State<ApiState>,
    Json(request): Json<SubmitOrderRequest>,
) -> Result<Json<SubmitOrderResponse>, ApiError> {
    let command = SubmitOrderCommand {
        symbol: request.symbol,
        trader: request.trader,
        asset_address: request.asset_address,
        side: request.side,
        quantity: request.quantity,
        price: request.price,
        commitment: parse_field("commitment", &request.commitment)?,
        secret: parse_field("secret", &request.secret)?,
        nonce: parse_field("nonce", &request.nonce)?,
        expiry: request.expiry,
        whitelist_index: request.whitelist_index,
    };
    let outcome = state.service.submit_order(command).await?;
    Ok(Json(SubmitOrderResponse {
        accepted: true,
        pending_matches: outcome.matches.len(),
        order_book: outcome.book.into(),
        no_match_reason: outcome.no_match_reason,
        matches: outcome.matches.iter().map(MatchResponse::from).collect(),
    }))
}

async fn prepare_order(
    State(state): State<ApiState>,
    Json(request): Json<PrepareOrderRequest>,
) -> Result<Json<PrepareOrderResponse>, ApiError> {
    let material = state.service.prepare_order(
        &request.asset_address,
        request.side,
        request.quantity,
        request.price,
    )?;
    Ok(Json(PrepareOrderResponse {
        commitment: fr_to_decimal(material.commitment),
        secret: fr_to_decimal(material.secret),
        nonce: fr_to_decimal(material.nonce),
    }))
}

async fn order_book(
    State(state): State<ApiState>,
    Path(asset): Path<String>,
) -> Result<Json<OrderBookResponse>, ApiError> {
    let snapshot = state.service.order_book(&asset).await?;
    Ok(Json(snapshot.into()))
}

async fn list_matches(
    State(state): State<ApiState>,
) -> Result<Json<Vec<MatchResponse>>, ApiError> {
    let matches = state.service.matches().await?;
    Ok(Json(matches.iter().map(MatchResponse::from).collect()))
}

async fn list_settlements(
    State(state): State<ApiState>,
    Query(query): Query<SettlementsQuery>,
) -> Result<Json<Vec<SettlementResponse>>, ApiError> {
    let records = state.service.settlements(query.trader.as_deref());
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

async fn submit_signature(
    State(state): State<ApiState>,
    Json(request): Json<SignatureRequest>,
) -> Result<Json<SignatureAck>, ApiError> {
    let ack = state
        .service
        .submit_signature(&request.match_id, request.role, request.signature)
        .await?;
    Ok(Json(ack))
}

async fn process_matches(
    State(state): State<ApiState>,
) -> Result<Json<ProcessMatchesResponse>, ApiError> {
    let dispatched = state.service.process_pending_matches().await?;
    Ok(Json(ProcessMatchesResponse { dispatched }))
}

async fn rebuild_whitelist(
    State(state): State<ApiState>,
    Json(request): Json<RebuildWhitelistRequest>,
) -> Result<Json<RebuildWhitelistResponse>, ApiError> {
    let participants = request.participants;
    let root = state.service.rebuild_whitelist(&participants)?;
    Ok(Json(RebuildWhitelistResponse {
        root,
        participants: participants.len(),
    }))
}
