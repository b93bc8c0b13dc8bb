//! Typed event bus with topic-keyed fan-out.
//!
//! Publishers never block: each subscriber owns a bounded outbound queue
//! drained by its own writer task, and a subscriber whose queue overflows
//! is disconnected. Events for one match are accepted in order and each
//! queue is FIFO, so per-match delivery order is preserved; nothing is
//! promised across matches.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::telemetry::Telemetry;

pub fn orderbook_channel(asset: &str) -> String {
    format!("orderbook:{asset}")
}

pub fn trader_channel(address: &str) -> String {
    format!("trader:{address}")
}

pub fn settlement_channel(match_id: &str) -> String {
    format!("settlement:{match_id}")
}

/// Framed JSON messages on the gateway stream, both directions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Subscribed { channel: String },
    Unsubscribed { channel: String },
    Event {
        event: String,
        channel: String,
        data: Value,
        timestamp: u64,
    },
    Ping { timestamp: u64 },
    Pong { timestamp: u64 },
    Error { message: String },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSubmitted {
    pub asset: String,
    pub trader: String,
    pub side: u8,
    pub quantity: String,
    pub price: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMatched {
    pub match_id: String,
    pub buyer_address: String,
    pub seller_address: String,
    pub asset: String,
    pub execution_price: String,
    pub execution_quantity: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofUpdate {
    pub match_id: String,
    pub buyer_address: String,
    pub seller_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementUpdate {
    pub match_id: String,
    pub buyer_address: String,
    pub seller_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureAdded {
    pub match_id: String,
    pub signer: String,
    pub role: String,
    pub buyer_signed: bool,
    pub seller_signed: bool,
    pub timestamp: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureComplete {
    pub match_id: String,
    pub buyer_address: String,
    pub seller_address: String,
    pub timestamp: u64,
}

#[derive(Clone, Debug)]
pub enum PoolEvent {
    OrderSubmitted(OrderSubmitted),
    OrderMatched(OrderMatched),
    ProofGenerating(ProofUpdate),
    ProofGenerated(ProofUpdate),
    ProofFailed(ProofUpdate),
    SignatureAdded(SignatureAdded),
    SignatureComplete(SignatureComplete),
    SettlementQueued(SettlementUpdate),
    SettlementTxBuilt(SettlementUpdate),
    SettlementConfirmed(SettlementUpdate),
    SettlementFailed(SettlementUpdate),
}

impl PoolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::OrderSubmitted(_) => "order:submitted",
            PoolEvent::OrderMatched(_) => "order:matched",
            PoolEvent::ProofGenerating(_) => "proof:generating",
            PoolEvent::ProofGenerated(_) => "proof:generated",
            PoolEvent::ProofFailed(_) => "proof:failed",
            PoolEvent::SignatureAdded(_) => "signature:added",
            PoolEvent::SignatureComplete(_) => "signature:complete",
            PoolEvent::SettlementQueued(_) => "settlement:queued",
            PoolEvent::SettlementTxBuilt(_) => "settlement:txBuilt",
            PoolEvent::SettlementConfirmed(_) => "settlement:confirmed",
            PoolEvent::SettlementFailed(_) => "settlement:failed",
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            PoolEvent::OrderSubmitted(p) => p.timestamp,
            PoolEvent::OrderMatched(p) => p.timestamp,
            PoolEvent::ProofGenerating(p)
            | PoolEvent::ProofGenerated(p)
            | PoolEvent::ProofFailed(p) => p.timestamp,
            PoolEvent::SignatureAdded(p) => p.timestamp,
            PoolEvent::SignatureComplete(p) => p.timestamp,
            PoolEvent::SettlementQueued(p)
            | PoolEvent::SettlementTxBuilt(p)
            | PoolEvent::SettlementConfirmed(p)
            | PoolEvent::SettlementFailed(p) => p.timestamp,
        }
    }

    pub fn data(&self) -> Value {
        let serialized = match self {
            PoolEvent::OrderSubmitted(p) => serde_json::to_value(p),
            PoolEvent::OrderMatched(p) => serde_json::to_value(p),
            PoolEvent::ProofGenerating(p)
            | PoolEvent::ProofGenerated(p)
            | PoolEvent::ProofFailed(p) => serde_json::to_value(p),
            PoolEvent::SignatureAdded(p) => serde_json::to_value(p),
            PoolEvent::SignatureComplete(p) => serde_json::to_value(p),
            PoolEvent::SettlementQueued(p)
            | PoolEvent::SettlementTxBuilt(p)
            | PoolEvent::SettlementConfirmed(p)
            | PoolEvent::SettlementFailed(p) => serde_json::to_value(p),
        };
        serialized.unwrap_or(Value::Null)
    }

    /// Channels this event routes to.
    pub fn channels(&self) -> Vec<String> {
        match self {
            PoolEvent::OrderSubmitted(p) => vec![
                orderbook_channel(&p.asset),
                trader_channel(&p.trader),
            ],
            PoolEvent::OrderMatched(p) => vec![
                orderbook_channel(&p.asset),
                trader_channel(&p.buyer_address),
                trader_channel(&p.seller_address),
                settlement_channel(&p.match_id),
            ],
            PoolEvent::ProofGenerating(p)
            | PoolEvent::ProofGenerated(p)
            | PoolEvent::ProofFailed(p) => vec![
                trader_channel(&p.buyer_address),
                trader_channel(&p.seller_address),
                settlement_channel(&p.match_id),
            ],
            PoolEvent::SignatureAdded(p) => vec![
                trader_channel(&p.signer),
                settlement_channel(&p.match_id),
            ],
            PoolEvent::SignatureComplete(p) => vec![
                trader_channel(&p.buyer_address),
                trader_channel(&p.seller_address),
                settlement_channel(&p.match_id),
            ],
            PoolEvent::SettlementQueued(p)
            | PoolEvent::SettlementTxBuilt(p)
            | PoolEvent::SettlementConfirmed(p)
            | PoolEvent::SettlementFailed(p) => vec![
                trader_channel(&p.buyer_address),
                trader_channel(&p.seller_address),
                settlement_channel(&p.match_id),
            ],
        }
    }
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::Sender<WireMessage>>,
    channels: HashMap<String, HashSet<u64>>,
    memberships: HashMap<u64, HashSet<String>>,
}

pub struct EventBus {
    state: RwLock<BusState>,
    queue_depth: usize,
    telemetry: Telemetry,
}

impl EventBus {
    pub fn new(queue_depth: usize, telemetry: Telemetry) -> Self {
        Self {
            state: RwLock::new(BusState::default()),
            queue_depth,
            telemetry,
        }
    }

    /// Register a client; the returned receiver feeds its writer task.
    pub fn register(&self) -> (u64, mpsc::Receiver<WireMessage>) {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let mut state = self.state.write();
        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.insert(id, tx);
        state.memberships.insert(id, HashSet::new());
        self.telemetry.subscriber_connected();
        (id, rx)
    }

    /// Drop a client and every subscription it holds. Idempotent.
    pub fn release(&self, id: u64) {
        let mut state = self.state.write();
        if state.subscribers.remove(&id).is_none() {
            return;
        }
        if let Some(channels) = state.memberships.remove(&id) {
            for channel in channels {
                if let Some(members) = state.channels.get_mut(&channel) {
                    members.remove(&id);
                    if members.is_empty() {
                        state.channels.remove(&channel);
                    }
                }
            }
        }
        self.telemetry.subscriber_disconnected();
    }

    pub fn subscribe(&self, id: u64, channel: &str) -> bool {
        let mut state = self.state.write();
        if !state.subscribers.contains_key(&id) {
            return false;
        }
        state
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(id);
        if let Some(membership) = state.memberships.get_mut(&id) {
            membership.insert(channel.to_string());
        }
        true
    }

    pub fn unsubscribe(&self, id: u64, channel: &str) {
        let mut state = self.state.write();
        if let Some(members) = state.channels.get_mut(channel) {
            members.remove(&id);
            if members.is_empty() {
                state.channels.remove(channel);
            }
        }
        if let Some(membership) = state.memberships.get_mut(&id) {
            membership.remove(channel);
        }
    }

    /// Send one message straight to a client (acks, pings, errors).
    /// Returns false when the client is gone or too slow to keep.
    pub fn direct(&self, id: u64, message: WireMessage) -> bool {
        let overflowed = {
            let state = self.state.read();
            let Some(tx) = state.subscribers.get(&id) else {
                return false;
            };
            match tx.try_send(message) {
                Ok(()) => return true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        };
        if overflowed {
            warn!(subscriber = id, "outbound queue overflow; dropping client");
        }
        self.release(id);
        false
    }

    /// Fan an event out to every subscriber of its channels. Slow
    /// subscribers are dropped, never waited on.
    pub fn publish(&self, event: &PoolEvent) {
        let name = event.name();
        let data = event.data();
        let timestamp = event.timestamp();
        let mut dead = Vec::new();
        {
            let state = self.state.read();
            for channel in event.channels() {
                let Some(members) = state.channels.get(&channel) else {
                    continue;
                };
                for id in members {
                    let Some(tx) = state.subscribers.get(id) else {
                        continue;
                    };
                    let message = WireMessage::Event {
                        event: name.to_string(),
                        channel: channel.clone(),
                        data: data.clone(),
                        timestamp,
                    };
                    match tx.try_send(message) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => dead.push(*id),
                        Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
                    }
                }
            }
        }
        for id in dead {
            warn!(subscriber = id, event = name, "dropping slow subscriber");
            self.release(id);
        }
        debug!(event = name, "published");
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.read().subscribers.len()
    }
}
