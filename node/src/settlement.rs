//! Per-match settlement pipeline.
//!
//! Each match gets one actor task owning its state machine; proof results,
//! signature submissions and sink callbacks are serialized through its
//! mailbox, so the record never sees concurrent writers. Everything below
//! the actor is converted into a typed transition plus an event; errors
//! never propagate through the bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ark_bn254::Fr;
use async_trait::async_trait;
use darkpool_crypto::fr_to_be_bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{NodeError, NodeResult};
use crate::events::{
    EventBus, PoolEvent, ProofUpdate, SettlementUpdate, SignatureAdded, SignatureComplete,
};
use crate::order::{now_ms, Match};
use crate::telemetry::Telemetry;

const ACTOR_MAILBOX: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettlementStatus {
    Matched,
    Proving,
    AwaitingSignatures,
    PartiallySigned,
    SignaturesComplete,
    QueuedOnChain,
    Confirmed,
    Failed,
}

impl SettlementStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SettlementStatus::Confirmed | SettlementStatus::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
        }
    }
}

/// Output of the proof worker, in on-chain form.
#[derive(Clone, Debug)]
pub struct ProvedMatch {
    pub proof_bytes: Vec<u8>,
    pub public_signals_bytes: Vec<u8>,
    pub nullifier: Fr,
    pub proof_hash: String,
}

/// Signature slots after a submission; returned to the caller.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureAck {
    pub buyer_signed: bool,
    pub seller_signed: bool,
}

#[derive(Clone, Debug)]
pub struct SettlementRecord {
    pub match_id: String,
    pub status: SettlementStatus,
    pub buyer: String,
    pub seller: String,
    pub asset: String,
    pub nullifier: Option<Fr>,
    pub proof_bytes: Option<Vec<u8>>,
    pub public_signals_bytes: Option<Vec<u8>>,
    pub buyer_signed: bool,
    pub seller_signed: bool,
    pub buyer_signature: Option<String>,
    pub seller_signature: Option<String>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub updated_at: u64,
}

impl SettlementRecord {
    fn new(matched: &Match) -> Self {
        Self {
            match_id: matched.match_id.clone(),
            status: SettlementStatus::Matched,
            buyer: matched.buyer().to_string(),
            seller: matched.seller().to_string(),
            asset: matched.asset().to_string(),
            nullifier: None,
            proof_bytes: None,
            public_signals_bytes: None,
            buyer_signed: false,
            seller_signed: false,
            buyer_signature: None,
            seller_signature: None,
            tx_hash: None,
            error: None,
            updated_at: now_ms(),
        }
    }

    fn ack(&self) -> SignatureAck {
        SignatureAck {
            buyer_signed: self.buyer_signed,
            seller_signed: self.seller_signed,
        }
    }
}

/// Everything the external settlement sink needs to build and submit the
/// on-chain transaction.
#[derive(Clone, Debug)]
pub struct SettlementPacket {
    pub match_id: String,
    pub proof_bytes: Vec<u8>,
    pub public_signals_bytes: Vec<u8>,
    pub nullifier: [u8; 32],
    pub buyer_signature: String,
    pub seller_signature: String,
    pub buyer: String,
    pub seller: String,
    pub asset: String,
}

#[derive(Debug, Error)]
pub enum SinkError {
    /// Retried with exponential backoff.
    #[error("transient submission failure: {0}")]
    Transient(String),
    /// Terminal; the record fails immediately.
    #[error("{0}")]
    Terminal(String),
}

/// External on-chain submission boundary. Transaction assembly and
/// broadcasting live behind this seam.
#[async_trait]
pub trait SettlementSink: Send + Sync {
    async fn submit(&self, packet: SettlementPacket) -> Result<String, SinkError>;
}

/// Development sink: confirms instantly with a locally derived tx hash.
pub struct DryRunSink;

#[async_trait]
impl SettlementSink for DryRunSink {
    async fn submit(&self, packet: SettlementPacket) -> Result<String, SinkError> {
        let mut hasher = Sha256::new();
        hasher.update(packet.nullifier);
        hasher.update(&packet.proof_bytes);
        let tx_hash = hex::encode(hasher.finalize());
        debug!(match_id = %packet.match_id, %tx_hash, "dry-run settlement confirmed");
        Ok(tx_hash)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 2,
            max_attempts: 5,
        }
    }
}

pub enum SettlementMsg {
    ProofStarted,
    ProofReady(ProvedMatch),
    ProofFailed(String),
    Signature {
        role: Role,
        signature: String,
        reply: oneshot::Sender<NodeResult<SignatureAck>>,
    },
}

struct MatchEntry {
    record: Arc<RwLock<SettlementRecord>>,
    tx: mpsc::Sender<SettlementMsg>,
}

pub struct SettlementCoordinator {
    entries: RwLock<HashMap<String, MatchEntry>>,
    registration_order: RwLock<Vec<String>>,
    bus: Arc<EventBus>,
    sink: Arc<dyn SettlementSink>,
    telemetry: Telemetry,
    signature_timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl SettlementCoordinator {
    pub fn new(
        bus: Arc<EventBus>,
        sink: Arc<dyn SettlementSink>,
        telemetry: Telemetry,
        signature_timeout: Option<Duration>,
        retry: RetryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            registration_order: RwLock::new(Vec::new()),
            bus,
            sink,
            telemetry,
            signature_timeout,
            retry,
        })
    }

    /// Create the record and spawn the per-match actor.
    pub fn register(&self, matched: &Match) {
        let record = Arc::new(RwLock::new(SettlementRecord::new(matched)));
        let (tx, rx) = mpsc::channel(ACTOR_MAILBOX);
        let actor = MatchActor {
            matched: matched.clone(),
            record: record.clone(),
            bus: self.bus.clone(),
            sink: self.sink.clone(),
            telemetry: self.telemetry.clone(),
            signature_timeout: self.signature_timeout,
            retry: self.retry,
        };
        tokio::spawn(actor.run(rx));
        self.entries
            .write()
            .insert(matched.match_id.clone(), MatchEntry { record, tx });
        self.registration_order
            .write()
            .push(matched.match_id.clone());
    }

    async fn send(&self, match_id: &str, msg: SettlementMsg) {
        let tx = {
            let entries = self.entries.read();
            entries.get(match_id).map(|entry| entry.tx.clone())
        };
        match tx {
            Some(tx) => {
                if tx.send(msg).await.is_err() {
                    debug!(match_id, "settlement actor already terminal");
                }
            }
            None => warn!(match_id, "message for unregistered match dropped"),
        }
    }

    pub async fn proof_started(&self, match_id: &str) {
        self.send(match_id, SettlementMsg::ProofStarted).await;
    }

    pub async fn proof_ready(&self, match_id: &str, proved: ProvedMatch) {
        self.send(match_id, SettlementMsg::ProofReady(proved)).await;
    }

    pub async fn proof_failed(&self, match_id: &str, error: String) {
        self.send(match_id, SettlementMsg::ProofFailed(error)).await;
    }

    /// Signature rendezvous entry point. Idempotent per role; wrong match
    /// or a failed match is rejected.
    pub async fn submit_signature(
        &self,
        match_id: &str,
        role: Role,
        signature: String,
    ) -> NodeResult<SignatureAck> {
        let (tx, record) = {
            let entries = self.entries.read();
            let entry = entries
                .get(match_id)
                .ok_or_else(|| NodeError::UnknownMatch(match_id.to_string()))?;
            (entry.tx.clone(), entry.record.clone())
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        let msg = SettlementMsg::Signature {
            role,
            signature,
            reply: reply_tx,
        };
        if tx.send(msg).await.is_ok() {
            if let Ok(result) = reply_rx.await {
                return result;
            }
        }
        // Actor already finished (or raced past the mailbox while
        // submitting); answer from the record.
        let record = record.read();
        match record.status {
            SettlementStatus::SignaturesComplete
            | SettlementStatus::QueuedOnChain
            | SettlementStatus::Confirmed => Ok(record.ack()),
            SettlementStatus::Failed => Err(NodeError::InvalidInput(format!(
                "match {match_id} already failed: {}",
                record.error.as_deref().unwrap_or("unknown")
            ))),
            _ => Err(NodeError::Unavailable("settlement actor stopped")),
        }
    }

    pub fn record(&self, match_id: &str) -> Option<SettlementRecord> {
        let entries = self.entries.read();
        entries.get(match_id).map(|entry| entry.record.read().clone())
    }

    /// Records in registration order, optionally filtered to one trader.
    pub fn records(&self, trader: Option<&str>) -> Vec<SettlementRecord> {
        let entries = self.entries.read();
        self.registration_order
            .read()
            .iter()
            .filter_map(|match_id| entries.get(match_id))
            .map(|entry| entry.record.read().clone())
            .filter(|record| {
                trader
                    .map(|addr| record.buyer == addr || record.seller == addr)
                    .unwrap_or(true)
            })
            .collect()
    }
}

struct MatchActor {
    matched: Match,
    record: Arc<RwLock<SettlementRecord>>,
    bus: Arc<EventBus>,
    sink: Arc<dyn SettlementSink>,
    telemetry: Telemetry,
    signature_timeout: Option<Duration>,
    retry: RetryPolicy,
}

struct SignatureOutcome {
    result: NodeResult<SignatureAck>,
    completed: bool,
}

impl MatchActor {
    async fn run(self, mut rx: mpsc::Receiver<SettlementMsg>) {
        let mut proved: Option<ProvedMatch> = None;
        let mut deadline: Option<Instant> = None;
        loop {
            let msg = match deadline {
                Some(at) => tokio::select! {
                    msg = rx.recv() => match msg {
                        Some(msg) => msg,
                        None => return,
                    },
                    _ = tokio::time::sleep_until(at) => {
                        self.fail("signature-timeout".to_string());
                        return;
                    }
                },
                None => match rx.recv().await {
                    Some(msg) => msg,
                    None => return,
                },
            };
            match msg {
                SettlementMsg::ProofStarted => {
                    let started = {
                        let mut record = self.record.write();
                        if record.status == SettlementStatus::Matched {
                            record.status = SettlementStatus::Proving;
                            record.updated_at = now_ms();
                            true
                        } else {
                            false
                        }
                    };
                    if started {
                        self.publish_proof_event(SettlementStatus::Proving, None, None);
                    }
                }
                SettlementMsg::ProofFailed(error) => {
                    warn!(match_id = %self.matched.match_id, %error, "proof failed");
                    {
                        let mut record = self.record.write();
                        record.status = SettlementStatus::Failed;
                        record.error = Some(error.clone());
                        record.updated_at = now_ms();
                    }
                    self.publish_proof_event(SettlementStatus::Failed, None, Some(error));
                    self.telemetry.record_settlement(false);
                    return;
                }
                SettlementMsg::ProofReady(p) => {
                    {
                        let mut record = self.record.write();
                        record.status = SettlementStatus::AwaitingSignatures;
                        record.nullifier = Some(p.nullifier);
                        record.proof_bytes = Some(p.proof_bytes.clone());
                        record.public_signals_bytes = Some(p.public_signals_bytes.clone());
                        record.updated_at = now_ms();
                    }
                    self.publish_proof_event(
                        SettlementStatus::AwaitingSignatures,
                        Some(p.proof_hash.clone()),
                        None,
                    );
                    deadline = Some(self.signature_deadline());
                    proved = Some(p);
                }
                SettlementMsg::Signature {
                    role,
                    signature,
                    reply,
                } => {
                    let outcome = self.apply_signature(role, signature);
                    let _ = reply.send(outcome.result);
                    if outcome.completed {
                        deadline = None;
                        let Some(p) = proved.clone() else { return };
                        self.settle(p).await;
                        return;
                    }
                }
            }
        }
    }

    fn signature_deadline(&self) -> Instant {
        match self.signature_timeout {
            Some(timeout) => Instant::now() + timeout,
            None => {
                // Default deadline: the matched orders' own expiry.
                let expiry_ms = self
                    .matched
                    .buy_order
                    .expiry
                    .min(self.matched.sell_order.expiry);
                Instant::now() + Duration::from_millis(expiry_ms.saturating_sub(now_ms()))
            }
        }
    }

    fn apply_signature(&self, role: Role, signature: String) -> SignatureOutcome {
        let mut record = self.record.write();
        match record.status {
            SettlementStatus::Matched | SettlementStatus::Proving => {
                return SignatureOutcome {
                    result: Err(NodeError::InvalidInput(format!(
                        "match {} has no proof yet",
                        record.match_id
                    ))),
                    completed: false,
                };
            }
            SettlementStatus::SignaturesComplete
            | SettlementStatus::QueuedOnChain
            | SettlementStatus::Confirmed => {
                return SignatureOutcome {
                    result: Ok(record.ack()),
                    completed: false,
                };
            }
            SettlementStatus::Failed => {
                return SignatureOutcome {
                    result: Err(NodeError::InvalidInput(format!(
                        "match {} already failed",
                        record.match_id
                    ))),
                    completed: false,
                };
            }
            SettlementStatus::AwaitingSignatures | SettlementStatus::PartiallySigned => {}
        }

        let already_signed = match role {
            Role::Buyer => record.buyer_signed,
            Role::Seller => record.seller_signed,
        };
        if already_signed {
            // Same side submitting twice is a no-op.
            return SignatureOutcome {
                result: Ok(record.ack()),
                completed: false,
            };
        }
        match role {
            Role::Buyer => {
                record.buyer_signed = true;
                record.buyer_signature = Some(signature);
            }
            Role::Seller => {
                record.seller_signed = true;
                record.seller_signature = Some(signature);
            }
        }
        let completed = record.buyer_signed && record.seller_signed;
        record.status = if completed {
            SettlementStatus::SignaturesComplete
        } else {
            SettlementStatus::PartiallySigned
        };
        record.updated_at = now_ms();
        let ack = record.ack();
        drop(record);

        let signer = match role {
            Role::Buyer => self.matched.buyer().to_string(),
            Role::Seller => self.matched.seller().to_string(),
        };
        self.bus.publish(&PoolEvent::SignatureAdded(SignatureAdded {
            match_id: self.matched.match_id.clone(),
            signer,
            role: role.as_str().to_string(),
            buyer_signed: ack.buyer_signed,
            seller_signed: ack.seller_signed,
            timestamp: now_ms(),
        }));
        if completed {
            self.bus
                .publish(&PoolEvent::SignatureComplete(SignatureComplete {
                    match_id: self.matched.match_id.clone(),
                    buyer_address: self.matched.buyer().to_string(),
                    seller_address: self.matched.seller().to_string(),
                    timestamp: now_ms(),
                }));
        }
        SignatureOutcome {
            result: Ok(ack),
            completed,
        }
    }

    async fn settle(&self, proved: ProvedMatch) {
        let packet = {
            let record = self.record.read();
            SettlementPacket {
                match_id: record.match_id.clone(),
                proof_bytes: proved.proof_bytes.clone(),
                public_signals_bytes: proved.public_signals_bytes.clone(),
                nullifier: fr_to_be_bytes(proved.nullifier),
                buyer_signature: record.buyer_signature.clone().unwrap_or_default(),
                seller_signature: record.seller_signature.clone().unwrap_or_default(),
                buyer: record.buyer.clone(),
                seller: record.seller.clone(),
                asset: record.asset.clone(),
            }
        };
        self.publish_settlement_event(PoolEventKind::TxBuilt, None, None);
        {
            let mut record = self.record.write();
            record.status = SettlementStatus::QueuedOnChain;
            record.updated_at = now_ms();
        }
        self.publish_settlement_event(PoolEventKind::Queued, None, None);

        match self.submit_with_retry(packet).await {
            Ok(tx_hash) => {
                {
                    let mut record = self.record.write();
                    record.status = SettlementStatus::Confirmed;
                    record.tx_hash = Some(tx_hash.clone());
                    record.updated_at = now_ms();
                }
                info!(match_id = %self.matched.match_id, %tx_hash, "settlement confirmed");
                self.publish_settlement_event(PoolEventKind::Confirmed, Some(tx_hash), None);
                self.telemetry.record_settlement(true);
            }
            Err(error) => self.fail(error),
        }
    }

    /// Exponential backoff on transient sink errors only.
    async fn submit_with_retry(&self, packet: SettlementPacket) -> Result<String, String> {
        let mut delay = self.retry.initial;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.sink.submit(packet.clone()).await {
                Ok(tx_hash) => return Ok(tx_hash),
                Err(SinkError::Terminal(error)) => return Err(error),
                Err(SinkError::Transient(error)) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(error);
                    }
                    warn!(
                        match_id = %self.matched.match_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient submission failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= self.retry.factor;
                }
            }
        }
    }

    fn fail(&self, error: String) {
        {
            let mut record = self.record.write();
            record.status = SettlementStatus::Failed;
            record.error = Some(error.clone());
            record.updated_at = now_ms();
        }
        warn!(match_id = %self.matched.match_id, %error, "settlement failed");
        self.publish_settlement_event(PoolEventKind::SettlementFailed, None, Some(error));
        self.telemetry.record_settlement(false);
    }

    fn publish_proof_event(
        &self,
        status: SettlementStatus,
        proof_hash: Option<String>,
        error: Option<String>,
    ) {
        let payload = ProofUpdate {
            match_id: self.matched.match_id.clone(),
            buyer_address: self.matched.buyer().to_string(),
            seller_address: self.matched.seller().to_string(),
            proof_hash,
            error,
            timestamp: now_ms(),
        };
        let event = match status {
            SettlementStatus::Proving => PoolEvent::ProofGenerating(payload),
            SettlementStatus::AwaitingSignatures => PoolEvent::ProofGenerated(payload),
            _ => PoolEvent::ProofFailed(payload),
        };
        self.bus.publish(&event);
    }

    fn publish_settlement_event(
        &self,
        kind: PoolEventKind,
        tx_hash: Option<String>,
        error: Option<String>,
    ) {
        let payload = SettlementUpdate {
            match_id: self.matched.match_id.clone(),
            buyer_address: self.matched.buyer().to_string(),
            seller_address: self.matched.seller().to_string(),
            tx_hash,
            error,
            timestamp: now_ms(),
        };
        let event = match kind {
            PoolEventKind::TxBuilt => PoolEvent::SettlementTxBuilt(payload),
            PoolEventKind::Queued => PoolEvent::SettlementQueued(payload),
            PoolEventKind::Confirmed => PoolEvent::SettlementConfirmed(payload),
            PoolEventKind::SettlementFailed => PoolEvent::SettlementFailed(payload),
        };
        self.bus.publish(&event);
    }
}

enum PoolEventKind {
    TxBuilt,
    Queued,
    Confirmed,
    SettlementFailed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{PrivateOrder, Side, ADDRESS_LEN};

    fn order(side: Side, trader_tag: char) -> PrivateOrder {
        PrivateOrder {
            commitment: Fr::from(5u64),
            trader: trader_tag.to_string().repeat(ADDRESS_LEN),
            asset_address: "C".repeat(ADDRESS_LEN),
            symbol: "GOLD".into(),
            side,
            quantity: 100,
            price: 50,
            secret: Fr::from(7u64),
            nonce: Fr::from(9u64),
            timestamp: 1,
            expiry: now_ms() + 60_000,
            whitelist_index: 0,
        }
    }

    fn matched() -> Match {
        Match::pair(order(Side::Buy, 'B'), order(Side::Sell, 'S'))
    }

    fn proved() -> ProvedMatch {
        ProvedMatch {
            proof_bytes: vec![1u8; 256],
            public_signals_bytes: vec![0, 0, 0, 1],
            nullifier: Fr::from(42u64),
            proof_hash: "cafe".into(),
        }
    }

    fn coordinator(
        sink: Arc<dyn SettlementSink>,
        signature_timeout: Option<Duration>,
    ) -> Arc<SettlementCoordinator> {
        let bus = Arc::new(EventBus::new(16, Telemetry::new()));
        SettlementCoordinator::new(
            bus,
            sink,
            Telemetry::new(),
            signature_timeout,
            RetryPolicy {
                initial: Duration::from_millis(5),
                factor: 2,
                max_attempts: 3,
            },
        )
    }

    async fn wait_for_status(
        coordinator: &SettlementCoordinator,
        match_id: &str,
        status: SettlementStatus,
    ) {
        for _ in 0..200 {
            if coordinator.record(match_id).map(|r| r.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "match {match_id} never reached {status:?}, last = {:?}",
            coordinator.record(match_id).map(|r| r.status)
        );
    }

    #[tokio::test]
    async fn rendezvous_reaches_confirmed() {
        let coordinator = coordinator(Arc::new(DryRunSink), None);
        let m = matched();
        coordinator.register(&m);
        coordinator.proof_started(&m.match_id).await;
        coordinator.proof_ready(&m.match_id, proved()).await;
        wait_for_status(&coordinator, &m.match_id, SettlementStatus::AwaitingSignatures).await;

        let ack = coordinator
            .submit_signature(&m.match_id, Role::Buyer, "sig-b".into())
            .await
            .unwrap();
        assert!(ack.buyer_signed);
        assert!(!ack.seller_signed);

        // Same side again is a no-op.
        let ack = coordinator
            .submit_signature(&m.match_id, Role::Buyer, "sig-b2".into())
            .await
            .unwrap();
        assert!(!ack.seller_signed);

        let ack = coordinator
            .submit_signature(&m.match_id, Role::Seller, "sig-s".into())
            .await
            .unwrap();
        assert!(ack.buyer_signed && ack.seller_signed);

        wait_for_status(&coordinator, &m.match_id, SettlementStatus::Confirmed).await;
        let record = coordinator.record(&m.match_id).unwrap();
        assert!(record.tx_hash.is_some());
        assert!(record.buyer_signature.as_deref() == Some("sig-b"));
    }

    #[tokio::test]
    async fn proof_failure_is_terminal() {
        let coordinator = coordinator(Arc::new(DryRunSink), None);
        let m = matched();
        coordinator.register(&m);
        coordinator
            .proof_failed(&m.match_id, "commitment mismatch".into())
            .await;
        wait_for_status(&coordinator, &m.match_id, SettlementStatus::Failed).await;

        let err = coordinator
            .submit_signature(&m.match_id, Role::Buyer, "late".into())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn signature_before_proof_is_rejected() {
        let coordinator = coordinator(Arc::new(DryRunSink), None);
        let m = matched();
        coordinator.register(&m);
        let err = coordinator
            .submit_signature(&m.match_id, Role::Buyer, "early".into())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unknown_match_is_rejected() {
        let coordinator = coordinator(Arc::new(DryRunSink), None);
        let err = coordinator
            .submit_signature("missing", Role::Buyer, "sig".into())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::UnknownMatch(_)));
    }

    #[tokio::test]
    async fn signature_timeout_fails_the_match() {
        let coordinator = coordinator(Arc::new(DryRunSink), Some(Duration::from_millis(20)));
        let m = matched();
        coordinator.register(&m);
        coordinator.proof_ready(&m.match_id, proved()).await;
        wait_for_status(&coordinator, &m.match_id, SettlementStatus::Failed).await;
        let record = coordinator.record(&m.match_id).unwrap();
        assert_eq!(record.error.as_deref(), Some("signature-timeout"));
    }

    struct FlakySink {
        failures: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl SettlementSink for FlakySink {
        async fn submit(&self, packet: SettlementPacket) -> Result<String, SinkError> {
            use std::sync::atomic::Ordering;
            if self.failures.fetch_sub(1, Ordering::SeqCst) > 1 {
                Err(SinkError::Transient("mempool congestion".into()))
            } else {
                DryRunSink.submit(packet).await
            }
        }
    }

    #[tokio::test]
    async fn transient_sink_errors_are_retried() {
        let sink = Arc::new(FlakySink {
            failures: std::sync::atomic::AtomicU32::new(3),
        });
        let coordinator = coordinator(sink, None);
        let m = matched();
        coordinator.register(&m);
        coordinator.proof_ready(&m.match_id, proved()).await;
        wait_for_status(&coordinator, &m.match_id, SettlementStatus::AwaitingSignatures).await;
        coordinator
            .submit_signature(&m.match_id, Role::Buyer, "b".into())
            .await
            .unwrap();
        coordinator
            .submit_signature(&m.match_id, Role::Seller, "s".into())
            .await
            .unwrap();
        wait_for_status(&coordinator, &m.match_id, SettlementStatus::Confirmed).await;
    }

    struct BrickedSink;

    #[async_trait]
    impl SettlementSink for BrickedSink {
        async fn submit(&self, _packet: SettlementPacket) -> Result<String, SinkError> {
            Err(SinkError::Terminal("nullifier already spent".into()))
        }
    }

    #[tokio::test]
    async fn terminal_sink_errors_fail_without_retry() {
        let coordinator = coordinator(Arc::new(BrickedSink), None);
        let m = matched();
        coordinator.register(&m);
        coordinator.proof_ready(&m.match_id, proved()).await;
        wait_for_status(&coordinator, &m.match_id, SettlementStatus::AwaitingSignatures).await;
        coordinator
            .submit_signature(&m.match_id, Role::Buyer, "b".into())
            .await
            .unwrap();
        coordinator
            .submit_signature(&m.match_id, Role::Seller, "s".into())
            .await
            .unwrap();
        wait_for_status(&coordinator, &m.match_id, SettlementStatus::Failed).await;
        let record = coordinator.record(&m.match_id).unwrap();
        assert_eq!(record.error.as_deref(), Some("nullifier already spent"));
    }
}
