//! Service wiring and the validated command surface.
//!
//! `NodeService` owns the channel ends; the HTTP layer and the tests talk
//! to the pipeline exclusively through it. Input validation happens here;
//! the ingest path below only ever recovers "no match".

use std::sync::Arc;

use ark_bn254::Fr;
use darkpool_crypto::{
    fr_to_decimal, generate_order_commitment, hash_asset, order_commitment, OrderCommitment,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::book::BookSnapshot;
use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::events::EventBus;
use crate::ingest::{IngestActor, IngestCommand, SubmitOutcome};
use crate::order::{
    now_ms, Match, PrivateOrder, Side, ADDRESS_LEN, ADDRESS_PREFIX, MAX_SYMBOL_LEN,
};
use crate::proof::{spawn_proof_workers, ProofBackend};
use crate::registry::WhitelistRegistry;
use crate::settlement::{
    Role, SettlementCoordinator, SettlementRecord, SettlementSink, SignatureAck,
};
use crate::telemetry::{Telemetry, TelemetrySnapshot};

/// A submit request after wire decoding, before validation.
#[derive(Clone, Debug)]
pub struct SubmitOrderCommand {
    pub symbol: String,
    pub trader: String,
    pub asset_address: String,
    pub side: Side,
    pub quantity: u64,
    pub price: u64,
    pub commitment: Fr,
    pub secret: Fr,
    pub nonce: Fr,
    pub expiry: u64,
    pub whitelist_index: usize,
}

pub struct NodeHandle {
    pub service: Arc<NodeService>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub async fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

pub struct NodeService {
    config: NodeConfig,
    ingest_tx: mpsc::Sender<IngestCommand>,
    coordinator: Arc<SettlementCoordinator>,
    registry: Arc<WhitelistRegistry>,
    bus: Arc<EventBus>,
    telemetry: Telemetry,
}

impl NodeService {
    pub fn start(
        config: NodeConfig,
        backend: Arc<dyn ProofBackend>,
        sink: Arc<dyn SettlementSink>,
    ) -> NodeResult<NodeHandle> {
        let telemetry = Telemetry::new();
        let registry = Arc::new(WhitelistRegistry::build(&config.participants)?);
        let bus = Arc::new(EventBus::new(
            config.subscriber_queue_depth,
            telemetry.clone(),
        ));
        let coordinator = SettlementCoordinator::new(
            bus.clone(),
            sink,
            telemetry.clone(),
            config.signature_timeout(),
            config.retry_policy(),
        );

        let (match_tx, match_rx) = mpsc::channel(config.match_queue_depth);
        let match_rx = Arc::new(tokio::sync::Mutex::new(match_rx));
        let (ingest_tx, ingest_task) = IngestActor::spawn(
            config.ingest_queue_depth,
            match_tx,
            coordinator.clone(),
            bus.clone(),
            telemetry.clone(),
        );

        let mut tasks = vec![ingest_task];
        tasks.extend(spawn_proof_workers(
            config.proof_workers,
            match_rx,
            backend,
            registry.clone(),
            coordinator.clone(),
            telemetry.clone(),
        ));

        let sweep_tx = ingest_tx.clone();
        let sweep_interval = config.expiry_sweep_interval();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if sweep_tx.send(IngestCommand::SweepExpired).await.is_err() {
                    return;
                }
            }
        }));

        info!(
            workers = config.proof_workers,
            participants = config.participants.len(),
            "dark-pool core started"
        );
        let service = Arc::new(NodeService {
            config,
            ingest_tx,
            coordinator,
            registry,
            bus,
            telemetry,
        });
        Ok(NodeHandle { service, tasks })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Validate and hand the order to the ingest actor.
    pub async fn submit_order(&self, command: SubmitOrderCommand) -> NodeResult<SubmitOutcome> {
        let order = match self.validate(command) {
            Ok(order) => order,
            Err(err) => {
                self.telemetry.record_order(false);
                return Err(err);
            }
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        self.ingest_tx
            .send(IngestCommand::Submit {
                order,
                reply: reply_tx,
            })
            .await
            .map_err(|_| NodeError::Unavailable("ingest actor stopped"))?;
        reply_rx
            .await
            .map_err(|_| NodeError::Unavailable("ingest actor stopped"))
    }

    /// Commitment service surface: draw secret/nonce and commit.
    pub fn prepare_order(
        &self,
        asset_address: &str,
        side: Side,
        quantity: u64,
        price: u64,
    ) -> NodeResult<OrderCommitment> {
        validate_address("asset address", asset_address)?;
        if quantity == 0 || price == 0 {
            return Err(NodeError::InvalidInput(
                "quantity and price must be positive".into(),
            ));
        }
        let asset_hash = hash_asset(asset_address)?;
        Ok(generate_order_commitment(
            asset_hash,
            side.as_field(),
            quantity,
            price,
        )?)
    }

    pub async fn order_book(&self, asset: &str) -> NodeResult<BookSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.ingest_tx
            .send(IngestCommand::Snapshot {
                asset: asset.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| NodeError::Unavailable("ingest actor stopped"))?;
        reply_rx
            .await
            .map_err(|_| NodeError::Unavailable("ingest actor stopped"))
    }

    pub async fn matches(&self) -> NodeResult<Vec<Match>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.ingest_tx
            .send(IngestCommand::CompletedMatches { reply: reply_tx })
            .await
            .map_err(|_| NodeError::Unavailable("ingest actor stopped"))?;
        reply_rx
            .await
            .map_err(|_| NodeError::Unavailable("ingest actor stopped"))
    }

    /// Drain matches parked behind a full proof queue.
    pub async fn process_pending_matches(&self) -> NodeResult<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.ingest_tx
            .send(IngestCommand::ProcessPending { reply: reply_tx })
            .await
            .map_err(|_| NodeError::Unavailable("ingest actor stopped"))?;
        reply_rx
            .await
            .map_err(|_| NodeError::Unavailable("ingest actor stopped"))
    }

    pub fn settlements(&self, trader: Option<&str>) -> Vec<SettlementRecord> {
        self.coordinator.records(trader)
    }

    pub fn settlement(&self, match_id: &str) -> Option<SettlementRecord> {
        self.coordinator.record(match_id)
    }

    pub async fn submit_signature(
        &self,
        match_id: &str,
        role: Role,
        signature: String,
    ) -> NodeResult<SignatureAck> {
        if signature.trim().is_empty() {
            return Err(NodeError::InvalidInput("signature must not be empty".into()));
        }
        self.coordinator
            .submit_signature(match_id, role, signature)
            .await
    }

    /// Atomic whitelist rebuild; returns the new root as a decimal string.
    pub fn rebuild_whitelist(&self, participants: &[String]) -> NodeResult<String> {
        let root = self.registry.rebuild(participants)?;
        Ok(fr_to_decimal(root))
    }

    fn validate(&self, command: SubmitOrderCommand) -> NodeResult<PrivateOrder> {
        let symbol = command.symbol.trim().to_uppercase();
        if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LEN {
            return Err(NodeError::InvalidInput(format!(
                "symbol must be 1..={MAX_SYMBOL_LEN} characters"
            )));
        }
        validate_address("trader address", &command.trader)?;
        validate_address("asset address", &command.asset_address)?;
        if command.quantity == 0 {
            return Err(NodeError::InvalidInput("quantity must be positive".into()));
        }
        if command.price == 0 {
            return Err(NodeError::InvalidInput("price must be positive".into()));
        }
        if command.expiry <= now_ms() {
            return Err(NodeError::InvalidInput(
                "expiry must be in the future".into(),
            ));
        }
        let whitelist_len = self.registry.snapshot().len();
        if command.whitelist_index >= whitelist_len {
            return Err(NodeError::InvalidInput(format!(
                "whitelist index {} out of range ({} participants)",
                command.whitelist_index, whitelist_len
            )));
        }
        // The commitment must be reproducible from the submitted material.
        let asset_hash = hash_asset(&command.asset_address)?;
        let expected = order_commitment(
            asset_hash,
            command.side.as_field(),
            command.quantity,
            command.price,
            command.nonce,
            command.secret,
        )?;
        if expected != command.commitment {
            return Err(NodeError::InvalidInput(
                "commitment does not reproduce from order parameters".into(),
            ));
        }
        Ok(PrivateOrder {
            commitment: command.commitment,
            trader: command.trader,
            asset_address: command.asset_address,
            symbol,
            side: command.side,
            quantity: command.quantity,
            price: command.price,
            secret: command.secret,
            nonce: command.nonce,
            timestamp: 0,
            expiry: command.expiry,
            whitelist_index: command.whitelist_index,
        })
    }
}

fn validate_address(what: &str, address: &str) -> NodeResult<()> {
    if address.len() != ADDRESS_LEN || !address.starts_with(ADDRESS_PREFIX) {
        return Err(NodeError::InvalidInput(format!(
            "{what} must be {ADDRESS_LEN} characters beginning with '{ADDRESS_PREFIX}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::DeterministicBackend;
    use crate::settlement::DryRunSink;

    fn participant(index: usize) -> String {
        format!("C{index:055}")
    }

    fn test_config(participants: usize) -> NodeConfig {
        NodeConfig {
            participants: (0..participants).map(participant).collect(),
            proof_workers: 2,
            ..NodeConfig::default()
        }
    }

    async fn start() -> NodeHandle {
        NodeService::start(
            test_config(4),
            Arc::new(DeterministicBackend),
            Arc::new(DryRunSink),
        )
        .unwrap()
    }

    fn command(side: Side, quantity: u64, price: u64, index: usize) -> SubmitOrderCommand {
        let asset_address = "C".repeat(ADDRESS_LEN);
        let asset_hash = hash_asset(&asset_address).unwrap();
        let material =
            generate_order_commitment(asset_hash, side.as_field(), quantity, price).unwrap();
        SubmitOrderCommand {
            symbol: "gold".into(),
            trader: participant(index),
            asset_address,
            side,
            quantity,
            price,
            commitment: material.commitment,
            secret: material.secret,
            nonce: material.nonce,
            expiry: now_ms() + 60_000,
            whitelist_index: index,
        }
    }

    #[tokio::test]
    async fn submit_match_and_query_round_trip() {
        let handle = start().await;
        let service = handle.service.clone();

        let outcome = service
            .submit_order(command(Side::Buy, 100, 50, 0))
            .await
            .unwrap();
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.book.buys.len(), 1);

        let outcome = service
            .submit_order(command(Side::Sell, 100, 50, 1))
            .await
            .unwrap();
        assert_eq!(outcome.matches.len(), 1);
        assert!(outcome.book.buys.is_empty());
        assert!(outcome.book.sells.is_empty());

        let matches = service.matches().await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].execution_price, 50);

        let settlements = service.settlements(None);
        assert_eq!(settlements.len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_inputs_are_rejected_at_the_boundary() {
        let handle = start().await;
        let service = handle.service.clone();

        let mut bad_symbol = command(Side::Buy, 100, 50, 0);
        bad_symbol.symbol = "WAYTOOLONGSYMBOL".into();
        assert!(service.submit_order(bad_symbol).await.is_err());

        let mut bad_trader = command(Side::Buy, 100, 50, 0);
        bad_trader.trader = "X".repeat(ADDRESS_LEN);
        assert!(service.submit_order(bad_trader).await.is_err());

        let mut bad_quantity = command(Side::Buy, 100, 50, 0);
        bad_quantity.quantity = 0;
        assert!(service.submit_order(bad_quantity).await.is_err());

        let mut expired = command(Side::Buy, 100, 50, 0);
        expired.expiry = 1;
        assert!(service.submit_order(expired).await.is_err());

        let mut bad_index = command(Side::Buy, 100, 50, 0);
        bad_index.whitelist_index = 99;
        assert!(service.submit_order(bad_index).await.is_err());

        let mut forged = command(Side::Buy, 100, 50, 0);
        forged.price = 51;
        let err = service.submit_order(forged).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidInput(ref msg) if msg.contains("commitment")));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn no_match_reason_surfaces_quantity_mismatch() {
        let handle = start().await;
        let service = handle.service.clone();
        service
            .submit_order(command(Side::Buy, 100, 50, 0))
            .await
            .unwrap();
        let outcome = service
            .submit_order(command(Side::Sell, 90, 50, 1))
            .await
            .unwrap();
        assert!(outcome.matches.is_empty());
        assert!(outcome.no_match_reason.is_some());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn prepare_order_round_trips_through_submit() {
        let handle = start().await;
        let service = handle.service.clone();
        let asset_address = "C".repeat(ADDRESS_LEN);
        let material = service
            .prepare_order(&asset_address, Side::Buy, 100, 50)
            .unwrap();
        let cmd = SubmitOrderCommand {
            symbol: "GOLD".into(),
            trader: participant(0),
            asset_address,
            side: Side::Buy,
            quantity: 100,
            price: 50,
            commitment: material.commitment,
            secret: material.secret,
            nonce: material.nonce,
            expiry: now_ms() + 60_000,
            whitelist_index: 0,
        };
        assert!(service.submit_order(cmd).await.is_ok());
        handle.shutdown().await;
    }
}
