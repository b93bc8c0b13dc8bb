//! Proof worker pool.
//!
//! Workers drain the match queue concurrently; each borrows the current
//! whitelist snapshot, assembles the circuit witness for both traders and
//! proves under `spawn_blocking`. Results flow to the per-match settlement
//! actor, which owns all event emission so per-match ordering holds.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use whitelist_tree::WhitelistTree;

use darkpool_crypto::hash_asset;
use settlement_circuit::{CircuitArtifacts, SettlementProver, SettlementWitness};

use crate::error::NodeResult;
use crate::order::Match;
use crate::registry::WhitelistRegistry;
use crate::settlement::{ProvedMatch, SettlementCoordinator};
use crate::telemetry::Telemetry;

/// One unit of proving work: the match plus the whitelist snapshot it is
/// proven against.
pub struct ProofJob {
    pub matched: Match,
    pub snapshot: Arc<WhitelistTree>,
}

/// Seam over the Groth16 prover; called inside `spawn_blocking`. Failures
/// carry the trader-facing message verbatim.
pub trait ProofBackend: Send + Sync {
    fn prove(&self, job: &ProofJob) -> Result<ProvedMatch, String>;
}

/// Assemble the witness the circuit expects, with the documented
/// consistency warnings: the matcher guarantees these equalities under the
/// exact-quantity policy, and when prices crossed unequally the circuit
/// will reject the witness because commitments bind the original prices.
pub fn build_witness(job: &ProofJob) -> Result<SettlementWitness, String> {
    let matched = &job.matched;
    let buy = &matched.buy_order;
    let sell = &matched.sell_order;
    if matched.execution_price != buy.price || matched.execution_price != sell.price {
        warn!(
            match_id = %matched.match_id,
            execution_price = matched.execution_price,
            buy_price = buy.price,
            sell_price = sell.price,
            "execution price diverges from committed prices"
        );
    }
    if matched.execution_quantity != buy.quantity || matched.execution_quantity != sell.quantity {
        warn!(
            match_id = %matched.match_id,
            "execution quantity diverges from committed quantities"
        );
    }

    let asset_hash = hash_asset(&buy.asset_address).map_err(|err| err.to_string())?;
    let snapshot = &job.snapshot;
    let buyer_proof = snapshot
        .proof(buy.whitelist_index)
        .map_err(|err| err.to_string())?;
    let seller_proof = snapshot
        .proof(sell.whitelist_index)
        .map_err(|err| err.to_string())?;
    Ok(SettlementWitness {
        buyer_id_hash: snapshot
            .id_hash(buy.whitelist_index)
            .map_err(|err| err.to_string())?,
        seller_id_hash: snapshot
            .id_hash(sell.whitelist_index)
            .map_err(|err| err.to_string())?,
        buyer_merkle_proof: buyer_proof.siblings,
        buyer_merkle_indices: buyer_proof.indices,
        seller_merkle_proof: seller_proof.siblings,
        seller_merkle_indices: seller_proof.indices,
        buy_secret: buy.secret,
        buy_nonce: buy.nonce,
        sell_secret: sell.secret,
        sell_nonce: sell.nonce,
        buy_commitment: buy.commitment,
        sell_commitment: sell.commitment,
        asset_hash,
        matched_quantity: matched.execution_quantity,
        execution_price: matched.execution_price,
        whitelist_root: snapshot.root(),
    })
}

fn proof_hash(proof_bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(proof_bytes))
}

/// Production backend: WASM witness generation + Groth16 over the loaded
/// zkey. Provers are pooled because each owns a wasmer instance.
pub struct GrothBackend {
    artifacts: Arc<CircuitArtifacts>,
    provers: Mutex<Vec<SettlementProver>>,
}

impl GrothBackend {
    pub fn load(wasm: impl AsRef<Path>, zkey: impl AsRef<Path>) -> NodeResult<Self> {
        let artifacts = CircuitArtifacts::load(wasm, zkey)?;
        Ok(Self {
            artifacts,
            provers: Mutex::new(Vec::new()),
        })
    }
}

impl ProofBackend for GrothBackend {
    fn prove(&self, job: &ProofJob) -> Result<ProvedMatch, String> {
        let witness = build_witness(job)?;
        let mut prover = match self.provers.lock().pop() {
            Some(prover) => prover,
            None => SettlementProver::new(self.artifacts.clone()).map_err(|err| err.to_string())?,
        };
        let result = prover.prove(&witness);
        self.provers.lock().push(prover);
        let proof = result.map_err(|err| err.to_string())?;
        Ok(ProvedMatch {
            proof_hash: proof_hash(&proof.proof_bytes),
            proof_bytes: proof.proof_bytes.to_vec(),
            public_signals_bytes: proof.public_signals_bytes,
            nullifier: proof.nullifier,
        })
    }
}

/// Deterministic backend for pipeline tests without circuit artifacts:
/// real nullifier derivation and signal encoding, synthetic proof bytes.
#[cfg(any(test, feature = "test-utils"))]
pub struct DeterministicBackend;

#[cfg(any(test, feature = "test-utils"))]
impl ProofBackend for DeterministicBackend {
    fn prove(&self, job: &ProofJob) -> Result<ProvedMatch, String> {
        use ark_bn254::Fr;

        let witness = build_witness(job)?;
        let matched = &job.matched;
        let nullifier = darkpool_crypto::compute_nullifier(
            matched.buy_order.commitment,
            matched.sell_order.commitment,
            matched.execution_quantity,
            matched.buy_order.secret,
            matched.sell_order.secret,
        )
        .map_err(|err| err.to_string())?;
        let signals = [
            witness.buy_commitment,
            witness.sell_commitment,
            witness.asset_hash,
            Fr::from(witness.matched_quantity),
            Fr::from(witness.execution_price),
            witness.whitelist_root,
            nullifier,
        ];
        let mut proof_bytes = vec![0u8; settlement_circuit::PROOF_BYTES_LEN];
        let seed = Sha256::digest(darkpool_crypto::fr_to_be_bytes(nullifier));
        for (chunk, byte) in proof_bytes.chunks_mut(32).zip(seed.iter().cycle()) {
            chunk.fill(*byte);
        }
        Ok(ProvedMatch {
            proof_hash: proof_hash(&proof_bytes),
            public_signals_bytes: settlement_circuit::encode_public_signals(&signals),
            proof_bytes,
            nullifier,
        })
    }
}

/// Spawn the pool. Workers never touch book state; they stop when the
/// queue closes.
pub fn spawn_proof_workers(
    workers: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Match>>>,
    backend: Arc<dyn ProofBackend>,
    registry: Arc<WhitelistRegistry>,
    coordinator: Arc<SettlementCoordinator>,
    telemetry: Telemetry,
) -> Vec<JoinHandle<()>> {
    (0..workers.max(1))
        .map(|worker| {
            let queue = queue.clone();
            let backend = backend.clone();
            let registry = registry.clone();
            let coordinator = coordinator.clone();
            let telemetry = telemetry.clone();
            tokio::spawn(async move {
                run_worker(worker, queue, backend, registry, coordinator, telemetry).await;
            })
        })
        .collect()
}

async fn run_worker(
    worker: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Match>>>,
    backend: Arc<dyn ProofBackend>,
    registry: Arc<WhitelistRegistry>,
    coordinator: Arc<SettlementCoordinator>,
    telemetry: Telemetry,
) {
    loop {
        let matched = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(matched) = matched else {
            debug!(worker, "proof queue closed; worker exiting");
            return;
        };
        let match_id = matched.match_id.clone();
        debug!(worker, %match_id, "proving match");
        coordinator.proof_started(&match_id).await;
        let job = ProofJob {
            matched,
            snapshot: registry.snapshot(),
        };
        let backend = backend.clone();
        let outcome = match tokio::task::spawn_blocking(move || backend.prove(&job)).await {
            Ok(result) => result,
            Err(join_err) => Err(format!("proof task aborted: {join_err}")),
        };
        match outcome {
            Ok(proved) => {
                telemetry.record_proof(true);
                coordinator.proof_ready(&match_id, proved).await;
            }
            Err(error) => {
                telemetry.record_proof(false);
                warn!(worker, %match_id, %error, "proof generation failed");
                coordinator.proof_failed(&match_id, error).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{now_ms, PrivateOrder, Side, ADDRESS_LEN};
    use ark_bn254::Fr;

    fn participant(index: usize) -> String {
        format!("C{index:055}")
    }

    fn order(side: Side, whitelist_index: usize) -> PrivateOrder {
        PrivateOrder {
            commitment: Fr::from(whitelist_index as u64 + 100),
            trader: participant(whitelist_index),
            asset_address: "C".repeat(ADDRESS_LEN),
            symbol: "GOLD".into(),
            side,
            quantity: 100,
            price: 50,
            secret: Fr::from(whitelist_index as u64 + 1),
            nonce: Fr::from(whitelist_index as u64 + 2),
            timestamp: 1,
            expiry: now_ms() + 60_000,
            whitelist_index,
        }
    }

    fn job(buy_index: usize, sell_index: usize, participants: usize) -> ProofJob {
        let addresses: Vec<String> = (0..participants).map(participant).collect();
        let registry = WhitelistRegistry::build(&addresses).unwrap();
        ProofJob {
            matched: Match::pair(order(Side::Buy, buy_index), order(Side::Sell, sell_index)),
            snapshot: registry.snapshot(),
        }
    }

    #[test]
    fn witness_carries_both_merkle_paths() {
        let job = job(0, 1, 3);
        let witness = build_witness(&job).unwrap();
        assert_eq!(witness.buyer_merkle_proof.len(), whitelist_tree::TREE_DEPTH);
        assert_eq!(witness.seller_merkle_proof.len(), whitelist_tree::TREE_DEPTH);
        assert_eq!(witness.matched_quantity, 100);
        assert_eq!(witness.execution_price, 50);
        assert_eq!(witness.whitelist_root, job.snapshot.root());
    }

    #[test]
    fn unregistered_trader_fails_witness_assembly() {
        let job = job(0, 5, 3);
        let err = build_witness(&job).unwrap_err();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn deterministic_backend_derives_the_pair_nullifier() {
        let job_a = job(0, 1, 3);
        let first = DeterministicBackend.prove(&job_a).unwrap();
        let second = DeterministicBackend.prove(&job_a).unwrap();
        assert_eq!(first.nullifier, second.nullifier);
        assert_eq!(first.proof_bytes.len(), settlement_circuit::PROOF_BYTES_LEN);
        // Last signal in the encoding is the nullifier.
        let bytes = &first.public_signals_bytes;
        let tail = &bytes[bytes.len() - 32..];
        assert_eq!(tail, darkpool_crypto::fr_to_be_bytes(first.nullifier));
    }
}
