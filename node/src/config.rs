use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::settlement::RetryPolicy;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    pub api_addr: SocketAddr,
    pub circuit_wasm: PathBuf,
    pub circuit_zkey: PathBuf,
    pub proof_workers: usize,
    pub ingest_queue_depth: usize,
    pub match_queue_depth: usize,
    pub subscriber_queue_depth: usize,
    pub heartbeat_interval_ms: u64,
    /// Deadline for collecting both signatures after a proof lands.
    /// `None` falls back to the matched orders' own expiry.
    pub signature_timeout_ms: Option<u64>,
    pub submit_retry_initial_ms: u64,
    pub submit_retry_max_attempts: u32,
    pub expiry_sweep_interval_ms: u64,
    /// Ordered compliance whitelist; leaf index == position.
    pub participants: Vec<String>,
}

impl NodeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn signature_timeout(&self) -> Option<Duration> {
        self.signature_timeout_ms.map(Duration::from_millis)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_sweep_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_millis(self.submit_retry_initial_ms),
            factor: 2,
            max_attempts: self.submit_retry_max_attempts,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_addr: "127.0.0.1:8080".parse().expect("loopback socket"),
            circuit_wasm: PathBuf::from("settlement_proof.wasm"),
            circuit_zkey: PathBuf::from("settlement_proof_final.zkey"),
            proof_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            ingest_queue_depth: 256,
            match_queue_depth: 256,
            subscriber_queue_depth: 64,
            heartbeat_interval_ms: 30_000,
            signature_timeout_ms: None,
            submit_retry_initial_ms: 1_000,
            submit_retry_max_attempts: 5,
            expiry_sweep_interval_ms: 5_000,
            participants: Vec::new(),
        }
    }
}
