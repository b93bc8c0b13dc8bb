//! Shared helpers for the workspace integration tests.

use std::sync::Arc;

use darkpool_crypto::{generate_order_commitment, hash_asset};
use darkpool_node::order::{now_ms, Side};
use darkpool_node::proof::DeterministicBackend;
use darkpool_node::service::SubmitOrderCommand;
use darkpool_node::settlement::DryRunSink;
use darkpool_node::{NodeConfig, NodeHandle, NodeService};

pub const ASSET: &str = "CAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub fn participant(index: usize) -> String {
    format!("C{index:055}")
}

pub fn start_core(participants: usize) -> NodeHandle {
    let config = NodeConfig {
        participants: (0..participants).map(participant).collect(),
        proof_workers: 2,
        ..NodeConfig::default()
    };
    NodeService::start(config, Arc::new(DeterministicBackend), Arc::new(DryRunSink))
        .expect("core starts")
}

/// A valid submit command with freshly drawn commitment material.
pub fn order_command(
    trader_index: usize,
    side: Side,
    quantity: u64,
    price: u64,
) -> SubmitOrderCommand {
    let asset_hash = hash_asset(ASSET).expect("asset hash");
    let material = generate_order_commitment(asset_hash, side.as_field(), quantity, price)
        .expect("commitment material");
    SubmitOrderCommand {
        symbol: "GOLD".into(),
        trader: participant(trader_index),
        asset_address: ASSET.into(),
        side,
        quantity,
        price,
        commitment: material.commitment,
        secret: material.secret,
        nonce: material.nonce,
        expiry: now_ms() + 60_000,
        whitelist_index: trader_index,
    }
}

pub fn scaled(units: u64) -> u64 {
    units * darkpool_node::order::PRICE_SCALE
}
