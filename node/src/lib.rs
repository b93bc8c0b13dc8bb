//! Off-chain core of the dark pool.
//!
//! Orders arrive with Poseidon commitments, the single-writer ingest actor
//! matches them under price-time priority with an exact-quantity
//! constraint, a worker pool proves each match against the settlement
//! circuit, and a per-match settlement actor drives signature rendezvous
//! and on-chain submission. Every transition fans out over the pub/sub
//! gateway.

pub mod api;
pub mod book;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ingest;
pub mod order;
pub mod proof;
pub mod registry;
pub mod service;
pub mod settlement;
pub mod telemetry;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use service::{NodeHandle, NodeService};
