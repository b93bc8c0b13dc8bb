//! Groth16 bindings for the settlement circuit.
//!
//! The circuit is a fixed external artifact: a WASM witness generator
//! (`settlement_proof.wasm`) and a proving key (`settlement_proof_final.zkey`).
//! This crate marshals witnesses into the circuit's input map, drives
//! witness generation and proving, checks the proof against the zkey's own
//! verifying key, and encodes proof and public signals in the layout the
//! on-chain verifier expects.

pub mod encode;
pub mod error;
pub mod prover;
pub mod witness;

pub use encode::{encode_proof, encode_public_signals, PROOF_BYTES_LEN};
pub use error::CircuitError;
pub use prover::{CircuitArtifacts, SettlementProof, SettlementProver};
pub use witness::SettlementWitness;
