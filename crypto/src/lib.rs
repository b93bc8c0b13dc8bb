//! Cryptographic core of the dark pool.
//!
//! Everything on-chain speaks the BN254 scalar field and circomlib's
//! Poseidon, so all commitments, nullifiers and whitelist nodes produced
//! here must be bit-compatible with the settlement circuit.

pub mod commitment;
pub mod error;
pub mod field;
pub mod poseidon;

pub use ark_bn254::Fr;

pub use commitment::{
    compute_nullifier, generate_order_commitment, hash_asset, order_commitment, OrderCommitment,
    SIDE_BUY, SIDE_SELL,
};
pub use error::CryptoError;
pub use field::{
    fr_from_address, fr_from_be_bytes, fr_from_decimal, fr_to_be_bytes, fr_to_decimal, fr_to_hex,
    random_fr,
};
pub use poseidon::{poseidon_hash, MAX_POSEIDON_ARITY};
