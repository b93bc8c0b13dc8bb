//! Poseidon hashing over BN254.
//!
//! Delegates to `light-poseidon`, which carries the circomlib round
//! constants and MDS matrices. Commitments use arity 6, nullifiers arity 4
//! and Merkle nodes arity 2; any parameter drift here would invalidate
//! every commitment and proof in flight.

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::error::CryptoError;

/// Largest sponge width the settlement circuit instantiates.
pub const MAX_POSEIDON_ARITY: usize = 6;

/// Hash `inputs.len()` field elements with the circom parameter set for
/// that arity. Deterministic and pure.
pub fn poseidon_hash(inputs: &[Fr]) -> Result<Fr, CryptoError> {
    if inputs.is_empty() || inputs.len() > MAX_POSEIDON_ARITY {
        return Err(CryptoError::UnsupportedArity(inputs.len()));
    }
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())?;
    Ok(hasher.hash(inputs)?)
}
