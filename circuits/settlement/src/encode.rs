//! Byte encodings consumed by the on-chain Groth16 verifier.

use ark_bn254::{Bn254, Fq, Fr};
use ark_ff::{BigInteger, PrimeField};
use ark_groth16::Proof;
use darkpool_crypto::fr_to_be_bytes;

/// `A.x ∥ A.y ∥ B.x1 ∥ B.x0 ∥ B.y1 ∥ B.y0 ∥ C.x ∥ C.y`, 32 bytes each.
pub const PROOF_BYTES_LEN: usize = 256;

fn fq_to_be_bytes(value: Fq) -> [u8; 32] {
    let repr = value.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - repr.len()..].copy_from_slice(&repr);
    out
}

/// Fixed 256-byte proof layout. The Fp2 coordinates are emitted `c1 ∥ c0`,
/// matching the on-chain verifier's convention.
pub fn encode_proof(proof: &Proof<Bn254>) -> [u8; PROOF_BYTES_LEN] {
    let mut out = [0u8; PROOF_BYTES_LEN];
    let coordinates = [
        fq_to_be_bytes(proof.a.x),
        fq_to_be_bytes(proof.a.y),
        fq_to_be_bytes(proof.b.x.c1),
        fq_to_be_bytes(proof.b.x.c0),
        fq_to_be_bytes(proof.b.y.c1),
        fq_to_be_bytes(proof.b.y.c0),
        fq_to_be_bytes(proof.c.x),
        fq_to_be_bytes(proof.c.y),
    ];
    for (slot, coordinate) in out.chunks_mut(32).zip(coordinates.iter()) {
        slot.copy_from_slice(coordinate);
    }
    out
}

/// 4-byte big-endian signal count followed by each signal as 32 bytes
/// big-endian. The last signal is the nullifier.
pub fn encode_public_signals(signals: &[Fr]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + signals.len() * 32);
    out.extend_from_slice(&(signals.len() as u32).to_be_bytes());
    for signal in signals {
        out.extend_from_slice(&fr_to_be_bytes(*signal));
    }
    out
}
