//! Canonical conversions for BN254 scalar elements.
//!
//! Wire formats are fixed: field elements travel either as 32-byte
//! big-endian buffers or as decimal strings. Every conversion reduces to
//! the least residue so downstream hashing sees canonical values only.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use ark_std::UniformRand;
use num_bigint::BigUint;
use rand::rngs::OsRng;

use crate::error::CryptoError;

/// Interpret arbitrary big-endian bytes as an integer and reduce mod r.
pub fn fr_from_be_bytes(bytes: &[u8]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

/// Fixed 32-byte big-endian encoding of the least residue.
pub fn fr_to_be_bytes(value: Fr) -> [u8; 32] {
    let repr = value.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - repr.len()..].copy_from_slice(&repr);
    out
}

pub fn fr_to_hex(value: Fr) -> String {
    hex::encode(fr_to_be_bytes(value))
}

/// Parse a decimal string, reducing mod r if the value is oversized.
pub fn fr_from_decimal(text: &str) -> Result<Fr, CryptoError> {
    let value: BigUint = text
        .trim()
        .parse()
        .map_err(|_| CryptoError::InvalidDecimal(text.to_string()))?;
    Ok(Fr::from_be_bytes_mod_order(&value.to_bytes_be()))
}

pub fn fr_to_decimal(value: Fr) -> String {
    BigUint::from_bytes_be(&fr_to_be_bytes(value)).to_string()
}

/// Opaque account / asset identifiers enter the field as the big-endian
/// integer formed by their raw bytes, reduced mod r.
pub fn fr_from_address(address: &str) -> Fr {
    Fr::from_be_bytes_mod_order(address.as_bytes())
}

/// Uniform field element from OS entropy. Used for order secrets and
/// nonces, so predictability here would leak order intent.
pub fn random_fr() -> Fr {
    Fr::rand(&mut OsRng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip() {
        let value = Fr::from(123_456_789u64);
        let bytes = fr_to_be_bytes(value);
        assert_eq!(bytes.len(), 32);
        assert_eq!(fr_from_be_bytes(&bytes), value);
    }

    #[test]
    fn decimal_round_trip() {
        let value = Fr::from(987_654_321u64);
        let text = fr_to_decimal(value);
        assert_eq!(text, "987654321");
        assert_eq!(fr_from_decimal(&text).unwrap(), value);
    }

    #[test]
    fn oversized_decimal_reduces() {
        // 2 * r + 5 must canonicalize to 5.
        let r_minus_one: BigUint = fr_to_decimal(-Fr::from(1u64)).parse().unwrap();
        let modulus = r_minus_one + 1u32;
        let oversized = &modulus * 2u32 + 5u32;
        let parsed = fr_from_decimal(&oversized.to_string()).unwrap();
        assert_eq!(parsed, Fr::from(5u64));
    }

    #[test]
    fn rejects_garbage_decimal() {
        assert!(fr_from_decimal("0x123").is_err());
        assert!(fr_from_decimal("").is_err());
    }

    #[test]
    fn address_reduction_is_deterministic() {
        let addr = "CDLZFC3SYJYDZT7K67VZ75HPJVIEUVNIXF47ZG2FB2RMQQVU2HHGCYSC";
        assert_eq!(fr_from_address(addr), fr_from_address(addr));
        assert_ne!(fr_from_address(addr), fr_from_address("CXYZ"));
    }

    #[test]
    fn random_elements_are_distinct() {
        assert_ne!(random_fr(), random_fr());
    }
}
