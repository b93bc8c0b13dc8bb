//! Order commitments and nullifier derivation.
//!
//! A commitment binds `(assetHash, side, quantity, price, nonce, secret)`
//! under a 6-ary Poseidon; the nullifier binds a matched pair and is
//! symmetric in the two secrets because they enter as a sum.

use ark_bn254::Fr;

use crate::error::CryptoError;
use crate::field::{fr_from_address, random_fr};
use crate::poseidon::poseidon_hash;

pub const SIDE_BUY: u64 = 0;
pub const SIDE_SELL: u64 = 1;

/// Freshly drawn commitment material for one order.
#[derive(Clone, Copy, Debug)]
pub struct OrderCommitment {
    pub commitment: Fr,
    pub secret: Fr,
    pub nonce: Fr,
}

/// `Poseidon([addr as big-endian integer mod r])`.
pub fn hash_asset(address: &str) -> Result<Fr, CryptoError> {
    poseidon_hash(&[fr_from_address(address)])
}

/// Deterministic commitment over explicit material. Used both when
/// creating orders and when validating that a submitted order reproduces
/// its claimed commitment.
pub fn order_commitment(
    asset_hash: Fr,
    side: u64,
    quantity: u64,
    price: u64,
    nonce: Fr,
    secret: Fr,
) -> Result<Fr, CryptoError> {
    poseidon_hash(&[
        asset_hash,
        Fr::from(side),
        Fr::from(quantity),
        Fr::from(price),
        nonce,
        secret,
    ])
}

/// Draw secret and nonce from OS entropy and commit. Both values must be
/// indistinguishable from uniform; they are the only thing hiding the
/// order's parameters.
pub fn generate_order_commitment(
    asset_hash: Fr,
    side: u64,
    quantity: u64,
    price: u64,
) -> Result<OrderCommitment, CryptoError> {
    let secret = random_fr();
    let nonce = random_fr();
    let commitment = order_commitment(asset_hash, side, quantity, price, nonce, secret)?;
    Ok(OrderCommitment {
        commitment,
        secret,
        nonce,
    })
}

/// `Poseidon([buyCommit, sellCommit, qty, buyerSecret + sellerSecret])`.
///
/// Deterministic in the pair, so the on-chain nullifier set rejects a
/// second settlement of the same match.
pub fn compute_nullifier(
    buy_commitment: Fr,
    sell_commitment: Fr,
    quantity: u64,
    buyer_secret: Fr,
    seller_secret: Fr,
) -> Result<Fr, CryptoError> {
    poseidon_hash(&[
        buy_commitment,
        sell_commitment,
        Fr::from(quantity),
        buyer_secret + seller_secret,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSET: &str = "CDLZFC3SYJYDZT7K67VZ75HPJVIEUVNIXF47ZG2FB2RMQQVU2HHGCYSC";

    #[test]
    fn commitment_is_deterministic() {
        let asset_hash = hash_asset(ASSET).unwrap();
        let nonce = Fr::from(42u64);
        let secret = Fr::from(1337u64);
        let first = order_commitment(asset_hash, SIDE_BUY, 100, 50, nonce, secret).unwrap();
        let second = order_commitment(asset_hash, SIDE_BUY, 100, 50, nonce, secret).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn commitment_binds_every_field() {
        let asset_hash = hash_asset(ASSET).unwrap();
        let nonce = Fr::from(42u64);
        let secret = Fr::from(1337u64);
        let base = order_commitment(asset_hash, SIDE_BUY, 100, 50, nonce, secret).unwrap();
        let variants = [
            order_commitment(asset_hash, SIDE_SELL, 100, 50, nonce, secret).unwrap(),
            order_commitment(asset_hash, SIDE_BUY, 101, 50, nonce, secret).unwrap(),
            order_commitment(asset_hash, SIDE_BUY, 100, 51, nonce, secret).unwrap(),
            order_commitment(asset_hash, SIDE_BUY, 100, 50, Fr::from(43u64), secret).unwrap(),
            order_commitment(asset_hash, SIDE_BUY, 100, 50, nonce, Fr::from(7u64)).unwrap(),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn generated_commitment_reproduces() {
        let asset_hash = hash_asset(ASSET).unwrap();
        let material = generate_order_commitment(asset_hash, SIDE_SELL, 90, 48).unwrap();
        let recomputed = order_commitment(
            asset_hash,
            SIDE_SELL,
            90,
            48,
            material.nonce,
            material.secret,
        )
        .unwrap();
        assert_eq!(material.commitment, recomputed);
    }

    #[test]
    fn nullifier_is_symmetric_in_secrets() {
        let buy = Fr::from(111u64);
        let sell = Fr::from(222u64);
        let s1 = Fr::from(333u64);
        let s2 = Fr::from(444u64);
        let forward = compute_nullifier(buy, sell, 100, s1, s2).unwrap();
        let swapped = compute_nullifier(buy, sell, 100, s2, s1).unwrap();
        assert_eq!(forward, swapped);
    }

    #[test]
    fn nullifier_binds_pair_and_quantity() {
        let buy = Fr::from(111u64);
        let sell = Fr::from(222u64);
        let s1 = Fr::from(333u64);
        let s2 = Fr::from(444u64);
        let base = compute_nullifier(buy, sell, 100, s1, s2).unwrap();
        assert_ne!(base, compute_nullifier(sell, buy, 100, s1, s2).unwrap());
        assert_ne!(base, compute_nullifier(buy, sell, 99, s1, s2).unwrap());
        assert_ne!(
            base,
            compute_nullifier(buy, sell, 100, s1, Fr::from(445u64)).unwrap()
        );
    }
}
