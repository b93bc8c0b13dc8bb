//! Witness marshalling for the settlement circuit.
//!
//! Signal names are frozen by the compiled circuit; renaming anything here
//! makes witness generation fail for every match.

use ark_bn254::Fr;
use darkpool_crypto::fr_to_be_bytes;
use num_bigint::{BigInt, Sign};

/// Full input assignment for one matched pair.
///
/// Private signals: both traders' whitelist leaves and Merkle paths plus
/// the order secrets/nonces. Public signals: the two commitments, asset
/// hash, matched quantity, execution price and whitelist root. The circuit
/// outputs the nullifier.
#[derive(Clone, Debug)]
pub struct SettlementWitness {
    pub buyer_id_hash: Fr,
    pub seller_id_hash: Fr,
    pub buyer_merkle_proof: Vec<Fr>,
    pub buyer_merkle_indices: Vec<u8>,
    pub seller_merkle_proof: Vec<Fr>,
    pub seller_merkle_indices: Vec<u8>,
    pub buy_secret: Fr,
    pub buy_nonce: Fr,
    pub sell_secret: Fr,
    pub sell_nonce: Fr,
    pub buy_commitment: Fr,
    pub sell_commitment: Fr,
    pub asset_hash: Fr,
    pub matched_quantity: u64,
    pub execution_price: u64,
    pub whitelist_root: Fr,
}

fn signal(value: Fr) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, &fr_to_be_bytes(value))
}

fn signals(values: &[Fr]) -> Vec<BigInt> {
    values.iter().map(|value| signal(*value)).collect()
}

fn index_signals(indices: &[u8]) -> Vec<BigInt> {
    indices.iter().map(|index| BigInt::from(*index)).collect()
}

impl SettlementWitness {
    /// The `(name, values)` pairs consumed by the WASM witness calculator.
    pub fn to_signal_inputs(&self) -> Vec<(String, Vec<BigInt>)> {
        vec![
            ("buyerIdHash".into(), vec![signal(self.buyer_id_hash)]),
            ("sellerIdHash".into(), vec![signal(self.seller_id_hash)]),
            (
                "buyerMerkleProof".into(),
                signals(&self.buyer_merkle_proof),
            ),
            (
                "buyerMerkleIndices".into(),
                index_signals(&self.buyer_merkle_indices),
            ),
            (
                "sellerMerkleProof".into(),
                signals(&self.seller_merkle_proof),
            ),
            (
                "sellerMerkleIndices".into(),
                index_signals(&self.seller_merkle_indices),
            ),
            ("buySecret".into(), vec![signal(self.buy_secret)]),
            ("buyNonce".into(), vec![signal(self.buy_nonce)]),
            ("sellSecret".into(), vec![signal(self.sell_secret)]),
            ("sellNonce".into(), vec![signal(self.sell_nonce)]),
            ("buyCommitment".into(), vec![signal(self.buy_commitment)]),
            ("sellCommitment".into(), vec![signal(self.sell_commitment)]),
            ("assetHash".into(), vec![signal(self.asset_hash)]),
            (
                "matchedQuantity".into(),
                vec![BigInt::from(self.matched_quantity)],
            ),
            (
                "executionPrice".into(),
                vec![BigInt::from(self.execution_price)],
            ),
            ("whitelistRoot".into(), vec![signal(self.whitelist_root)]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SettlementWitness {
        SettlementWitness {
            buyer_id_hash: Fr::from(1u64),
            seller_id_hash: Fr::from(2u64),
            buyer_merkle_proof: vec![Fr::from(3u64); 20],
            buyer_merkle_indices: vec![0; 20],
            seller_merkle_proof: vec![Fr::from(4u64); 20],
            seller_merkle_indices: vec![1; 20],
            buy_secret: Fr::from(5u64),
            buy_nonce: Fr::from(6u64),
            sell_secret: Fr::from(7u64),
            sell_nonce: Fr::from(8u64),
            buy_commitment: Fr::from(9u64),
            sell_commitment: Fr::from(10u64),
            asset_hash: Fr::from(11u64),
            matched_quantity: 1_000_000_000,
            execution_price: 500_000_000,
            whitelist_root: Fr::from(12u64),
        }
    }

    #[test]
    fn signal_names_are_frozen() {
        let names: Vec<String> = sample()
            .to_signal_inputs()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            names,
            [
                "buyerIdHash",
                "sellerIdHash",
                "buyerMerkleProof",
                "buyerMerkleIndices",
                "sellerMerkleProof",
                "sellerMerkleIndices",
                "buySecret",
                "buyNonce",
                "sellSecret",
                "sellNonce",
                "buyCommitment",
                "sellCommitment",
                "assetHash",
                "matchedQuantity",
                "executionPrice",
                "whitelistRoot",
            ]
        );
    }

    #[test]
    fn merkle_arrays_keep_their_length() {
        let inputs = sample().to_signal_inputs();
        let by_name: std::collections::HashMap<_, _> = inputs.into_iter().collect();
        assert_eq!(by_name["buyerMerkleProof"].len(), 20);
        assert_eq!(by_name["sellerMerkleIndices"].len(), 20);
        assert_eq!(by_name["buySecret"].len(), 1);
    }

    #[test]
    fn integer_signals_round_trip() {
        let inputs = sample().to_signal_inputs();
        let by_name: std::collections::HashMap<_, _> = inputs.into_iter().collect();
        assert_eq!(by_name["matchedQuantity"][0], BigInt::from(1_000_000_000u64));
        assert_eq!(by_name["buyerIdHash"][0], BigInt::from(1u64));
    }
}
