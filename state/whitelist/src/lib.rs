//! Poseidon Merkle whitelist of compliance-approved participants.
//!
//! The tree mirrors the settlement circuit's hash domain: leaves are
//! `Poseidon([id])`, nodes are `Poseidon([left, right])`, and every proof
//! is padded to the circuit's fixed depth with a precomputed zero ladder.
//! A built tree is immutable; the registry swaps whole snapshots.

use ark_bn254::Fr;
use darkpool_crypto::{poseidon_hash, CryptoError};
use thiserror::Error;

/// Fixed circuit depth; the whitelist admits at most 2^20 participants.
pub const TREE_DEPTH: usize = 20;

#[derive(Debug, Error)]
pub enum WhitelistError {
    #[error("whitelist holds {len} participants, index {index} is out of range")]
    InvalidLeafIndex { index: usize, len: usize },
    #[error("whitelist exceeds 2^{TREE_DEPTH} participants")]
    TooManyParticipants,
    #[error("hash error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Inclusion proof for one leaf, already padded to [`TREE_DEPTH`].
///
/// `indices[k]` is 0 when the running hash is the left child at level `k`
/// and 1 when it is the right child; padded levels always sit on the left
/// of a zero subtree, so their index is 0.
#[derive(Clone, Debug)]
pub struct InclusionProof {
    pub leaf_index: usize,
    pub siblings: Vec<Fr>,
    pub indices: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct WhitelistTree {
    levels: Vec<Vec<Fr>>,
    zero_ladder: Vec<Fr>,
    dense_depth: usize,
    root: Fr,
    len: usize,
}

impl WhitelistTree {
    /// Build a snapshot over the ordered participant identifiers.
    pub fn build(ids: &[Fr]) -> Result<Self, WhitelistError> {
        if ids.len() > 1 << TREE_DEPTH {
            return Err(WhitelistError::TooManyParticipants);
        }
        let mut zero_ladder = Vec::with_capacity(TREE_DEPTH + 1);
        zero_ladder.push(Fr::from(0u64));
        for level in 0..TREE_DEPTH {
            let below = zero_ladder[level];
            zero_ladder.push(poseidon_hash(&[below, below])?);
        }

        let mut leaves = Vec::with_capacity(ids.len().max(2));
        for id in ids {
            leaves.push(poseidon_hash(&[*id])?);
        }
        let dense_width = ids.len().max(2).next_power_of_two();
        let dense_depth = dense_width.trailing_zeros() as usize;
        leaves.resize(dense_width, zero_ladder[0]);

        let mut levels = vec![leaves];
        for level in 0..dense_depth {
            let below = &levels[level];
            let mut above = Vec::with_capacity(below.len() / 2);
            for pair in below.chunks(2) {
                above.push(poseidon_hash(&[pair[0], pair[1]])?);
            }
            levels.push(above);
        }

        let mut root = levels[dense_depth][0];
        for level in dense_depth..TREE_DEPTH {
            root = poseidon_hash(&[root, zero_ladder[level]])?;
        }

        Ok(Self {
            levels,
            zero_ladder,
            dense_depth,
            root,
            len: ids.len(),
        })
    }

    pub fn root(&self) -> Fr {
        self.root
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dense_depth(&self) -> usize {
        self.dense_depth
    }

    /// Leaf hash `Poseidon([id])` for a registered participant.
    pub fn id_hash(&self, index: usize) -> Result<Fr, WhitelistError> {
        if index >= self.len {
            return Err(WhitelistError::InvalidLeafIndex {
                index,
                len: self.len,
            });
        }
        Ok(self.levels[0][index])
    }

    /// Inclusion proof padded to the fixed circuit depth.
    pub fn proof(&self, index: usize) -> Result<InclusionProof, WhitelistError> {
        if index >= self.len {
            return Err(WhitelistError::InvalidLeafIndex {
                index,
                len: self.len,
            });
        }
        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        let mut indices = Vec::with_capacity(TREE_DEPTH);
        let mut position = index;
        for level in 0..self.dense_depth {
            let sibling = self.levels[level][position ^ 1];
            siblings.push(sibling);
            indices.push((position & 1) as u8);
            position >>= 1;
        }
        // Above the dense tree the padded zero subtree is always the right
        // sibling.
        for level in self.dense_depth..TREE_DEPTH {
            siblings.push(self.zero_ladder[level]);
            indices.push(0);
        }
        Ok(InclusionProof {
            leaf_index: index,
            siblings,
            indices,
        })
    }

    /// Recompute the path and compare against `root`. Total: malformed
    /// proofs simply fail to verify.
    pub fn verify(proof: &InclusionProof, leaf: Fr, root: Fr) -> bool {
        if proof.siblings.len() != TREE_DEPTH || proof.indices.len() != TREE_DEPTH {
            return false;
        }
        let mut current = leaf;
        for (sibling, index) in proof.siblings.iter().zip(proof.indices.iter()) {
            let pair = if *index == 0 {
                [current, *sibling]
            } else {
                [*sibling, current]
            };
            current = match poseidon_hash(&pair) {
                Ok(node) => node,
                Err(_) => return false,
            };
        }
        current == root
    }
}
