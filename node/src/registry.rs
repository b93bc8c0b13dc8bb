//! Whitelist lifecycle: build once at startup, rebuild atomically when the
//! on-chain registry root changes. Readers keep the snapshot they took.

use std::sync::Arc;

use ark_bn254::Fr;
use darkpool_crypto::fr_from_address;
use parking_lot::RwLock;
use tracing::info;
use whitelist_tree::WhitelistTree;

use crate::error::NodeResult;

pub struct WhitelistRegistry {
    snapshot: RwLock<Arc<WhitelistTree>>,
}

fn participant_ids(participants: &[String]) -> Vec<Fr> {
    participants
        .iter()
        .map(|address| fr_from_address(address))
        .collect()
}

impl WhitelistRegistry {
    pub fn build(participants: &[String]) -> NodeResult<Self> {
        let tree = WhitelistTree::build(&participant_ids(participants))?;
        info!(
            participants = participants.len(),
            root = %darkpool_crypto::fr_to_decimal(tree.root()),
            "whitelist built"
        );
        Ok(Self {
            snapshot: RwLock::new(Arc::new(tree)),
        })
    }

    /// Publish a fresh snapshot. In-flight proof jobs keep the tree they
    /// already borrowed.
    pub fn rebuild(&self, participants: &[String]) -> NodeResult<Fr> {
        let tree = Arc::new(WhitelistTree::build(&participant_ids(participants))?);
        let root = tree.root();
        *self.snapshot.write() = tree;
        info!(
            participants = participants.len(),
            root = %darkpool_crypto::fr_to_decimal(root),
            "whitelist rebuilt"
        );
        Ok(root)
    }

    pub fn snapshot(&self) -> Arc<WhitelistTree> {
        self.snapshot.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("C{:055}", i)).collect()
    }

    #[test]
    fn rebuild_swaps_snapshot_without_touching_old_one() {
        let registry = WhitelistRegistry::build(&addresses(3)).unwrap();
        let original = registry.snapshot();
        let original_root = original.root();
        let proof = original.proof(1).unwrap();
        let leaf = original.id_hash(1).unwrap();

        registry.rebuild(&addresses(4)).unwrap();
        let rebuilt = registry.snapshot();
        assert_ne!(rebuilt.root(), original_root);

        assert!(WhitelistTree::verify(&proof, leaf, original_root));
        assert_eq!(original.root(), original_root);
    }
}
