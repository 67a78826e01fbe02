//! RFC 6962 Merkle tree hashing and inclusion proof verification.

use plugin_sig_core::{Error, Result};
use sha2::{Digest, Sha256};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

pub type Hash = [u8; 32];

pub fn hash_leaf(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    hasher.finalize().into()
}

pub fn hash_children(left: &[u8], right: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Verify that `leaf_hash` sits at `index` in a tree of `tree_size` leaves
/// whose root is `root_hash` (RFC 9162, section 2.1.3.2).
pub fn verify_inclusion(
    index: u64,
    tree_size: u64,
    leaf_hash: &Hash,
    proof: &[Hash],
    root_hash: &[u8],
) -> Result<()> {
    if index >= tree_size {
        return Err(Error::verification(format!(
            "inclusion proof index {index} is outside a tree of size {tree_size}"
        )));
    }

    let mut fnode = index;
    let mut snode = tree_size - 1;
    let mut computed = *leaf_hash;

    for sibling in proof {
        if snode == 0 {
            return Err(Error::verification("inclusion proof is longer than the tree height"));
        }
        if fnode & 1 == 1 || fnode == snode {
            computed = hash_children(sibling, &computed);
            while fnode & 1 == 0 && fnode != 0 {
                fnode >>= 1;
                snode >>= 1;
            }
        } else {
            computed = hash_children(&computed, sibling);
        }
        fnode >>= 1;
        snode >>= 1;
    }

    if snode != 0 {
        return Err(Error::verification("inclusion proof is shorter than the tree height"));
    }
    if computed.as_slice() != root_hash {
        return Err(Error::verification(
            "inclusion proof does not reproduce the log root hash",
        ));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::reference::{audit_path, root};
    use super::*;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n).map(|i| hash_leaf(format!("leaf-{i}").as_bytes())).collect()
    }

    #[test]
    fn every_leaf_verifies_in_uneven_trees() {
        for size in [1usize, 2, 3, 7, 8, 13, 100] {
            let tree = leaves(size);
            let root_hash = root(&tree);
            for index in 0..size {
                let proof = audit_path(index, &tree);
                verify_inclusion(index as u64, size as u64, &tree[index], &proof, &root_hash)
                    .unwrap_or_else(|e| panic!("size {size} index {index}: {e}"));
            }
        }
    }

    #[test]
    fn wrong_index_fails() {
        let tree = leaves(13);
        let root_hash = root(&tree);
        let proof = audit_path(5, &tree);
        assert!(verify_inclusion(6, 13, &tree[5], &proof, &root_hash).is_err());
        assert!(verify_inclusion(13, 13, &tree[5], &proof, &root_hash).is_err());
    }

    #[test]
    fn tampered_sibling_fails() {
        let tree = leaves(100);
        let root_hash = root(&tree);
        let mut proof = audit_path(42, &tree);
        proof[2][0] ^= 0x80;
        assert!(verify_inclusion(42, 100, &tree[42], &proof, &root_hash).is_err());
    }

    #[test]
    fn truncated_or_extended_proof_fails() {
        let tree = leaves(100);
        let root_hash = root(&tree);
        let proof = audit_path(42, &tree);

        let truncated = &proof[..proof.len() - 1];
        assert!(verify_inclusion(42, 100, &tree[42], truncated, &root_hash).is_err());

        let mut extended = proof.clone();
        extended.push([0u8; 32]);
        assert!(verify_inclusion(42, 100, &tree[42], &extended, &root_hash).is_err());
    }

    #[test]
    fn leaf_and_node_hashes_are_domain_separated() {
        let data = [0u8; 64];
        assert_ne!(hash_leaf(&data), hash_children(&data[..32], &data[32..]));
    }
}
