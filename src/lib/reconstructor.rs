//! Client-side replay of the origin pool's commitment tree.
//!
//! Leaf records are ordered by leaf index, never by arrival order, and must
//! form the contiguous range `0..n`. The rebuilt root is checked against the
//! root the chain reports before any path taken from the tree is trusted.

use alloy::primitives::B256;
use tracing::{
    debug,
    info,
};

use crate::{
    domain::{
        commitment::Commitment,
        events::LeafRecord,
        merkle::{
            FixedMerkleTree,
            MerklePath,
            TreeError,
        },
    },
    ports::chain::{
        ChainError,
        OriginChain,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ReconstructionError {
    #[error("The deposit is not found in the tree")]
    CommitmentNotFound(Commitment),

    #[error("Merkle tree is corrupted: local root {local}, on-chain root {on_chain}")]
    RootMismatch { local: B256, on_chain: B256 },

    #[error("incomplete leaf replay: expected leaf index {expected}, found {found}")]
    IncompleteReplay { expected: u64, found: u64 },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Root and path proving one commitment's membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inclusion {
    pub root: B256,
    pub path: MerklePath,
}

/// Rebuild the tree from leaf records in any order.
///
/// Identical duplicates (the same log fetched twice) are dropped. Two
/// different records for one index, or a gap, are an `IncompleteReplay`.
pub fn reconstruct(
    height: usize,
    mut records: Vec<LeafRecord>,
) -> Result<FixedMerkleTree, ReconstructionError> {
    records.sort_by_key(|r| r.leaf_index);
    records.dedup();

    let mut tree = FixedMerkleTree::new(height)?;
    for (expected, record) in records.iter().enumerate() {
        let expected = expected as u64;
        if record.leaf_index != expected {
            return Err(ReconstructionError::IncompleteReplay {
                expected,
                found: record.leaf_index,
            });
        }
        tree.insert(record.commitment)?;
    }

    if let Some(last) = records.last() {
        if last.root != tree.root() {
            return Err(ReconstructionError::RootMismatch {
                local: tree.root(),
                on_chain: last.root,
            });
        }
    }
    Ok(tree)
}

/// Locate `commitment` and produce its path. Never invents a path.
pub fn inclusion(
    tree: &FixedMerkleTree,
    commitment: &Commitment,
) -> Result<Inclusion, ReconstructionError> {
    let index = tree
        .index_of(commitment)
        .ok_or(ReconstructionError::CommitmentNotFound(*commitment))?;
    Ok(Inclusion {
        root: tree.root(),
        path: tree.path(index)?,
    })
}

/// Fetch every `Deposit` event since `from_block`, rebuild the tree and check
/// it against the pool's authoritative latest root.
pub async fn reconstruct_from_chain<O: OriginChain>(
    origin: &O,
    height: usize,
    from_block: u64,
) -> Result<FixedMerkleTree, ReconstructionError> {
    let head = origin.block_number().await?;
    let records = origin.deposit_events(from_block, head).await?;
    debug!(count = records.len(), from_block, head, "fetched deposit events");

    let tree = reconstruct(height, records)?;
    let on_chain = origin.latest_root().await?;
    if tree.root() != on_chain {
        // The pool may have accepted a deposit after `head`; a stale local
        // root is reported the same way as corruption.
        return Err(ReconstructionError::RootMismatch {
            local: tree.root(),
            on_chain,
        });
    }

    info!(leaves = tree.len(), root = %tree.root(), "reconstructed commitment tree");
    Ok(tree)
}
