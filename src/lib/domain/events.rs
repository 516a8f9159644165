use alloy::primitives::{
    Address,
    B256,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};

use super::commitment::Commitment;

/// Position of a log in chain order. Used as the relayer watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventPosition {
    pub block: u64,
    pub log_index: u64,
}

impl EventPosition {
    pub fn new(block: u64, log_index: u64) -> Self {
        Self { block, log_index }
    }

    /// A position after every log of `block`.
    pub fn end_of(block: u64) -> Self {
        Self {
            block,
            log_index: u64::MAX,
        }
    }
}

/// One `Deposit` event of the origin pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafRecord {
    pub commitment: Commitment,
    pub leaf_index: u64,
    /// Origin tree root right after this leaf was appended.
    pub root: B256,
    pub block_number: u64,
    pub log_index: u64,
}

impl LeafRecord {
    pub fn position(&self) -> EventPosition {
        EventPosition::new(self.block_number, self.log_index)
    }
}

/// One `Reclaim` event of the destination pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimRequest {
    pub recipient: Address,
    pub amount: U256,
    pub block_number: u64,
    pub log_index: u64,
}

impl ReclaimRequest {
    pub fn position(&self) -> EventPosition {
        EventPosition::new(self.block_number, self.log_index)
    }
}
