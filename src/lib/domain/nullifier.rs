use std::fmt;

use alloy::primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};

/// Public hash of a deposit nullifier, revealed on withdrawal.
/// The destination ledger marks it spent so the deposit cannot be withdrawn twice.
/// nullifier_hash = hash(le(nullifier, 31))
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullifierHash(pub B256);

impl fmt::Display for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<B256> for NullifierHash {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl From<NullifierHash> for B256 {
    fn from(value: NullifierHash) -> Self {
        value.0
    }
}
