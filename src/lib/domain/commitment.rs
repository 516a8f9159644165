use std::fmt;

use alloy::primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};

/// A deposit commitment: the leaf the origin pool appends to its tree.
/// commitment = hash(le(nullifier, 31) || le(secret, 31))
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub B256);

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<B256> for Commitment {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl From<Commitment> for B256 {
    fn from(value: Commitment) -> Self {
        value.0
    }
}
