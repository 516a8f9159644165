use std::fmt;

use alloy::primitives::{
    Address,
    B256,
    U256,
};

use super::{
    deposit::Deposit,
    merkle::MerklePath,
    proof::PublicSignals,
};

/// Caller-chosen public parameters of a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawParams {
    pub recipient: Address,
    pub relayer: Address,
    pub fee: U256,
    pub refund: U256,
}

impl WithdrawParams {
    /// Withdraw straight to `recipient` with no relayer, fee or refund.
    pub fn direct(recipient: Address) -> Self {
        Self {
            recipient,
            relayer: Address::ZERO,
            fee: U256::ZERO,
            refund: U256::ZERO,
        }
    }
}

/// Full circuit input: public signals plus the private nullifier, secret and path.
#[derive(Clone)]
pub struct WithdrawWitness {
    pub public: PublicSignals,
    pub nullifier: U256,
    pub secret: U256,
    pub path: MerklePath,
}

impl WithdrawWitness {
    pub fn new(deposit: &Deposit, root: B256, path: MerklePath, params: &WithdrawParams) -> Self {
        Self {
            public: PublicSignals {
                root,
                nullifier_hash: deposit.nullifier_hash(),
                recipient: params.recipient,
                relayer: params.relayer,
                fee: params.fee,
                refund: params.refund,
            },
            nullifier: deposit.nullifier(),
            secret: deposit.secret(),
            path,
        }
    }
}

impl fmt::Debug for WithdrawWitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithdrawWitness")
            .field("public", &self.public)
            .field("leaf_index", &self.path.leaf_index)
            .finish_non_exhaustive()
    }
}
