use std::future::Future;

use alloy::primitives::{
    Address,
    B256,
    U256,
};

use super::TxReceipt;
use crate::domain::{
    commitment::Commitment,
    events::{
        LeafRecord,
        ReclaimRequest,
    },
    nullifier::NullifierHash,
    proof::WithdrawProof,
};

/// Port for the origin chain: the native-asset commitment pool.
///
/// Implementations:
/// - `EthereumOrigin` (alloy over JSON-RPC)
/// - `InMemoryOrigin` for tests and local runs
pub trait OriginChain: Send + Sync {
    /// Account that signs transactions sent through this handle.
    fn account(&self) -> Address;

    /// Lock `value` in the pool under `commitment`.
    fn deposit(
        &self,
        commitment: Commitment,
        value: U256,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    /// `Deposit` events emitted in blocks `from_block..=to_block`, in chain order.
    fn deposit_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<LeafRecord>, ChainError>> + Send;

    /// Most recent root of the pool's tree.
    fn latest_root(&self) -> impl Future<Output = Result<B256, ChainError>> + Send;

    /// Pay out native asset against a reclaim (relayer only).
    fn release_funds(
        &self,
        recipient: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    fn native_balance(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn block_number(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;
}

/// Port for the destination chain: root registry, nullifier ledger and wrapped token.
///
/// Implementations:
/// - `EthereumDestination` (alloy over JSON-RPC)
/// - `InMemoryDestination` for tests and local runs
pub trait DestinationChain: Send + Sync {
    fn account(&self) -> Address;

    /// Register an origin root (relayer only).
    fn submit_root(&self, root: B256)
        -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    /// `Reclaim` events emitted in blocks `from_block..=to_block`, in chain order.
    fn reclaim_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<ReclaimRequest>, ChainError>> + Send;

    /// Spend a deposit and mint wrapped tokens to the proof's recipient.
    fn withdraw(
        &self,
        proof: &WithdrawProof,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    fn is_known_root(&self, root: B256)
        -> impl Future<Output = Result<bool, ChainError>> + Send;

    fn is_spent(
        &self,
        nullifier_hash: NullifierHash,
    ) -> impl Future<Output = Result<bool, ChainError>> + Send;

    /// Wrapped-token balance.
    fn token_balance(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn native_balance(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, ChainError>> + Send;

    /// Burn wrapped tokens of the caller and request release on the origin chain.
    fn reclaim(
        &self,
        recipient: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    /// Move wrapped tokens between destination accounts.
    fn transfer(
        &self,
        recipient: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>> + Send;

    fn block_number(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("gas estimation failed: {0}")]
    Estimate(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error(
        "transaction {tx_hash} reverted{}",
        .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default()
    )]
    Reverted {
        tx_hash: B256,
        reason: Option<String>,
    },

    #[error("rejected by contract: {0}")]
    Rejected(String),

    #[error("timed out waiting for receipt")]
    Timeout,

    #[error("signer error: {0}")]
    Signer(String),
}
