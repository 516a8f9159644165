//! Operator-side bridge operations.
//!
//! Every check that can be made locally (deposit found, nullifier unspent,
//! root registered, sufficient balance) runs before a transaction is sent.

use std::sync::Arc;

use alloy::primitives::{
    Address,
    B256,
    U256,
};
use tracing::{
    info,
    warn,
};

use crate::{
    context::BridgeContext,
    domain::{
        commitment::Commitment,
        deposit::{
            Deposit,
            DepositError,
        },
        merkle::{
            FixedMerkleTree,
            TreeError,
        },
        nullifier::NullifierHash,
        root_history::ROOT_HISTORY_SIZE,
        witness::WithdrawParams,
    },
    ports::{
        chain::{
            ChainError,
            DestinationChain,
            OriginChain,
        },
        prover::Prover,
        TxReceipt,
    },
    proof_service::{
        ProofError,
        ProofService,
    },
    reconstructor::{
        inclusion,
        reconstruct_from_chain,
        Inclusion,
        ReconstructionError,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid deposit: {0}")]
    InvalidDeposit(#[from] DepositError),

    #[error("The note is already spent ({0})")]
    AlreadySpent(NullifierHash),

    #[error("root {0} is not registered on the destination chain")]
    UnknownRoot(B256),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("insufficient token balance: have {available}, need {requested}")]
    InsufficientBalance { available: U256, requested: U256 },

    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl From<TreeError> for ClientError {
    fn from(e: TreeError) -> Self {
        ClientError::Reconstruction(ReconstructionError::Tree(e))
    }
}

/// A deposit that was accepted by the origin pool.
/// The deposit pair is the only way to spend it.
#[derive(Debug)]
pub struct DepositReceipt {
    pub deposit: Deposit,
    pub receipt: TxReceipt,
}

/// Which balances `balance` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceScope {
    #[default]
    All,
    Origin,
    Destination,
    Token,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Balances {
    pub origin: Option<U256>,
    pub destination: Option<U256>,
    pub token: Option<U256>,
}

pub struct BridgeClient<O, D, P> {
    ctx: Arc<BridgeContext<O, D>>,
    proofs: ProofService<P>,
}

impl<O, D, P> BridgeClient<O, D, P>
where
    O: OriginChain,
    D: DestinationChain,
    P: Prover + 'static,
{
    pub fn new(ctx: Arc<BridgeContext<O, D>>, proofs: ProofService<P>) -> Self {
        Self { ctx, proofs }
    }

    /// Generate a fresh deposit and lock one denomination under its commitment.
    pub async fn deposit(&self) -> Result<DepositReceipt, ClientError> {
        let deposit = Deposit::random();
        let receipt = self
            .ctx
            .origin
            .deposit(deposit.commitment(), self.ctx.params.denomination)
            .await?;
        info!(commitment = %deposit.commitment(), tx = %receipt.tx_hash, "deposit accepted");
        Ok(DepositReceipt { deposit, receipt })
    }

    /// Prove ownership of `deposit` and withdraw it on the destination chain.
    pub async fn withdraw_to_destination(
        &self,
        deposit: &Deposit,
        params: &WithdrawParams,
    ) -> Result<TxReceipt, ClientError> {
        let tree = reconstruct_from_chain(
            &self.ctx.origin,
            self.ctx.params.tree_height,
            self.ctx.params.origin_deployment_block,
        )
        .await?;
        let commitment = deposit.commitment();
        let latest = inclusion(&tree, &commitment)?;

        let nullifier_hash = deposit.nullifier_hash();
        if self.ctx.destination.is_spent(nullifier_hash).await? {
            return Err(ClientError::AlreadySpent(nullifier_hash));
        }

        let chosen = self.registered_inclusion(&tree, &commitment, latest).await?;
        info!(root = %chosen.root, leaf_index = chosen.path.leaf_index, "generating withdrawal proof");

        let proof = self.proofs.generate(deposit, chosen, params).await?;
        let receipt = self.ctx.destination.withdraw(&proof).await?;
        info!(tx = %receipt.tx_hash, recipient = %params.recipient, "withdrawal accepted");
        Ok(receipt)
    }

    /// Pick the newest root that the destination registry knows and that
    /// already contains the deposit. The relayer may lag the origin pool by a
    /// few deposits.
    async fn registered_inclusion(
        &self,
        tree: &FixedMerkleTree,
        commitment: &Commitment,
        latest: Inclusion,
    ) -> Result<Inclusion, ClientError> {
        let destination = &self.ctx.destination;
        if destination.is_known_root(latest.root).await? {
            return Ok(latest);
        }

        let leaves: Vec<Commitment> = tree.leaves().iter().copied().map(Commitment).collect();
        let first = latest.path.leaf_index as usize + 1;
        let height = self.ctx.params.tree_height;

        // Roots of every prefix that contains the deposit, oldest first.
        let mut prefix = FixedMerkleTree::from_leaves(height, leaves[..first].iter().copied())?;
        let mut candidates = vec![(first, prefix.root())];
        for (offset, leaf) in leaves[first..].iter().enumerate() {
            prefix.insert(*leaf)?;
            candidates.push((first + offset + 1, prefix.root()));
        }
        // The full tree was checked above.
        candidates.pop();

        for (len, root) in candidates.into_iter().rev().take(ROOT_HISTORY_SIZE) {
            if destination.is_known_root(root).await? {
                warn!(%root, latest = %latest.root, "latest root not registered yet, using an older one");
                let older = FixedMerkleTree::from_leaves(height, leaves[..len].iter().copied())?;
                return Ok(inclusion(&older, commitment)?);
            }
        }

        Err(ClientError::UnknownRoot(latest.root))
    }

    /// Burn wrapped tokens and ask for `amount` to be released on the origin chain.
    pub async fn reclaim(&self, recipient: Address, amount: U256) -> Result<TxReceipt, ClientError> {
        self.check_token_balance(amount).await?;
        let receipt = self.ctx.destination.reclaim(recipient, amount).await?;
        info!(%recipient, %amount, tx = %receipt.tx_hash, "reclaim requested");
        Ok(receipt)
    }

    /// Move wrapped tokens to another destination account.
    pub async fn transfer(&self, recipient: Address, amount: U256) -> Result<TxReceipt, ClientError> {
        self.check_token_balance(amount).await?;
        let receipt = self.ctx.destination.transfer(recipient, amount).await?;
        info!(%recipient, %amount, tx = %receipt.tx_hash, "transfer sent");
        Ok(receipt)
    }

    pub async fn balance(
        &self,
        account: Address,
        scope: BalanceScope,
    ) -> Result<Balances, ClientError> {
        let wants = |s: BalanceScope| scope == BalanceScope::All || scope == s;
        let mut balances = Balances::default();
        if wants(BalanceScope::Origin) {
            balances.origin = Some(self.ctx.origin.native_balance(account).await?);
        }
        if wants(BalanceScope::Destination) {
            balances.destination = Some(self.ctx.destination.native_balance(account).await?);
        }
        if wants(BalanceScope::Token) {
            balances.token = Some(self.ctx.destination.token_balance(account).await?);
        }
        Ok(balances)
    }

    async fn check_token_balance(&self, amount: U256) -> Result<(), ClientError> {
        if amount.is_zero() {
            return Err(ClientError::ZeroAmount);
        }
        let available = self
            .ctx
            .destination
            .token_balance(self.ctx.destination.account())
            .await?;
        if available < amount {
            return Err(ClientError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        Ok(())
    }
}
