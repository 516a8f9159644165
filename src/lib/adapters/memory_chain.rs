use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::Arc,
};

use alloy::primitives::{
    keccak256,
    Address,
    B256,
    U256,
};
use tokio::sync::Mutex;

use crate::{
    domain::{
        commitment::Commitment,
        events::{
            LeafRecord,
            ReclaimRequest,
        },
        merkle::{
            FixedMerkleTree,
            TreeError,
        },
        nullifier::NullifierHash,
        proof::WithdrawProof,
        root_history::RootHistory,
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
};

/// Gas charged per simulated transaction.
const SIMULATED_GAS: u64 = 21_000;

/// Block clock of one simulated chain. Every transaction is mined in its own block.
#[derive(Debug, Default)]
struct Ledger {
    block: u64,
    nonce: u64,
    native: HashMap<Address, U256>,
}

impl Ledger {
    fn mine(&mut self, tag: &[u8], sender: Address) -> TxReceipt {
        self.block += 1;
        self.nonce += 1;
        let mut preimage = tag.to_vec();
        preimage.extend_from_slice(sender.as_slice());
        preimage.extend_from_slice(&self.nonce.to_be_bytes());
        TxReceipt {
            tx_hash: keccak256(&preimage),
            block_number: self.block,
            gas_used: SIMULATED_GAS,
            success: true,
        }
    }

    fn balance(&self, account: &Address) -> U256 {
        self.native.get(account).copied().unwrap_or_default()
    }

    fn debit(&mut self, account: Address, amount: U256) -> Result<(), ChainError> {
        let balance = self.balance(&account);
        if balance < amount {
            return Err(ChainError::Rejected("insufficient funds".into()));
        }
        self.native.insert(account, balance - amount);
        Ok(())
    }

    fn credit(&mut self, account: Address, amount: U256) {
        *self.native.entry(account).or_default() += amount;
    }
}

struct OriginState {
    ledger: Ledger,
    tree: FixedMerkleTree,
    commitments: HashSet<Commitment>,
    events: Vec<LeafRecord>,
    locked: U256,
}

/// In-process model of the origin pool contract.
///
/// Handles obtained through [`InMemoryOrigin::connect`] share state and differ
/// only in the signing account.
#[derive(Clone)]
pub struct InMemoryOrigin {
    state: Arc<Mutex<OriginState>>,
    denomination: U256,
    bridge: Address,
    account: Address,
}

impl InMemoryOrigin {
    pub fn new(
        denomination: U256,
        tree_height: usize,
        bridge: Address,
        account: Address,
    ) -> Result<Self, TreeError> {
        Ok(Self {
            state: Arc::new(Mutex::new(OriginState {
                ledger: Ledger::default(),
                tree: FixedMerkleTree::new(tree_height)?,
                commitments: HashSet::new(),
                events: Vec::new(),
                locked: U256::ZERO,
            })),
            denomination,
            bridge,
            account,
        })
    }

    /// Another handle on the same pool, signing as `account`.
    pub fn connect(&self, account: Address) -> Self {
        Self {
            account,
            ..self.clone()
        }
    }

    /// Credit native balance to an account.
    pub async fn fund(&self, account: Address, amount: U256) {
        self.state.lock().await.ledger.credit(account, amount);
    }

    /// Native asset held by the pool.
    pub async fn locked(&self) -> U256 {
        self.state.lock().await.locked
    }

    /// Append a leaf record without running `deposit`.
    /// Models a chain whose history the pool did not produce itself.
    pub async fn inject_event(&self, record: LeafRecord) {
        let mut state = self.state.lock().await;
        state.ledger.block = state.ledger.block.max(record.block_number);
        state.events.push(record);
    }
}

impl OriginChain for InMemoryOrigin {
    fn account(&self) -> Address {
        self.account
    }

    async fn deposit(&self, commitment: Commitment, value: U256) -> Result<TxReceipt, ChainError> {
        let mut state = self.state.lock().await;

        if value != self.denomination {
            return Err(ChainError::Rejected(
                "Please send exactly the denomination along with the deposit".into(),
            ));
        }
        if state.commitments.contains(&commitment) {
            return Err(ChainError::Rejected("The commitment has been submitted".into()));
        }
        if state.tree.len() >= state.tree.capacity() {
            return Err(ChainError::Rejected(
                "Merkle tree is full. No more leaves can be added".into(),
            ));
        }
        state.ledger.debit(self.account, value)?;

        let leaf_index = state
            .tree
            .insert(commitment)
            .map_err(|e| ChainError::Rejected(e.to_string()))?;
        state.commitments.insert(commitment);
        state.locked += value;

        let receipt = state.ledger.mine(b"deposit", self.account);
        let root = state.tree.root();
        state.events.push(LeafRecord {
            commitment,
            leaf_index,
            root,
            block_number: receipt.block_number,
            log_index: 0,
        });
        Ok(receipt)
    }

    async fn deposit_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LeafRecord>, ChainError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| (from_block..=to_block).contains(&e.block_number))
            .cloned()
            .collect())
    }

    async fn latest_root(&self) -> Result<B256, ChainError> {
        Ok(self.state.lock().await.tree.root())
    }

    async fn release_funds(
        &self,
        recipient: Address,
        amount: U256,
    ) -> Result<TxReceipt, ChainError> {
        let mut state = self.state.lock().await;
        if self.account != self.bridge {
            return Err(ChainError::Rejected("Only the bridge can release funds".into()));
        }
        if state.locked < amount {
            return Err(ChainError::Rejected("Not enough locked funds".into()));
        }
        state.locked -= amount;
        state.ledger.credit(recipient, amount);
        Ok(state.ledger.mine(b"releaseFunds", self.account))
    }

    async fn native_balance(&self, account: Address) -> Result<U256, ChainError> {
        Ok(self.state.lock().await.ledger.balance(&account))
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().await.ledger.block)
    }
}

struct DestinationState {
    ledger: Ledger,
    roots: RootHistory,
    spent: HashSet<NullifierHash>,
    tokens: HashMap<Address, U256>,
    events: Vec<ReclaimRequest>,
}

impl DestinationState {
    fn token_balance(&self, account: &Address) -> U256 {
        self.tokens.get(account).copied().unwrap_or_default()
    }

    fn burn(&mut self, account: Address, amount: U256) -> Result<(), ChainError> {
        let balance = self.token_balance(&account);
        if balance < amount {
            return Err(ChainError::Rejected("transfer amount exceeds balance".into()));
        }
        self.tokens.insert(account, balance - amount);
        Ok(())
    }

    fn mint(&mut self, account: Address, amount: U256) {
        *self.tokens.entry(account).or_default() += amount;
    }
}

/// In-process model of the destination contract: root registry, nullifier
/// ledger and wrapped token. Proofs are checked with `P`.
pub struct InMemoryDestination<P> {
    state: Arc<Mutex<DestinationState>>,
    prover: Arc<P>,
    denomination: U256,
    bridge: Address,
    account: Address,
}

impl<P> Clone for InMemoryDestination<P> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            prover: Arc::clone(&self.prover),
            denomination: self.denomination,
            bridge: self.bridge,
            account: self.account,
        }
    }
}

impl<P: Prover> InMemoryDestination<P> {
    pub fn new(denomination: U256, prover: Arc<P>, bridge: Address, account: Address) -> Self {
        Self {
            state: Arc::new(Mutex::new(DestinationState {
                ledger: Ledger::default(),
                roots: RootHistory::new(),
                spent: HashSet::new(),
                tokens: HashMap::new(),
                events: Vec::new(),
            })),
            prover,
            denomination,
            bridge,
            account,
        }
    }

    /// Another handle on the same contract, signing as `account`.
    pub fn connect(&self, account: Address) -> Self {
        Self {
            account,
            ..self.clone()
        }
    }

    /// Credit native balance to an account.
    pub async fn fund(&self, account: Address, amount: U256) {
        self.state.lock().await.ledger.credit(account, amount);
    }
}

impl<P: Prover> DestinationChain for InMemoryDestination<P> {
    fn account(&self) -> Address {
        self.account
    }

    async fn submit_root(&self, root: B256) -> Result<TxReceipt, ChainError> {
        let mut state = self.state.lock().await;
        if self.account != self.bridge {
            return Err(ChainError::Rejected("Only the bridge can submit roots".into()));
        }
        state.roots.push(root);
        Ok(state.ledger.mine(b"submitRoot", self.account))
    }

    async fn reclaim_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ReclaimRequest>, ChainError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| (from_block..=to_block).contains(&e.block_number))
            .cloned()
            .collect())
    }

    async fn withdraw(&self, proof: &WithdrawProof) -> Result<TxReceipt, ChainError> {
        let mut state = self.state.lock().await;
        let signals = &proof.public_signals;

        if signals.fee > self.denomination {
            return Err(ChainError::Rejected("Fee exceeds transfer value".into()));
        }
        if !signals.refund.is_zero() {
            return Err(ChainError::Rejected(
                "Refund value is supposed to be zero for ETH instance".into(),
            ));
        }
        if state.spent.contains(&signals.nullifier_hash) {
            return Err(ChainError::Rejected("The note has been already spent".into()));
        }
        if !state.roots.contains(&signals.root) {
            return Err(ChainError::Rejected("Cannot find your merkle root".into()));
        }
        let valid = self
            .prover
            .verify(proof)
            .await
            .map_err(|e| ChainError::Rejected(format!("verifier error: {e}")))?;
        if !valid {
            return Err(ChainError::Rejected("Invalid withdraw proof".into()));
        }

        state.spent.insert(signals.nullifier_hash);
        state.mint(signals.recipient, self.denomination - signals.fee);
        if !signals.fee.is_zero() {
            state.mint(signals.relayer, signals.fee);
        }
        Ok(state.ledger.mine(b"withdraw", self.account))
    }

    async fn is_known_root(&self, root: B256) -> Result<bool, ChainError> {
        Ok(self.state.lock().await.roots.contains(&root))
    }

    async fn is_spent(&self, nullifier_hash: NullifierHash) -> Result<bool, ChainError> {
        Ok(self.state.lock().await.spent.contains(&nullifier_hash))
    }

    async fn token_balance(&self, account: Address) -> Result<U256, ChainError> {
        Ok(self.state.lock().await.token_balance(&account))
    }

    async fn native_balance(&self, account: Address) -> Result<U256, ChainError> {
        Ok(self.state.lock().await.ledger.balance(&account))
    }

    async fn reclaim(&self, recipient: Address, amount: U256) -> Result<TxReceipt, ChainError> {
        let mut state = self.state.lock().await;
        if amount.is_zero() {
            return Err(ChainError::Rejected("Amount must be positive".into()));
        }
        state.burn(self.account, amount)?;
        let receipt = state.ledger.mine(b"reclaim", self.account);
        state.events.push(ReclaimRequest {
            recipient,
            amount,
            block_number: receipt.block_number,
            log_index: 0,
        });
        Ok(receipt)
    }

    async fn transfer(&self, recipient: Address, amount: U256) -> Result<TxReceipt, ChainError> {
        let mut state = self.state.lock().await;
        state.burn(self.account, amount)?;
        state.mint(recipient, amount);
        Ok(state.ledger.mine(b"transfer", self.account))
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().await.ledger.block)
    }
}
