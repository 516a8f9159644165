use std::time::Duration;

use alloy::{
    contract::SolCallBuilder,
    network::EthereumWallet,
    primitives::{
        Address,
        B256,
        U256,
    },
    providers::{
        DynProvider,
        PendingTransactionError,
        Provider,
        ProviderBuilder,
        WatchTxError,
    },
    rpc::types::{
        Filter,
        Log,
    },
    signers::local::PrivateKeySigner,
    sol_types::{
        SolCall,
        SolEvent,
    },
    transports::http::reqwest::Url,
};
use tracing::{
    debug,
    warn,
};

use super::abi::{
    IDestinationWrappedETH,
    IOriginWrappedETH,
};
use crate::{
    domain::{
        commitment::Commitment,
        events::{
            LeafRecord,
            ReclaimRequest,
        },
        nullifier::NullifierHash,
        proof::WithdrawProof,
    },
    ports::{
        chain::{
            ChainError,
            DestinationChain,
            OriginChain,
        },
        TxReceipt,
    },
};

/// Maximum block range per log query (avoids RPC limits).
const BATCH_SIZE: u64 = 500;

/// How transactions are sized and awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxPolicy {
    /// Gas limit as a percentage of the node's estimate.
    pub gas_multiplier_percent: u64,
    /// How long to wait for the receipt after broadcast.
    pub receipt_timeout: Duration,
}

impl TxPolicy {
    pub fn gas_limit(&self, estimate: u64) -> u64 {
        estimate.saturating_mul(self.gas_multiplier_percent) / 100
    }
}

/// Revert reason embedded in a node's error text. Geth and anvil report
/// `execution reverted: <reason>`, hardhat `reverted with reason string '<reason>'`
/// and ganache `VM Exception while processing transaction: revert <reason>`.
fn revert_reason(message: &str) -> Option<String> {
    const MARKERS: [&str; 3] = [
        "execution reverted: ",
        "reverted with reason string '",
        "VM Exception while processing transaction: revert ",
    ];
    const TERMINATORS: [&str; 3] = [", data:", "'", "\""];

    MARKERS.iter().find_map(|marker| {
        let start = message.find(marker)? + marker.len();
        let rest = &message[start..];
        let end = TERMINATORS
            .iter()
            .filter_map(|t| rest.find(t))
            .min()
            .unwrap_or(rest.len());
        let reason = rest[..end].trim();
        (!reason.is_empty()).then(|| reason.to_string())
    })
}

fn rejection(message: &str) -> Option<ChainError> {
    revert_reason(message).map(ChainError::Rejected)
}

fn parse_rpc_url(rpc_url: &str) -> Result<Url, ChainError> {
    rpc_url
        .parse()
        .map_err(|e| ChainError::Rpc(format!("Invalid RPC URL: {}", e)))
}

/// Provider for one chain, signing when built with a key.
#[derive(Clone)]
struct Connection {
    provider: DynProvider,
    signer: Option<Signing>,
}

#[derive(Debug, Clone, Copy)]
struct Signing {
    account: Address,
    policy: TxPolicy,
}

impl Connection {
    fn new(rpc_url: &str, private_key: &str, policy: TxPolicy) -> Result<Self, ChainError> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| ChainError::Signer(format!("Invalid private key: {}", e)))?;

        let account = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider = DynProvider::new(
            ProviderBuilder::new()
                .wallet(wallet)
                .connect_http(parse_rpc_url(rpc_url)?),
        );

        Ok(Self {
            provider,
            signer: Some(Signing { account, policy }),
        })
    }

    /// Connection for reads only; every transaction fails with `ChainError::Signer`.
    fn read_only(rpc_url: &str) -> Result<Self, ChainError> {
        let provider = DynProvider::new(ProviderBuilder::new().connect_http(parse_rpc_url(rpc_url)?));
        Ok(Self {
            provider,
            signer: None,
        })
    }

    fn account(&self) -> Address {
        self.signer.map_or(Address::ZERO, |s| s.account)
    }

    /// Estimate, pad by the policy multiplier, send and wait for the receipt.
    ///
    /// A revert during estimation surfaces as `Rejected` with the contract's
    /// reason. A mined revert is replayed at its block to recover the reason.
    async fn submit<P, C>(
        &self,
        call: SolCallBuilder<P, C>,
        label: &str,
    ) -> Result<TxReceipt, ChainError>
    where
        P: Provider + Clone,
        C: SolCall,
    {
        let Some(signing) = self.signer else {
            return Err(ChainError::Signer(format!("{label}: no signing key configured")));
        };
        let estimate = call.estimate_gas().await.map_err(|e| {
            rejection(&e.to_string()).unwrap_or_else(|| ChainError::Estimate(format!("{label}: {e}")))
        })?;
        let gas = signing.policy.gas_limit(estimate);
        debug!(label, estimate, gas, "estimated gas");

        let replay = call.clone();
        let pending = call.gas(gas).send().await.map_err(|e| {
            rejection(&e.to_string())
                .unwrap_or_else(|| ChainError::TransactionFailed(format!("{label}: {e}")))
        })?;
        let tx_hash = *pending.tx_hash();
        debug!(label, %tx_hash, "transaction broadcast");

        let receipt = match pending
            .with_timeout(Some(signing.policy.receipt_timeout))
            .get_receipt()
            .await
        {
            Ok(receipt) => receipt,
            Err(PendingTransactionError::TxWatcher(WatchTxError::Timeout)) => {
                warn!(label, %tx_hash, "no receipt before timeout");
                return Err(ChainError::Timeout);
            }
            Err(e) => return Err(ChainError::TransactionFailed(format!("{label}: {e}"))),
        };

        if !receipt.status() {
            let reason = match receipt.block_number {
                Some(block) => replay
                    .block(block.into())
                    .call()
                    .await
                    .err()
                    .and_then(|e| revert_reason(&e.to_string())),
                None => None,
            };
            warn!(label, %tx_hash, ?reason, "transaction reverted");
            return Err(ChainError::Reverted { tx_hash, reason });
        }

        Ok(convert_receipt(&receipt))
    }

    /// Fetch logs of one event in `BATCH_SIZE` block windows, in chain order.
    async fn logs(
        &self,
        contract: Address,
        signature: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainError> {
        let mut logs = Vec::new();
        let mut from = from_block;
        while from <= to_block {
            let to = to_block.min(from.saturating_add(BATCH_SIZE - 1));
            let filter = Filter::new()
                .address(contract)
                .event_signature(signature)
                .from_block(from)
                .to_block(to);
            let batch = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| ChainError::Rpc(format!("logs {from}..{to}: {e}")))?;
            logs.extend(batch);
            if to == u64::MAX {
                break;
            }
            from = to + 1;
        }
        logs.sort_by_key(|l| (l.block_number, l.log_index));
        Ok(logs)
    }

    async fn native_balance(&self, account: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(account)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }
}

fn convert_receipt(receipt: &alloy::rpc::types::TransactionReceipt) -> TxReceipt {
    TxReceipt {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number.unwrap_or(0),
        gas_used: receipt.gas_used,
        success: receipt.status(),
    }
}

/// Origin pool adapter over JSON-RPC.
#[derive(Clone)]
pub struct EthereumOrigin {
    conn: Connection,
    contract: Address,
}

impl EthereumOrigin {
    pub fn new(
        rpc_url: &str,
        private_key: &str,
        contract: Address,
        policy: TxPolicy,
    ) -> Result<Self, ChainError> {
        Ok(Self {
            conn: Connection::new(rpc_url, private_key, policy)?,
            contract,
        })
    }

    /// Handle for balance and event queries without a key.
    pub fn read_only(rpc_url: &str, contract: Address) -> Result<Self, ChainError> {
        Ok(Self {
            conn: Connection::read_only(rpc_url)?,
            contract,
        })
    }

    /// Fixed deposit amount the pool accepts.
    pub async fn denomination(&self) -> Result<U256, ChainError> {
        IOriginWrappedETH::new(self.contract, &self.conn.provider)
            .denomination()
            .call()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }
}

impl OriginChain for EthereumOrigin {
    fn account(&self) -> Address {
        self.conn.account()
    }

    async fn deposit(&self, commitment: Commitment, value: U256) -> Result<TxReceipt, ChainError> {
        let pool = IOriginWrappedETH::new(self.contract, &self.conn.provider);
        self.conn
            .submit(pool.deposit(commitment.0).value(value), "deposit")
            .await
    }

    async fn deposit_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LeafRecord>, ChainError> {
        let logs = self
            .conn
            .logs(
                self.contract,
                IOriginWrappedETH::Deposit::SIGNATURE_HASH,
                from_block,
                to_block,
            )
            .await?;

        let mut records = Vec::with_capacity(logs.len());
        for log in &logs {
            match log.log_decode::<IOriginWrappedETH::Deposit>() {
                Ok(event) => records.push(LeafRecord {
                    commitment: Commitment(event.inner.commitment),
                    leaf_index: u64::from(event.inner.leafIndex),
                    root: event.inner.root,
                    block_number: log.block_number.unwrap_or_default(),
                    log_index: log.log_index.unwrap_or_default(),
                }),
                Err(e) => warn!("origin: Deposit decode error: {e}"),
            }
        }
        Ok(records)
    }

    async fn latest_root(&self) -> Result<B256, ChainError> {
        IOriginWrappedETH::new(self.contract, &self.conn.provider)
            .getLastRoot()
            .call()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn release_funds(
        &self,
        recipient: Address,
        amount: U256,
    ) -> Result<TxReceipt, ChainError> {
        let pool = IOriginWrappedETH::new(self.contract, &self.conn.provider);
        self.conn
            .submit(pool.releaseFunds(recipient, amount), "releaseFunds")
            .await
    }

    async fn native_balance(&self, account: Address) -> Result<U256, ChainError> {
        self.conn.native_balance(account).await
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.conn.block_number().await
    }
}

/// Destination pool and wrapped-token adapter over JSON-RPC.
#[derive(Clone)]
pub struct EthereumDestination {
    conn: Connection,
    contract: Address,
}

impl EthereumDestination {
    pub fn new(
        rpc_url: &str,
        private_key: &str,
        contract: Address,
        policy: TxPolicy,
    ) -> Result<Self, ChainError> {
        Ok(Self {
            conn: Connection::new(rpc_url, private_key, policy)?,
            contract,
        })
    }

    /// Handle for balance and event queries without a key.
    pub fn read_only(rpc_url: &str, contract: Address) -> Result<Self, ChainError> {
        Ok(Self {
            conn: Connection::read_only(rpc_url)?,
            contract,
        })
    }
}

impl DestinationChain for EthereumDestination {
    fn account(&self) -> Address {
        self.conn.account()
    }

    async fn submit_root(&self, root: B256) -> Result<TxReceipt, ChainError> {
        let pool = IDestinationWrappedETH::new(self.contract, &self.conn.provider);
        self.conn.submit(pool.submitRoot(root), "submitRoot").await
    }

    async fn reclaim_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ReclaimRequest>, ChainError> {
        let logs = self
            .conn
            .logs(
                self.contract,
                IDestinationWrappedETH::Reclaim::SIGNATURE_HASH,
                from_block,
                to_block,
            )
            .await?;

        let mut requests = Vec::with_capacity(logs.len());
        for log in &logs {
            match log.log_decode::<IDestinationWrappedETH::Reclaim>() {
                Ok(event) => requests.push(ReclaimRequest {
                    recipient: event.inner.recipient,
                    amount: event.inner.amount,
                    block_number: log.block_number.unwrap_or_default(),
                    log_index: log.log_index.unwrap_or_default(),
                }),
                Err(e) => warn!("destination: Reclaim decode error: {e}"),
            }
        }
        Ok(requests)
    }

    async fn withdraw(&self, proof: &WithdrawProof) -> Result<TxReceipt, ChainError> {
        let pool = IDestinationWrappedETH::new(self.contract, &self.conn.provider);
        let signals = &proof.public_signals;
        let call = pool
            .withdraw(
                proof.proof.clone(),
                signals.root,
                signals.nullifier_hash.0,
                signals.recipient,
                signals.relayer,
                signals.fee,
                signals.refund,
            )
            .value(signals.refund);
        self.conn.submit(call, "withdraw").await
    }

    async fn is_known_root(&self, root: B256) -> Result<bool, ChainError> {
        IDestinationWrappedETH::new(self.contract, &self.conn.provider)
            .isKnownRoot(root)
            .call()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn is_spent(&self, nullifier_hash: NullifierHash) -> Result<bool, ChainError> {
        IDestinationWrappedETH::new(self.contract, &self.conn.provider)
            .isSpent(nullifier_hash.0)
            .call()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn token_balance(&self, account: Address) -> Result<U256, ChainError> {
        IDestinationWrappedETH::new(self.contract, &self.conn.provider)
            .balanceOf(account)
            .call()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn native_balance(&self, account: Address) -> Result<U256, ChainError> {
        self.conn.native_balance(account).await
    }

    async fn reclaim(&self, recipient: Address, amount: U256) -> Result<TxReceipt, ChainError> {
        let pool = IDestinationWrappedETH::new(self.contract, &self.conn.provider);
        self.conn
            .submit(pool.reclaim(recipient, amount), "reclaim")
            .await
    }

    async fn transfer(&self, recipient: Address, amount: U256) -> Result<TxReceipt, ChainError> {
        let pool = IDestinationWrappedETH::new(self.contract, &self.conn.provider);
        self.conn
            .submit(pool.transfer(recipient, amount), "transfer")
            .await
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.conn.block_number().await
    }
}
