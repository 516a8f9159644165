//! End-to-end bridge flows on the in-memory chains, with the relayer running
//! as a background task between them.

use std::{
    future::Future,
    sync::Arc,
    time::Duration,
};

use alloy::primitives::{
    Address,
    B256,
    U256,
};
use shielded_bridge::{
    adapters::{
        checkpoint::InMemoryCheckpoint,
        memory_chain::{
            InMemoryDestination,
            InMemoryOrigin,
        },
        mock_prover::MockProver,
    },
    client::{
        BridgeClient,
        ClientError,
    },
    context::{
        BridgeContext,
        BridgeParams,
    },
    domain::{
        deposit::Deposit,
        merkle::FixedMerkleTree,
        witness::{
            WithdrawParams,
            WithdrawWitness,
        },
    },
    ports::{
        chain::{
            ChainError,
            DestinationChain,
            OriginChain,
        },
        prover::Prover,
    },
    proof_service::ProofService,
    relayer::{
        subscription::PollOptions,
        Relayer,
        RelayerError,
        RelayerReport,
    },
};
use tokio::{
    sync::watch,
    task::JoinHandle,
};

const HEIGHT: usize = 4;
const BRIDGE: Address = Address::repeat_byte(0xb0);
const USER: Address = Address::repeat_byte(0xa1);
const RECIPIENT: Address = Address::repeat_byte(0xc2);

type Destination = InMemoryDestination<MockProver>;

fn denomination() -> U256 {
    U256::from(10u64).pow(U256::from(17u64))
}

fn params() -> BridgeParams {
    BridgeParams {
        denomination: denomination(),
        tree_height: HEIGHT,
        origin_deployment_block: 0,
        destination_deployment_block: 0,
    }
}

struct Harness {
    client: BridgeClient<InMemoryOrigin, Destination, MockProver>,
    /// Handles signing as the user.
    origin: InMemoryOrigin,
    destination: Destination,
    stop: watch::Sender<bool>,
    relayer: JoinHandle<Result<RelayerReport, RelayerError>>,
}

impl Harness {
    async fn start() -> Self {
        let prover = Arc::new(MockProver::new(HEIGHT));
        let origin = InMemoryOrigin::new(denomination(), HEIGHT, BRIDGE, USER).unwrap();
        origin.fund(USER, denomination() * U256::from(10u64)).await;
        let destination = InMemoryDestination::new(denomination(), Arc::clone(&prover), BRIDGE, USER);

        let bridge_ctx = Arc::new(BridgeContext::new(
            origin.connect(BRIDGE),
            destination.connect(BRIDGE),
            params(),
        ));
        let relayer = Relayer::new(
            bridge_ctx,
            Arc::new(InMemoryCheckpoint::new()),
            PollOptions {
                poll_interval: Duration::from_millis(5),
                confirmations: 0,
            },
        );
        let (stop, shutdown) = watch::channel(false);
        let relayer = tokio::spawn(async move { relayer.run(shutdown).await });

        let user_ctx = Arc::new(BridgeContext::new(origin.clone(), destination.clone(), params()));
        let proofs = ProofService::new(prover, HEIGHT, 1, Duration::from_secs(5));

        Self {
            client: BridgeClient::new(user_ctx, proofs),
            origin,
            destination,
            stop,
            relayer,
        }
    }

    async fn wait_for_latest_root(&self) {
        let root = self.origin.latest_root().await.unwrap();
        let destination = self.destination.clone();
        eventually(move || {
            let destination = destination.clone();
            async move { destination.is_known_root(root).await.unwrap() }
        })
        .await;
    }

    async fn shutdown(self) -> RelayerReport {
        self.stop.send(true).unwrap();
        self.relayer.await.unwrap().unwrap()
    }
}

async fn eventually<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_deposit_relay_withdraw_once() {
    let h = Harness::start().await;

    let deposited = h.client.deposit().await.unwrap();
    h.wait_for_latest_root().await;

    h.client
        .withdraw_to_destination(&deposited.deposit, &WithdrawParams::direct(RECIPIENT))
        .await
        .unwrap();
    assert_eq!(h.destination.token_balance(RECIPIENT).await.unwrap(), denomination());
    assert!(h
        .destination
        .is_spent(deposited.deposit.nullifier_hash())
        .await
        .unwrap());

    let err = h
        .client
        .withdraw_to_destination(&deposited.deposit, &WithdrawParams::direct(RECIPIENT))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::AlreadySpent(_)));
    assert_eq!(h.destination.token_balance(RECIPIENT).await.unwrap(), denomination());

    let report = h.shutdown().await;
    assert_eq!(report.roots.forwarded, 1);
    assert_eq!(report.roots.abandoned, 0);
}

#[tokio::test]
async fn test_several_deposits_each_withdrawable() {
    let h = Harness::start().await;

    let mut deposits = Vec::new();
    for _ in 0..3 {
        deposits.push(h.client.deposit().await.unwrap().deposit);
    }
    h.wait_for_latest_root().await;

    for deposit in deposits.iter().rev() {
        h.client
            .withdraw_to_destination(deposit, &WithdrawParams::direct(RECIPIENT))
            .await
            .unwrap();
    }
    assert_eq!(
        h.destination.token_balance(RECIPIENT).await.unwrap(),
        denomination() * U256::from(3u64)
    );
    h.shutdown().await;
}

#[tokio::test]
async fn test_wrong_denomination_rejected_without_leaf() {
    let h = Harness::start().await;

    let err = h
        .origin
        .deposit(Deposit::random().commitment(), denomination() - U256::from(1u64))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Rejected(_)));
    assert!(h.origin.deposit_events(0, u64::MAX).await.unwrap().is_empty());
    assert_eq!(h.origin.locked().await, U256::ZERO);
    h.shutdown().await;
}

#[tokio::test]
async fn test_withdraw_against_unrelayed_root_rejected() {
    let h = Harness::start().await;

    // A proof over a tree the origin pool never held.
    let deposit = Deposit::random();
    let tree = FixedMerkleTree::from_leaves(HEIGHT, [deposit.commitment()]).unwrap();
    let witness = WithdrawWitness::new(
        &deposit,
        tree.root(),
        tree.path(0).unwrap(),
        &WithdrawParams::direct(RECIPIENT),
    );
    let proof = MockProver::new(HEIGHT).full_prove(&witness).await.unwrap();

    let err = h.destination.withdraw(&proof).await.unwrap_err();
    assert!(err.to_string().contains("Cannot find your merkle root"));
    assert!(!h.destination.is_spent(deposit.nullifier_hash()).await.unwrap());
    assert!(!h.destination.is_known_root(B256::ZERO).await.unwrap());
    h.shutdown().await;
}

#[tokio::test]
async fn test_reclaim_released_by_relayer() {
    let h = Harness::start().await;
    let payee = Address::repeat_byte(0xd3);

    let deposited = h.client.deposit().await.unwrap();
    h.wait_for_latest_root().await;
    h.client
        .withdraw_to_destination(&deposited.deposit, &WithdrawParams::direct(USER))
        .await
        .unwrap();

    let amount = denomination() / U256::from(4u64);
    h.client.reclaim(payee, amount).await.unwrap();

    let origin = h.origin.clone();
    eventually(move || {
        let origin = origin.clone();
        async move { origin.native_balance(payee).await.unwrap() == amount }
    })
    .await;
    assert_eq!(h.origin.locked().await, denomination() - amount);
    assert_eq!(
        h.destination.token_balance(USER).await.unwrap(),
        denomination() - amount
    );

    let report = h.shutdown().await;
    assert_eq!(report.releases.forwarded, 1);
    assert_eq!(report.releases.abandoned, 0);
}
