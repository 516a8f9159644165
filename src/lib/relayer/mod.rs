//! Two independent relay legs between the chains.
//!
//! - Root leg: every origin `Deposit` root is registered on the destination.
//! - Release leg: every destination `Reclaim` is paid out on the origin.
//!
//! Each leg runs its own poller task feeding one consumer task through a
//! bounded channel. The consumer handles one event at a time and records its
//! watermark in a [`CheckpointStore`], so a restart resumes after the last
//! handled event.

pub mod leg;
pub mod subscription;

use std::{
    future::Future,
    sync::Arc,
};

use tokio::{
    sync::watch,
    task::JoinError,
};
use tracing::{
    debug,
    error,
    info,
};

use self::{
    leg::{
        Delivery,
        Forwarded,
        RelayLeg,
        ReleaseLeg,
        RootLeg,
    },
    subscription::{
        subscribe,
        FeedItem,
        PollOptions,
    },
};
use crate::{
    context::BridgeContext,
    domain::events::{
        EventPosition,
        LeafRecord,
    },
    ports::{
        chain::{
            ChainError,
            DestinationChain,
            OriginChain,
        },
        checkpoint::{
            CheckpointError,
            CheckpointStore,
        },
    },
};

#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("relay task failed: {0}")]
    Task(#[from] JoinError),
}

/// Counters of one leg over a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LegStats {
    /// Events that produced a transaction.
    pub forwarded: u64,
    /// Events the target chain already reflected.
    pub skipped: u64,
    /// Events whose transaction failed. They are logged and not retried.
    pub abandoned: u64,
    /// Watermark at the end of the run.
    pub watermark: Option<EventPosition>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayerReport {
    pub roots: LegStats,
    pub releases: LegStats,
}

pub struct Relayer<O, D, C> {
    root_leg: Arc<RootLeg<O, D>>,
    release_leg: Arc<ReleaseLeg<O, D>>,
    checkpoints: Arc<C>,
    options: PollOptions,
}

impl<O, D, C> Relayer<O, D, C>
where
    O: OriginChain + 'static,
    D: DestinationChain + 'static,
    C: CheckpointStore + 'static,
{
    pub fn new(ctx: Arc<BridgeContext<O, D>>, checkpoints: Arc<C>, options: PollOptions) -> Self {
        Self {
            root_leg: Arc::new(RootLeg::new(Arc::clone(&ctx))),
            release_leg: Arc::new(ReleaseLeg::new(ctx)),
            checkpoints,
            options,
        }
    }

    /// Register the root carried by a deposit event on the destination.
    pub async fn forward_root(&self, record: &LeafRecord) -> Result<Forwarded, RelayerError> {
        Ok(self.root_leg.forward(record).await?)
    }

    /// Run both legs until `shutdown` flips to true, then drain what was
    /// already polled and return.
    ///
    /// A leg that fails stops the other one too, and its error is returned.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<RelayerReport, RelayerError> {
        let (halt, halted) = watch::channel(false);
        let halt = Arc::new(halt);
        let relay_shutdown = tokio::spawn(relay_shutdown(shutdown, Arc::clone(&halt)));

        let roots = tokio::spawn(supervise(
            RootLeg::<O, D>::NAME,
            drive(
                Arc::clone(&self.root_leg),
                Arc::clone(&self.checkpoints),
                self.options,
                halted.clone(),
            ),
            Arc::clone(&halt),
        ));
        let releases = tokio::spawn(supervise(
            ReleaseLeg::<O, D>::NAME,
            drive(
                Arc::clone(&self.release_leg),
                Arc::clone(&self.checkpoints),
                self.options,
                halted,
            ),
            halt,
        ));

        let (roots, releases) = tokio::join!(roots, releases);
        relay_shutdown.abort();
        let report = RelayerReport {
            roots: roots??,
            releases: releases??,
        };
        info!(?report, "relayer stopped");
        Ok(report)
    }
}

/// Flip `halt` once the caller asks for shutdown or drops its sender.
async fn relay_shutdown(mut shutdown: watch::Receiver<bool>, halt: Arc<watch::Sender<bool>>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
    halt.send_replace(true);
}

/// Await one leg and halt its sibling when it fails.
async fn supervise<F>(
    leg: &'static str,
    drive: F,
    halt: Arc<watch::Sender<bool>>,
) -> Result<LegStats, RelayerError>
where
    F: Future<Output = Result<LegStats, RelayerError>>,
{
    let result = drive.await;
    if let Err(e) = &result {
        error!(leg, "relay leg failed, stopping relayer: {e}");
        halt.send_replace(true);
    }
    result
}

/// Consume one leg's feed: `Idle` while waiting, `Processing` for one event at a time.
async fn drive<L, C>(
    leg: Arc<L>,
    checkpoints: Arc<C>,
    options: PollOptions,
    shutdown: watch::Receiver<bool>,
) -> Result<LegStats, RelayerError>
where
    L: RelayLeg,
    C: CheckpointStore,
{
    let resume = checkpoints.load(L::NAME).await?;
    info!(leg = L::NAME, ?resume, "starting relay leg");

    let mut stats = LegStats {
        watermark: resume,
        ..LegStats::default()
    };
    let mut feed = subscribe(Arc::clone(&leg), resume, options, shutdown);

    while let Some(item) = feed.recv().await {
        match item {
            FeedItem::Event(event) => {
                let position = L::position(&event);
                debug!(leg = L::NAME, ?position, ?event, "processing event");

                if leg.delivery() == Delivery::AtMostOnce {
                    checkpoints.save(L::NAME, position).await?;
                }
                match leg.forward(&event).await {
                    Ok(Forwarded::Sent(receipt)) => {
                        info!(
                            leg = L::NAME,
                            ?position,
                            tx = %receipt.tx_hash,
                            block = receipt.block_number,
                            "event forwarded"
                        );
                        stats.forwarded += 1;
                    }
                    Ok(Forwarded::Skipped) => stats.skipped += 1,
                    Err(e) => {
                        error!(leg = L::NAME, ?position, ?event, "forwarding failed, event abandoned: {e}");
                        stats.abandoned += 1;
                    }
                }
                if leg.delivery() == Delivery::AtLeastOnce {
                    checkpoints.save(L::NAME, position).await?;
                }
                stats.watermark = Some(position);
            }
            FeedItem::Synced(block) => {
                let position = EventPosition::end_of(block);
                if stats.watermark.map_or(true, |w| w < position) {
                    checkpoints.save(L::NAME, position).await?;
                    stats.watermark = Some(position);
                }
            }
        }
    }

    info!(leg = L::NAME, ?stats, "relay leg stopped");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::primitives::{
        Address,
        U256,
    };

    use super::*;
    use crate::{
        adapters::{
            checkpoint::InMemoryCheckpoint,
            memory_chain::{
                InMemoryDestination,
                InMemoryOrigin,
            },
            mock_prover::MockProver,
        },
        context::BridgeParams,
        domain::{
            deposit::Deposit,
            merkle::FixedMerkleTree,
            witness::{
                WithdrawParams,
                WithdrawWitness,
            },
        },
        ports::prover::Prover,
    };

    const HEIGHT: usize = 4;
    const BRIDGE: Address = Address::repeat_byte(0xb0);
    const ALICE: Address = Address::repeat_byte(0xa1);

    type Origin = InMemoryOrigin;
    type Destination = InMemoryDestination<MockProver>;
    type Ctx = BridgeContext<Origin, Destination>;
    type TestRelayer = Relayer<Origin, Destination, InMemoryCheckpoint>;

    fn denomination() -> U256 {
        U256::from(100u64)
    }

    /// Context signing as the bridge. ALICE holds native funds on the origin.
    async fn setup() -> Arc<Ctx> {
        let origin = InMemoryOrigin::new(denomination(), HEIGHT, BRIDGE, BRIDGE).unwrap();
        let destination =
            InMemoryDestination::new(denomination(), Arc::new(MockProver::new(HEIGHT)), BRIDGE, BRIDGE);
        origin.fund(ALICE, U256::from(1_000u64)).await;
        let params = BridgeParams {
            denomination: denomination(),
            tree_height: HEIGHT,
            origin_deployment_block: 0,
            destination_deployment_block: 0,
        };
        Arc::new(BridgeContext::new(origin, destination, params))
    }

    /// Mint one denomination of wrapped tokens to `account` through a withdrawal
    /// against a root registered directly by the bridge.
    async fn mint_tokens(ctx: &Ctx, account: Address) {
        let deposit = Deposit::random();
        let tree = FixedMerkleTree::from_leaves(HEIGHT, [deposit.commitment()]).unwrap();
        ctx.destination.submit_root(tree.root()).await.unwrap();
        let witness = WithdrawWitness::new(
            &deposit,
            tree.root(),
            tree.path(0).unwrap(),
            &WithdrawParams::direct(account),
        );
        let proof = MockProver::new(HEIGHT).full_prove(&witness).await.unwrap();
        ctx.destination.connect(account).withdraw(&proof).await.unwrap();
    }

    fn options() -> PollOptions {
        PollOptions {
            poll_interval: Duration::from_millis(5),
            confirmations: 0,
        }
    }

    /// Run the relayer until `done` holds, then shut it down and return its report.
    async fn run_until<F, Fut>(relayer: TestRelayer, done: F) -> RelayerReport
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let (stop, shutdown) = watch::channel(false);
        let running = tokio::spawn(async move { relayer.run(shutdown).await });
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("relayer did not reach the expected state");
        stop.send(true).unwrap();
        running.await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_deposit_roots_registered() {
        let ctx = setup().await;
        let user = ctx.origin.connect(ALICE);
        for _ in 0..3 {
            user.deposit(Deposit::random().commitment(), denomination())
                .await
                .unwrap();
        }
        let roots: Vec<_> = ctx
            .origin
            .deposit_events(0, u64::MAX)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.root)
            .collect();
        let last_block = ctx.origin.block_number().await.unwrap();

        let checkpoints = Arc::new(InMemoryCheckpoint::new());
        let relayer = Relayer::new(Arc::clone(&ctx), Arc::clone(&checkpoints), options());
        let report = run_until(relayer, || {
            let checkpoints = Arc::clone(&checkpoints);
            async move {
                checkpoints
                    .load(RootLeg::<Origin, Destination>::NAME)
                    .await
                    .unwrap()
                    .is_some_and(|p| p.block >= last_block)
            }
        })
        .await;

        for root in &roots {
            assert!(ctx.destination.is_known_root(*root).await.unwrap());
        }
        assert_eq!(report.roots.forwarded, 3);
        assert_eq!(report.roots.abandoned, 0);
    }

    #[tokio::test]
    async fn test_restart_resumes_after_watermark() {
        let ctx = setup().await;
        let user = ctx.origin.connect(ALICE);
        user.deposit(Deposit::random().commitment(), denomination())
            .await
            .unwrap();
        let first_block = ctx.origin.block_number().await.unwrap();

        let checkpoints = Arc::new(InMemoryCheckpoint::new());
        let relayer = Relayer::new(Arc::clone(&ctx), Arc::clone(&checkpoints), options());
        let first = run_until(relayer, || {
            let checkpoints = Arc::clone(&checkpoints);
            async move {
                checkpoints
                    .load(RootLeg::<Origin, Destination>::NAME)
                    .await
                    .unwrap()
                    .is_some_and(|p| p.block >= first_block)
            }
        })
        .await;
        assert_eq!(first.roots.forwarded, 1);

        user.deposit(Deposit::random().commitment(), denomination())
            .await
            .unwrap();
        let second_block = ctx.origin.block_number().await.unwrap();
        let relayer = Relayer::new(Arc::clone(&ctx), Arc::clone(&checkpoints), options());
        let second = run_until(relayer, || {
            let checkpoints = Arc::clone(&checkpoints);
            async move {
                checkpoints
                    .load(RootLeg::<Origin, Destination>::NAME)
                    .await
                    .unwrap()
                    .is_some_and(|p| p.block >= second_block)
            }
        })
        .await;

        // The first root is behind the watermark and never looked at again.
        assert_eq!(second.roots.forwarded, 1);
        assert_eq!(second.roots.skipped, 0);
    }

    #[tokio::test]
    async fn test_known_root_skipped() {
        let ctx = setup().await;
        ctx.origin
            .connect(ALICE)
            .deposit(Deposit::random().commitment(), denomination())
            .await
            .unwrap();
        let record = ctx.origin.deposit_events(0, u64::MAX).await.unwrap().remove(0);

        let relayer = Relayer::new(Arc::clone(&ctx), Arc::new(InMemoryCheckpoint::new()), options());
        assert!(matches!(relayer.forward_root(&record).await.unwrap(), Forwarded::Sent(_)));
        assert_eq!(relayer.forward_root(&record).await.unwrap(), Forwarded::Skipped);
    }

    #[tokio::test]
    async fn test_reclaim_released_on_origin() {
        let ctx = setup().await;
        ctx.origin
            .connect(ALICE)
            .deposit(Deposit::random().commitment(), denomination())
            .await
            .unwrap();
        mint_tokens(&ctx, ALICE).await;
        let recipient = Address::repeat_byte(0x77);
        ctx.destination
            .connect(ALICE)
            .reclaim(recipient, U256::from(40u64))
            .await
            .unwrap();
        let reclaim_block = ctx.destination.block_number().await.unwrap();

        let checkpoints = Arc::new(InMemoryCheckpoint::new());
        let relayer = Relayer::new(Arc::clone(&ctx), Arc::clone(&checkpoints), options());
        let report = run_until(relayer, || {
            let ctx = Arc::clone(&ctx);
            async move { !ctx.origin.native_balance(recipient).await.unwrap().is_zero() }
        })
        .await;

        assert_eq!(report.releases.forwarded, 1);
        assert_eq!(ctx.origin.native_balance(recipient).await.unwrap(), U256::from(40u64));
        assert_eq!(ctx.origin.locked().await, U256::from(60u64));
        let watermark = checkpoints
            .load(ReleaseLeg::<Origin, Destination>::NAME)
            .await
            .unwrap()
            .unwrap();
        assert!(watermark.block >= reclaim_block);
    }

    #[tokio::test]
    async fn test_failed_release_abandoned_and_watermark_advances() {
        let ctx = setup().await;
        // Nothing is locked on the origin, so the release is rejected.
        mint_tokens(&ctx, ALICE).await;
        ctx.destination
            .connect(ALICE)
            .reclaim(ALICE, U256::from(30u64))
            .await
            .unwrap();
        let reclaim_block = ctx.destination.block_number().await.unwrap();

        let checkpoints = Arc::new(InMemoryCheckpoint::new());
        let relayer = Relayer::new(Arc::clone(&ctx), Arc::clone(&checkpoints), options());
        let report = run_until(relayer, || {
            let checkpoints = Arc::clone(&checkpoints);
            async move {
                checkpoints
                    .load(ReleaseLeg::<Origin, Destination>::NAME)
                    .await
                    .unwrap()
                    .is_some_and(|p| p.block >= reclaim_block)
            }
        })
        .await;

        assert_eq!(report.releases.abandoned, 1);
        assert_eq!(report.releases.forwarded, 0);
        assert_eq!(ctx.origin.native_balance(ALICE).await.unwrap(), U256::from(1_000u64));
    }

    /// Watermarks that cannot be written for one stream.
    struct BrokenCheckpoint {
        stream: &'static str,
        inner: InMemoryCheckpoint,
    }

    impl CheckpointStore for BrokenCheckpoint {
        async fn load(&self, stream: &str) -> Result<Option<EventPosition>, CheckpointError> {
            self.inner.load(stream).await
        }

        async fn save(&self, stream: &str, position: EventPosition) -> Result<(), CheckpointError> {
            if stream == self.stream {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.save(stream, position).await
        }
    }

    #[tokio::test]
    async fn test_failed_leg_stops_relayer() {
        let ctx = setup().await;
        ctx.origin
            .connect(ALICE)
            .deposit(Deposit::random().commitment(), denomination())
            .await
            .unwrap();

        let checkpoints = Arc::new(BrokenCheckpoint {
            stream: RootLeg::<Origin, Destination>::NAME,
            inner: InMemoryCheckpoint::new(),
        });
        let relayer = Relayer::new(Arc::clone(&ctx), checkpoints, options());
        let (_stop, shutdown) = watch::channel(false);

        let result = tokio::time::timeout(Duration::from_secs(2), relayer.run(shutdown))
            .await
            .expect("relayer kept running after a leg failed");
        assert!(matches!(result, Err(RelayerError::Checkpoint(_))));
    }
}
