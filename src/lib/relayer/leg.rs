use std::{
    fmt::Debug,
    future::Future,
    sync::Arc,
};

use tracing::debug;

use crate::{
    context::BridgeContext,
    domain::events::{
        EventPosition,
        LeafRecord,
        ReclaimRequest,
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

/// When a leg's watermark moves past an event relative to forwarding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Watermark saved after the transaction. A crash in between resends,
    /// so forwarding must be idempotent.
    AtLeastOnce,
    /// Watermark saved before the transaction. A crash in between drops the event.
    AtMostOnce,
}

/// Outcome of forwarding one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forwarded {
    Sent(TxReceipt),
    /// The target chain already reflects the event.
    Skipped,
}

/// One direction of the relay: events read on a source chain, each forwarded
/// verbatim as one transaction on the other chain.
pub trait RelayLeg: Send + Sync + 'static {
    type Event: Debug + Clone + Send + Sync + 'static;

    /// Watermark key of this leg.
    const NAME: &'static str;

    fn delivery(&self) -> Delivery;

    /// First block that can hold an event of this leg.
    fn start_block(&self) -> u64;

    fn head_block(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Events in blocks `from_block..=to_block`.
    fn fetch(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<Self::Event>, ChainError>> + Send;

    fn position(event: &Self::Event) -> EventPosition;

    fn forward(
        &self,
        event: &Self::Event,
    ) -> impl Future<Output = Result<Forwarded, ChainError>> + Send;
}

/// Origin `Deposit` events to destination `submitRoot`.
pub struct RootLeg<O, D> {
    ctx: Arc<BridgeContext<O, D>>,
}

impl<O, D> RootLeg<O, D> {
    pub fn new(ctx: Arc<BridgeContext<O, D>>) -> Self {
        Self { ctx }
    }
}

impl<O, D> RelayLeg for RootLeg<O, D>
where
    O: OriginChain + 'static,
    D: DestinationChain + 'static,
{
    type Event = LeafRecord;

    const NAME: &'static str = "origin-deposits";

    fn delivery(&self) -> Delivery {
        Delivery::AtLeastOnce
    }

    fn start_block(&self) -> u64 {
        self.ctx.params.origin_deployment_block
    }

    async fn head_block(&self) -> Result<u64, ChainError> {
        self.ctx.origin.block_number().await
    }

    async fn fetch(&self, from_block: u64, to_block: u64) -> Result<Vec<LeafRecord>, ChainError> {
        self.ctx.origin.deposit_events(from_block, to_block).await
    }

    fn position(event: &LeafRecord) -> EventPosition {
        event.position()
    }

    async fn forward(&self, event: &LeafRecord) -> Result<Forwarded, ChainError> {
        // Re-registering a root would evict an older one from the window.
        if self.ctx.destination.is_known_root(event.root).await? {
            debug!(root = %event.root, "root already registered");
            return Ok(Forwarded::Skipped);
        }
        let receipt = self.ctx.destination.submit_root(event.root).await?;
        Ok(Forwarded::Sent(receipt))
    }
}

/// Destination `Reclaim` events to origin `releaseFunds`.
pub struct ReleaseLeg<O, D> {
    ctx: Arc<BridgeContext<O, D>>,
}

impl<O, D> ReleaseLeg<O, D> {
    pub fn new(ctx: Arc<BridgeContext<O, D>>) -> Self {
        Self { ctx }
    }
}

impl<O, D> RelayLeg for ReleaseLeg<O, D>
where
    O: OriginChain + 'static,
    D: DestinationChain + 'static,
{
    type Event = ReclaimRequest;

    const NAME: &'static str = "destination-reclaims";

    fn delivery(&self) -> Delivery {
        // A release cannot be recognised after the fact; paying twice is worse
        // than a release an operator has to replay by hand.
        Delivery::AtMostOnce
    }

    fn start_block(&self) -> u64 {
        self.ctx.params.destination_deployment_block
    }

    async fn head_block(&self) -> Result<u64, ChainError> {
        self.ctx.destination.block_number().await
    }

    async fn fetch(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ReclaimRequest>, ChainError> {
        self.ctx.destination.reclaim_events(from_block, to_block).await
    }

    fn position(event: &ReclaimRequest) -> EventPosition {
        event.position()
    }

    async fn forward(&self, event: &ReclaimRequest) -> Result<Forwarded, ChainError> {
        let receipt = self
            .ctx
            .origin
            .release_funds(event.recipient, event.amount)
            .await?;
        Ok(Forwarded::Sent(receipt))
    }
}
