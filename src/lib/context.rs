use alloy::primitives::U256;

use crate::ports::chain::{
    DestinationChain,
    OriginChain,
};

/// Protocol constants shared by every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeParams {
    /// Exact value of every deposit, in wei.
    pub denomination: U256,
    pub tree_height: usize,
    /// First origin block that can hold a `Deposit` event.
    pub origin_deployment_block: u64,
    /// First destination block that can hold a `Reclaim` event.
    pub destination_deployment_block: u64,
}

/// Chain handles and parameters, built once per process and shared read-only.
pub struct BridgeContext<O, D> {
    pub origin: O,
    pub destination: D,
    pub params: BridgeParams,
}

impl<O: OriginChain, D: DestinationChain> BridgeContext<O, D> {
    pub fn new(origin: O, destination: D, params: BridgeParams) -> Self {
        Self {
            origin,
            destination,
            params,
        }
    }
}
