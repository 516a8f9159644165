//! Shielded two-chain bridge.
//!
//! Deposits lock a fixed denomination into a commitment pool on the origin
//! chain. Withdrawals on the destination chain prove membership of a
//! commitment in a relayed Merkle root without revealing which deposit is
//! spent. A relayer forwards new roots from origin to destination and
//! reclaim requests from destination back to origin.
//!
//! The crate follows a ports/adapters layout: `domain` holds pure data and
//! hashing, `ports` the traits for chains, provers and checkpoints, and
//! `adapters` the alloy, snarkjs and in-memory implementations.

pub mod adapters;
pub mod client;
pub mod config;
pub mod context;
pub mod crypto;
pub mod domain;
pub mod ports;
pub mod proof_service;
pub mod reconstructor;
pub mod relayer;
