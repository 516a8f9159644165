//! MiMCSponge over BN254 with 220 Feistel rounds, the tree hash of the pool.

use alloy::primitives::{
    keccak256,
    uint,
    B256,
    U256,
};
use ark_bn254::Fr;
use ark_ff::{
    Field,
    PrimeField,
    Zero,
};
use lazy_static::lazy_static;

use super::{
    b256_to_fr,
    fr_to_b256,
};

pub const ROUNDS: usize = 220;

const SEED: &str = "mimcsponge";

/// Canonical empty leaf of the commitment tree: `keccak256("tornado") mod p`.
pub const ZERO_VALUE: U256 = uint!(
    21663839004416932945382355908790599225266501822907911457504978515578255421292_U256
);

lazy_static! {
    static ref ROUND_CONSTANTS: [Fr; ROUNDS] = round_constants();
}

/// `c_i = keccak256^(i+1)(SEED) mod p`, with the first and last rounds unkeyed.
fn round_constants() -> [Fr; ROUNDS] {
    let mut constants = [Fr::zero(); ROUNDS];
    let mut digest = keccak256(SEED);
    for constant in constants.iter_mut().take(ROUNDS - 1).skip(1) {
        digest = keccak256(digest);
        *constant = Fr::from_be_bytes_mod_order(digest.as_slice());
    }
    constants
}

/// One MiMC Feistel permutation of `(left, right)` under `key`.
pub fn sponge(mut left: Fr, mut right: Fr, key: Fr) -> (Fr, Fr) {
    for (round, constant) in ROUND_CONSTANTS.iter().enumerate() {
        let t = left + key + constant;
        let t5 = t.square().square() * t;
        if round < ROUNDS - 1 {
            (left, right) = (right + t5, left);
        } else {
            right += t5;
        }
    }
    (left, right)
}

/// Hash of two tree nodes: absorb `left`, add `right` to the rate, permute again.
pub fn hash_pair(left: B256, right: B256) -> B256 {
    let (rate, capacity) = sponge(b256_to_fr(left), Fr::zero(), Fr::zero());
    let (rate, _) = sponge(rate + b256_to_fr(right), capacity, Fr::zero());
    fr_to_b256(rate)
}

/// The empty leaf as a B256 word.
pub fn zero_leaf() -> B256 {
    B256::from(ZERO_VALUE)
}
