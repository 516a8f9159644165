//! Hashes shared with the withdrawal circuit and the on-chain tree.
//!
//! Commitments and nullifier hashes are Baby Jubjub Pedersen hashes; tree
//! nodes are MiMCSponge hashes, as computed by the pool's hasher contract.

pub mod babyjub;
pub mod mimc;
pub mod pedersen;

use alloy::primitives::B256;
use ark_bn254::Fr;
use ark_ff::{
    BigInteger,
    PrimeField,
};

/// Convert B256 to BN254 field element.
pub(crate) fn b256_to_fr(value: B256) -> Fr {
    Fr::from_be_bytes_mod_order(value.as_ref())
}

/// Convert BN254 field element to B256.
pub(crate) fn fr_to_b256(value: Fr) -> B256 {
    let bytes = value.into_bigint().to_bytes_be();
    B256::from_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use alloy::primitives::U256;

    use super::*;

    #[test]
    fn test_field_conversion_reduces_mod_p() {
        let p = B256::from_slice(&Fr::MODULUS.to_bytes_be());
        assert_eq!(fr_to_b256(b256_to_fr(p)), B256::ZERO);

        let small = B256::from(U256::from(42u64));
        assert_eq!(fr_to_b256(b256_to_fr(small)), small);
    }
}
