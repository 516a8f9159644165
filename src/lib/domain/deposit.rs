use std::fmt;

use alloy::primitives::U256;
use rand::Rng;

use super::{
    commitment::Commitment,
    nullifier::NullifierHash,
};
use crate::crypto::pedersen;

/// Byte width of the nullifier and the secret.
pub const SCALAR_BYTES: usize = 31;

/// Errors building a deposit from user-supplied values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DepositError {
    #[error("{0} does not fit in 31 bytes")]
    OutOfRange(&'static str),

    #[error("invalid {field}: {reason}")]
    Parse {
        field: &'static str,
        reason: String,
    },
}

/// The bearer secret of one deposit.
///
/// Whoever knows `(nullifier, secret)` can withdraw the deposit. The pair is
/// created client-side and never sent anywhere; only the commitment goes
/// on-chain at deposit time and only the nullifier hash at withdrawal time.
#[derive(Clone, PartialEq, Eq)]
pub struct Deposit {
    nullifier: U256,
    secret: U256,
}

impl Deposit {
    /// Generate a fresh deposit with random 31-byte nullifier and secret.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut nullifier = [0u8; SCALAR_BYTES];
        let mut secret = [0u8; SCALAR_BYTES];
        rng.fill(&mut nullifier[..]);
        rng.fill(&mut secret[..]);

        Self {
            nullifier: U256::from_le_slice(&nullifier),
            secret: U256::from_le_slice(&secret),
        }
    }

    /// Rebuild a deposit from its two scalars.
    pub fn new(nullifier: U256, secret: U256) -> Result<Self, DepositError> {
        if nullifier.bit_len() > SCALAR_BYTES * 8 {
            return Err(DepositError::OutOfRange("nullifier"));
        }
        if secret.bit_len() > SCALAR_BYTES * 8 {
            return Err(DepositError::OutOfRange("secret"));
        }
        Ok(Self { nullifier, secret })
    }

    /// Parse the pair from decimal (or `0x`-prefixed hex) strings, as printed by `deposit`.
    pub fn parse(nullifier: &str, secret: &str) -> Result<Self, DepositError> {
        let nullifier = nullifier
            .trim()
            .parse::<U256>()
            .map_err(|e| DepositError::Parse {
                field: "nullifier",
                reason: e.to_string(),
            })?;
        let secret = secret
            .trim()
            .parse::<U256>()
            .map_err(|e| DepositError::Parse {
                field: "secret",
                reason: e.to_string(),
            })?;
        Self::new(nullifier, secret)
    }

    pub fn nullifier(&self) -> U256 {
        self.nullifier
    }

    pub fn secret(&self) -> U256 {
        self.secret
    }

    /// `le(nullifier, 31) || le(secret, 31)`
    pub fn preimage(&self) -> [u8; 2 * SCALAR_BYTES] {
        let mut preimage = [0u8; 2 * SCALAR_BYTES];
        preimage[..SCALAR_BYTES].copy_from_slice(&le_bytes(self.nullifier));
        preimage[SCALAR_BYTES..].copy_from_slice(&le_bytes(self.secret));
        preimage
    }

    pub fn commitment(&self) -> Commitment {
        Commitment(pedersen::hash(&self.preimage()))
    }

    pub fn nullifier_hash(&self) -> NullifierHash {
        NullifierHash(pedersen::hash(&le_bytes(self.nullifier)))
    }
}

impl fmt::Debug for Deposit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deposit")
            .field("commitment", &self.commitment())
            .field("nullifier", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Little-endian encoding truncated to 31 bytes. Callers keep values below 2^248.
fn le_bytes(value: U256) -> [u8; SCALAR_BYTES] {
    let full = value.to_le_bytes::<32>();
    let mut out = [0u8; SCALAR_BYTES];
    out.copy_from_slice(&full[..SCALAR_BYTES]);
    out
}
