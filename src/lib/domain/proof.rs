use alloy::primitives::{
    Address,
    Bytes,
    B256,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};

use super::nullifier::NullifierHash;

/// Number of public inputs of the withdrawal circuit.
pub const PUBLIC_SIGNAL_COUNT: usize = 6;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignalsError {
    #[error("expected {PUBLIC_SIGNAL_COUNT} public signals, got {0}")]
    WrongCount(usize),

    #[error("public signal {index} is not a decimal integer: {value}")]
    NotAnInteger { index: usize, value: String },

    #[error("public signal {index} does not fit in an address")]
    AddressOverflow { index: usize },
}

/// Public inputs of a withdrawal proof, in circuit order:
/// `[root, nullifierHash, recipient, relayer, fee, refund]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSignals {
    pub root: B256,
    pub nullifier_hash: NullifierHash,
    pub recipient: Address,
    pub relayer: Address,
    pub fee: U256,
    pub refund: U256,
}

impl PublicSignals {
    pub fn to_fields(&self) -> [U256; PUBLIC_SIGNAL_COUNT] {
        [
            U256::from_be_bytes(self.root.0),
            U256::from_be_bytes(self.nullifier_hash.0 .0),
            address_to_field(self.recipient),
            address_to_field(self.relayer),
            self.fee,
            self.refund,
        ]
    }

    /// Decimal strings, the encoding snarkjs uses in `public.json`.
    pub fn to_decimal_strings(&self) -> Vec<String> {
        self.to_fields().iter().map(|f| f.to_string()).collect()
    }

    pub fn from_decimal_strings<S: AsRef<str>>(values: &[S]) -> Result<Self, SignalsError> {
        if values.len() != PUBLIC_SIGNAL_COUNT {
            return Err(SignalsError::WrongCount(values.len()));
        }

        let mut fields = [U256::ZERO; PUBLIC_SIGNAL_COUNT];
        for (index, value) in values.iter().enumerate() {
            let value = value.as_ref();
            fields[index] = U256::from_str_radix(value, 10).map_err(|_| {
                SignalsError::NotAnInteger {
                    index,
                    value: value.to_string(),
                }
            })?;
        }

        Ok(Self {
            root: B256::from(fields[0]),
            nullifier_hash: NullifierHash(B256::from(fields[1])),
            recipient: field_to_address(fields[2], 2)?,
            relayer: field_to_address(fields[3], 3)?,
            fee: fields[4],
            refund: fields[5],
        })
    }
}

/// A Groth16 withdrawal proof in Solidity calldata layout plus its public inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawProof {
    pub proof: Bytes,
    pub public_signals: PublicSignals,
}

fn address_to_field(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

fn field_to_address(value: U256, index: usize) -> Result<Address, SignalsError> {
    if value.bit_len() > 160 {
        return Err(SignalsError::AddressOverflow { index });
    }
    Ok(Address::from_word(B256::from(value)))
}
