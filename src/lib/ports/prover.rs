use std::future::Future;

use crate::domain::{
    proof::WithdrawProof,
    witness::WithdrawWitness,
};

/// Port for withdrawal proof generation and verification.
///
/// Implementations:
/// - `SnarkjsProver` (shells out to `snarkjs groth16 fullprove` / `verify`)
/// - `MockProver` for testing
pub trait Prover: Send + Sync {
    /// Generate a proof for the withdrawal circuit.
    ///
    /// The returned proof carries the public signals the prover reported,
    /// which callers compare against the witness before trusting them.
    fn full_prove(
        &self,
        witness: &WithdrawWitness,
    ) -> impl Future<Output = Result<WithdrawProof, ProverError>> + Send;

    /// Check a proof against its public signals.
    fn verify(
        &self,
        proof: &WithdrawProof,
    ) -> impl Future<Output = Result<bool, ProverError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ProverError {
    #[error("proof generation failed: {0}")]
    ProofFailed(String),

    #[error("witness generation failed: {0}")]
    WitnessError(String),

    #[error("invalid witness: {0}")]
    InvalidWitness(String),

    #[error("malformed prover output: {0}")]
    MalformedOutput(String),

    #[error("prover binary not found: {0}")]
    BinaryNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProverError {
    /// Whether running the prover again with the same input may succeed.
    /// A witness the circuit rejects will be rejected every time.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ProverError::InvalidWitness(_)
                | ProverError::WitnessError(_)
                | ProverError::BinaryNotFound(_)
        )
    }
}
