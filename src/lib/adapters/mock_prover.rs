use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};

use alloy::primitives::{
    keccak256,
    Bytes,
    B256,
};

use crate::{
    domain::{
        deposit::Deposit,
        proof::{
            PublicSignals,
            WithdrawProof,
        },
        witness::WithdrawWitness,
    },
    ports::prover::{
        Prover,
        ProverError,
    },
};

/// Deterministic stand-in for the withdrawal circuit.
///
/// `full_prove` enforces the same relations the circuit does (commitment from
/// nullifier and secret, path to root, nullifier hash) and returns a keccak
/// binding of the public signals as the proof. `verify` accepts exactly that
/// binding.
pub struct MockProver {
    height: usize,
    /// Number of upcoming `verify` calls that report `false`.
    failing_verifications: AtomicUsize,
}

impl MockProver {
    pub fn new(height: usize) -> Self {
        Self {
            height,
            failing_verifications: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` verifications fail regardless of the proof.
    pub fn fail_next_verifications(&self, count: usize) {
        self.failing_verifications.store(count, Ordering::SeqCst);
    }

    fn binding(signals: &PublicSignals) -> B256 {
        let mut encoded = Vec::with_capacity(32 * signals.to_fields().len());
        for field in signals.to_fields() {
            encoded.extend_from_slice(&field.to_be_bytes::<32>());
        }
        keccak256(&encoded)
    }

    fn check_witness(&self, witness: &WithdrawWitness) -> Result<(), ProverError> {
        if !witness.path.is_complete(self.height) {
            return Err(ProverError::InvalidWitness(format!(
                "path must have {} levels matching the leaf index",
                self.height
            )));
        }

        let deposit = Deposit::new(witness.nullifier, witness.secret)
            .map_err(|e| ProverError::InvalidWitness(e.to_string()))?;

        if witness.path.compute_root(deposit.commitment().0) != witness.public.root {
            return Err(ProverError::InvalidWitness(
                "commitment is not included under root".into(),
            ));
        }
        if deposit.nullifier_hash() != witness.public.nullifier_hash {
            return Err(ProverError::InvalidWitness(
                "nullifier hash does not match nullifier".into(),
            ));
        }
        Ok(())
    }
}

impl Prover for MockProver {
    async fn full_prove(&self, witness: &WithdrawWitness) -> Result<WithdrawProof, ProverError> {
        self.check_witness(witness)?;
        let public_signals = witness.public.clone();
        Ok(WithdrawProof {
            proof: Bytes::copy_from_slice(Self::binding(&public_signals).as_slice()),
            public_signals,
        })
    }

    async fn verify(&self, proof: &WithdrawProof) -> Result<bool, ProverError> {
        let forced_failure = self
            .failing_verifications
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced_failure {
            return Ok(false);
        }
        Ok(proof.proof.as_ref() == Self::binding(&proof.public_signals).as_slice())
    }
}
