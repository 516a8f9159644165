use std::{
    sync::Arc,
    time::Duration,
};

use tracing::{
    debug,
    error,
    info,
    warn,
};

use crate::{
    domain::{
        deposit::Deposit,
        proof::WithdrawProof,
        witness::{
            WithdrawParams,
            WithdrawWitness,
        },
    },
    ports::prover::{
        Prover,
        ProverError,
    },
    reconstructor::Inclusion,
};

/// Retries allowed after the first proving attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("witness incomplete: {0}")]
    WitnessIncomplete(String),

    #[error("proof generation failed: {0}")]
    ProveFailed(String),

    #[error("proof failed self-verification after {attempts} attempt(s); prover integrity fault")]
    SelfVerifyFailed { attempts: u32 },

    #[error("proof generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Why one proving attempt did not yield a usable proof.
enum AttemptFailure {
    Prover(ProverError),
    SelfVerify,
    Timeout,
}

/// Builds the withdrawal witness, runs the prover off the caller's task and
/// checks every proof against its own public inputs before handing it out.
pub struct ProofService<P> {
    prover: Arc<P>,
    tree_height: usize,
    max_retries: u32,
    timeout: Duration,
}

impl<P: Prover + 'static> ProofService<P> {
    pub fn new(prover: Arc<P>, tree_height: usize, max_retries: u32, timeout: Duration) -> Self {
        Self {
            prover,
            tree_height,
            max_retries,
            timeout,
        }
    }

    pub async fn generate(
        &self,
        deposit: &Deposit,
        inclusion: Inclusion,
        params: &WithdrawParams,
    ) -> Result<WithdrawProof, ProofError> {
        if !inclusion.path.is_complete(self.tree_height) {
            return Err(ProofError::WitnessIncomplete(format!(
                "path has {} elements for a tree of height {}",
                inclusion.path.path_elements.len(),
                self.tree_height
            )));
        }
        let witness = WithdrawWitness::new(deposit, inclusion.root, inclusion.path, params);

        let attempts = self.max_retries + 1;
        let mut last = AttemptFailure::SelfVerify;
        for attempt in 1..=attempts {
            debug!(attempt, "generating withdrawal proof");
            match self.attempt(&witness).await {
                Ok(proof) => {
                    info!(attempt, "withdrawal proof generated and self-verified");
                    return Ok(proof);
                }
                Err(AttemptFailure::Prover(e)) if !e.is_transient() => {
                    return Err(ProofError::ProveFailed(e.to_string()));
                }
                Err(failure) => {
                    match &failure {
                        AttemptFailure::Prover(e) => warn!(attempt, "prover failed: {e}"),
                        AttemptFailure::SelfVerify => {
                            error!(attempt, "proof failed self-verification")
                        }
                        AttemptFailure::Timeout => {
                            warn!(attempt, timeout = ?self.timeout, "prover timed out")
                        }
                    }
                    last = failure;
                }
            }
        }

        Err(match last {
            AttemptFailure::Prover(e) => ProofError::ProveFailed(e.to_string()),
            AttemptFailure::SelfVerify => ProofError::SelfVerifyFailed { attempts },
            AttemptFailure::Timeout => ProofError::Timeout(self.timeout),
        })
    }

    async fn attempt(&self, witness: &WithdrawWitness) -> Result<WithdrawProof, AttemptFailure> {
        let prover = Arc::clone(&self.prover);
        let owned = witness.clone();
        let mut handle = tokio::spawn(async move { prover.full_prove(&owned).await });

        let proof = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => result.map_err(AttemptFailure::Prover)?,
            Ok(Err(join)) => {
                return Err(AttemptFailure::Prover(ProverError::ProofFailed(format!(
                    "prover task failed: {join}"
                ))))
            }
            Err(_) => {
                // Wait for the cancelled prover to be dropped so its scratch
                // files are gone before the caller sees the timeout.
                handle.abort();
                let _ = handle.await;
                return Err(AttemptFailure::Timeout);
            }
        };

        if proof.public_signals != witness.public {
            // A proof over other public inputs would verify and still be useless.
            return Err(AttemptFailure::Prover(ProverError::MalformedOutput(
                "prover reported public signals that differ from the witness".into(),
            )));
        }

        match self.prover.verify(&proof).await {
            Ok(true) => Ok(proof),
            Ok(false) => Err(AttemptFailure::SelfVerify),
            Err(e) => Err(AttemptFailure::Prover(e)),
        }
    }
}
