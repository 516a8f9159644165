use std::path::{
    Path,
    PathBuf,
};

use alloy::primitives::{
    Bytes,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::{
    domain::{
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

/// Byte length of a Groth16 proof in Solidity calldata layout (8 words).
pub const PROOF_BYTES: usize = 256;

/// Files the withdrawal circuit was compiled and set up into.
#[derive(Debug, Clone)]
pub struct CircuitArtifacts {
    pub circuit_wasm: PathBuf,
    pub proving_key: PathBuf,
    pub verification_key: PathBuf,
}

/// JSON input for the withdrawal circuit.
///
/// Field names **must** match the circom signal names exactly.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CircuitInput {
    // -- Public --
    root: String,
    nullifier_hash: String,
    recipient: String,
    relayer: String,
    fee: String,
    refund: String,

    // -- Private --
    nullifier: String,
    secret: String,
    path_elements: Vec<String>,
    path_indices: Vec<u8>,
}

impl From<&WithdrawWitness> for CircuitInput {
    fn from(w: &WithdrawWitness) -> Self {
        let [root, nullifier_hash, recipient, relayer, fee, refund] =
            w.public.to_fields().map(|f| f.to_string());
        Self {
            root,
            nullifier_hash,
            recipient,
            relayer,
            fee,
            refund,
            nullifier: w.nullifier.to_string(),
            secret: w.secret.to_string(),
            path_elements: w
                .path
                .path_elements
                .iter()
                .map(|e| U256::from_be_bytes(e.0).to_string())
                .collect(),
            path_indices: w.path.path_indices.clone(),
        }
    }
}

/// `proof.json` as written by `snarkjs groth16 fullprove`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SnarkjsProof {
    pi_a: Vec<String>,
    pi_b: Vec<Vec<String>>,
    pi_c: Vec<String>,
    protocol: String,
    curve: String,
}

impl SnarkjsProof {
    /// Solidity verifier layout: `a.x, a.y, b.x1, b.x0, b.y1, b.y0, c.x, c.y`.
    /// The G2 coordinates are swapped relative to snarkjs' JSON.
    fn to_calldata(&self) -> Result<Bytes, ProverError> {
        let word = |s: Option<&String>| -> Result<[u8; 32], ProverError> {
            let s = s.ok_or_else(|| ProverError::MalformedOutput("short proof.json".into()))?;
            U256::from_str_radix(s, 10)
                .map(|v| v.to_be_bytes::<32>())
                .map_err(|e| ProverError::MalformedOutput(format!("{s}: {e}")))
        };
        let b = |i: usize, j: usize| self.pi_b.get(i).and_then(|row| row.get(j));

        let words = [
            word(self.pi_a.first())?,
            word(self.pi_a.get(1))?,
            word(b(0, 1))?,
            word(b(0, 0))?,
            word(b(1, 1))?,
            word(b(1, 0))?,
            word(self.pi_c.first())?,
            word(self.pi_c.get(1))?,
        ];
        Ok(Bytes::from(words.concat()))
    }

    fn from_calldata(calldata: &[u8]) -> Result<Self, ProverError> {
        if calldata.len() != PROOF_BYTES {
            return Err(ProverError::MalformedOutput(format!(
                "proof must be {PROOF_BYTES} bytes, got {}",
                calldata.len()
            )));
        }
        let w: Vec<String> = calldata
            .chunks(32)
            .map(|chunk| U256::from_be_slice(chunk).to_string())
            .collect();
        let one = "1".to_string();
        let zero = "0".to_string();

        Ok(Self {
            pi_a: vec![w[0].clone(), w[1].clone(), one.clone()],
            pi_b: vec![
                vec![w[3].clone(), w[2].clone()],
                vec![w[5].clone(), w[4].clone()],
                vec![one.clone(), zero],
            ],
            pi_c: vec![w[6].clone(), w[7].clone(), one],
            protocol: "groth16".into(),
            curve: "bn128".into(),
        })
    }
}

/// SnarkjsProver generates Groth16 proofs by shelling out to the snarkjs CLI.
///
/// This prover:
/// 1. Writes the witness to `input.json` in a fresh scratch directory
/// 2. Runs `snarkjs groth16 fullprove` to produce `proof.json` and `public.json`
/// 3. Converts the proof to Solidity calldata
///
/// Verification writes both files back and runs `snarkjs groth16 verify`.
pub struct SnarkjsProver {
    snarkjs_bin: PathBuf,
    artifacts: CircuitArtifacts,
    work_dir: PathBuf,
}

impl SnarkjsProver {
    pub fn new(snarkjs_bin: PathBuf, artifacts: CircuitArtifacts, work_dir: PathBuf) -> Self {
        Self {
            snarkjs_bin,
            artifacts,
            work_dir,
        }
    }

    /// Fresh scratch directory under `work_dir`, removed when the guard drops.
    ///
    /// The prover future may be dropped mid-await on timeout, so cleanup
    /// cannot wait for the prover to return.
    async fn scratch_dir(&self) -> Result<TempDir, ProverError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        Ok(tempfile::Builder::new()
            .prefix("proof-")
            .tempdir_in(&self.work_dir)?)
    }

    async fn run(&self, args: &[&Path], subcommand: &str) -> Result<std::process::Output, ProverError> {
        debug!(subcommand, "running snarkjs");
        Command::new(&self.snarkjs_bin)
            .args(["groth16", subcommand])
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ProverError::BinaryNotFound(self.snarkjs_bin.display().to_string())
                }
                _ => ProverError::IoError(e),
            })
    }

    async fn prove_in(&self, dir: &Path, witness: &WithdrawWitness) -> Result<WithdrawProof, ProverError> {
        let input = serde_json::to_vec(&CircuitInput::from(witness))
            .map_err(|e| ProverError::InvalidWitness(e.to_string()))?;
        let input_path = dir.join("input.json");
        let proof_path = dir.join("proof.json");
        let public_path = dir.join("public.json");
        tokio::fs::write(&input_path, input).await?;

        let output = self
            .run(
                &[
                    &input_path,
                    &self.artifacts.circuit_wasm,
                    &self.artifacts.proving_key,
                    &proof_path,
                    &public_path,
                ],
                "fullprove",
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            // Circuit constraint failures surface during witness calculation.
            if stderr.contains("Assert Failed") || stdout.contains("Assert Failed") {
                return Err(ProverError::WitnessError(format!(
                    "snarkjs fullprove rejected the witness: {}",
                    stderr
                )));
            }
            return Err(ProverError::ProofFailed(format!(
                "snarkjs fullprove failed: {}",
                stderr
            )));
        }

        let proof: SnarkjsProof = serde_json::from_slice(&tokio::fs::read(&proof_path).await?)
            .map_err(|e| ProverError::MalformedOutput(format!("proof.json: {e}")))?;
        let public: Vec<String> = serde_json::from_slice(&tokio::fs::read(&public_path).await?)
            .map_err(|e| ProverError::MalformedOutput(format!("public.json: {e}")))?;
        let public_signals = PublicSignals::from_decimal_strings(&public)
            .map_err(|e| ProverError::MalformedOutput(e.to_string()))?;

        Ok(WithdrawProof {
            proof: proof.to_calldata()?,
            public_signals,
        })
    }

    async fn verify_in(&self, dir: &Path, proof: &WithdrawProof) -> Result<bool, ProverError> {
        let proof_json = SnarkjsProof::from_calldata(&proof.proof)?;
        let proof_path = dir.join("proof.json");
        let public_path = dir.join("public.json");
        tokio::fs::write(
            &proof_path,
            serde_json::to_vec(&proof_json)
                .map_err(|e| ProverError::MalformedOutput(e.to_string()))?,
        )
        .await?;
        tokio::fs::write(
            &public_path,
            serde_json::to_vec(&proof.public_signals.to_decimal_strings())
                .map_err(|e| ProverError::MalformedOutput(e.to_string()))?,
        )
        .await?;

        let output = self
            .run(
                &[&self.artifacts.verification_key, &public_path, &proof_path],
                "verify",
            )
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if output.status.success() && stdout.contains("OK") {
            return Ok(true);
        }
        if stdout.contains("Invalid proof") {
            return Ok(false);
        }
        Err(ProverError::ProofFailed(format!(
            "snarkjs verify failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )))
    }
}

impl Prover for SnarkjsProver {
    async fn full_prove(&self, witness: &WithdrawWitness) -> Result<WithdrawProof, ProverError> {
        // The scratch directory holds the private witness.
        let dir = self.scratch_dir().await?;
        self.prove_in(dir.path(), witness).await
    }

    async fn verify(&self, proof: &WithdrawProof) -> Result<bool, ProverError> {
        let dir = self.scratch_dir().await?;
        self.verify_in(dir.path(), proof).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use alloy::primitives::{
        Address,
        B256,
    };

    use super::*;
    use crate::{
        domain::{
            deposit::Deposit,
            merkle::FixedMerkleTree,
            witness::WithdrawParams,
        },
        proof_service::{
            ProofError,
            ProofService,
        },
        reconstructor::inclusion,
    };

    fn artifacts_in(dir: &Path) -> CircuitArtifacts {
        CircuitArtifacts {
            circuit_wasm: dir.join("withdraw.wasm"),
            proving_key: dir.join("withdraw.zkey"),
            verification_key: dir.join("verification_key.json"),
        }
    }

    fn sample_proof_json() -> SnarkjsProof {
        let s = |v: u64| v.to_string();
        SnarkjsProof {
            pi_a: vec![s(1), s(2), s(1)],
            pi_b: vec![vec![s(3), s(4)], vec![s(5), s(6)], vec![s(1), s(0)]],
            pi_c: vec![s(7), s(8), s(1)],
            protocol: "groth16".into(),
            curve: "bn128".into(),
        }
    }

    #[test]
    fn test_calldata_swaps_g2_coordinates() {
        let calldata = sample_proof_json().to_calldata().unwrap();
        assert_eq!(calldata.len(), PROOF_BYTES);

        let words: Vec<u64> = calldata
            .chunks(32)
            .map(|w| U256::from_be_slice(w).to::<u64>())
            .collect();
        assert_eq!(words, vec![1, 2, 4, 3, 6, 5, 7, 8]);
    }

    #[test]
    fn test_calldata_converts_back_to_snarkjs_json() {
        let json = sample_proof_json();
        let calldata = json.to_calldata().unwrap();
        assert_eq!(SnarkjsProof::from_calldata(&calldata).unwrap(), json);
    }

    #[test]
    fn test_short_calldata_rejected() {
        assert!(matches!(
            SnarkjsProof::from_calldata(&[0u8; 64]),
            Err(ProverError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_circuit_input_uses_circom_names() {
        let deposit = Deposit::random();
        let tree = FixedMerkleTree::from_leaves(3, [deposit.commitment()]).unwrap();
        let witness = WithdrawWitness::new(
            &deposit,
            tree.root(),
            tree.path(0).unwrap(),
            &WithdrawParams::direct(Address::repeat_byte(0x01)),
        );

        let json = serde_json::to_value(CircuitInput::from(&witness)).unwrap();
        for key in [
            "root",
            "nullifierHash",
            "recipient",
            "relayer",
            "fee",
            "refund",
            "nullifier",
            "secret",
            "pathElements",
            "pathIndices",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["pathElements"].as_array().unwrap().len(), 3);
        assert_eq!(json["relayer"], "0");
        assert_eq!(
            json["root"],
            U256::from_be_bytes(tree.root().0).to_string()
        );
        assert_ne!(tree.root(), B256::ZERO);
    }

    #[tokio::test]
    async fn test_missing_binary_reported() {
        let dir = tempfile::tempdir().unwrap();
        let prover = SnarkjsProver::new(
            PathBuf::from("/nonexistent/snarkjs"),
            artifacts_in(dir.path()),
            dir.path().to_path_buf(),
        );
        let calldata = sample_proof_json().to_calldata().unwrap();
        let proof = WithdrawProof {
            proof: calldata,
            public_signals: PublicSignals::from_decimal_strings(&["1", "2", "3", "4", "0", "0"])
                .unwrap(),
        };
        assert!(matches!(
            prover.verify(&proof).await,
            Err(ProverError::BinaryNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_proof_leaves_no_witness_on_disk() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let snarkjs = dir.path().join("snarkjs");
        std::fs::write(&snarkjs, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&snarkjs, std::fs::Permissions::from_mode(0o755)).unwrap();
        let work_dir = dir.path().join("work");

        let prover = SnarkjsProver::new(snarkjs, artifacts_in(dir.path()), work_dir.clone());
        let service = ProofService::new(Arc::new(prover), 3, 0, Duration::from_millis(300));

        let deposit = Deposit::random();
        let tree = FixedMerkleTree::from_leaves(3, [deposit.commitment()]).unwrap();
        let inc = inclusion(&tree, &deposit.commitment()).unwrap();
        let err = service
            .generate(&deposit, inc, &WithdrawParams::direct(Address::repeat_byte(0x01)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::Timeout(_)));

        let leftovers: Vec<_> = std::fs::read_dir(&work_dir).unwrap().collect();
        assert!(leftovers.is_empty(), "scratch files left behind: {leftovers:?}");
    }
}
