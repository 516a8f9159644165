use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

use alloy::primitives::{
    Address,
    U256,
};
use serde::{
    Deserialize,
    Deserializer,
};

use crate::{
    adapters::{
        ethereum::TxPolicy,
        snarkjs_prover::CircuitArtifacts,
    },
    context::BridgeParams,
    domain::merkle::MAX_TREE_HEIGHT,
    proof_service::DEFAULT_MAX_RETRIES,
};

/// Environment variable holding the operator key used by `bridge`.
pub const WALLET_PRIVATE_KEY: &str = "WALLET_PRIVATE_KEY";
/// Environment variable holding the relayer key used by `relayer`.
pub const BRIDGE_PRIVATE_KEY: &str = "BRIDGE_PRIVATE_KEY";

/// Upper bound on `prover.max_retries`.
pub const MAX_PROOF_RETRIES: u32 = 3;

/// Top-level bridge configuration loaded from TOML.
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    pub origin: ChainConfig,
    pub destination: ChainConfig,
    pub bridge: ProtocolConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub relayer: RelayerConfig,
    #[serde(default)]
    pub prover: ProverConfig,
}

/// Per-chain configuration.
#[derive(Debug, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    /// Address of the bridge contract on this chain.
    pub contract_address: Address,
    /// Block number at which the contract was deployed. Event scans start here.
    #[serde(default)]
    pub deployment_block: u64,
    /// Block explorer base URL for transaction links (e.g. "https://sepolia.etherscan.io/tx").
    /// When absent, raw tx hashes are printed instead.
    pub explorer_url: Option<String>,
}

impl ChainConfig {
    pub fn tx_link(&self, tx_hash: impl std::fmt::Display) -> String {
        match &self.explorer_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), tx_hash),
            None => tx_hash.to_string(),
        }
    }
}

/// Protocol parameters both contracts were deployed with.
#[derive(Debug, Deserialize)]
pub struct ProtocolConfig {
    /// Deposit amount in wei, as a decimal string.
    #[serde(deserialize_with = "deserialize_wei")]
    pub denomination: U256,
    pub tree_height: usize,
}

/// Operator command settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub gas_multiplier_percent: u64,
    #[serde(with = "humantime_serde")]
    pub receipt_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gas_multiplier_percent: 105,
            receipt_timeout: Duration::from_secs(120),
        }
    }
}

/// Relayer settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    /// Delay between polls once a subscription has caught up (e.g. "4s").
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Blocks an event must be buried under before it is forwarded.
    pub confirmations: u64,
    pub gas_multiplier_percent: u64,
    #[serde(with = "humantime_serde")]
    pub receipt_timeout: Duration,
    /// JSON file holding the per-subscription watermark.
    pub checkpoint_path: PathBuf,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(4),
            confirmations: 0,
            gas_multiplier_percent: 120,
            receipt_timeout: Duration::from_secs(120),
            checkpoint_path: PathBuf::from("relayer-checkpoint.json"),
        }
    }
}

/// Proving settings for `snarkjs`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProverConfig {
    pub snarkjs_bin: PathBuf,
    pub circuit_wasm: PathBuf,
    pub proving_key: PathBuf,
    pub verification_key: PathBuf,
    /// Scratch directory for witness and proof files.
    pub work_dir: PathBuf,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            snarkjs_bin: PathBuf::from("snarkjs"),
            circuit_wasm: PathBuf::from("build/circuits/withdraw.wasm"),
            proving_key: PathBuf::from("build/circuits/withdraw_final.zkey"),
            verification_key: PathBuf::from("build/circuits/verification_key.json"),
            work_dir: std::env::temp_dir().join("shielded-bridge"),
            timeout: Duration::from_secs(300),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ProverConfig {
    pub fn artifacts(&self) -> CircuitArtifacts {
        CircuitArtifacts {
            circuit_wasm: self.circuit_wasm.clone(),
            proving_key: self.proving_key.clone(),
            verification_key: self.verification_key.clone(),
        }
    }
}

/// Errors from config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

impl BridgeConfig {
    /// Load and validate a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let height = self.bridge.tree_height;
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(ConfigError::Validation(format!(
                "bridge.tree_height must be in 1..={MAX_TREE_HEIGHT}, got {height}"
            )));
        }
        if self.bridge.denomination.is_zero() {
            return Err(ConfigError::Validation(
                "bridge.denomination must be greater than zero".into(),
            ));
        }
        if self.relayer.gas_multiplier_percent < 100 {
            return Err(ConfigError::Validation(
                "relayer.gas_multiplier_percent must be at least 100".into(),
            ));
        }
        if self.client.gas_multiplier_percent < 100 {
            return Err(ConfigError::Validation(
                "client.gas_multiplier_percent must be at least 100".into(),
            ));
        }
        if self.relayer.poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "relayer.poll_interval must be greater than zero".into(),
            ));
        }
        if self.relayer.receipt_timeout.is_zero() || self.client.receipt_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "receipt_timeout must be greater than zero".into(),
            ));
        }
        if self.prover.max_retries > MAX_PROOF_RETRIES {
            return Err(ConfigError::Validation(format!(
                "prover.max_retries must be at most {MAX_PROOF_RETRIES}"
            )));
        }
        if self.prover.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "prover.timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn params(&self) -> BridgeParams {
        BridgeParams {
            denomination: self.bridge.denomination,
            tree_height: self.bridge.tree_height,
            origin_deployment_block: self.origin.deployment_block,
            destination_deployment_block: self.destination.deployment_block,
        }
    }

    pub fn client_tx_policy(&self) -> TxPolicy {
        TxPolicy {
            gas_multiplier_percent: self.client.gas_multiplier_percent,
            receipt_timeout: self.client.receipt_timeout,
        }
    }

    pub fn relayer_tx_policy(&self) -> TxPolicy {
        TxPolicy {
            gas_multiplier_percent: self.relayer.gas_multiplier_percent,
            receipt_timeout: self.relayer.receipt_timeout,
        }
    }
}

/// Read a private key from the environment. Keys never live in the config file.
pub fn private_key_from_env(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingEnv(var))
}

fn deserialize_wei<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wei {
        Text(String),
        Number(u64),
    }

    match Wei::deserialize(deserializer)? {
        Wei::Number(n) => Ok(U256::from(n)),
        Wei::Text(s) => s.trim().parse::<U256>().map_err(serde::de::Error::custom),
    }
}
