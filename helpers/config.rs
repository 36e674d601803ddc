//! Deployment configuration
//!
//! Loads the TOML file that replaces the hard-coded endpoint, chain id and
//! credentials. `${VAR}` and `${VAR:-default}` placeholders are substituted
//! from the environment before parsing, so secrets never live in the file.

use crate::error::{Error, Result};
use alloy_primitives::{hex, Address};
use alloy_signer_local::PrivateKeySigner;
use regex::Regex;
use serde::Deserialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Compiler version the SimpleStorage source is written against.
pub const DEFAULT_SOLC_VERSION: &str = "0.6.0";

/// Sections of an output selection requested from solc.
pub const DEFAULT_OUTPUT_SELECTION: &[&str] =
    &["abi", "metadata", "evm.bytecode", "evm.bytecode.sourceMap"];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,
    #[serde(default)]
    pub nonce_policy: NoncePolicy,
    #[serde(default = "default_store_value")]
    pub store_value: u64,
    pub contract: ContractConfig,
    #[serde(default)]
    pub compiler: CompilerConfig,
    pub network: NetworkConfig,
    pub account: AccountConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractConfig {
    pub source_path: PathBuf,
    /// Key of the source unit in the compiler output, e.g. `SimpleStorage.sol`.
    pub file_name: String,
    pub contract_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    #[serde(default = "default_solc_path")]
    pub solc_path: PathBuf,
    #[serde(default = "default_solc_version")]
    pub version: String,
    #[serde(default = "default_output_selection")]
    pub output_selection: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            solc_path: default_solc_path(),
            version: default_solc_version(),
            output_selection: default_output_selection(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_receipt_timeout_seconds")]
    pub receipt_timeout_seconds: u64,
}

impl NetworkConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub private_key: PrivateKey,
    /// Optional cross-check against the address derived from the key.
    #[serde(default)]
    pub address: Option<Address>,
}

impl AccountConfig {
    /// Builds the local signer and checks it against the configured address.
    pub fn signer(&self) -> Result<PrivateKeySigner> {
        let signer = PrivateKeySigner::from_str(self.private_key.expose())
            .map_err(|e| Error::InvalidConfig(format!("Invalid private key: {}", e)))?;

        if let Some(expected) = self.address {
            if expected != signer.address() {
                return Err(Error::InvalidConfig(format!(
                    "Configured address {} does not match private key address {}",
                    expected,
                    signer.address()
                )));
            }
        }

        Ok(signer)
    }
}

/// How the sequencer obtains the nonce of each transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoncePolicy {
    /// Query the node once, then hand out N, N+1, ... locally.
    #[default]
    Sequential,
    /// Query the node before every transaction.
    Live,
}

impl FromStr for NoncePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "live" => Ok(Self::Live),
            other => Err(Error::InvalidConfig(format!(
                "Unknown nonce policy '{}', expected 'sequential' or 'live'",
                other
            ))),
        }
    }
}

/// Hex private key whose Debug output never shows the key material.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("compiled_code.json")
}

fn default_store_value() -> u64 {
    15
}

fn default_solc_path() -> PathBuf {
    PathBuf::from("solc")
}

fn default_solc_version() -> String {
    DEFAULT_SOLC_VERSION.to_string()
}

fn default_output_selection() -> Vec<String> {
    DEFAULT_OUTPUT_SELECTION
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_receipt_timeout_seconds() -> u64 {
    120
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
        .map_err(|e| Error::InvalidConfig(format!("Regex error: {e}")))?;

    let mut result = String::with_capacity(input.len());
    let mut last = 0;

    for cap in re.captures_iter(input) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name.as_str()) {
            Ok(v) => v,
            Err(_) => match default_value {
                Some(default) => default.to_string(),
                None => {
                    return Err(Error::InvalidConfig(format!(
                        "Environment variable '{}' not found",
                        var_name.as_str()
                    )))
                }
            },
        };

        result.push_str(&input[last..full_match.start()]);
        result.push_str(&value);
        last = full_match.end();
    }
    result.push_str(&input[last..]);

    Ok(result)
}

impl DeployConfig {
    /// Loads configuration from a file.
    ///
    /// Relative source and artifact paths are resolved against the directory
    /// holding the config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config: Self = raw.parse()?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base_dir);
        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        if self.contract.source_path.is_relative() {
            self.contract.source_path = base_dir.join(&self.contract.source_path);
        }
        if self.artifact_path.is_relative() {
            self.artifact_path = base_dir.join(&self.artifact_path);
        }
    }

    /// Checks the values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if self.contract.file_name.trim().is_empty() {
            return Err(Error::InvalidConfig("contract.file_name is empty".into()));
        }
        if self.contract.contract_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "contract.contract_name is empty".into(),
            ));
        }
        if self.compiler.version.trim().is_empty() {
            return Err(Error::InvalidConfig("compiler.version is empty".into()));
        }
        if self.network.chain_id == 0 {
            return Err(Error::InvalidConfig("network.chain_id must be non-zero".into()));
        }
        if self.network.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "network.poll_interval_ms must be non-zero".into(),
            ));
        }

        let url = url::Url::parse(&self.network.rpc_url)
            .map_err(|e| Error::InvalidConfig(format!("Invalid RPC URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidConfig(format!(
                "RPC URL must be http or https, got '{}'",
                url.scheme()
            )));
        }

        let key = self.account.private_key.expose();
        let key = key.strip_prefix("0x").unwrap_or(key);
        if key.len() != 64 {
            return Err(Error::InvalidConfig(
                "Private key must be 64 hex characters (32 bytes)".into(),
            ));
        }
        if hex::decode(key).is_err() {
            return Err(Error::InvalidConfig(
                "Private key must be valid hexadecimal".into(),
            ));
        }

        Ok(())
    }
}

impl FromStr for DeployConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let resolved = resolve_env_vars(s)?;
        let config: Self = toml::from_str(&resolved)
            .map_err(|e| Error::InvalidConfig(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}
