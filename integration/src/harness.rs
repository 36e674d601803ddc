use alloy_primitives::hex;
use helpers::{CompilationResult, DeployConfig};
use rand::RngCore;
use std::path::Path;

/// Anvil's first dev account, funded on any default local node.
pub const ANVIL_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Compiler output for SimpleStorage.sol, used where solc is not available.
pub const SIMPLE_STORAGE_OUTPUT: &str =
    include_str!("../../helpers/testdata/simple_storage_output.json");

pub fn simple_storage_output() -> anyhow::Result<CompilationResult> {
    Ok(CompilationResult::from_slice(SIMPLE_STORAGE_OUTPUT.as_bytes())?)
}

/// Fresh throwaway key, so each test starts from nonce zero.
pub fn random_private_key() -> String {
    let mut bytes = [0_u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

pub fn contract_source_path() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../contracts/simple-storage/SimpleStorage.sol")
}

/// Config for the SimpleStorage contract against `rpc_url`.
pub fn test_config(
    rpc_url: &str,
    chain_id: u64,
    private_key: &str,
    artifact_dir: &Path,
) -> anyhow::Result<DeployConfig> {
    let config = format!(
        r#"
artifact_path = "{artifact}"

[contract]
source_path = "{source}"
file_name = "SimpleStorage.sol"
contract_name = "SimpleStorage"

[network]
rpc_url = "{rpc_url}"
chain_id = {chain_id}
poll_interval_ms = 5
receipt_timeout_seconds = 30

[account]
private_key = "{private_key}"
"#,
        artifact = artifact_dir.join("compiled_code.json").display(),
        source = contract_source_path().display(),
    );
    Ok(config.parse()?)
}
