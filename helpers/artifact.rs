//! Compiler output and the contract artifacts extracted from it

use crate::error::{Error, Result};
use alloy_json_abi::JsonAbi;
use alloy_primitives::{hex, Bytes};
use serde::Deserialize;
use serde_json::Value;
use std::{fs, path::Path};

/// Full standard-JSON output of one solc run, kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationResult {
    raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub formatted_message: Option<String>,
}

impl Diagnostic {
    /// The compiler's pretty message when present, the bare message otherwise.
    pub fn display_message(&self) -> &str {
        self.formatted_message
            .as_deref()
            .unwrap_or(&self.message)
            .trim_end()
    }
}

/// Bytecode and ABI of a single contract.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    pub abi: JsonAbi,
    /// The ABI exactly as solc emitted it.
    pub abi_json: Value,
    pub bytecode: Bytes,
}

impl CompilationResult {
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_value(serde_json::from_slice(bytes)?))
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn diagnostics(&self) -> Result<Vec<Diagnostic>> {
        match self.raw.get("errors") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(errors) => Ok(serde_json::from_value(errors.clone())?),
        }
    }

    pub fn has_errors(&self) -> Result<bool> {
        Ok(self
            .diagnostics()?
            .iter()
            .any(|d| d.severity == Severity::Error))
    }

    /// Walks `contracts.<file>.<name>` and pulls out the ABI and creation bytecode.
    pub fn contract(&self, file_name: &str, contract_name: &str) -> Result<ContractArtifact> {
        let empty = serde_json::Map::new();
        let sources = self
            .raw
            .get("contracts")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let contracts = sources
            .get(file_name)
            .and_then(Value::as_object)
            .ok_or_else(|| Error::MissingSource {
                file: file_name.to_string(),
                available: join_keys(sources),
            })?;

        let contract = contracts
            .get(contract_name)
            .ok_or_else(|| Error::MissingContract {
                file: file_name.to_string(),
                contract: contract_name.to_string(),
                available: join_keys(contracts),
            })?;

        let missing = |field: &str| Error::MissingArtifactField {
            contract: contract_name.to_string(),
            field: field.to_string(),
        };

        let abi_json = contract.get("abi").cloned().ok_or_else(|| missing("abi"))?;
        let abi: JsonAbi = serde_json::from_value(abi_json.clone())
            .map_err(|e| Error::Abi(format!("Invalid ABI for {}: {}", contract_name, e)))?;

        let object = contract
            .pointer("/evm/bytecode/object")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("evm.bytecode.object"))?;
        let bytecode = decode_bytecode(contract_name, object)?;

        Ok(ContractArtifact {
            name: contract_name.to_string(),
            abi,
            abi_json,
            bytecode,
        })
    }

    /// Overwrites `path` with the full compiler output.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let io_err = |source| Error::ArtifactIo {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec(&self.raw)?;
        fs::write(path, bytes).map_err(io_err)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|source| Error::ArtifactIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_slice(&bytes)
    }
}

fn decode_bytecode(contract_name: &str, object: &str) -> Result<Bytes> {
    let invalid = |reason: String| Error::InvalidBytecode {
        contract: contract_name.to_string(),
        reason,
    };

    if object.is_empty() {
        return Err(invalid(
            "empty bytecode (abstract contract or interface)".to_string(),
        ));
    }
    if object.contains("__$") {
        return Err(invalid("unlinked library placeholder".to_string()));
    }

    hex::decode(object)
        .map(Bytes::from)
        .map_err(|e| invalid(e.to_string()))
}

fn join_keys(map: &serde_json::Map<String, Value>) -> String {
    if map.is_empty() {
        return "none".to_string();
    }
    map.keys().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Standard-JSON output shaped like solc 0.6.0's for SimpleStorage.sol.
    pub(crate) const SIMPLE_STORAGE_OUTPUT: &str = include_str!("testdata/simple_storage_output.json");

    fn output() -> CompilationResult {
        CompilationResult::from_slice(SIMPLE_STORAGE_OUTPUT.as_bytes()).unwrap()
    }

    #[test]
    fn test_extract_simple_storage() {
        let artifact = output().contract("SimpleStorage.sol", "SimpleStorage").unwrap();
        assert_eq!(artifact.name, "SimpleStorage");
        assert!(artifact.abi.function("store").is_some());
        assert!(artifact.abi.function("retrieve").is_some());
        assert_eq!(&artifact.bytecode[..2], &[0x60, 0x80]);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let result = output();
        let first = result.contract("SimpleStorage.sol", "SimpleStorage").unwrap();
        let second = result.contract("SimpleStorage.sol", "SimpleStorage").unwrap();
        assert_eq!(first.bytecode, second.bytecode);
        assert_eq!(first.abi, second.abi);
    }

    #[test]
    fn test_wrong_file_name_is_descriptive() {
        let err = output().contract("Simplestorage.sol", "SimpleStorage").unwrap_err();
        match err {
            Error::MissingSource { file, available } => {
                assert_eq!(file, "Simplestorage.sol");
                assert_eq!(available, "SimpleStorage.sol");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_contract_name_is_descriptive() {
        let err = output().contract("SimpleStorage.sol", "SimpleStorag").unwrap_err();
        assert!(matches!(err, Error::MissingContract { .. }));
        assert!(err.to_string().contains("available: SimpleStorage"));
    }

    #[test]
    fn test_missing_bytecode_field() {
        let raw = serde_json::json!({
            "contracts": { "A.sol": { "A": { "abi": [] } } }
        });
        let err = CompilationResult::from_value(raw).contract("A.sol", "A").unwrap_err();
        assert!(matches!(err, Error::MissingArtifactField { ref field, .. } if field == "evm.bytecode.object"));
    }

    #[test]
    fn test_interface_has_no_bytecode() {
        let raw = serde_json::json!({
            "contracts": { "I.sol": { "I": { "abi": [], "evm": { "bytecode": { "object": "" } } } } }
        });
        let err = CompilationResult::from_value(raw).contract("I.sol", "I").unwrap_err();
        assert!(matches!(err, Error::InvalidBytecode { .. }));
    }

    #[test]
    fn test_diagnostics_parsed() {
        let raw = serde_json::json!({
            "errors": [
                {
                    "severity": "warning",
                    "type": "Warning",
                    "component": "general",
                    "message": "SPDX license identifier not provided in source file.",
                    "formattedMessage": "Warning: SPDX license identifier not provided in source file.\n"
                },
                {
                    "severity": "error",
                    "type": "ParserError",
                    "component": "general",
                    "message": "Expected ';' but got 'function'",
                    "formattedMessage": "SimpleStorage.sol:5:5: ParserError: Expected ';' but got 'function'\n"
                }
            ]
        });
        let result = CompilationResult::from_value(raw);
        let diagnostics = result.diagnostics().unwrap();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[1].kind, "ParserError");
        assert!(diagnostics[1].display_message().ends_with("got 'function'"));
        assert!(result.has_errors().unwrap());
        assert!(!output().has_errors().unwrap());
    }

    #[test]
    fn test_artifact_file_round_trip() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("build").join("compiled_code.json");
        let result = output();
        let used = result.contract("SimpleStorage.sol", "SimpleStorage").unwrap();

        result.write_to(&path).unwrap();
        let reread = CompilationResult::read_from(&path).unwrap();
        assert_eq!(reread, result);

        let persisted = reread.contract("SimpleStorage.sol", "SimpleStorage").unwrap();
        assert_eq!(persisted.bytecode, used.bytecode);
        assert_eq!(persisted.abi_json, used.abi_json);
    }
}
