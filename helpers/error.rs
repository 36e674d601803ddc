//! Error types shared by every stage of the deployment pipeline

use alloy_primitives::B256;
use std::path::PathBuf;

/// Convenience Result type alias using the local Error type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Source and compiler errors
    #[error("Failed to read contract source {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Compiler invocation failed: {0}")]
    CompilerInvocation(String),

    #[error("Compiler version mismatch: expected {expected}, found {found}")]
    CompilerVersionMismatch { expected: String, found: String },

    #[error("Compilation failed:\n{0}")]
    Compilation(String),

    // Artifact errors
    #[error("Source file '{file}' not present in compiler output (available: {available})")]
    MissingSource { file: String, available: String },

    #[error("Contract '{contract}' not found in '{file}' (available: {available})")]
    MissingContract {
        file: String,
        contract: String,
        available: String,
    },

    #[error("Contract '{contract}' has no '{field}' in compiler output")]
    MissingArtifactField { contract: String, field: String },

    #[error("Invalid bytecode for contract '{contract}': {reason}")]
    InvalidBytecode { contract: String, reason: String },

    #[error("Artifact I/O failed for {path}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Config errors
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Chain errors
    #[error("RPC request failed: {0}")]
    RpcError(String),

    #[error("Chain id mismatch: configured {configured}, node reports {reported}")]
    ChainIdMismatch { configured: u64, reported: u64 },

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Transaction {0} reverted")]
    Reverted(B256),

    #[error("Timed out waiting for receipt of transaction {0}")]
    ReceiptTimeout(B256),

    #[error("No contract address in receipt of transaction {0}")]
    MissingContractAddress(B256),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
