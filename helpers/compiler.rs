//! Source loading and the solc standard-JSON adapter

use crate::{
    artifact::{CompilationResult, Severity},
    config::CompilerConfig,
    error::{Error, Result},
};
use regex::Regex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, info, warn};

/// Reads the contract source as text.
pub fn load_source(path: &Path) -> Result<String> {
    let source = std::fs::read_to_string(path).map_err(|source| Error::SourceRead {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), bytes = source.len(), "Loaded contract source");
    Ok(source)
}

#[derive(Debug, Clone, Serialize)]
pub struct StandardJsonInput {
    language: String,
    sources: BTreeMap<String, SourceUnit>,
    settings: Settings,
}

#[derive(Debug, Clone, Serialize)]
struct SourceUnit {
    content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    output_selection: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl StandardJsonInput {
    /// One Solidity source unit, selecting `outputs` for every contract in it.
    pub fn single_source(
        file_name: impl Into<String>,
        content: impl Into<String>,
        outputs: &[String],
    ) -> Self {
        let sources = BTreeMap::from([(
            file_name.into(),
            SourceUnit {
                content: content.into(),
            },
        )]);
        let all_contracts = BTreeMap::from([("*".to_string(), outputs.to_vec())]);

        Self {
            language: "Solidity".to_string(),
            sources,
            settings: Settings {
                output_selection: BTreeMap::from([("*".to_string(), all_contracts)]),
            },
        }
    }
}

/// A `solc` binary pinned to one version.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    solc_path: PathBuf,
    version: String,
}

impl SolcCompiler {
    pub fn new(solc_path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            solc_path: solc_path.into(),
            version: version.into(),
        }
    }

    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(config.solc_path.clone(), config.version.clone())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Version reported by `solc --version`.
    pub fn installed_version(&self) -> Result<String> {
        let output = Command::new(&self.solc_path)
            .arg("--version")
            .output()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_version(&stdout).ok_or_else(|| {
            Error::CompilerInvocation(format!(
                "Could not read version from '{} --version': {}",
                self.solc_path.display(),
                stdout.trim()
            ))
        })
    }

    pub fn ensure_version(&self) -> Result<()> {
        let found = self.installed_version()?;
        if found != self.version {
            return Err(Error::CompilerVersionMismatch {
                expected: self.version.clone(),
                found,
            });
        }
        Ok(())
    }

    /// Runs `solc --standard-json` on `input`.
    ///
    /// Fails if the compiler reports any diagnostic of severity `error`;
    /// warnings are logged and the result is returned.
    pub fn compile(&self, input: &StandardJsonInput) -> Result<CompilationResult> {
        self.ensure_version()?;

        let payload = serde_json::to_vec(input)?;
        let mut child = Command::new(&self.solc_path)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .map_err(|e| Error::CompilerInvocation(format!("Failed to write input: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::CompilerInvocation(e.to_string()))?;

        if !output.status.success() && output.stdout.is_empty() {
            return Err(Error::CompilerInvocation(format!(
                "solc exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(bytes = output.stdout.len(), "Received compiler output");

        let result = interpret_output(&output.stdout)?;
        info!(version = %self.version, "Compilation succeeded");
        Ok(result)
    }

    fn spawn_error(&self, e: std::io::Error) -> Error {
        Error::CompilerInvocation(format!(
            "Failed to run {}: {}",
            self.solc_path.display(),
            e
        ))
    }
}

/// Parses compiler stdout and turns error diagnostics into a failure.
pub(crate) fn interpret_output(stdout: &[u8]) -> Result<CompilationResult> {
    let result = CompilationResult::from_slice(stdout)?;

    let mut errors = Vec::new();
    for diagnostic in result.diagnostics()? {
        match diagnostic.severity {
            Severity::Error => errors.push(diagnostic.display_message().to_string()),
            Severity::Warning => warn!(kind = %diagnostic.kind, "{}", diagnostic.message),
            Severity::Info => debug!("{}", diagnostic.message),
        }
    }

    if !errors.is_empty() {
        return Err(Error::Compilation(errors.join("\n")));
    }
    Ok(result)
}

/// Extracts `x.y.z` from the output of `solc --version`.
pub fn parse_version(output: &str) -> Option<String> {
    let re = Regex::new(r"Version:\s*(\d+\.\d+\.\d+)").ok()?;
    re.captures(output).map(|cap| cap[1].to_string())
}
