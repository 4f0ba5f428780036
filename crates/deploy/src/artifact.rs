//! Compiled contract artifacts in the Hardhat layout.
//!
//! ```text
//! artifacts/
//!   contracts/TAIYAKI.sol/TAIYAKI.json       abi and creation bytecode
//!   contracts/TAIYAKI.sol/TAIYAKI.dbg.json   points at the build info
//!   build-info/<id>.json                     compiler version and standard JSON input
//! ```

use std::path::{Path, PathBuf};

use alloy_core::{
    dyn_abi::{DynSolValue, Specifier},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::step::{ArgValue, ContractId};

const BUILD_INFO_DIR: &str = "build-info";
const DBG_EXTENSION: &str = "dbg.json";

/// A compiled contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: JsonAbi,
    /// Creation bytecode.
    pub bytecode: Bytes,
}

impl Artifact {
    /// `source:Name`, the form block explorers expect.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// ABI-encode constructor arguments, coercing each value to its parameter type.
    pub fn encode_constructor_args(&self, args: &[ArgValue]) -> Result<Vec<u8>> {
        let inputs = self
            .abi
            .constructor
            .as_ref()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        if inputs.len() != args.len() {
            anyhow::bail!(
                "{} expects {} constructor argument(s), got {}",
                self.contract_name,
                inputs.len(),
                args.len()
            );
        }

        if args.is_empty() {
            return Ok(Vec::new());
        }

        let values = inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let ty = param
                    .resolve()
                    .with_context(|| format!("Unsupported parameter type {}", param.ty))?;
                ty.coerce_str(&arg.to_abi_string()).with_context(|| {
                    format!("Argument {} is not a valid {} for '{}'", arg, param.ty, param.name)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DynSolValue::Tuple(values).abi_encode_params())
    }

    /// Creation bytecode followed by the encoded constructor arguments.
    pub fn init_code(&self, args: &[ArgValue]) -> Result<Bytes> {
        let encoded = self.encode_constructor_args(args)?;
        let mut code = Vec::with_capacity(self.bytecode.len() + encoded.len());
        code.extend_from_slice(&self.bytecode);
        code.extend_from_slice(&encoded);
        Ok(code.into())
    }
}

/// Compiler metadata shared by every contract of one compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// Short compiler version, e.g. `0.8.4`.
    pub solc_version: String,
    /// Full compiler version, e.g. `0.8.4+commit.c7e474f2`.
    pub solc_long_version: String,
    /// The standard JSON input the contracts were compiled from.
    pub input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: PathBuf,
}

/// Reads artifacts from a Hardhat `artifacts/` directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load the artifact of `contract`.
    pub fn load(&self, contract: &ContractId) -> Result<Artifact> {
        let path = self.artifact_path(contract)?;
        read_json(&path)
    }

    /// Load the build info `contract` was compiled in.
    pub fn build_info(&self, contract: &ContractId) -> Result<BuildInfo> {
        let path = self.artifact_path(contract)?.with_extension(DBG_EXTENSION);
        let debug: DebugFile = read_json(&path)?;

        let dir = path.parent().unwrap_or(&self.root);
        read_json(&dir.join(debug.build_info))
    }

    fn artifact_path(&self, contract: &ContractId) -> Result<PathBuf> {
        let file_name = format!("{}.json", contract.name());

        if let Some(source) = contract.source() {
            let path = self.root.join(source).join(&file_name);
            if !path.is_file() {
                anyhow::bail!("No artifact for {} at {}", contract, path.display());
            }
            return Ok(path);
        }

        let mut found = Vec::new();
        find_files(&self.root, &file_name, &mut found)
            .with_context(|| format!("Failed to search artifacts in {}", self.root.display()))?;

        match found.len() {
            0 => anyhow::bail!(
                "No artifact named {} under {}",
                contract.name(),
                self.root.display()
            ),
            1 => Ok(found.remove(0)),
            _ => anyhow::bail!(
                "Contract name {} is ambiguous ({} artifacts), use the fully qualified name",
                contract.name(),
                found.len()
            ),
        }
    }
}

fn find_files(dir: &Path, file_name: &str, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if entry.file_type()?.is_dir() {
            if entry.file_name() != BUILD_INFO_DIR {
                find_files(&path, file_name, found)?;
            }
        } else if entry.file_name() == file_name {
            found.push(path);
        }
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
