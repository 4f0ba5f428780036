//! Deployment step definitions.
//!
//! A [`StepDefinition`] names one contract deployment, the flag gating it, and the
//! constructor arguments to deploy it with. Arguments are either literal values or
//! [`AddressRef`]s that are resolved at execution time against the addresses
//! produced earlier in the same run and the seed address table.

use std::{collections::BTreeMap, fmt, str::FromStr};

use alloy_core::primitives::Address;
use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};

use crate::ledger::DeploymentLedger;

/// Prefix marking a named address reference in configuration files (`"@TAIYAKI"`).
pub const REFERENCE_PREFIX: char = '@';

/// Identifier of a compiled contract.
///
/// Either fully qualified (`contracts/TAIYAKI.sol:TAIYAKI`) or a bare contract name
/// (`TAIYAKI`), in which case the artifact is looked up by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractId {
    source: Option<String>,
    name: String,
}

impl ContractId {
    /// Create a fully qualified contract identifier.
    pub fn qualified(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            name: name.into(),
        }
    }

    /// Create a contract identifier from a bare contract name.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            source: None,
            name: name.into(),
        }
    }

    /// The source file path, if the identifier is fully qualified.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The contract name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}:{}", source, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for ContractId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.rsplit_once(':') {
            Some((source, name)) => {
                if source.is_empty() || name.is_empty() {
                    anyhow::bail!("Invalid contract identifier '{}': expected <path>:<Name>", s);
                }
                Ok(Self::qualified(source, name))
            }
            None if s.is_empty() => anyhow::bail!("Contract identifier cannot be empty"),
            None => Ok(Self::bare(s)),
        }
    }
}

impl TryFrom<String> for ContractId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContractId> for String {
    fn from(id: ContractId) -> Self {
        id.to_string()
    }
}

/// A reference to an address used as a constructor argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressRef {
    /// An address known before the run starts.
    Literal(Address),
    /// The address produced by an earlier step, or a seed address, with this name.
    Named(String),
}

impl AddressRef {
    /// Reference the address produced by (or seeded for) `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Resolve this reference.
    ///
    /// Names are looked up in the ledger first, so an address deployed during this run
    /// shadows a seed address of the same name. Returns `None` when the name is unknown.
    pub fn resolve(&self, seeds: &SeedAddresses, ledger: &DeploymentLedger) -> Option<Address> {
        match self {
            Self::Literal(address) => Some(*address),
            Self::Named(name) => ledger
                .address_of(name)
                .or_else(|| seeds.get(name).copied()),
        }
    }
}

impl fmt::Display for AddressRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(address) => write!(f, "{}", address),
            Self::Named(name) => write!(f, "{}{}", REFERENCE_PREFIX, name),
        }
    }
}

impl From<Address> for AddressRef {
    fn from(address: Address) -> Self {
        Self::Literal(address)
    }
}

/// A resolved constructor argument.
///
/// Integers and text are coerced against the constructor's ABI parameter type when
/// the deployment calldata is encoded, so a `uint256` can be given as a decimal string.
///
/// Serialized with its kind, so text that happens to look like an address is read
/// back as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    Address(Address),
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ArgValue {
    /// String form accepted by the ABI coercion of the matching parameter type.
    pub fn to_abi_string(&self) -> String {
        match self {
            Self::Address(address) => address.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{:?}", value),
            other => write!(f, "{}", other.to_abi_string()),
        }
    }
}

/// A constructor argument as declared, before address resolution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawArg")]
pub enum ArgSpec {
    Address(AddressRef),
    Value(ArgValue),
}

impl From<AddressRef> for ArgSpec {
    fn from(reference: AddressRef) -> Self {
        Self::Address(reference)
    }
}

impl From<Address> for ArgSpec {
    fn from(address: Address) -> Self {
        Self::Address(AddressRef::Literal(address))
    }
}

impl From<ArgValue> for ArgSpec {
    fn from(value: ArgValue) -> Self {
        Self::Value(value)
    }
}

impl From<bool> for ArgSpec {
    fn from(value: bool) -> Self {
        Self::Value(ArgValue::Bool(value))
    }
}

impl From<i64> for ArgSpec {
    fn from(value: i64) -> Self {
        Self::Value(ArgValue::Int(value))
    }
}

impl From<&str> for ArgSpec {
    fn from(value: &str) -> Self {
        Self::Value(ArgValue::Text(value.to_string()))
    }
}

/// Untyped argument as it appears in a configuration file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawArg {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl TryFrom<RawArg> for ArgSpec {
    type Error = String;

    fn try_from(raw: RawArg) -> Result<Self, Self::Error> {
        match raw {
            RawArg::Bool(value) => Ok(value.into()),
            RawArg::Int(value) => Ok(value.into()),
            RawArg::Text(text) => parse_text_arg(&text),
        }
    }
}

/// `@name` is a reference, a 0x-prefixed 20-byte hex string is a literal address,
/// anything else is passed through as text.
fn parse_text_arg(text: &str) -> Result<ArgSpec, String> {
    if let Some(name) = text.strip_prefix(REFERENCE_PREFIX) {
        if name.trim().is_empty() {
            return Err(format!("Empty address reference '{}'", text));
        }
        return Ok(AddressRef::named(name.trim()).into());
    }

    if text.len() == 42 && text.starts_with("0x") {
        if let Ok(address) = text.parse::<Address>() {
            return Ok(address.into());
        }
    }

    Ok(ArgSpec::Value(ArgValue::Text(text.to_string())))
}

/// Addresses supplied as static configuration rather than produced by the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, From)]
pub struct SeedAddresses(BTreeMap<String, Address>);

impl SeedAddresses {
    /// Add or replace a seed address.
    pub fn insert(&mut self, name: impl Into<String>, address: Address) -> Option<Address> {
        self.0.insert(name.into(), address)
    }
}

impl<S: Into<String>> FromIterator<(S, Address)> for SeedAddresses {
    fn from_iter<I: IntoIterator<Item = (S, Address)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(name, address)| (name.into(), address)).collect())
    }
}

/// A named reference that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference(pub String);

/// One contract deployment in the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    /// Unique name of the step, used to reference its deployed address.
    pub name: String,
    /// The contract to deploy.
    pub contract: ContractId,
    /// Whether the step runs at all.
    pub enabled: bool,
    /// Whether the deployed contract is submitted for source verification.
    pub verify: bool,
    /// Constructor arguments, in order.
    pub args: Vec<ArgSpec>,
}

impl StepDefinition {
    /// Create an enabled, verified step with no constructor arguments.
    pub fn new(name: impl Into<String>, contract: ContractId) -> Self {
        Self {
            name: name.into(),
            contract,
            enabled: true,
            verify: true,
            args: Vec::new(),
        }
    }

    /// Set whether the step runs.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set whether the deployed contract is verified.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Append a constructor argument.
    pub fn arg(mut self, arg: impl Into<ArgSpec>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append the address produced by (or seeded for) `name` as a constructor argument.
    pub fn address_of(self, name: impl Into<String>) -> Self {
        self.arg(AddressRef::named(name))
    }

    /// The address references this step depends on, in argument order.
    pub fn depends_on(&self) -> impl Iterator<Item = &AddressRef> {
        self.args.iter().filter_map(|arg| match arg {
            ArgSpec::Address(reference) => Some(reference),
            ArgSpec::Value(_) => None,
        })
    }

    /// Build the constructor arguments, resolving every address reference.
    pub fn resolve_args(
        &self,
        seeds: &SeedAddresses,
        ledger: &DeploymentLedger,
    ) -> Result<Vec<ArgValue>, UnresolvedReference> {
        self.args
            .iter()
            .map(|arg| match arg {
                ArgSpec::Value(value) => Ok(value.clone()),
                ArgSpec::Address(reference) => reference
                    .resolve(seeds, ledger)
                    .map(ArgValue::Address)
                    .ok_or_else(|| UnresolvedReference(reference.to_string())),
            })
            .collect()
    }
}
