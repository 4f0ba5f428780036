//! In-memory record of the contracts deployed during a run.

use alloy_core::primitives::{Address, TxHash};
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use derive_more::Deref;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::step::{ArgValue, ContractId};

/// Outcome of one executed deployment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Name of the step that produced this deployment.
    pub step_name: String,
    /// The deployed contract.
    pub contract: ContractId,
    /// Address of the deployed contract.
    pub address: Address,
    /// Hash of the contract creation transaction, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    /// The resolved constructor arguments the contract was deployed with.
    pub constructor_args: Vec<ArgValue>,
    /// Whether the contract source was verified on the block explorer.
    pub verified: bool,
}

/// Deployment results of a run, keyed by step name, in execution order.
///
/// The ledger only grows: results are appended as steps complete and are never
/// replaced or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentLedger(IndexMap<String, DeploymentResult>);

impl DeploymentLedger {
    pub(crate) fn record(&mut self, result: DeploymentResult) {
        debug_assert!(
            !self.0.contains_key(&result.step_name),
            "step {} recorded twice",
            result.step_name
        );
        self.0.insert(result.step_name.clone(), result);
    }

    /// Address deployed by the step `name` during this run.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.0.get(name).map(|result| result.address)
    }

    /// Deployment results in execution order.
    pub fn results(&self) -> impl Iterator<Item = &DeploymentResult> {
        self.0.values()
    }

    /// Names of the executed steps in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// Render the ledger as a table.
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec!["Step", "Contract", "Address", "Verified"]);

        for result in self.results() {
            table.add_row(vec![
                result.step_name.clone(),
                result.contract.to_string(),
                result.address.to_string(),
                if result.verified { "yes" } else { "no" }.to_string(),
            ]);
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;

    fn result(name: &str, address: Address) -> DeploymentResult {
        DeploymentResult {
            step_name: name.to_string(),
            contract: ContractId::bare(name),
            address,
            tx_hash: None,
            constructor_args: vec![],
            verified: true,
        }
    }

    #[test]
    fn test_ledger_keeps_insertion_order() {
        let mut ledger = DeploymentLedger::default();
        ledger.record(result("TAIYAKILP", address!("00000000000000000000000000000000000000cc")));
        ledger.record(result("ChonkNFT", address!("00000000000000000000000000000000000000bb")));
        ledger.record(result("TAIYAKI", address!("00000000000000000000000000000000000000aa")));

        assert_eq!(ledger.step_names(), vec!["TAIYAKILP", "ChonkNFT", "TAIYAKI"]);
        assert_eq!(
            ledger.address_of("ChonkNFT"),
            Some(address!("00000000000000000000000000000000000000bb"))
        );
        assert_eq!(ledger.address_of("NFTManager"), None);
    }

    #[test]
    fn test_ledger_serde_preserves_order() {
        let mut ledger = DeploymentLedger::default();
        ledger.record(result("b", address!("00000000000000000000000000000000000000bb")));
        ledger.record(result("a", address!("00000000000000000000000000000000000000aa")));

        let json = serde_json::to_string(&ledger).unwrap();
        let loaded: DeploymentLedger = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded.step_names(), vec!["b", "a"]);
        assert_eq!(loaded, ledger);
    }

    #[test]
    fn test_ledger_table_has_one_row_per_step() {
        let mut ledger = DeploymentLedger::default();
        ledger.record(result("TAIYAKI", address!("00000000000000000000000000000000000000aa")));

        let rendered = ledger.table().to_string();
        assert!(rendered.contains("TAIYAKI"));
        assert!(rendered.to_lowercase().contains("0x00000000000000000000000000000000000000aa"));
    }
}
