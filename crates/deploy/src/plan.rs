//! Dry-run preview of a deployment run.

use std::collections::HashSet;

use alloy_core::primitives::Address;
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use strum::Display;

use crate::step::{AddressRef, ContractId, SeedAddresses, StepDefinition};

/// Where an address reference would be resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ReferenceSource {
    Literal,
    /// An earlier enabled step of the same run.
    Step,
    Seed,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReference {
    pub reference: AddressRef,
    pub source: ReferenceSource,
    /// Known only for literals and seeds; step addresses exist once deployed.
    pub address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub name: String,
    pub contract: ContractId,
    pub enabled: bool,
    pub verify: bool,
    pub references: Vec<PlannedReference>,
}

/// What a run would do, computed without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<PlannedStep>,
}

impl Plan {
    pub fn new(steps: &[StepDefinition], seeds: &SeedAddresses) -> Self {
        let mut deployed = HashSet::new();

        let steps = steps
            .iter()
            .map(|step| {
                let references = step
                    .depends_on()
                    .map(|reference| plan_reference(reference, seeds, &deployed))
                    .collect();

                if step.enabled {
                    deployed.insert(step.name.as_str());
                }

                PlannedStep {
                    name: step.name.clone(),
                    contract: step.contract.clone(),
                    enabled: step.enabled,
                    verify: step.verify,
                    references,
                }
            })
            .collect();

        Self { steps }
    }

    /// References of enabled steps that would abort the run.
    pub fn unresolved(&self) -> impl Iterator<Item = (&str, &AddressRef)> {
        self.steps
            .iter()
            .filter(|step| step.enabled)
            .flat_map(|step| {
                step.references
                    .iter()
                    .filter(|r| r.source == ReferenceSource::Unresolved)
                    .map(move |r| (step.name.as_str(), &r.reference))
            })
    }

    /// Whether a run would get past every reference resolution.
    pub fn is_runnable(&self) -> bool {
        !self.steps.is_empty() && self.unresolved().next().is_none()
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec!["Step", "Contract", "Runs", "Verify", "References"]);

        for step in &self.steps {
            let references = step
                .references
                .iter()
                .map(|r| match r.address {
                    Some(address) if r.source == ReferenceSource::Seed => {
                        format!("{} ({} {})", r.reference, r.source, address)
                    }
                    _ => format!("{} ({})", r.reference, r.source),
                })
                .collect::<Vec<_>>()
                .join("\n");

            table.add_row(vec![
                step.name.clone(),
                step.contract.to_string(),
                yes_no(step.enabled),
                yes_no(step.verify),
                references,
            ]);
        }

        table
    }
}

fn plan_reference(
    reference: &AddressRef,
    seeds: &SeedAddresses,
    deployed: &HashSet<&str>,
) -> PlannedReference {
    let (source, address) = match reference {
        AddressRef::Literal(address) => (ReferenceSource::Literal, Some(*address)),
        AddressRef::Named(name) if deployed.contains(name.as_str()) => (ReferenceSource::Step, None),
        AddressRef::Named(name) => match seeds.get(name) {
            Some(address) => (ReferenceSource::Seed, Some(*address)),
            None => (ReferenceSource::Unresolved, None),
        },
    };

    PlannedReference {
        reference: reference.clone(),
        source,
        address,
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;

    const NFT: Address = address!("BdA6415502b0ddaB9EDA1D09F4f16286273Fdbb6");
    const WETH: Address = address!("c778417e063141139fce010982780140aa0cd5ab");

    fn steps(nft_enabled: bool) -> Vec<StepDefinition> {
        vec![
            StepDefinition::new("ChonkNFT", ContractId::bare("ChonkNFT")).enabled(nft_enabled),
            StepDefinition::new("NFTManager", ContractId::bare("NFTManager")).address_of("ChonkNFT"),
            StepDefinition::new("ChonkMachineManager", ContractId::bare("ChonkMachineManager"))
                .address_of("NFTManager")
                .address_of("TAIYAKI")
                .arg(WETH),
        ]
    }

    #[test]
    fn test_plan_sources() {
        let seeds: SeedAddresses = [("ChonkNFT", NFT)].into_iter().collect();

        let plan = Plan::new(&steps(true), &seeds);
        assert_eq!(plan.steps[1].references[0].source, ReferenceSource::Step);

        let plan = Plan::new(&steps(false), &seeds);
        assert_eq!(plan.steps[1].references[0].source, ReferenceSource::Seed);
        assert_eq!(plan.steps[1].references[0].address, Some(NFT));

        let machine = &plan.steps[2].references;
        assert_eq!(machine[0].source, ReferenceSource::Step);
        assert_eq!(machine[1].source, ReferenceSource::Unresolved);
        assert_eq!(machine[2].source, ReferenceSource::Literal);
        assert_eq!(machine[2].address, Some(WETH));

        assert!(!plan.is_runnable());
        let unresolved: Vec<_> = plan.unresolved().collect();
        assert_eq!(
            unresolved,
            vec![("ChonkMachineManager", &AddressRef::named("TAIYAKI"))]
        );
    }

    #[test]
    fn test_disabled_steps_are_not_checked() {
        let seeds = SeedAddresses::default();
        let steps = vec![
            StepDefinition::new("Token", ContractId::bare("Token")),
            StepDefinition::new("Pool", ContractId::bare("Pool"))
                .address_of("Missing")
                .enabled(false),
        ];

        let plan = Plan::new(&steps, &seeds);
        assert!(plan.is_runnable());
        assert_eq!(plan.steps[1].references[0].source, ReferenceSource::Unresolved);
        assert!(plan.table().to_string().contains("@Missing (unresolved)"));
    }

    #[test]
    fn test_empty_plan_is_not_runnable() {
        assert!(!Plan::new(&[], &SeedAddresses::default()).is_runnable());
    }
}
