//! Behaviour of the deployment sequencer against in-memory deployers and verifiers.
//!
//! Run with: cargo test --test sequencer

use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use alloy_core::primitives::{Address, B256, address};
use taiyaki_deploy::{
    ArgValue, ContractDeployer, ContractId, DeployReceipt, DeploymentError, RunErrorKind,
    SeedAddresses, Sequencer, SettleStrategy, SourceVerifier, StepDefinition, VerificationError,
};
use tokio::time::Instant;

const DEPLOY_BLOCK: u64 = 100;

/// Deploys every contract at a fresh address, failing for the configured names.
#[derive(Default)]
struct MockDeployer {
    fail: HashSet<String>,
    calls: Mutex<Vec<(String, Vec<ArgValue>, Instant)>>,
    head: AtomicU64,
    head_unavailable: bool,
    head_polls: AtomicU64,
}

impl MockDeployer {
    fn failing(names: &[&str]) -> Self {
        Self {
            fail: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(String, Vec<ArgValue>)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, args, _)| (name.clone(), args.clone()))
            .collect()
    }

    fn deployed_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }

    fn last_deploy_at(&self) -> Instant {
        self.calls.lock().unwrap().last().unwrap().2
    }
}

impl ContractDeployer for MockDeployer {
    async fn deploy(
        &self,
        contract: &ContractId,
        args: &[ArgValue],
    ) -> Result<DeployReceipt, DeploymentError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((contract.name().to_string(), args.to_vec(), Instant::now()));
            calls.len()
        };

        if self.fail.contains(contract.name()) {
            return Err(DeploymentError::Reverted {
                tx_hash: B256::with_last_byte(index as u8),
            });
        }

        self.head.store(DEPLOY_BLOCK, Ordering::SeqCst);
        Ok(DeployReceipt {
            address: Address::with_last_byte(index as u8),
            tx_hash: B256::with_last_byte(index as u8),
            block_number: DEPLOY_BLOCK,
        })
    }

    async fn block_number(&self) -> Result<u64, DeploymentError> {
        self.head_polls.fetch_add(1, Ordering::SeqCst);
        if self.head_unavailable {
            return Err(DeploymentError::Other(anyhow::anyhow!("connection refused")));
        }
        Ok(self.head.fetch_add(1, Ordering::SeqCst))
    }
}

/// Records verification requests, failing for the configured names.
#[derive(Default)]
struct MockVerifier {
    fail: HashSet<String>,
    calls: Mutex<Vec<(String, Address, Vec<ArgValue>, Instant)>>,
}

impl MockVerifier {
    fn failing(names: &[&str]) -> Self {
        Self {
            fail: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    fn verified_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, ..)| name.clone())
            .collect()
    }
}

impl SourceVerifier for MockVerifier {
    async fn verify_source(
        &self,
        contract: &ContractId,
        address: Address,
        args: &[ArgValue],
    ) -> Result<(), VerificationError> {
        self.calls.lock().unwrap().push((
            contract.name().to_string(),
            address,
            args.to_vec(),
            Instant::now(),
        ));

        if self.fail.contains(contract.name()) {
            return Err(VerificationError::Rejected("Fail - Unable to verify".to_string()));
        }
        Ok(())
    }
}

fn step(name: &str) -> StepDefinition {
    StepDefinition::new(name, ContractId::bare(name))
}

fn no_delay() -> SettleStrategy {
    SettleStrategy::Delay { secs: 0 }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

#[tokio::test]
async fn test_all_steps_disabled() {
    init_test_tracing();
    let deployer = MockDeployer::default();
    let verifier = MockVerifier::default();
    let sequencer = Sequencer::new(&deployer).with_verifier(&verifier).settle(no_delay());

    let steps = vec![
        step("TAIYAKI").enabled(false),
        step("ChonkNFT").enabled(false),
        step("NFTManager").address_of("ChonkNFT").enabled(false),
    ];

    let ledger = sequencer.run(&steps, &SeedAddresses::default()).await.unwrap();

    assert!(ledger.is_empty());
    assert!(deployer.calls().is_empty());
    assert!(verifier.verified_names().is_empty());
}

#[tokio::test]
async fn test_ledger_follows_declaration_order() {
    let deployer = MockDeployer::default();
    let sequencer = Sequencer::new(&deployer);

    let steps = vec![
        step("TAIYAKILP"),
        step("ChonkNFT").enabled(false),
        step("TAIYAKI"),
        step("TaiyakiFISHSwap"),
    ];

    let ledger = sequencer.run(&steps, &SeedAddresses::default()).await.unwrap();

    assert_eq!(ledger.step_names(), vec!["TAIYAKILP", "TAIYAKI", "TaiyakiFISHSwap"]);
    assert_eq!(deployer.deployed_names(), vec!["TAIYAKILP", "TAIYAKI", "TaiyakiFISHSwap"]);
}

#[tokio::test]
async fn test_address_propagates_to_later_step() {
    let deployer = MockDeployer::default();
    let verifier = MockVerifier::default();
    let sequencer = Sequencer::new(&deployer).with_verifier(&verifier).settle(no_delay());

    let steps = vec![step("Token"), step("Pool").address_of("Token")];

    let ledger = sequencer.run(&steps, &SeedAddresses::default()).await.unwrap();

    let token = ledger.address_of("Token").unwrap();
    assert_eq!(token, Address::with_last_byte(1));
    assert_eq!(
        deployer.calls(),
        vec![
            ("Token".to_string(), vec![]),
            ("Pool".to_string(), vec![ArgValue::Address(token)]),
        ]
    );
    assert_eq!(ledger.step_names(), vec!["Token", "Pool"]);

    let pool = &ledger["Pool"];
    assert_eq!(pool.constructor_args, vec![ArgValue::Address(token)]);
    assert!(pool.verified);

    // Verification sees exactly the deployment arguments.
    let calls = verifier.calls.lock().unwrap();
    assert_eq!(calls[1].1, pool.address);
    assert_eq!(calls[1].2, vec![ArgValue::Address(token)]);
}

#[tokio::test]
async fn test_reference_to_later_step_is_fatal() {
    let deployer = MockDeployer::default();
    let sequencer = Sequencer::new(&deployer);

    let steps = vec![
        step("ChonkNFT"),
        step("TaiyakiFISHSwap").address_of("TAIYAKI"),
        step("TAIYAKI"),
    ];

    let err = sequencer.run(&steps, &SeedAddresses::default()).await.unwrap_err();

    assert!(matches!(
        &err.kind,
        RunErrorKind::UnresolvedReference { step, reference }
            if step == "TaiyakiFISHSwap" && reference == "@TAIYAKI"
    ));
    assert_eq!(err.ledger.step_names(), vec!["ChonkNFT"]);
    assert_eq!(deployer.deployed_names(), vec!["ChonkNFT"]);
}

#[tokio::test]
async fn test_reference_to_disabled_step_is_fatal_without_seed() {
    let deployer = MockDeployer::default();
    let sequencer = Sequencer::new(&deployer);

    let steps = vec![
        step("TAIYAKILP").enabled(false),
        step("TAIYAKI"),
        step("TaiyakiETHLP").address_of("TAIYAKILP").address_of("TAIYAKI"),
    ];

    let err = sequencer.run(&steps, &SeedAddresses::default()).await.unwrap_err();

    assert!(matches!(err.kind, RunErrorKind::UnresolvedReference { .. }));
    assert_eq!(err.ledger.step_names(), vec!["TAIYAKI"]);
    assert_eq!(deployer.deployed_names(), vec!["TAIYAKI"]);
}

#[tokio::test]
async fn test_disabled_step_falls_back_to_seed() {
    let deployer = MockDeployer::default();
    let sequencer = Sequencer::new(&deployer);
    let nft = address!("BdA6415502b0ddaB9EDA1D09F4f16286273Fdbb6");
    let seeds: SeedAddresses = [("ChonkNFT", nft)].into_iter().collect();

    let steps = vec![
        step("ChonkNFT").enabled(false),
        step("NFTManager").address_of("ChonkNFT"),
    ];

    let ledger = sequencer.run(&steps, &seeds).await.unwrap();

    assert_eq!(ledger.step_names(), vec!["NFTManager"]);
    assert_eq!(ledger["NFTManager"].constructor_args, vec![ArgValue::Address(nft)]);
}

#[tokio::test]
async fn test_deployed_address_shadows_seed() {
    let deployer = MockDeployer::default();
    let sequencer = Sequencer::new(&deployer);
    let seeded = address!("1A5C71dDF3d71CBB0C0Bc312ff712a52cBe29cD2");
    let seeds: SeedAddresses = [("TAIYAKI", seeded)].into_iter().collect();

    let steps = vec![step("TAIYAKI"), step("TaiyakiETHLP").address_of("TAIYAKI")];

    let ledger = sequencer.run(&steps, &seeds).await.unwrap();

    let deployed = ledger.address_of("TAIYAKI").unwrap();
    assert_ne!(deployed, seeded);
    assert_eq!(
        ledger["TaiyakiETHLP"].constructor_args,
        vec![ArgValue::Address(deployed)]
    );
}

#[tokio::test]
async fn test_deploy_failure_stops_run() {
    let deployer = MockDeployer::failing(&["TaiyakiETHLP"]);
    let verifier = MockVerifier::default();
    let sequencer = Sequencer::new(&deployer).with_verifier(&verifier).settle(no_delay());

    let steps = vec![
        step("TAIYAKILP"),
        step("TAIYAKI"),
        step("TaiyakiETHLP").address_of("TAIYAKILP").address_of("TAIYAKI"),
        step("NFTManager"),
        step("ChonkMachineManager"),
    ];

    let err = sequencer.run(&steps, &SeedAddresses::default()).await.unwrap_err();

    match &err.kind {
        RunErrorKind::Deployment { step, source } => {
            assert_eq!(step, "TaiyakiETHLP");
            assert!(matches!(source, DeploymentError::Reverted { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.ledger.step_names(), vec!["TAIYAKILP", "TAIYAKI"]);
    assert_eq!(deployer.deployed_names(), vec!["TAIYAKILP", "TAIYAKI", "TaiyakiETHLP"]);
    assert_eq!(verifier.verified_names(), vec!["TAIYAKILP", "TAIYAKI"]);
}

#[tokio::test]
async fn test_verification_failure_is_not_fatal() {
    let deployer = MockDeployer::default();
    let verifier = MockVerifier::failing(&["ChonkNFT"]);
    let sequencer = Sequencer::new(&deployer).with_verifier(&verifier).settle(no_delay());

    let steps = vec![
        step("ChonkNFT"),
        step("NFTManager").address_of("ChonkNFT"),
    ];

    let ledger = sequencer.run(&steps, &SeedAddresses::default()).await.unwrap();

    assert_eq!(ledger.step_names(), vec!["ChonkNFT", "NFTManager"]);
    assert!(!ledger["ChonkNFT"].verified);
    assert!(ledger["NFTManager"].verified);
    assert_eq!(verifier.verified_names(), vec!["ChonkNFT", "NFTManager"]);
}

#[tokio::test]
async fn test_empty_sequence_is_rejected() {
    let deployer = MockDeployer::default();
    let sequencer = Sequencer::new(&deployer);

    let err = sequencer.run(&[], &SeedAddresses::default()).await.unwrap_err();

    assert!(matches!(err.kind, RunErrorKind::EmptySequence));
    assert!(err.ledger.is_empty());
    assert!(deployer.calls().is_empty());
}

#[tokio::test]
async fn test_duplicate_step_rejected_before_any_deploy() {
    let deployer = MockDeployer::default();
    let sequencer = Sequencer::new(&deployer);

    let steps = vec![step("TAIYAKI"), step("ChonkNFT"), step("TAIYAKI")];

    let err = sequencer.run(&steps, &SeedAddresses::default()).await.unwrap_err();

    assert!(matches!(&err.kind, RunErrorKind::DuplicateStep(name) if name == "TAIYAKI"));
    assert!(deployer.calls().is_empty());
}

#[tokio::test]
async fn test_verification_skipped_when_not_requested() {
    let deployer = MockDeployer::default();
    let verifier = MockVerifier::default();
    let sequencer = Sequencer::new(&deployer).with_verifier(&verifier).settle(no_delay());

    let steps = vec![step("TAIYAKI").verify(false), step("ChonkNFT")];

    let ledger = sequencer.run(&steps, &SeedAddresses::default()).await.unwrap();

    assert!(!ledger["TAIYAKI"].verified);
    assert!(ledger["ChonkNFT"].verified);
    assert_eq!(verifier.verified_names(), vec!["ChonkNFT"]);
}

#[tokio::test(start_paused = true)]
async fn test_without_verifier_nothing_waits() {
    let deployer = MockDeployer::default();
    let sequencer = Sequencer::new(&deployer);
    let start = Instant::now();

    let ledger = sequencer
        .run(&[step("TAIYAKI"), step("ChonkNFT")], &SeedAddresses::default())
        .await
        .unwrap();

    assert!(ledger.results().all(|result| !result.verified));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_settle_delay_before_verification() {
    let deployer = MockDeployer::default();
    let verifier = MockVerifier::default();
    let sequencer = Sequencer::new(&deployer).with_verifier(&verifier);

    sequencer
        .run(&[step("TAIYAKI")], &SeedAddresses::default())
        .await
        .unwrap();

    let deployed_at = deployer.last_deploy_at();
    let verified_at = verifier.calls.lock().unwrap()[0].3;
    assert!(verified_at - deployed_at >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_settle_waits_for_confirmations() {
    let deployer = MockDeployer::default();
    let verifier = MockVerifier::default();
    let sequencer = Sequencer::new(&deployer)
        .with_verifier(&verifier)
        .settle(SettleStrategy::Confirmations {
            count: 3,
            poll_interval_secs: 2,
            timeout_secs: 600,
        });

    let ledger = sequencer
        .run(&[step("TAIYAKI")], &SeedAddresses::default())
        .await
        .unwrap();

    // The head starts at the deployment block and grows by one per poll.
    assert_eq!(deployer.head_polls.load(Ordering::SeqCst), 4);
    assert!(ledger["TAIYAKI"].verified);

    let verified_at = verifier.calls.lock().unwrap()[0].3;
    assert!(verified_at - deployer.last_deploy_at() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_confirmations_give_up_on_unavailable_head() {
    let deployer = MockDeployer {
        head_unavailable: true,
        ..Default::default()
    };
    let verifier = MockVerifier::default();
    let sequencer = Sequencer::new(&deployer)
        .with_verifier(&verifier)
        .settle(SettleStrategy::Confirmations {
            count: 3,
            poll_interval_secs: 2,
            timeout_secs: 600,
        });

    let ledger = sequencer
        .run(&[step("TAIYAKI")], &SeedAddresses::default())
        .await
        .unwrap();

    assert_eq!(deployer.head_polls.load(Ordering::SeqCst), 1);
    assert!(ledger["TAIYAKI"].verified);
}

#[tokio::test(start_paused = true)]
async fn test_confirmations_give_up_after_timeout() {
    let deployer = MockDeployer::default();
    let verifier = MockVerifier::default();
    let sequencer = Sequencer::new(&deployer)
        .with_verifier(&verifier)
        .settle(SettleStrategy::Confirmations {
            count: 1000,
            poll_interval_secs: 2,
            timeout_secs: 10,
        });

    let ledger = sequencer
        .run(&[step("TAIYAKI")], &SeedAddresses::default())
        .await
        .unwrap();

    // Polls at 0, 2, 4, 6, 8 and 10 seconds, then verifies without the confirmations.
    assert_eq!(deployer.head_polls.load(Ordering::SeqCst), 6);
    assert!(ledger["TAIYAKI"].verified);

    let waited = verifier.calls.lock().unwrap()[0].3 - deployer.last_deploy_at();
    assert!(waited >= Duration::from_secs(10));
    assert!(waited < Duration::from_secs(12));
}
