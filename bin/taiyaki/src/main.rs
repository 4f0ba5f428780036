//! taiyaki deploys the Taiyaki contracts to EVM networks, one configurable step at a time.

mod cli;

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command, DeployArgs};
use taiyaki_deploy::{
    Account, ArtifactStore, DeployConfig, DeploymentReport, EtherscanVerifier, FlagOverrides,
    NetworkConfig, Plan, RpcDeployer, RunError, Sequencer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets may live in a .env file next to the configuration.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command {
        Command::Deploy(args) => deploy(&cli.config, args).await,
        Command::Plan { network, flags } => plan(&cli.config, &network, &flags.into()),
        Command::Report { path } => report(&path),
    }
}

async fn deploy(config_path: &Path, args: DeployArgs) -> Result<()> {
    let config = DeployConfig::load(config_path)?;
    let network = config.network(&args.network)?;
    let seeds = config.seeds_for(&args.network)?;

    let DeployArgs {
        network: network_name,
        flags,
        no_verify,
        private_key,
        from,
        explorer_api_key,
        report_dir,
    } = args;

    let steps = config.step_definitions(&flags.into())?;

    let account = match (private_key, from) {
        (Some(key), None) => Account::from_private_key(&key)?,
        (None, Some(address)) => Account::Unlocked(address),
        (None, None) => anyhow::bail!("Either --private-key (PRIVATE_KEY) or --from is required"),
        (Some(_), Some(_)) => anyhow::bail!("--private-key and --from are mutually exclusive"),
    };

    let artifacts = ArtifactStore::new(&config.artifacts);
    let deployer = RpcDeployer::connect(&network_name, network, account, artifacts.clone()).await?;
    let chain_id = deployer.chain_id();
    let sender = deployer.account().address();

    let verifier = if no_verify {
        tracing::info!("Source verification disabled");
        None
    } else {
        explorer_verifier(&config, network, explorer_api_key, artifacts, chain_id)?
    };

    let sequencer = Sequencer::new(deployer)
        .with_verifier(verifier)
        .settle(config.verify.settle);

    let report = DeploymentReport::begin(&network_name, chain_id, sender);

    let (ledger, failure) = match sequencer.run(&steps, &seeds).await {
        Ok(ledger) => (ledger, None),
        Err(RunError { ledger, kind }) => (ledger, Some(anyhow::Error::new(kind))),
    };

    println!("{}", ledger.table());

    let deployed = ledger.len();
    let report = report.finish(ledger, failure.as_ref().map(|e| format!("{:#}", e)));
    let saved = report.save_to_file(&DeploymentReport::default_path(&report_dir, &network_name));

    if let Some(e) = failure {
        if let Err(save_err) = saved {
            tracing::error!(error = ?save_err, "Failed to save deployment report");
        }
        return Err(e.context(format!(
            "Deployment to '{}' aborted after {} step(s)",
            network_name, deployed
        )));
    }

    saved?;
    tracing::info!(network = %network_name, deployed, "Deployment complete");
    Ok(())
}

/// Build the verifier for `network`, if it has a block explorer and an API key.
fn explorer_verifier(
    config: &DeployConfig,
    network: &NetworkConfig,
    api_key: Option<String>,
    artifacts: ArtifactStore,
    chain_id: u64,
) -> Result<Option<EtherscanVerifier>> {
    let Some(explorer) = &network.explorer else {
        tracing::info!("No block explorer configured, skipping source verification");
        return Ok(None);
    };

    let Some(api_key) = api_key.or_else(|| explorer.api_key.clone()) else {
        tracing::warn!("No explorer API key (EXPLORER_API_KEY), skipping source verification");
        return Ok(None);
    };

    let verifier = EtherscanVerifier::new(explorer.api_url.clone(), api_key, artifacts)?
        .with_chain_id(chain_id)
        .with_compiler_version(config.compiler.version.clone())
        .with_status_polling(
            Duration::from_secs(config.verify.poll_interval_secs),
            config.verify.max_status_checks,
        );

    Ok(Some(verifier))
}

fn plan(config_path: &Path, network: &str, overrides: &FlagOverrides) -> Result<()> {
    let config = DeployConfig::load(config_path)?;
    let seeds = config.seeds_for(network)?;
    let steps = config.step_definitions(overrides)?;

    let plan = Plan::new(&steps, &seeds);
    println!("{}", plan.table());

    if !plan.is_runnable() {
        for (step, reference) in plan.unresolved() {
            tracing::error!(step = %step, reference = %reference, "Unresolved address reference");
        }
        anyhow::bail!("Deployment to '{}' would not complete", network);
    }

    tracing::info!(network = %network, "Plan resolves");
    Ok(())
}

fn report(path: &Path) -> Result<()> {
    let report = DeploymentReport::load_from_file(path)
        .with_context(|| format!("Failed to load report {}", path.display()))?;

    tracing::info!(
        network = %report.network,
        chain_id = report.chain_id,
        deployer = %report.deployer,
        started_at = %report.started_at,
        finished_at = %report.finished_at,
        complete = report.complete,
        "Deployment report"
    );
    if let Some(error) = &report.error {
        tracing::warn!(error = %error, "Run was aborted");
    }

    println!("{}", report.deployments.table());
    Ok(())
}
