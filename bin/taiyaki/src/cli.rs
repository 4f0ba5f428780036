use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use taiyaki_deploy::{DEFAULT_CONFIG_FILENAME, FlagOverrides};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "taiyaki")]
#[command(
    author,
    version,
    about = "Deploy the Taiyaki contracts, one flag-gated step at a time"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "TAIYAKI_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the deployment configuration file.
    #[arg(short, long, env = "TAIYAKI_CONFIG", default_value = DEFAULT_CONFIG_FILENAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy the enabled steps to a network.
    Deploy(DeployArgs),

    /// Show what a deployment would do, without touching the network.
    Plan {
        /// The network to plan for, as named in the configuration file.
        #[arg(short, long, env = "TAIYAKI_NETWORK")]
        network: String,

        #[command(flatten)]
        flags: StepFlags,
    },

    /// Print a saved deployment report.
    Report {
        /// Path to the report file.
        path: PathBuf,
    },
}

#[derive(Args)]
pub struct DeployArgs {
    /// The network to deploy to, as named in the configuration file.
    #[arg(short, long, env = "TAIYAKI_NETWORK")]
    pub network: String,

    #[command(flatten)]
    pub flags: StepFlags,

    /// Skip source verification for every step.
    #[arg(long, env = "TAIYAKI_NO_VERIFY")]
    pub no_verify: bool,

    /// Private key of the deploying account.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Deploy from an account unlocked on the node instead of signing locally.
    #[arg(long, env = "TAIYAKI_FROM")]
    pub from: Option<Address>,

    /// API key of the block explorer, overriding the configured one.
    #[arg(long, env = "EXPLORER_API_KEY", hide_env_values = true)]
    pub explorer_api_key: Option<String>,

    /// Directory the run report is written to.
    #[arg(long, env = "TAIYAKI_REPORT_DIR", default_value = "deployments")]
    pub report_dir: PathBuf,
}

/// Per-run step toggles.
#[derive(Args)]
pub struct StepFlags {
    /// Enable a step disabled in the configuration file. Repeatable.
    #[arg(long = "enable", value_name = "STEP")]
    pub enable: Vec<String>,

    /// Disable a step enabled in the configuration file. Repeatable.
    #[arg(long = "disable", value_name = "STEP")]
    pub disable: Vec<String>,
}

impl From<StepFlags> for FlagOverrides {
    fn from(flags: StepFlags) -> Self {
        Self {
            enable: flags.enable,
            disable: flags.disable,
        }
    }
}
