//! accrue: command-line front end for an Accrue deployment.
//!
//! Each invocation loads the deployment and the saved state, runs one
//! operation at a single timestamp, and writes the result back in one
//! transaction. A failed operation leaves the database untouched.

mod commands;
mod config;
mod keys;
mod output;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use accrue_staking::AuthorizationAction;
use accrue_types::{AccountId, Decimal, Timestamp};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AccrueConfig;

/// Token emission and staking reward accounting.
#[derive(Parser, Debug)]
#[command(name = "accrue", version, about = "Token emission and staking reward accounting")]
struct Cli {
    /// CLI configuration file. Default: $ACCRUE_DATA_DIR/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the configuration.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Operation time in Unix seconds. Default: now.
    #[arg(long, global = true)]
    now: Option<Timestamp>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate the deployment and write the initial state.
    Init,

    /// Show the minter, pools, routers and services.
    Status,

    /// Show balances of an account.
    Balance {
        #[arg(long)]
        account: AccountId,
        /// Only this asset.
        #[arg(long)]
        asset: Option<String>,
    },

    /// Show the reward a staker could claim right now.
    Pending {
        /// Service name or id.
        #[arg(long)]
        service: String,
        #[arg(long)]
        account: AccountId,
    },

    /// Credit an external asset to an account (minter owner only).
    Fund {
        #[arg(long)]
        caller: AccountId,
        #[arg(long)]
        asset: String,
        #[arg(long)]
        to: AccountId,
        #[arg(long)]
        amount: Decimal,
    },

    /// Stake into a service.
    Stake {
        /// Service name or id.
        #[arg(long)]
        service: String,
        /// Account paying the stake.
        #[arg(long)]
        account: AccountId,
        #[arg(long)]
        amount: Decimal,
        /// Credit the position to another account.
        #[arg(long = "for")]
        beneficiary: Option<AccountId>,
    },

    /// Withdraw staked tokens.
    Unstake {
        #[arg(long)]
        service: String,
        #[arg(long)]
        account: AccountId,
        #[arg(long)]
        amount: Decimal,
        /// Send the tokens to another account.
        #[arg(long)]
        to: Option<AccountId>,
    },

    /// Claim accrued rewards.
    Claim {
        #[arg(long)]
        service: String,
        #[arg(long)]
        account: AccountId,
        #[arg(long)]
        to: Option<AccountId>,
    },

    /// Fold a service's pending upstream supply into its reward rate.
    Update {
        #[arg(long)]
        service: String,
    },

    /// Drain an externally owned pool into its owner's balance.
    Supply {
        #[arg(long)]
        account: AccountId,
    },

    /// Change the minter's output rate (minter owner only).
    SetOutputRate {
        #[arg(long)]
        caller: AccountId,
        #[arg(long)]
        rate: Decimal,
    },

    /// Replace a router's weights (router owner only).
    SetWeights {
        /// Router name or id.
        #[arg(long)]
        router: String,
        #[arg(long)]
        caller: AccountId,
        /// `service=weight`, repeatable.
        #[arg(long = "weight", value_parser = parse_weight)]
        weights: Vec<(String, Decimal)>,
    },

    /// Hand a pool to a new owner.
    TransferPool {
        #[arg(long)]
        caller: AccountId,
        /// Pool name.
        #[arg(long)]
        pool: String,
        #[arg(long)]
        to: AccountId,
    },

    /// Suspend a service: no new stakes.
    Suspend {
        #[arg(long)]
        service: String,
        #[arg(long)]
        caller: AccountId,
    },

    /// Resume a suspended service.
    Resume {
        #[arg(long)]
        service: String,
        #[arg(long)]
        caller: AccountId,
    },

    /// Stop reward claims on a service. Stakes and unstakes keep working.
    PauseClaims {
        #[arg(long)]
        service: String,
        #[arg(long)]
        caller: AccountId,
    },

    /// Allow reward claims again.
    UnpauseClaims {
        #[arg(long)]
        service: String,
        #[arg(long)]
        caller: AccountId,
    },

    /// Send tokens a service holds but owes nobody (service owner only).
    Recover {
        #[arg(long)]
        service: String,
        #[arg(long)]
        caller: AccountId,
        #[arg(long)]
        asset: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        to: AccountId,
    },

    /// Generate an owner key and print its account id.
    Keygen {
        /// New key file. An existing file is never replaced.
        #[arg(long)]
        out: PathBuf,
    },

    /// Sign an authorization letting a spender act for the key's account.
    Authorize {
        #[arg(long)]
        key_file: PathBuf,
        #[arg(long)]
        service: String,
        /// stake, unstake or claim.
        #[arg(long, value_parser = parse_action)]
        action: AuthorizationAction,
        #[arg(long)]
        spender: AccountId,
        /// Most the spender may move (or, for a claim, pay out).
        #[arg(long)]
        amount: Decimal,
        /// Unix seconds. Default: one hour after --now.
        #[arg(long)]
        deadline: Option<Timestamp>,
    },

    /// Submit a signed authorization as its spender.
    Relay {
        #[arg(long)]
        service: String,
        #[arg(long)]
        caller: AccountId,
        /// JSON file written from `accrue authorize`.
        #[arg(long)]
        authorization: PathBuf,
        /// Amount to stake or unstake. Default: the signed amount.
        #[arg(long)]
        amount: Option<Decimal>,
    },
}

fn parse_action(arg: &str) -> Result<AuthorizationAction, String> {
    match arg {
        "stake" => Ok(AuthorizationAction::Stake),
        "unstake" => Ok(AuthorizationAction::Unstake),
        "claim" => Ok(AuthorizationAction::Claim),
        other => Err(format!("expected stake, unstake or claim, got '{other}'")),
    }
}

fn parse_weight(arg: &str) -> Result<(String, Decimal), String> {
    let (name, weight) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected service=weight, got '{arg}'"))?;
    let weight = weight.parse::<Decimal>().map_err(|e| e.to_string())?;
    Ok((name.trim().to_string(), weight))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AccrueConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.display().to_string();
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("accrue={}", config.logging.log_level).parse()?),
        )
        .init();

    if let Commands::Keygen { out } = &cli.command {
        return commands::keygen(out, cli.json);
    }

    let now = match cli.now {
        Some(now) => now,
        None => SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(),
    };

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let mut conn = accrue_db::open(&data_dir.join(accrue_db::DB_FILE))?;
    let deployment = config.load_deployment()?;
    info!(data_dir = %data_dir.display(), now, "accrue starting");

    commands::run(&cli.command, &mut conn, &deployment, now, cli.json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_weight() {
        let (name, weight) = parse_weight("lp=0.25").expect("parse");
        assert_eq!(name, "lp");
        assert_eq!(weight, "0.25".parse::<Decimal>().expect("decimal"));
        assert!(parse_weight("lp").is_err());
        assert!(parse_weight("lp=abc").is_err());
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("claim"), Ok(AuthorizationAction::Claim));
        assert_eq!(parse_action("unstake"), Ok(AuthorizationAction::Unstake));
        assert!(parse_action("transfer").is_err());
    }

    #[test]
    fn test_parse_set_weights_command() {
        let caller = "1a".repeat(32);
        let cli = Cli::try_parse_from([
            "accrue",
            "--now",
            "1700000000",
            "set-weights",
            "--router",
            "staking",
            "--caller",
            caller.as_str(),
            "--weight",
            "lp=0.5",
            "--weight",
            "single=0.5",
        ])
        .expect("parse");
        assert_eq!(cli.now, Some(1_700_000_000));
        assert!(matches!(
            cli.command,
            Commands::SetWeights { ref weights, .. } if weights.len() == 2
        ));
    }
}
