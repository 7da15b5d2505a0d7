//! Tokenomics CLI - drive the token economy from the command line
//!
//! State lives in a snapshot directory and is reloaded for every command.

mod commands;
mod demo;
mod display;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use economics::{ProtocolConfig, TokenEconomy};
use std::path::{Path, PathBuf};
use tokenomics_core::{Amount, Bps, Clock, FixedClock, SystemClock, Timestamp};
use tokenomics_storage::Storage;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

pub type Economy = TokenEconomy<Box<dyn Clock>>;

const DEFAULT_CONFIG: &str = "config/local.toml";

#[derive(Parser)]
#[command(name = "tokenomics")]
#[command(about = "Token sale, staking and lending economy")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct Cli {
    /// Path to configuration file [default: config/local.toml, or built-in]
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Snapshot directory holding the economy state
    #[arg(short, long, value_name = "DIR", default_value = "tokenomics-data", global = true)]
    state: PathBuf,

    /// Evaluate the command at this UNIX time instead of the system clock
    #[arg(long, value_name = "UNIX_SECS", global = true)]
    at: Option<Timestamp>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the economy: mint the token and the borrowed asset, register feeds
    Init {
        /// Replace an existing state
        #[arg(long)]
        force: bool,

        /// Also write the effective configuration to this file
        #[arg(long, value_name = "FILE")]
        write_config: Option<PathBuf>,
    },

    /// Publish a new price for a pair, e.g. `feed ETH/USD 1300`
    Feed {
        pair: String,
        /// Decimal price in the quote currency
        price: String,
    },

    /// Set (or with --increase, raise) an allowance
    Approve {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        spender: String,
        /// Asset symbol [default: the primary token]
        #[arg(long)]
        asset: Option<String>,
        #[arg(long)]
        increase: bool,
        /// Micro-units
        amount: Amount,
    },

    /// Move balance between accounts
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        asset: Option<String>,
        amount: Amount,
    },

    /// Quote the sale: tokens for a payment, or the cost of tokens
    Quote {
        /// Native micro-units to spend
        #[arg(long, conflicts_with = "tokens")]
        pay: Option<Amount>,
        /// Token micro-units to buy
        #[arg(long)]
        tokens: Option<Amount>,
    },

    /// Buy tokens with native currency
    Buy {
        #[arg(long)]
        buyer: String,
        /// Native micro-units paid
        #[arg(long)]
        pay: Amount,
        /// Buy exactly this many token micro-units
        #[arg(long)]
        tokens: Option<Amount>,
    },

    /// Stake tokens (approve the staking custody account first)
    Stake {
        #[arg(long)]
        account: String,
        amount: Amount,
    },

    /// Add to an active stake
    IncreaseStake {
        #[arg(long)]
        account: String,
        amount: Amount,
    },

    /// Transfer reward reserve into staking custody
    FundStaking {
        #[arg(long)]
        from: String,
        amount: Amount,
    },

    /// Claim principal plus interest once the lock has elapsed
    Claim {
        #[arg(long)]
        account: String,
    },

    /// Borrow a percentage (basis points) of the staked value
    Borrow {
        #[arg(long)]
        account: String,
        #[arg(long)]
        percent: Bps,
    },

    /// Show the current debt of an open loan
    Debt {
        #[arg(long)]
        account: String,
    },

    /// Repay part of a loan, or all of it with --full
    Repay {
        #[arg(long)]
        account: String,
        #[arg(long, conflicts_with = "amount")]
        full: bool,
        #[arg(required_unless_present = "full")]
        amount: Option<Amount>,
    },

    /// Administrative changes
    Admin {
        #[arg(long)]
        caller: String,
        #[command(subcommand)]
        action: AdminCommand,
    },

    /// Balances, stakes and loans
    Report,

    /// Verify that every asset's balances add up to its supply
    Audit,

    /// Run the mint, buy, stake, claim, borrow and repay walk-through in memory
    Demo,
}

#[derive(Subcommand, Clone, Copy)]
pub enum AdminCommand {
    /// Staking interest rate in basis points
    StakingRate { bps: Bps },
    /// Minimum staking period in seconds
    MinStakingPeriod { secs: u64 },
    /// Lending interest rate in basis points
    LendingRate { bps: Bps },
    /// Maximum lending percent in basis points
    MaxLendingPercent { bps: Bps },
    /// Maximum accepted price age in seconds
    MaxPriceAge { secs: u64 },
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default.as_str()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ProtocolConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
        None => {
            debug!("no config file, using built-in local config");
            return Ok(ProtocolConfig::local());
        }
    };
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = ProtocolConfig::from_toml_str(&contents)
        .with_context(|| format!("parsing config {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

fn clock(at: Option<Timestamp>) -> Box<dyn Clock> {
    match at {
        Some(at) => Box::new(FixedClock(at)),
        None => Box::new(SystemClock),
    }
}

fn open_economy(storage: &Storage, at: Option<Timestamp>) -> Result<Economy> {
    if !storage.has_state() {
        bail!(
            "no economy state in {}; run `tokenomics init` first",
            storage.data_dir().display()
        );
    }
    let state = storage.load_state()?;
    Ok(TokenEconomy::from_state(state, clock(at)))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    if let Commands::Demo = cli.command {
        return demo::run();
    }

    let storage = Storage::open(&cli.state)?;

    if let Commands::Init {
        force,
        write_config,
    } = &cli.command
    {
        if storage.has_state() && !force {
            bail!(
                "economy state already exists in {} (use --force to replace it)",
                storage.data_dir().display()
            );
        }
        let config = load_config(cli.config.as_deref())?;
        if let Some(path) = write_config {
            std::fs::write(path, config.to_toml_string()?)
                .with_context(|| format!("writing config {}", path.display()))?;
        }
        let eco: Economy = TokenEconomy::genesis(config, clock(cli.at))?;
        storage.save_state(eco.state())?;
        display::genesis(&eco);
        return Ok(());
    }

    let mut eco = open_economy(&storage, cli.at)?;
    let changed = commands::dispatch(&mut eco, cli.command, cli.json)?;
    if changed {
        storage.save_state(eco.state())?;
    }
    Ok(())
}
