//! # CLI Interface
//!
//! Defines the command-line argument structure for `veilmint-node` using
//! `clap` derive. Three subcommands: `run`, `commitment` and `version`.

use clap::{Args, Parser, Subcommand};
use veilmint_protocol::config::{
    CollectionConfig, DEFAULT_COLLECTION_NAME, DEFAULT_COLLECTION_SYMBOL, DEFAULT_MAX_SUPPLY,
    DEFAULT_METRICS_PORT, DEFAULT_MINT_PRICE_WEI, DEFAULT_RPC_PORT, GRACE_PERIOD_SECS,
};
use veilmint_protocol::identity::Address;
use veilmint_protocol::units::Wei;

use crate::logging::LogFormat;

/// Veilmint collection node.
///
/// Hosts one hidden-metadata NFT collection and serves it over JSON-RPC,
/// REST and WebSocket, with Prometheus metrics on a separate port.
#[derive(Parser, Debug)]
#[command(
    name = "veilmint-node",
    about = "Veilmint collection node",
    version,
    propagate_version = true
)]
pub struct VeilmintCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a collection in-process and serve it.
    Run(RunArgs),
    /// Compute a metadata commitment for a base URI.
    Commitment(CommitmentArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Collection owner address (0x-prefixed hex).
    ///
    /// Required unless `--devnet` is set, in which case a well-known
    /// devnet owner is used.
    #[arg(long, env = "VEILMINT_OWNER")]
    pub owner: Option<Address>,

    /// Collection name.
    #[arg(long, env = "VEILMINT_NAME", default_value = DEFAULT_COLLECTION_NAME)]
    pub name: String,

    /// Collection symbol.
    #[arg(long, env = "VEILMINT_SYMBOL", default_value = DEFAULT_COLLECTION_SYMBOL)]
    pub symbol: String,

    /// Hard ceiling on tokens ever minted.
    #[arg(long, env = "VEILMINT_MAX_SUPPLY", default_value_t = DEFAULT_MAX_SUPPLY)]
    pub max_supply: u64,

    /// Initial mint price in wei.
    #[arg(long, env = "VEILMINT_MINT_PRICE", default_value_t = DEFAULT_MINT_PRICE_WEI)]
    pub mint_price: Wei,

    /// Seconds between a withdrawal request and its earliest execution.
    #[arg(long, env = "VEILMINT_GRACE_PERIOD_SECS", default_value_t = GRACE_PERIOD_SECS)]
    pub grace_period_secs: u64,

    /// Port for the JSON-RPC, REST and WebSocket API.
    #[arg(long, env = "VEILMINT_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VEILMINT_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format.
    #[arg(long, env = "VEILMINT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Run against a manual clock that `evm_increaseTime` can move forward.
    #[arg(long, env = "VEILMINT_DEVNET")]
    pub devnet: bool,
}

impl RunArgs {
    /// The deployment configuration described by these arguments.
    pub fn collection_config(&self) -> CollectionConfig {
        CollectionConfig {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            max_supply: self.max_supply,
            mint_price: self.mint_price,
            grace_period_secs: self.grace_period_secs,
        }
    }
}

/// Arguments for the `commitment` subcommand.
#[derive(Args, Debug)]
pub struct CommitmentArgs {
    /// The final metadata base URI to commit to.
    #[arg(long)]
    pub base_uri: String,

    /// Blinding secret. Leave empty to commit to the base URI alone.
    #[arg(long, conflicts_with = "generate_secret", default_value = "")]
    pub secret: String,

    /// Generate a fresh random secret instead of passing one.
    #[arg(long)]
    pub generate_secret: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        VeilmintCli::command().debug_assert();
    }

    #[test]
    fn run_defaults_match_protocol_constants() {
        let cli = VeilmintCli::try_parse_from(["veilmint-node", "run", "--devnet"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.devnet);
        assert!(args.owner.is_none());
        assert_eq!(args.collection_config(), CollectionConfig::default());
        assert_eq!(args.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(args.log_format, LogFormat::Pretty);
    }

    #[test]
    fn run_parses_owner_and_overrides() {
        let owner = Address::derive("cli-owner");
        let owner_hex = owner.to_string();
        let cli = VeilmintCli::try_parse_from([
            "veilmint-node",
            "run",
            "--owner",
            owner_hex.as_str(),
            "--max-supply",
            "333",
            "--mint-price",
            "0",
            "--log-format",
            "json",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.owner, Some(owner));
        assert_eq!(args.max_supply, 333);
        assert_eq!(args.mint_price, 0);
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn run_rejects_malformed_owner() {
        assert!(VeilmintCli::try_parse_from(["veilmint-node", "run", "--owner", "0x12"]).is_err());
    }

    #[test]
    fn secret_and_generate_secret_conflict() {
        assert!(VeilmintCli::try_parse_from([
            "veilmint-node",
            "commitment",
            "--base-uri",
            "ipfs://final/",
            "--secret",
            "s",
            "--generate-secret",
        ])
        .is_err());
    }
}
