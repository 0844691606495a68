//! # CLI Interface
//!
//! Command-line structure for `settlement-node`. Every path and setting can
//! also come from the environment, which is how the service is deployed.

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Settlement signing and payments authorization.
#[derive(Parser, Debug)]
#[command(
    name = "settlement-node",
    about = "Settlement signing CLI and payments authorization service",
    version,
    propagate_version = true
)]
pub struct SettlementCli {
    /// Log output format: pretty or json.
    #[arg(long, global = true, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Turn antifraud-approved payout files into signed custodian artifacts.
    SignSettlement(SignSettlementArgs),
    /// Run the payments authorization service.
    Serve(ServeArgs),
    /// Manage the local secret vault.
    #[command(subcommand)]
    Vault(VaultCommands),
    /// Print version information and exit.
    Version,
}

/// Location of the vault database and its master key.
#[derive(Args, Debug, Clone)]
pub struct VaultArgs {
    #[arg(long, env = "VAULT_PATH", default_value = "./vault")]
    pub vault_path: PathBuf,

    /// Hex-encoded AES-256 master key file.
    #[arg(long, env = "VAULT_KEY_FILE", default_value = "./vault.key")]
    pub vault_key_file: PathBuf,
}

#[derive(Args, Debug)]
pub struct SignSettlementArgs {
    #[command(flatten)]
    pub vault: VaultArgs,

    /// Input files, each a JSON array of payout records.
    #[arg(long = "in", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    #[arg(long, default_value = "./out")]
    pub out_dir: PathBuf,

    /// Treat all input files as one list.
    #[arg(long)]
    pub merge: bool,

    /// Collapse Uphold payouts that share a custodian wallet id.
    #[arg(long)]
    pub merge_custodial: bool,

    /// Custodians to process, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "uphold,paypal,gemini,bitflyer")]
    pub providers: Vec<String>,

    /// Local currency for PayPal mass-pay.
    #[arg(long, env = "PAYOUT_CURRENCY", default_value = "JPY")]
    pub currency: String,

    /// BAT to local currency rate. Required when PayPal payouts are present.
    #[arg(long, env = "BAT_RATE")]
    pub rate: Option<Decimal>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub vault: VaultArgs,

    #[arg(long, env = "LEDGER_PATH", default_value = "./ledger")]
    pub ledger_path: PathBuf,

    /// Environment whose authorized keys apply.
    #[arg(long, env = "ENV", default_value = "local")]
    pub environment: String,

    /// JSON file mapping environments to authorized public keys.
    #[arg(long, env = "AUTHORIZED_KEYS_FILE")]
    pub authorized_keys_file: PathBuf,

    /// Distinct authorizers required before submission.
    #[arg(long, env = "AUTHORIZATION_THRESHOLD", default_value_t = settlement::config::DEFAULT_AUTHORIZATION_THRESHOLD)]
    pub threshold: usize,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3333")]
    pub listen: String,

    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9090")]
    pub metrics_listen: String,
}

#[derive(Subcommand, Debug)]
pub enum VaultCommands {
    /// Create the master key file and the vault mounts.
    Init(VaultArgs),
    /// Store a custodian wallet bundle under a wallet key.
    ImportWallet(ImportWalletArgs),
    /// Print the wallet key's signer public key, creating the signer if needed.
    Signer(SignerArgs),
}

#[derive(Args, Debug)]
pub struct ImportWalletArgs {
    #[command(flatten)]
    pub vault: VaultArgs,

    /// Wallet key, e.g. `gemini-contribution`.
    #[arg(long)]
    pub wallet_key: String,

    /// Custodian wallet, card or account identifier.
    #[arg(long)]
    pub provider_id: String,

    #[arg(long)]
    pub client_id: Option<String>,

    /// API key reference sent alongside signatures.
    #[arg(long, env = "WALLET_CLIENT_KEY")]
    pub client_key: Option<String>,

    #[arg(long)]
    pub account: Option<String>,

    /// File holding the raw HMAC secret for the wallet.
    #[arg(long)]
    pub shared_secret_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SignerArgs {
    #[command(flatten)]
    pub vault: VaultArgs,

    #[arg(long)]
    pub wallet_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        SettlementCli::command().debug_assert();
    }

    #[test]
    fn sign_settlement_parses_providers() {
        let cli = SettlementCli::try_parse_from([
            "settlement-node",
            "sign-settlement",
            "--in",
            "a.json",
            "b.json",
            "--providers",
            "gemini,paypal",
            "--rate",
            "45.5",
        ])
        .unwrap();
        match cli.command {
            Commands::SignSettlement(args) => {
                assert_eq!(args.inputs.len(), 2);
                assert_eq!(args.providers, vec!["gemini", "paypal"]);
                assert_eq!(args.rate, Some(Decimal::new(455, 1)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
