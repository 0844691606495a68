// Copyright (c) 2026 Settlement Engineering. MIT License.
// See LICENSE for details.

//! # Settlement Node
//!
//! Entry point for the `settlement-node` binary.
//!
//! - `sign-settlement`: offline run turning payout files into signed
//!   custodian artifacts.
//! - `serve`: the payments authorization service and its metrics endpoint.
//! - `vault`: master key, wallet bundles and signers.
//! - `version`: build information.

mod api;
mod cli;
mod logging;
mod metrics;
mod middleware;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use settlement::authorization::{AuthorizationVerifier, AuthorizedKeystore};
use settlement::config::{AuthorizedKeys, ServiceConfig};
use settlement::custodian::{DryRunCustodianClient, FixedRateProvider};
use settlement::partition::{PartitionOptions, SettlementPartitioner};
use settlement::payments::PaymentsService;
use settlement::storage::{SettlementDb, TransactionLedger};
use settlement::transaction::{Custodian, WalletKey};
use settlement::vault::{load_master_key, write_master_key, VaultSecretStore, WalletSecret, REQUIRED_MOUNTS};

use cli::{Commands, SettlementCli, VaultArgs, VaultCommands};
use logging::{LogFormat, DEFAULT_FILTER};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SettlementCli::parse();
    logging::init_logging(DEFAULT_FILTER, LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::SignSettlement(args) => sign_settlement(args).await,
        Commands::Serve(args) => serve(args).await,
        Commands::Vault(VaultCommands::Init(args)) => vault_init(args),
        Commands::Vault(VaultCommands::ImportWallet(args)) => vault_import_wallet(args),
        Commands::Vault(VaultCommands::Signer(args)) => vault_signer(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens the vault named by `args` with its master key file.
fn open_vault(args: &VaultArgs) -> Result<VaultSecretStore> {
    let key = load_master_key(&args.vault_key_file)
        .with_context(|| format!("failed to load master key from {}", args.vault_key_file.display()))?;
    let vault = VaultSecretStore::open(&args.vault_path, key)
        .with_context(|| format!("failed to open vault at {}", args.vault_path.display()))?;
    vault.generate_mounts().context("failed to mount vault engines")?;
    Ok(vault)
}

/// Partitions the input files and writes signed artifacts.
async fn sign_settlement(args: cli::SignSettlementArgs) -> Result<()> {
    let vault = open_vault(&args.vault)?;

    let providers = args
        .providers
        .iter()
        .map(|p| p.parse::<Custodian>())
        .collect::<Result<Vec<_>, _>>()
        .context("invalid --providers")?;

    let mut rates = FixedRateProvider::new();
    if let Some(rate) = args.rate {
        rates = rates.with_rate(&args.currency, rate);
    }

    let mut options = PartitionOptions::new(&args.out_dir);
    options.merge = args.merge;
    options.merge_custodial = args.merge_custodial;
    options.providers = providers;
    options.payout_currency = args.currency.to_ascii_uppercase();

    tracing::info!(
        inputs = args.inputs.len(),
        out_dir = %args.out_dir.display(),
        merge = options.merge,
        "starting settlement signing run"
    );

    let partitioner = SettlementPartitioner::new(&vault, &rates, options);
    let report = partitioner
        .run(&args.inputs)
        .await
        .context("settlement signing run failed")?;

    for bucket in &report.buckets {
        println!("{:<28} {:<24} {} payouts", bucket.wallet_key.to_string(), bucket.group, bucket.payouts);
    }
    for file in &report.files {
        println!("wrote {}", file.display());
    }
    if report.skipped > 0 {
        println!("skipped {} non-positive records", report.skipped);
    }
    Ok(())
}

/// Runs the payments service and the metrics endpoint until shutdown.
async fn serve(args: cli::ServeArgs) -> Result<()> {
    tracing::info!(
        environment = %args.environment,
        threshold = args.threshold,
        listen = %args.listen,
        metrics_listen = %args.metrics_listen,
        "starting settlement-node"
    );

    let vault = open_vault(&args.vault)?;

    std::fs::create_dir_all(&args.ledger_path)
        .with_context(|| format!("failed to create ledger directory: {}", args.ledger_path.display()))?;
    let db = SettlementDb::open(&args.ledger_path)
        .with_context(|| format!("failed to open ledger at {}", args.ledger_path.display()))?;
    tracing::info!(path = %args.ledger_path.display(), "ledger opened");

    let keys = Arc::new(
        AuthorizedKeys::from_file(&args.authorized_keys_file).with_context(|| {
            format!(
                "failed to load authorized keys from {}",
                args.authorized_keys_file.display()
            )
        })?,
    );
    if keys.len(&args.environment) < args.threshold {
        tracing::warn!(
            environment = %args.environment,
            keys = keys.len(&args.environment),
            threshold = args.threshold,
            "fewer authorized keys than the threshold, nothing can be submitted"
        );
    }

    let config = ServiceConfig::new(&args.environment, args.threshold).context("invalid service configuration")?;
    let verifier =
        AuthorizationVerifier::new(Arc::clone(&keys), args.threshold).context("invalid authorization threshold")?;
    let service = PaymentsService::new(
        config,
        TransactionLedger::new(db),
        verifier,
        vault,
        Arc::new(DryRunCustodianClient),
    );

    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let app_state = api::AppState {
        service: Arc::new(service),
        keystore: Arc::new(AuthorizedKeystore::new(keys, args.environment.clone())),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind API listener on {}", args.listen))?;
    tracing::info!("API server listening on {}", args.listen);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_listener = tokio::net::TcpListener::bind(&args.metrics_listen)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", args.metrics_listen))?;
    tracing::info!("Metrics server listening on {}", args.metrics_listen);

    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("settlement-node stopped");
    Ok(())
}

/// Creates the master key file and mounts the vault engines.
fn vault_init(args: VaultArgs) -> Result<()> {
    if let Some(parent) = args.vault_key_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    write_master_key(&args.vault_key_file)
        .with_context(|| format!("failed to write master key to {}", args.vault_key_file.display()))?;
    open_vault(&args)?;

    tracing::info!(
        vault_path = %args.vault_path.display(),
        key_file = %args.vault_key_file.display(),
        "vault initialized"
    );
    println!("Vault initialized.");
    println!("  Vault path : {}", args.vault_path.display());
    println!("  Master key : {}", args.vault_key_file.display());
    println!("  Mounts     : {}", REQUIRED_MOUNTS.join(", "));
    Ok(())
}

/// Stores a wallet bundle and, when given, its HMAC secret.
fn vault_import_wallet(args: cli::ImportWalletArgs) -> Result<()> {
    let wallet_key: WalletKey = args
        .wallet_key
        .parse()
        .with_context(|| format!("invalid wallet key {}", args.wallet_key))?;
    let key = wallet_key.to_string();
    let vault = open_vault(&args.vault)?;

    let wallet = WalletSecret {
        provider_id: args.provider_id,
        client_id: args.client_id,
        client_key: args.client_key,
        account: args.account,
    };
    vault
        .put_wallet(&key, &wallet)
        .with_context(|| format!("failed to store wallet {key}"))?;

    if let Some(path) = &args.shared_secret_file {
        let secret = read_secret_file(path)?;
        vault
            .import_shared_secret(&key, &secret)
            .with_context(|| format!("failed to store shared secret for {key}"))?;
    }

    println!("Imported wallet {key}");
    Ok(())
}

/// Prints the wallet key's signer public key, creating it on first use.
fn vault_signer(args: cli::SignerArgs) -> Result<()> {
    let wallet_key: WalletKey = args
        .wallet_key
        .parse()
        .with_context(|| format!("invalid wallet key {}", args.wallet_key))?;
    let vault = open_vault(&args.vault)?;
    let signer = vault
        .generate_signer(&wallet_key.to_string())
        .with_context(|| format!("failed to load signer for {wallet_key}"))?;
    println!("{}", signer.public_key_hex());
    Ok(())
}

fn read_secret_file(path: &Path) -> Result<Vec<u8>> {
    let mut raw = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    while raw.last().is_some_and(|b| b.is_ascii_whitespace()) {
        raw.pop();
    }
    if raw.is_empty() {
        anyhow::bail!("shared secret file {} is empty", path.display());
    }
    Ok(raw)
}

/// Prints version information to stdout.
fn print_version() {
    println!("settlement-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc           {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
