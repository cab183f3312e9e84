//! Relay Book Packer - Entry Point
//!
//! Initializes configuration, logging, chain and relayer connections,
//! and the packer loop. Runs until Ctrl-C, the configured kill key or
//! the requested number of cycles.
//!
//! Wiring sequence:
//! 1. Parse the command line and load config.toml
//! 2. Init tracing (JSON structured logging)
//! 3. Load the wallet pool from the environment
//! 4. Connect the RPC provider and the relayer client
//! 5. Open the checkpoint store
//! 6. Spawn metrics (:9090) and health (:8080) servers
//! 7. Spawn Ctrl-C and kill-key watchers
//! 8. Run the packer until it stops, then shut the servers down

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use relay_book_packer::adapters::chain::{
    registry_domain, ChainProvider, Eip712PermitSigner, OnChainDepositDestination, OrderBookReader,
    TradingWallet,
};
use relay_book_packer::adapters::metrics::{HealthServer, HealthState, MetricsRegistry, PackerObserver};
use relay_book_packer::adapters::persistence::JsonCheckpointRepository;
use relay_book_packer::adapters::relayer::{RelayerClient, RelayerClientConfig};
use relay_book_packer::config::{self, AppConfig};
use relay_book_packer::ports::signer::PermitSigner;
use relay_book_packer::ports::telemetry::{NoopTelemetry, PackerTelemetry};
use relay_book_packer::usecases::deposit_relay::parse_payloads;
use relay_book_packer::usecases::{DepositRelay, Packer, PackerOptions, RetryPolicy};

#[derive(Parser)]
#[command(name = "relay-book-packer")]
#[command(about = "Gasless liquidity packer for on-chain order books", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config.toml", env = "PACKER_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the packer loop
    Run {
        /// Stop after this many steady-state cycles
        #[arg(long)]
        cycles: Option<u64>,
        /// Ignore any stored checkpoint and start a new run
        #[arg(long)]
        fresh: bool,
    },
    /// Deliver cross-chain deposits listed in a JSONL file
    DeliverDeposits {
        /// One deposit payload per line
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── 1. Load configuration ───────────────────────────────
    let config = config::loader::load_config(&cli.config).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.bot.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.bot.name,
        version = env!("CARGO_PKG_VERSION"),
        market = %config.market.symbol,
        mode = ?config.run.mode,
        wallets = config.wallets.len(),
        "Starting relay book packer"
    );

    match cli.command {
        Commands::Run { cycles, fresh } => run_packer(config, cycles, fresh).await,
        Commands::DeliverDeposits { file } => deliver_deposits(&config, &file).await,
    }
}

/// Wire adapters into the packer and run it to completion.
async fn run_packer(config: AppConfig, cycles: Option<u64>, fresh: bool) -> Result<()> {
    // ── 3. Wallet pool (keys stay in memory) ────────────────
    let wallets = TradingWallet::load_pool(&config.wallets).context("Failed to load wallet keys")?;

    // ── 4. Chain and relayer ────────────────────────────────
    let chain = Arc::new(ChainProvider::connect(&config.network).await?);
    let reader = Arc::new(OrderBookReader::new(
        chain.inner(),
        config.contracts.collateral_address()?,
        config.market.price_decimals,
    ));
    let relayer = Arc::new(
        RelayerClient::new(RelayerClientConfig::from(&config.network), &config.market)
            .context("Failed to create relayer client")?,
    );

    let domain = registry_domain(
        &config.session.domain_name,
        &config.session.domain_version,
        chain.chain_id(),
        config.contracts.session_registry_address()?,
    );
    let signers: Vec<Arc<dyn PermitSigner>> = wallets
        .into_iter()
        .map(|wallet| Arc::new(Eip712PermitSigner::new(wallet, domain.clone())) as Arc<dyn PermitSigner>)
        .collect();

    // ── 5. Checkpoint store ─────────────────────────────────
    let store = Arc::new(JsonCheckpointRepository::from_data_dir(&config.bot.data_dir).await?);

    // ── 6. Shutdown channel, metrics and health ─────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let health = Arc::new(HealthState::new());
    let mut server_handles = Vec::new();

    let telemetry: Arc<dyn PackerTelemetry> = if config.metrics.enabled {
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);

        let metrics_shutdown = shutdown_tx.subscribe();
        let bind = config.metrics.bind_address.clone();
        let metrics_ref = Arc::clone(&metrics);
        server_handles.push(tokio::spawn(async move {
            if let Err(e) = metrics_ref.serve(bind, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }));

        let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
        let health_shutdown = shutdown_tx.subscribe();
        server_handles.push(tokio::spawn(async move {
            if let Err(e) = health_server.run(health_shutdown).await {
                error!(error = %e, "Health server failed");
            }
        }));

        Arc::new(PackerObserver::new(metrics, Arc::clone(&health)))
    } else {
        Arc::new(NoopTelemetry)
    };

    // Chain reachability feeds readiness.
    let probe_chain = Arc::clone(&chain);
    let probe_health = Arc::clone(&health);
    let probe_handle = tokio::spawn(async move {
        loop {
            probe_health.set_chain_healthy(probe_chain.is_healthy().await);
            tokio::time::sleep(Duration::from_secs(15)).await;
        }
    });

    // ── 7. Stop triggers: Ctrl-C and kill key ───────────────
    let signal_tx = shutdown_tx.clone();
    let signal_handle = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, stopping after the wallet in flight");
            let _ = signal_tx.send(());
        }
    });

    let kill_handle = config.bot.kill_key.clone().map(|kill_key| {
        let kill_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim() == kill_key {
                    info!("Kill key entered, stopping after the wallet in flight");
                    let _ = kill_tx.send(());
                    break;
                }
            }
        })
    });

    // ── 8. Packer loop ──────────────────────────────────────
    let options = PackerOptions {
        order_book: config.contracts.order_book_address()?,
        market_id: config.market_id()?,
        methods: config.session.methods(),
        resume: config.bot.resume && !fresh,
        resume_with_new_config: config.bot.resume_with_new_config,
        retry: RetryPolicy::from_network(&config.network),
        max_cycles: cycles,
    };

    let mut packer = Packer::new(
        reader,
        relayer,
        store,
        signers,
        config.market.clone(),
        config.run.clone(),
        options,
        shutdown_tx.subscribe(),
    )
    .with_telemetry(telemetry);

    let result = packer.run().await;

    // ── Graceful shutdown ───────────────────────────────────
    let _ = shutdown_tx.send(());
    probe_handle.abort();
    signal_handle.abort();
    if let Some(handle) = kill_handle {
        handle.abort();
    }
    for handle in server_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    match result {
        Ok(summary) => {
            info!(
                run_id = %summary.run_id,
                cycles = summary.cycles,
                submitted = summary.submitted,
                failed = summary.failed,
                sessions_created = summary.sessions_created,
                "Shutdown complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Packer failed");
            Err(e)
        }
    }
}

/// Deliver every deposit in `file` to the destination chain.
async fn deliver_deposits(config: &AppConfig, file: &str) -> Result<()> {
    let relay_config = config
        .deposit_relay
        .as_ref()
        .context("deliver-deposits requires a [deposit_relay] section")?;

    let key = std::env::var(&relay_config.relayer_key_env)
        .with_context(|| format!("Environment variable {} is not set", relay_config.relayer_key_env))?;
    let relayer_wallet = TradingWallet::from_private_key("deposit-relayer", &key)?;

    let destination = Arc::new(OnChainDepositDestination::connect(relay_config, &relayer_wallet)?);
    let policy = RetryPolicy::new(relay_config.max_attempts, Duration::from_millis(relay_config.backoff_ms));
    let mut relay = DepositRelay::new(destination, policy);

    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {file}"))?;
    let payloads = parse_payloads(&text)?;
    info!(deposits = payloads.len(), file, "Delivering deposits");

    let report = relay.deliver_all(&payloads).await;
    info!(
        delivered = report.delivered,
        already_processed = report.already_processed,
        duplicates = report.duplicates,
        failed = report.failed,
        "Deposit delivery finished"
    );

    if report.failed > 0 {
        warn!(failed = report.failed, "Some deposits were not delivered");
        anyhow::bail!("{} deposit(s) failed", report.failed);
    }
    Ok(())
}
