use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use walletpay::application::orchestrator::PaymentOrchestrator;
use walletpay::application::reconciler::Reconciler;
use walletpay::application::wallet::WalletService;
use walletpay::config::{DEFAULT_RECONCILE_BATCH, EngineConfig};
use walletpay::domain::ports::{LedgerStoreRef, ReconciliationQueueRef};
use walletpay::infrastructure::gateway::{GatewayBehavior, SimulatedGateway};
use walletpay::infrastructure::in_memory::{InMemoryLedgerStore, InMemoryReconciliationQueue};
use walletpay::interfaces::csv::command_reader::{BatchCommand, CommandReader};
use walletpay::interfaces::csv::report_writer::ReportWriter;
use walletpay::logging::{LogFormat, init_logging};

/// Upper bound on reconciliation passes after the batch.
const DRAIN_PASSES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Report {
    Balances,
    Transactions,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "WALLETPAY_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Simulated provider behaviour: accept, reject or hang.
    #[arg(long, env = "WALLETPAY_GATEWAY", default_value = "accept")]
    gateway: GatewayBehavior,

    /// Gateway submit timeout in milliseconds.
    #[arg(long, env = "WALLETPAY_GATEWAY_TIMEOUT_MS", default_value_t = 5000)]
    gateway_timeout_ms: u64,

    /// Queue entries handled per reconciliation pass.
    #[arg(long, env = "WALLETPAY_RECONCILE_BATCH", default_value_t = DEFAULT_RECONCILE_BATCH)]
    reconcile_batch: usize,

    #[arg(long, env = "WALLETPAY_REPORT", value_enum, default_value_t = Report::Balances)]
    report: Report,

    #[arg(long, env = "WALLETPAY_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[arg(long, env = "WALLETPAY_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

fn open_stores(db_path: Option<PathBuf>) -> Result<(LedgerStoreRef, ReconciliationQueueRef)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        use walletpay::infrastructure::rocksdb::RocksDBStore;

        let store = Arc::new(RocksDBStore::open(db_path).into_diagnostic()?);
        let ledger: LedgerStoreRef = store.clone();
        let queue: ReconciliationQueueRef = store;
        return Ok((ledger, queue));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    let ledger: LedgerStoreRef = Arc::new(InMemoryLedgerStore::new());
    let queue: ReconciliationQueueRef = Arc::new(InMemoryReconciliationQueue::new());
    Ok((ledger, queue))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let config = EngineConfig::default()
        .with_gateway_timeout(Duration::from_millis(cli.gateway_timeout_ms))
        .with_reconcile_batch(cli.reconcile_batch);
    config.validate().into_diagnostic()?;

    let (ledger, queue) = open_stores(cli.db_path)?;
    let gateway = Arc::new(SimulatedGateway::new(cli.gateway));

    let orchestrator =
        PaymentOrchestrator::new(ledger.clone(), gateway.clone(), queue.clone(), &config);
    let reconciler = Reconciler::new(ledger.clone(), gateway, queue, &config);
    let wallets = WalletService::new(ledger.clone(), &config);

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(BatchCommand::Deposit { user_id, amount }) => {
                if let Err(e) = ledger.deposit(user_id, amount).await {
                    warn!(user_id, error = %e, code = e.code(), "Error processing deposit");
                }
            }
            Ok(BatchCommand::Payment(command)) => {
                let user_id = command.user_id;
                match orchestrator.submit_payment(command).await {
                    Ok(receipt) => info!(
                        user_id,
                        transaction_id = %receipt.transaction_id,
                        status = %receipt.status,
                        "Payment settled"
                    ),
                    Err(e) => warn!(
                        user_id,
                        transaction_id = ?e.transaction_id(),
                        status = %e.public_status(),
                        error = %e,
                        code = e.code(),
                        retriable = e.is_retriable(),
                        "Error processing payment"
                    ),
                }
            }
            Err(e) => warn!(error = %e, "Error reading command"),
        }
    }

    let report = reconciler.drain(DRAIN_PASSES).await.into_diagnostic()?;
    if report.remaining > 0 {
        warn!(
            remaining = report.remaining,
            "Reconciliation queue not drained; entries stay queued"
        );
    }

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    let all_wallets = ledger.wallets().await.into_diagnostic()?;
    match cli.report {
        Report::Balances => writer.write_balances(all_wallets).into_diagnostic()?,
        Report::Transactions => {
            let mut views = Vec::new();
            for wallet in all_wallets {
                views.extend(wallets.history(wallet.user_id, None).await.into_diagnostic()?);
            }
            writer.write_transactions(views).into_diagnostic()?;
        }
    }

    Ok(())
}
