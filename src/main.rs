use clap::Parser;
use miette::{IntoDiagnostic, Result};
use policy_bridge::application::ledger::IdempotencyLedger;
use policy_bridge::application::orchestrator::WorkflowOrchestrator;
use policy_bridge::application::scheduler::{BatchProcessor, merge_replays};
use policy_bridge::config::BridgeConfig;
use policy_bridge::domain::ports::LedgerStoreBox;
use policy_bridge::infrastructure::auth::StaticTokenProvider;
use policy_bridge::infrastructure::in_memory::InMemoryLedgerStore;
use policy_bridge::infrastructure::simulated::{SimulatedRemote, SimulatedSeed};
use policy_bridge::interfaces::csv::result_writer::ResultWriter;
use policy_bridge::interfaces::json::record_reader::RecordReader;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input file with one JSON transaction record per line
    input: PathBuf,

    /// JSON settings file; omitted keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a persistent ledger (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Entities preloaded into the simulated policy system
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Session token presented to the policy system
    #[arg(long, env = "POLICY_BRIDGE_TOKEN", default_value = "dry-run", hide_env_values = true)]
    token: String,

    /// Principal the session token belongs to
    #[arg(long, default_value = "policy-bridge")]
    principal: String,

    /// Maximum number of transactions processed at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Rounds of requeueing and replaying retryable failures after the batch
    #[arg(long, default_value_t = 0)]
    retry_rounds: u32,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("policy_bridge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[cfg(feature = "storage-rocksdb")]
fn ledger_store(db_path: Option<&Path>) -> Result<LedgerStoreBox> {
    use policy_bridge::infrastructure::rocksdb::RocksDbLedgerStore;

    match db_path {
        Some(path) => Ok(Box::new(RocksDbLedgerStore::open(path).into_diagnostic()?)),
        None => Ok(Box::new(InMemoryLedgerStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn ledger_store(db_path: Option<&Path>) -> Result<LedgerStoreBox> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory ledger."
        );
    }
    Ok(Box::new(InMemoryLedgerStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_path(path).into_diagnostic()?,
        None => BridgeConfig::default(),
    };
    if let Some(concurrency) = cli.concurrency {
        config.max_concurrency = concurrency;
    }

    let remote = match &cli.seed {
        Some(path) => SimulatedRemote::from_seed(SimulatedSeed::from_path(path).into_diagnostic()?),
        None => SimulatedRemote::new(),
    };
    let ledger = Arc::new(IdempotencyLedger::new(
        ledger_store(cli.db_path.as_deref())?,
        config.max_attempts,
    ));
    let auth = StaticTokenProvider::new(cli.token, cli.principal);
    let orchestrator = WorkflowOrchestrator::with_defaults(Arc::new(remote), Arc::new(auth), ledger, config.clone());
    let processor = BatchProcessor::new(Arc::new(orchestrator), config.max_concurrency);

    // Load records
    let file = File::open(&cli.input).into_diagnostic()?;
    let mut records = Vec::new();
    for (index, record) in RecordReader::new(BufReader::new(file)).records().enumerate() {
        match record {
            Ok(record) => records.push(record),
            Err(e) => error!(record = index + 1, error = %e, "skipping unreadable record"),
        }
    }
    info!(count = records.len(), "records loaded");

    let mut processed = processor.process_batch(records).await;
    for round in 1..=cli.retry_rounds {
        let requeued = processor.requeue_failed().await.into_diagnostic()?;
        if requeued.is_empty() {
            break;
        }
        info!(round, count = requeued.len(), "starting retry round");
        merge_replays(&mut processed, processor.run_retries().await.into_diagnostic()?);
    }

    for entry in processor.escalations().await.into_diagnostic()? {
        warn!(
            key = %entry.key,
            attempts = entry.attempt_count,
            last_error = entry.last_error.as_deref().unwrap_or_default(),
            "transaction requires manual intervention"
        );
    }

    let completed = processed.iter().filter(|p| p.result.is_completed()).count();
    info!(completed, failed = processed.len() - completed, "batch finished");

    // Output results
    let stdout = io::stdout();
    let mut writer = ResultWriter::new(stdout.lock());
    writer
        .write_results(processed.iter().map(|p| &p.result))
        .into_diagnostic()?;

    Ok(())
}
