use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use backline::app::{build_adapter_registry, Config, RunOutcome, SyncCoordinator};
use backline::cli::{output, Cli, Commands, EventsArgs, ReconcileArgs, SyncCommands};
use backline::core::db::{create_pool, DbPool};
use backline::core::domain::{EventStatus, SyncRunId};
use backline::core::store::{SqliteStore, Store};
use backline::error::Result;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config {}: {err}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.dry_run |= cli.dry_run;
    config.init_logging();

    match run(cli, config).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<ExitCode> {
    let pool = create_pool(&config.database)?;
    run_migrations(&pool)?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let Commands::Sync { command } = cli.command;
    match command {
        SyncCommands::Run => sync_run(&config, store).await,
        SyncCommands::Reconcile(args) => sync_reconcile(&config, store, args).await,
        SyncCommands::Events(args) => sync_events(store, args).await,
    }
}

fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut conn = pool
        .get()
        .map_err(|e| backline::error::Error::Fatal(e.to_string()))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| backline::error::Error::Fatal(format!("migrations failed: {e}")))?;
    Ok(())
}

fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, finishing in-flight work");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn sync_run(config: &Config, store: Arc<dyn Store>) -> Result<ExitCode> {
    let adapters = build_adapter_registry(config)?;
    if adapters.is_empty() {
        warn!("No platforms enabled; nothing to sync");
    }
    let coordinator = SyncCoordinator::new(
        store,
        adapters,
        config.sync.clone(),
        config.dry_run,
        shutdown_signal(),
    );

    let outcome = coordinator.run().await;
    report_outcome(&outcome);
    Ok(exit_code(&outcome))
}

async fn sync_reconcile(
    config: &Config,
    store: Arc<dyn Store>,
    args: ReconcileArgs,
) -> Result<ExitCode> {
    let Some(run_id) = SyncRunId::parse(&args.run_id) else {
        eprintln!("Invalid run id: {}", args.run_id);
        return Ok(ExitCode::FAILURE);
    };

    let adapters = build_adapter_registry(config)?;
    let coordinator = SyncCoordinator::new(
        store,
        adapters,
        config.sync.clone(),
        config.dry_run,
        shutdown_signal(),
    );

    let outcome = coordinator.reconcile_existing(run_id).await;
    report_outcome(&outcome);
    Ok(exit_code(&outcome))
}

async fn sync_events(store: Arc<dyn Store>, args: EventsArgs) -> Result<ExitCode> {
    let statuses: Vec<EventStatus> = args.status.into_iter().map(EventStatus::from).collect();
    let events = store.list_events_by_status(&statuses).await?;
    println!("{}", output::render_events(&events));
    Ok(ExitCode::SUCCESS)
}

fn report_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Finalized { run_id, summary } => {
            info!(run_id = %run_id, "Run finalized");
            println!("Run {run_id} finalized");
            println!("{}", output::render_summary(summary));
        }
        RunOutcome::TimedOut { run_id, summary } => {
            warn!(run_id = %run_id, "Run hit wall-clock timeout");
            println!("Run {run_id} timed out");
            println!("{}", output::render_summary(summary));
        }
        RunOutcome::Aborted { run_id, reason } => {
            error!(run_id = %run_id, reason = %reason, "Run aborted");
            eprintln!("Run {run_id} aborted: {reason}");
        }
    }
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1))
}
