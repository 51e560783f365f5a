//! Stock ledger command-line interface
//!
//! Thin driver over the engine services. Every command prints a tabular
//! summary and exits with `0` on success and `1` on failure.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use shared::{HealthReport, HealthStatus, RecoveryResult, StateFilter, SyncTarget};
use sqlx::postgres::PgPoolOptions;
use std::{process::ExitCode, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use stock_ledger::{
    external_source,
    services::{AgentLinker, ConflictReport, ResolutionSummary, SyncOutcome, SyncRequest},
    store::PgStore,
    AppState, Config,
};

/// Stock ledger and reconciliation engine
#[derive(Parser)]
#[command(name = "stock-ledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile local bins against the external inventory system
    SyncBins(SyncBinsArgs),

    /// List products at or below their low-stock threshold
    LowStock(LowStockArgs),

    /// Detect conflicts between the agent and bin subsystems
    Conflicts(ConflictsArgs),

    /// Evaluate sync health and recover when degraded
    Health(HealthArgs),

    /// Archive approved movements older than a cutoff
    Archive(ArchiveArgs),

    /// Link a delivery agent to a user and a bin
    LinkAgent(LinkAgentArgs),
}

#[derive(Args, Debug)]
struct SyncBinsArgs {
    /// Report planned changes without writing
    #[arg(long)]
    dry_run: bool,

    /// Restrict the pass to one delivery agent
    #[arg(long = "da-id")]
    da_id: Option<Uuid>,

    /// `all` or a state name
    #[arg(long, default_value = "all")]
    state: String,
}

#[derive(Args, Debug)]
struct LowStockArgs {
    /// Override every product's threshold
    #[arg(long)]
    threshold: Option<i64>,
}

#[derive(Args, Debug)]
struct ConflictsArgs {
    /// Resolve auto-resolvable conflicts after detection
    #[arg(long)]
    auto: bool,
}

#[derive(Args, Debug)]
struct HealthArgs {
    /// Overall status at which recovery runs; defaults to the configured one
    #[arg(long)]
    alert_threshold: Option<HealthStatus>,

    /// Keep monitoring until interrupted
    #[arg(long)]
    continuous: bool,

    /// Seconds between evaluations in continuous mode
    #[arg(long)]
    interval: Option<u64>,
}

#[derive(Args, Debug)]
struct ArchiveArgs {
    /// Cutoff as `YYYY-MM-DD` or RFC 3339
    #[arg(long)]
    before: String,

    /// Count eligible movements without flagging them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct LinkAgentArgs {
    #[arg(long = "da-id")]
    da_id: Uuid,

    #[arg(long)]
    user_id: Uuid,

    #[arg(long)]
    bin_id: Uuid,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stock_ledger=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn connect() -> anyhow::Result<AppState> {
    dotenvy::dotenv().ok();
    let config = Config::load().context("loading configuration")?;
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await
        .context("connecting to database")?;
    let source = external_source(&config)?;
    Ok(AppState::new(Arc::new(PgStore::new(db_pool)), source, config))
}

/// `Ok(false)` means the command ran but reported failure
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let state = connect().await?;
    match cli.command {
        Commands::SyncBins(args) => sync_bins(&state, args).await,
        Commands::LowStock(args) => low_stock(&state, args).await,
        Commands::Conflicts(args) => conflicts(&state, args).await,
        Commands::Health(args) => health(&state, args).await,
        Commands::Archive(args) => archive(&state, args).await,
        Commands::LinkAgent(args) => link_agent(&state, args).await,
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, stopping after the current item");
            token.cancel();
        }
    });
}

async fn sync_bins(state: &AppState, args: SyncBinsArgs) -> anyhow::Result<bool> {
    let state_filter = shared::parse_state_filter(&args.state)
        .map_err(|msg| anyhow::anyhow!("--state {}: {}", args.state, msg))?;
    let request = SyncRequest {
        target: args.da_id.map_or(SyncTarget::Global, SyncTarget::Agent),
        dry_run: args.dry_run,
        state_filter,
    };

    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel);
    let outcome = state.orchestrator().sync_bins(&request, &cancel).await?;
    print_sync(&outcome, &request.state_filter);
    Ok(outcome.record.success)
}

fn print_sync(outcome: &SyncOutcome, filter: &StateFilter) {
    let mode = if outcome.record.dry_run { "DRY RUN" } else { "LIVE" };
    println!("Sync {} [{}] state filter: {:?}", outcome.record.target, mode, filter);
    println!();
    println!(
        "{:<24} {:<10} {:<12} {:<28} {}",
        "EXTERNAL BIN", "ACTION", "STATE", "CHANGED", "ERROR"
    );
    for item in &outcome.items {
        println!(
            "{:<24} {:<10} {:<12} {:<28} {}",
            item.zoho_bin_id,
            item.action.as_str(),
            item.inferred_state.as_deref().unwrap_or("-"),
            item.changed_fields.join(","),
            item.error.as_deref().unwrap_or("")
        );
    }
    println!();
    println!(
        "created {}  updated {}  unchanged {}  failed {}",
        outcome.record.created, outcome.record.updated, outcome.record.unchanged, outcome.record.failed
    );
    for warning in &outcome.warnings {
        println!("warning: {}", warning);
    }
    if let Some(error) = &outcome.record.error {
        println!("pass error: {}", error);
    }
}

async fn low_stock(state: &AppState, args: LowStockArgs) -> anyhow::Result<bool> {
    let report = state.ledger().low_stock_report(args.threshold).await?;
    println!(
        "{:<16} {:<32} {:>10} {:>10} {:>10}",
        "SKU", "NAME", "STOCK", "THRESHOLD", "SHORTAGE"
    );
    for item in &report {
        println!(
            "{:<16} {:<32} {:>10} {:>10} {:>10}",
            item.sku, item.name, item.current_stock, item.threshold, item.shortage
        );
    }
    println!();
    println!("{} products low on stock", report.len());
    Ok(true)
}

async fn conflicts(state: &AppState, args: ConflictsArgs) -> anyhow::Result<bool> {
    let report = state.detector().detect_all_conflicts().await?;
    print_conflicts(&report);

    if !args.auto {
        return Ok(true);
    }
    let results = state.resolver().resolve_report(&report).await;
    let summary = ResolutionSummary::from_results(results);
    print_resolution(&summary);
    Ok(summary.failed == 0)
}

fn print_conflicts(report: &ConflictReport) {
    println!(
        "{:<18} {:<26} {:<9} {:<5} {}",
        "CATEGORY", "TYPE", "SEVERITY", "AUTO", "DESCRIPTION"
    );
    for (category, conflicts) in &report.conflicts {
        for conflict in conflicts {
            println!(
                "{:<18} {:<26} {:<9} {:<5} {}",
                category.as_str(),
                conflict.conflict_type.as_str(),
                conflict.severity.as_str(),
                if conflict.auto_resolvable { "yes" } else { "no" },
                conflict.description
            );
        }
    }
    println!();
    println!(
        "{} conflicts, {} auto-resolvable",
        report.total, report.auto_resolvable
    );
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
}

fn print_resolution(summary: &ResolutionSummary) {
    println!();
    println!("{:<26} {:<26} {:<8} {}", "TYPE", "ACTION", "RESULT", "ERROR");
    for result in &summary.results {
        let outcome = match (result.success, result.already_resolved) {
            (true, true) => "noop",
            (true, false) => "ok",
            (false, _) => "failed",
        };
        println!(
            "{:<26} {:<26} {:<8} {}",
            result.conflict_type.as_str(),
            result.action.as_str(),
            outcome,
            result.error.as_deref().unwrap_or("")
        );
    }
    println!();
    println!(
        "resolved {}  already resolved {}  queued {}  failed {}",
        summary.resolved, summary.already_resolved, summary.queued, summary.failed
    );
}

async fn health(state: &AppState, args: HealthArgs) -> anyhow::Result<bool> {
    let alert = match args.alert_threshold {
        Some(status) => status,
        None => state.config.health.alert_status()?,
    };
    let monitor = state.health_monitor();
    let cancel = CancellationToken::new();

    if args.continuous {
        let interval = args
            .interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| state.config.health.interval());
        cancel_on_interrupt(&cancel);
        let iterations = monitor.run_continuous(interval, alert, cancel).await?;
        println!("health monitor stopped after {} evaluations", iterations);
        return Ok(true);
    }

    let report = monitor.monitor_sync_health().await;
    print_health(&report);
    let recovery = monitor.trigger_auto_recovery(&report, alert, &cancel).await;
    print_recovery(&recovery);
    Ok(!report.needs_recovery(alert) || recovery.all_succeeded())
}

fn print_health(report: &HealthReport) {
    println!("{:<22} {:<10} {:<40} {}", "CHECK", "STATUS", "INDICATORS", "ERROR");
    for check in &report.checks {
        let indicators = check
            .indicators
            .iter()
            .map(|(k, v)| format!("{}={:.1}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:<22} {:<10} {:<40} {}",
            check.check_name.as_str(),
            check.status.as_str(),
            indicators,
            check.error.as_deref().unwrap_or("")
        );
    }
    println!();
    println!(
        "overall {}  score {:.0}%",
        report.overall_status, report.health_score
    );
}

fn print_recovery(recovery: &RecoveryResult) {
    if !recovery.triggered {
        println!("recovery not needed");
        return;
    }
    println!();
    println!("{:<24} {:<8} {}", "RECOVERY ACTION", "RESULT", "DETAIL");
    for action in &recovery.actions {
        println!(
            "{:<24} {:<8} {}",
            action.action,
            if action.success { "ok" } else { "failed" },
            action.detail.as_deref().unwrap_or("")
        );
    }
}

fn parse_cutoff(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("--before {:?} is not a date", value))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .context("invalid cutoff")
}

async fn archive(state: &AppState, args: ArchiveArgs) -> anyhow::Result<bool> {
    let cutoff = parse_cutoff(&args.before)?;
    let report = state.archival().archive_older_than(cutoff, args.dry_run).await?;

    println!("{:<20} {}", "CUTOFF", report.cutoff.to_rfc3339());
    println!("{:<20} {}", "MODE", if report.dry_run { "dry run" } else { "live" });
    println!("{:<20} {}", "ELIGIBLE", report.eligible);
    println!("{:<20} {}", "ARCHIVED", report.archived);
    println!("{:<20} {}", "BATCHES", report.batches);
    println!("{:<20} {} -> {}", "LEDGER ROWS", report.before.total, report.after.total);
    println!("{:<20} {} -> {}", "ARCHIVED ROWS", report.before.archived, report.after.archived);
    Ok(true)
}

async fn link_agent(state: &AppState, args: LinkAgentArgs) -> anyhow::Result<bool> {
    let agent = state
        .linker()
        .link(args.da_id, args.user_id, args.bin_id)
        .await?;
    println!("{:<12} {}", "AGENT", agent.id);
    println!("{:<12} {}", "NAME", agent.name);
    println!("{:<12} {}", "STATUS", agent.status.as_str());
    println!("{:<12} {}", "BIN", args.bin_id);
    println!("{:<12} {}", "STATE", agent.state.as_deref().unwrap_or("-"));
    Ok(true)
}
