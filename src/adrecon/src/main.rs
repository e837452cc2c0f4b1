//! adrecon: daily attribution and media-plan reconciliation runs over a
//! directory of normalized JSON inputs.

use adrecon_attribution::{validate_rows, OrderDeduplicator};
use adrecon_core::types::{Dimension, Metric};
use adrecon_core::{AppConfig, DiagnosticsSummary, RunDiagnostics};
use adrecon_pipeline::{DailyRun, Engine, JsonDirStore, MonthlyComparison, RecordStore};
use adrecon_reconciliation::plan::parse_plan_month;
use adrecon_reconciliation::MediaPlan;
use anyhow::{anyhow, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "adrecon")]
#[command(about = "Marketing attribution and media-plan reconciliation engine")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "ADRECON_CONFIG")]
    config: Option<String>,

    /// Directory holding input collections and the output/ tree
    #[arg(long, env = "ADRECON_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// JSON lookup tables (overrides config)
    #[arg(long, env = "ADRECON__TABLES_PATH")]
    tables: Option<String>,

    /// Comma-separated aggregation dimensions (overrides config)
    #[arg(long, value_delimiter = ',')]
    dimensions: Option<Vec<Dimension>>,

    /// Significance level for period comparisons (overrides config)
    #[arg(long, env = "ADRECON__PERFORMANCE__SIGNIFICANCE_LEVEL")]
    significance_level: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Attribute, deduplicate and reconcile one day
    Run {
        /// Day to process, YYYY-MM-DD (default: yesterday, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Attribute one day's orders to promo codes or utm channels and print them as JSON
    Dedup {
        /// Day to process, YYYY-MM-DD (default: yesterday, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Compare a month against another month
    Compare {
        /// Current month, YYYY-MM
        #[arg(long)]
        month: String,

        /// Previous month, YYYY-MM (default: the month before)
        #[arg(long)]
        previous: Option<String>,

        /// Comma-separated metrics (default: all)
        #[arg(long, value_delimiter = ',')]
        metrics: Option<Vec<Metric>>,
    },

    /// Validate media_plan.json and report malformed lines
    ValidatePlan,

    /// Print the effective configuration and lookup tables
    ShowConfig,
}

fn parse_month(raw: &str) -> anyhow::Result<NaiveDate> {
    parse_plan_month(raw).ok_or_else(|| anyhow!("invalid month '{raw}', expected YYYY-MM"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adrecon=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(tables) = cli.tables {
        config.tables_path = Some(tables);
    }
    if let Some(dimensions) = cli.dimensions {
        config.analysis.dimensions = dimensions;
    }
    if let Some(alpha) = cli.significance_level {
        config.performance.significance_level = alpha;
    }

    info!(
        data_dir = %cli.data_dir.display(),
        tables = config.tables_path.as_deref().unwrap_or("builtin"),
        dimensions = ?config.analysis.dimensions,
        significance_level = config.performance.significance_level,
        "Configuration loaded"
    );

    let engine = Engine::new(config).context("failed to initialise engine")?;
    let store = JsonDirStore::new(&cli.data_dir);

    match cli.command {
        Commands::Run { date } => cmd_run(&engine, &store, date).await,
        Commands::Dedup { date } => cmd_dedup(&engine, &store, date).await,
        Commands::Compare {
            month,
            previous,
            metrics,
        } => cmd_compare(&engine, &store, &month, previous.as_deref(), metrics).await,
        Commands::ValidatePlan => cmd_validate_plan(&engine, &store).await,
        Commands::ShowConfig => cmd_show_config(&engine),
    }
}

fn day_or_yesterday(date: Option<NaiveDate>) -> anyhow::Result<NaiveDate> {
    match date {
        Some(date) => Ok(date),
        None => Utc::now()
            .date_naive()
            .pred_opt()
            .ok_or_else(|| anyhow!("no previous day")),
    }
}

async fn cmd_run(
    engine: &Engine,
    store: &JsonDirStore,
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let date = day_or_yesterday(date)?;
    let report = DailyRun::new(engine, store).execute(date).await?;

    println!("Run {} for {}", report.run_id, report.date);
    println!(
        "  campaign-days: {} ({} matched: {} manual, {} exact, {} fuzzy; {} unmatched)",
        report.unified_records,
        report.match_stats.matched,
        report.match_stats.manual,
        report.match_stats.exact,
        report.match_stats.fuzzy,
        report.match_stats.unmatched,
    );
    println!(
        "  orders: {} promo, {} utm, {} duplicate transactions skipped",
        report.dedup_stats.promo_attributed,
        report.dedup_stats.utm_attributed,
        report.dedup_stats.duplicate_transactions,
    );
    print_diagnostics(&report.diagnostics);
    println!("Report: {}", store.daily_report_path(report.date).display());
    Ok(())
}

async fn cmd_dedup(
    engine: &Engine,
    store: &JsonDirStore,
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let date = day_or_yesterday(date)?;
    let (conversions, promo_rows) =
        tokio::try_join!(store.load_conversions(date, date), store.load_promo_rows())?;

    let diagnostics = RunDiagnostics::new(engine.config().diagnostics.sample_limit);
    let promo_orders = validate_rows(&promo_rows, &diagnostics);
    let outcome = OrderDeduplicator::new(engine.tables()).deduplicate(
        &conversions,
        &promo_orders,
        &diagnostics,
    );

    println!("{}", serde_json::to_string_pretty(&outcome.orders)?);
    eprintln!(
        "{date}: {} orders ({} promo, {} utm), promo revenue {:.2}, utm revenue {:.2}",
        outcome.orders.len(),
        outcome.stats.promo_attributed,
        outcome.stats.utm_attributed,
        outcome.stats.promo_revenue,
        outcome.stats.utm_revenue,
    );
    let summary = diagnostics.summary();
    if summary.total > 0 {
        warn!(diagnostics = summary.total, "Deduplication reported diagnostics");
    }
    Ok(())
}

async fn cmd_compare(
    engine: &Engine,
    store: &JsonDirStore,
    month: &str,
    previous: Option<&str>,
    metrics: Option<Vec<Metric>>,
) -> anyhow::Result<()> {
    let current = parse_month(month)?;
    let previous = previous.map(parse_month).transpose()?;
    let report = MonthlyComparison::new(engine, store)
        .execute(current, previous, metrics.as_deref())
        .await?;

    let comparison = &report.comparison;
    println!(
        "{} vs {}: {} groups ({} in both)",
        comparison.current_period,
        comparison.previous_period,
        comparison.summary.total_groups,
        comparison.summary.groups_in_both,
    );
    for (metric, summary) in &comparison.summary.metrics {
        println!(
            "  {:<12} +{} -{} ={}  improved {} worsened {} significant {}",
            metric.as_str(),
            summary.increased,
            summary.decreased,
            summary.unchanged,
            summary.improved,
            summary.worsened,
            summary.significant,
        );
    }
    print_diagnostics(&report.diagnostics);
    println!(
        "Report: {}",
        store
            .comparison_path(&comparison.current_period, &comparison.previous_period)
            .display()
    );
    Ok(())
}

async fn cmd_validate_plan(engine: &Engine, store: &JsonDirStore) -> anyhow::Result<()> {
    let rows = store.load_media_plan().await?;
    let diagnostics = RunDiagnostics::new(engine.config().diagnostics.sample_limit);
    let plan = MediaPlan::from_rows(&rows, &diagnostics);

    println!("{} rows, {} valid plan lines", rows.len(), plan.len());
    let summary = diagnostics.summary();
    print_diagnostics(&summary);
    if summary.total > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_show_config(engine: &Engine) -> anyhow::Result<()> {
    println!("{:#?}", engine.config());
    println!("{}", serde_json::to_string_pretty(engine.tables())?);
    Ok(())
}

fn print_diagnostics(summary: &DiagnosticsSummary) {
    if summary.total == 0 {
        println!("  diagnostics: none");
        return;
    }
    println!("  diagnostics: {}", summary.total);
    for (kind, entry) in &summary.kinds {
        println!("    {:<28} {}", kind.as_str(), entry.count);
        for sample in &entry.samples {
            println!("      - {sample}");
        }
    }
}
