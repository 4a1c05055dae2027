//! CourseTally - per-course student activity reports
//!
//! A CLI tool that aggregates activity events (quiz attempts, forum
//! posts, submissions, SCORM attempts, ...) per course from a platform
//! snapshot and renders a sorted, paginated report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad arguments, unreadable snapshot, aggregation failure)

use anyhow::{bail, Context, Result};
use chrono::Utc;
use coursetally::aggregator::CourseAggregator;
use coursetally::cache::{AggregationCache, MemoryCache, NoopCache};
use coursetally::cli::{Args, OutputFormat};
use coursetally::config::Config;
use coursetally::counters::{CounterKind, CounterRegistry};
use coursetally::report::{self, generator, ActivityReport, ActivitySummary, ReportMetadata};
use coursetally::source::SnapshotStore;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("CourseTally v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the report
    match run_report(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Report failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .coursetally.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".coursetally.toml");

    if path.exists() {
        eprintln!("⚠️  .coursetally.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .coursetally.toml")?;

    println!("✅ Created .coursetally.toml with default settings.");
    println!("   Edit it to customize the snapshot path, sorting, and pagination.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete report workflow.
async fn run_report(args: Args) -> Result<()> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let Some(snapshot_path) = config.data.snapshot.clone() else {
        bail!("No snapshot given. Pass --data <FILE> or set [data] snapshot in .coursetally.toml");
    };
    if config.report.per_page == 0 {
        bail!("Per-page must be at least 1 (check [report] per_page in the config)");
    }

    // Step 1: Load the snapshot
    println!("📥 Loading snapshot: {}", snapshot_path);
    let store = Arc::new(
        SnapshotStore::load(Path::new(&snapshot_path))
            .with_context(|| format!("Failed to load snapshot: {}", snapshot_path))?,
    );
    info!(
        "Snapshot ready: {} courses, {} record stores",
        store.course_count(),
        store.store_count()
    );

    // Step 2: Wire up the aggregation engine
    let registry = Arc::new(CounterRegistry::new(store.clone()));
    let cache: Arc<dyn AggregationCache> = if config.cache.enabled {
        Arc::new(MemoryCache::new())
    } else {
        info!("Aggregation cache disabled");
        Arc::new(NoopCache)
    };
    let mut aggregator =
        CourseAggregator::new(store.clone(), store.clone(), registry.clone(), cache);
    aggregator.set_category_scope(args.category);

    // Handle the listing flags: print and exit without aggregating
    if args.list_counters || args.list_categories {
        if args.list_counters {
            print_counters(&registry).await?;
        }
        if args.list_categories {
            print_categories(&aggregator).await?;
        }
        return Ok(());
    }

    // Step 3: Aggregate activity counts
    println!("🧮 Aggregating activity counts...");
    let spinner = make_spinner(!args.quiet);
    let mut records = aggregator.get_courses().await?;
    spinner.finish_and_clear();
    info!("Aggregated {} courses", records.len());

    // Step 4: Sort and paginate
    let sort = resolve_sort(&registry, &config.report.sort);
    report::sort_by_counter(&mut records, sort);

    let course_total = records.len();
    let page_records = report::paginate(&records, args.page, config.report.per_page).to_vec();

    // Step 5: Build the report
    println!("📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let columns = registry.enabled_kinds().await?;
    let summary = ActivitySummary::from_records(&records, &columns, config.report.top_courses);

    let metadata = ReportMetadata {
        snapshot: snapshot_path.clone(),
        generated_at: Utc::now(),
        category_scope: aggregator.category_scope(),
        course_total,
        page: args.page,
        per_page: config.report.per_page,
        sort,
        duration_seconds: duration,
    };

    let report = ActivityReport {
        metadata,
        columns,
        courses: page_records,
        summary,
    };

    // Step 6: Save the report
    let output_path = Path::new(&config.general.output);
    match args.format {
        OutputFormat::Json => generator::write_json_report(&report, output_path)
            .with_context(|| format!("Failed to write report to {}", output_path.display()))?,
        OutputFormat::Markdown => generator::write_report(&report, output_path)
            .with_context(|| format!("Failed to write report to {}", output_path.display()))?,
    }

    // Print summary
    let grand_total = report
        .summary
        .grand_totals
        .get(&CounterKind::Total)
        .copied()
        .unwrap_or(0);
    println!("\n📊 Report Summary:");
    println!("   Courses in scope: {}", course_total);
    println!("   Activity events: {}", grand_total);
    if let Some((kind, events)) = busiest_counter(&report) {
        println!("   Busiest counter: {} ({} events)", kind.label(), events);
    }
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Report complete! Saved to: {}",
        output_path.display()
    );

    Ok(())
}

/// Handle --list-counters: print the declared counters and availability.
async fn print_counters(registry: &CounterRegistry) -> Result<()> {
    println!("\n📋 Declared counters:\n");
    for def in registry.defs() {
        let available = registry.is_available(def.kind).await?;
        let marker = if available { "✅" } else { "🚫" };
        println!("   {} {:<14} {}", marker, def.kind.name(), def.kind.label());
    }
    println!("\n   🚫 marks counters whose module is hidden; they count as zero.");
    Ok(())
}

/// Handle --list-categories: print the categories available for scoping.
async fn print_categories(aggregator: &CourseAggregator) -> Result<()> {
    let categories = aggregator.categories().await?;

    if categories.is_empty() {
        println!("\n   No categories in this snapshot.");
        return Ok(());
    }

    println!("\n🗂️  Categories:\n");
    for (id, name) in categories {
        println!("   {:>5}  {}", id, name);
    }
    Ok(())
}

/// Resolve the sort column, falling back to the total column for names
/// outside the declared counter set.
fn resolve_sort(registry: &CounterRegistry, name: &str) -> CounterKind {
    match registry.lookup(name) {
        Ok(kind) => kind,
        Err(_) => {
            warn!("Unknown sort counter '{}', falling back to total", name);
            CounterKind::Total
        }
    }
}

/// The concrete counter with the most events, for the closing summary.
fn busiest_counter(report: &ActivityReport) -> Option<(CounterKind, u64)> {
    report
        .summary
        .grand_totals
        .iter()
        .filter(|(kind, _)| !kind.is_total())
        .max_by_key(|(_, events)| **events)
        .filter(|(_, events)| **events > 0)
        .map(|(kind, events)| (*kind, *events))
}

/// Create the aggregation spinner, hidden in quiet mode.
fn make_spinner(show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message("Walking record stores...");
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .coursetally.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
