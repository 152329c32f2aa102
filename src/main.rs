//! Sumi-Lens main entry point
//!
//! This is the command-line interface for the Sumi-Lens accessibility scanner.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use sumi_lens::config::{
    compute_config_hash, parse_config, validate, Config, DeviceKind, ScanType,
};
use sumi_lens::crawler::run_scan;
use sumi_lens::ScanError;
use tracing_subscriber::EnvFilter;

/// Sumi-Lens: a polite accessibility crawl engine
///
/// Sumi-Lens discovers the pages of a site through its sitemap or by following
/// links, evaluates each page once with an external rule evaluator, and
/// writes a deduplicated, severity-bucketed report.
#[derive(Parser, Debug)]
#[command(name = "sumi-lens")]
#[command(version)]
#[command(about = "A polite accessibility crawl engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be scanned without scanning
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Generate markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,

    /// Scan to report on with --stats or --export-summary (default: latest)
    #[arg(long, value_name = "ID")]
    scan_id: Option<i64>,

    #[command(flatten)]
    overrides: Overrides,
}

/// Command-line values that take precedence over the configuration file
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Seed URL, sitemap URL or local path
    #[arg(long)]
    url: Option<String>,

    #[arg(long, value_enum)]
    scan_type: Option<ScanType>,

    #[arg(long)]
    max_pages: Option<usize>,

    /// Number of concurrent page visits
    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long, value_enum)]
    device: Option<DeviceKind>,

    /// Viewport width for the custom device (320-1080)
    #[arg(long)]
    viewport_width: Option<u32>,

    /// One worker with a pause between pages
    #[arg(long)]
    safe_mode: bool,

    /// Do not fetch or honor robots.txt
    #[arg(long)]
    ignore_robots: bool,

    /// Blacklist pattern (repeatable)
    #[arg(long = "blacklist", value_name = "PATTERN")]
    blacklist: Vec<String>,

    /// Extra request header as NAME:VALUE (repeatable)
    #[arg(long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Abort once more than this many critical+serious occurrences are found
    #[arg(long)]
    must_fix: Option<u64>,

    /// Abort once more than this many moderate+minor occurrences are found
    #[arg(long)]
    good_to_fix: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.url {
            config.scan.url = url;
        }
        if let Some(scan_type) = self.scan_type {
            config.scan.scan_type = scan_type;
        }
        if let Some(max_pages) = self.max_pages {
            config.crawl.max_pages = max_pages;
        }
        if let Some(concurrency) = self.concurrency {
            config.crawl.max_concurrency = concurrency;
        }
        if let Some(device) = self.device {
            config.device.profile = device;
        }
        if let Some(width) = self.viewport_width {
            config.device.viewport_width = Some(width);
        }
        if self.safe_mode {
            config.crawl.safe_mode = true;
        }
        if self.ignore_robots {
            config.crawl.follow_robots = false;
        }
        config.filters.blacklist.extend(self.blacklist);
        config.headers.extend(self.headers);
        if self.must_fix.is_some() {
            config.thresholds.must_fix = self.must_fix;
        }
        if self.good_to_fix.is_some() {
            config.thresholds.good_to_fix = self.good_to_fix;
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME:VALUE, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_with_overrides(&cli.config, cli.overrides)?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config, cli.scan_id)?;
    } else if cli.export_summary {
        handle_export_summary(&config, cli.scan_id)?;
    } else {
        handle_scan(&config, &config_hash).await?;
    }

    Ok(())
}

/// Reads the file, applies command-line overrides, then validates
fn load_with_overrides(path: &Path, overrides: Overrides) -> Result<(Config, String)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config = parse_config(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let hash = compute_config_hash(path)?;

    overrides.apply(&mut config);
    validate(&config).context("Invalid configuration")?;

    Ok((config, hash))
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` wins over the command-line flags when set.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            // Only show errors
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("sumi_lens=info,warn"),
                1 => EnvFilter::new("sumi_lens=debug,info"),
                2 => EnvFilter::new("sumi_lens=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective settings
fn handle_dry_run(config: &Config) {
    let budget = config.crawl_budget();

    println!("=== Sumi-Lens Dry Run ===\n");

    println!("Scan:");
    println!("  Type: {}", config.scan.scan_type);
    println!("  Target: {}", config.scan.url);

    println!("\nBudget:");
    println!("  Max pages: {}", budget.max_pages);
    println!(
        "  Workers: {}{}",
        budget.effective_concurrency(),
        if budget.safe_mode { " (safe mode)" } else { "" }
    );
    println!("  Navigation timeout: {}ms", budget.navigation_timeout_ms);
    println!("  Retries: {}", budget.max_retries);
    println!("  Sitemap link cap: {}", budget.max_sitemap_links);
    println!(
        "  Device: {} ({}x{})",
        budget.device_profile.name,
        budget.device_profile.viewport_width,
        budget.device_profile.viewport_height
    );
    println!("  Scope: {:?}", budget.scope);
    println!("  Robots.txt: {}", if budget.follow_robots { "honored" } else { "ignored" });

    println!("\nThresholds:");
    println!("  mustFix: {}", limit_label(config.thresholds.must_fix));
    println!("  goodToFix: {}", limit_label(config.thresholds.good_to_fix));

    println!("\nFilters:");
    println!("  Blacklist patterns: {}", config.filters.blacklist.len());
    for pattern in &config.filters.blacklist {
        println!("    * {}", pattern);
    }
    println!(
        "  Excluded extensions: {}",
        config.filters.excluded_extensions.join(", ")
    );
    if !config.headers.is_empty() {
        println!("  Extra headers: {}", config.headers.len());
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());
    if config.evaluator.command.is_empty() {
        println!("Evaluator: none (pages will not be evaluated)");
    } else {
        println!("Evaluator: {}", config.evaluator.command.join(" "));
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Summary: {}", config.output.summary_path);
    println!("  Report: {}", config.output.report_path);

    println!("\n✓ Configuration is valid");
}

fn limit_label(limit: Option<u64>) -> String {
    limit
        .map(|l| l.to_string())
        .unwrap_or_else(|| "unlimited".to_string())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config, scan_id: Option<i64>) -> Result<()> {
    use sumi_lens::output::{load_statistics, print_statistics};
    use sumi_lens::storage::SqliteStorage;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open the scan database")?;
    let stats = load_statistics(&storage, scan_id)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: regenerates the markdown summary
fn handle_export_summary(config: &Config, scan_id: Option<i64>) -> Result<()> {
    use sumi_lens::output::{generate_markdown_summary, generate_summary};
    use sumi_lens::storage::SqliteStorage;

    println!("=== Exporting Scan Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open the scan database")?;

    tracing::info!("Loading scan data from database...");
    let summary = generate_summary(&storage, scan_id)?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))?;

    println!("✓ Summary exported to: {}", config.output.summary_path);

    Ok(())
}

/// Handles the main scan operation
///
/// An aborted scan is persisted first and then reported as an error so the
/// process exits non-zero.
async fn handle_scan(config: &Config, config_hash: &str) -> Result<()> {
    let report = run_scan(config, config_hash)
        .await
        .with_context(|| format!("Scan of {} failed", config.scan.url))?;

    if let Some(reason) = report.abort {
        tracing::error!("Scan aborted: {}", reason);
        return Err(ScanError::ThresholdExceeded(reason).into());
    }

    tracing::info!(
        "Scan completed: {} pages, {} issues",
        report.scanned_count(),
        report.issues.len()
    );
    Ok(())
}
