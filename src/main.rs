//! Visago - visual AI aggregator.
//!
//! Exit codes:
//!   0 - Success, including runs where every plugin reported an error
//!   1 - Fatal error (bad arguments, config, input or output failure)

use anyhow::{Context, Result};
use chrono::Utc;
use clap::CommandFactory;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;
use visago::cli::{Args, OutputFormat};
use visago::config::{Config, LOCAL_CONFIG};
use visago::report::{self, ReportMetadata};
use visago::{default_registry, input, AggregateReport, RequestDescriptor, Runner};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if args.init_config {
        return handle_init_config();
    }

    let (mut config, config_path) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    debug!("Arguments: {:?}", args);
    match config_path {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    if let Err(e) = run(args, config).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .visago.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(LOCAL_CONFIG);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", LOCAL_CONFIG);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", LOCAL_CONFIG))?;

    println!("Created {} with default settings.", LOCAL_CONFIG);
    Ok(())
}

/// Initialize logging on stderr, keeping stdout for the report.
fn init_logging(args: &Args, config: &Config) {
    let level = if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from the explicit path, the default locations, or defaults.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    if let Some(ref path) = args.config {
        return Ok((Config::load(path)?, Some(path.clone())));
    }

    for path in Config::default_paths() {
        if path.exists() {
            return Ok((Config::load(&path)?, Some(path)));
        }
    }

    Ok((Config::default(), None))
}

async fn run(args: Args, config: Config) -> Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("visago/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let mut registry = default_registry(client);
    registry.set_whitelist(&config.plugins.whitelist);
    registry.set_blacklist(&config.plugins.blacklist);

    if args.list_plugins {
        print!("{}", registry.display());
        return Ok(());
    }

    let mut raw_items = args.items.clone();
    raw_items.extend(input::read_piped_items().await?);
    if raw_items.is_empty() {
        Args::command().print_help()?;
        return Ok(());
    }

    let request = input::build_request(
        &raw_items,
        config.request.features(),
        config.request.tag_score,
    )?;

    let start_time = Instant::now();
    let plugins = registry.active_names();
    let items = request.items().len();
    let report = run_plugins(&registry, request, config.plugins.timeout(), args.quiet).await?;

    info!(
        "Finished in {:.1}s: {} merged asset(s), {} error(s)",
        start_time.elapsed().as_secs_f64(),
        report.all.assets.len(),
        report.error_count()
    );

    let metadata = ReportMetadata {
        generated_at: Utc::now(),
        items,
        plugins,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };
    let output = render(&report, &metadata, config.general.format)?;

    match args.output {
        Some(ref path) => {
            report::write_report(&output, path)?;
            info!("Report saved to {}", path.display());
        }
        None => print!("{}", output),
    }

    Ok(())
}

/// Run the plugins behind a progress bar that advances as each one reports.
async fn run_plugins(
    registry: &visago::PluginRegistry,
    request: RequestDescriptor,
    timeout: Option<Duration>,
    quiet: bool,
) -> Result<AggregateReport> {
    let total = registry.active_names().len() as u64;
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let report = Runner::new(registry)
        .with_timeout(timeout)
        .run_with_progress(request, |outcome| {
            let status = if outcome.is_success() { "done" } else { "failed" };
            pb.set_message(format!("{} {}", outcome.name, status));
            pb.inc(1);
        })
        .await?;

    pb.finish_and_clear();
    Ok(report)
}

fn render(report: &AggregateReport, metadata: &ReportMetadata, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => report::generate_text_report(report),
        OutputFormat::Json => {
            let mut json = report::generate_json_report(report)?;
            json.push('\n');
            json
        }
        OutputFormat::Markdown => report::generate_markdown_report(report, metadata),
    })
}
