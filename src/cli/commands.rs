//! Command implementation for the receipt processor CLI
//!
//! Sets up logging, assembles the configuration, picks the persistence
//! gateway and drives the file dispatcher, then reports the run summary.

use crate::app::adapters::memory::{EntityCounts, MemoryGateway};
use crate::app::adapters::postgres::PgGateway;
use crate::app::services::dispatcher::{DispatchStats, FileDispatcher};
use crate::cli::args::{Args, OutputFormat};
use crate::config::Config;
use crate::{Error, Result};
use colored::*;
use indicatif::HumanDuration;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Summary printed at the end of a run
#[derive(Debug, Clone, Serialize)]
struct RunReport<'a> {
    dry_run: bool,
    #[serde(flatten)]
    stats: &'a DispatchStats,
    success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<EntityCounts>,
}

/// Main command runner
///
/// 1. Set up logging and validate arguments
/// 2. Build the configuration and connect the gateway
/// 3. Dispatch every discovered file
/// 4. Report the summary
///
/// Per-file failures are part of the returned statistics; only run-level
/// failures are returned as errors.
pub async fn run(args: Args, cancellation_token: CancellationToken) -> Result<DispatchStats> {
    setup_logging(&args)?;

    info!("Starting receipt processor");
    debug!("Command line arguments: {:?}", redacted(&args));

    args.validate()?;
    let config = args.to_config();
    config.validate()?;
    debug!("Loaded configuration: {:?}", config);

    let (stats, store) = if config.dry_run {
        info!("Dry run: ingesting into an in-memory store");
        let gateway = Arc::new(MemoryGateway::new());
        let stats = dispatch(gateway.clone(), &config, cancellation_token.clone()).await?;
        (stats, Some(gateway.counts()))
    } else {
        let gateway = Arc::new(PgGateway::connect(&config.database).await?);
        let result = dispatch(gateway.clone(), &config, cancellation_token.clone()).await;
        gateway.close().await;
        (result?, None)
    };

    if cancellation_token.is_cancelled() {
        return Err(Error::processing_interrupted(format!(
            "cancelled after {} of {} files",
            stats.files_completed(),
            stats.files_discovered
        )));
    }

    generate_final_report(&args, &config, &stats, store)?;

    Ok(stats)
}

async fn dispatch(
    gateway: Arc<dyn crate::PersistenceGateway>,
    config: &Config,
    cancellation_token: CancellationToken,
) -> Result<DispatchStats> {
    let dispatcher = FileDispatcher::new(gateway, config, cancellation_token);
    dispatcher.run(&config.input_dir).await
}

/// Copy of the arguments safe to log
fn redacted(args: &Args) -> Args {
    let mut args = args.clone();
    if args.postgres_url.is_some() {
        args.postgres_url = Some("<redacted>".to_string());
    }
    args
}

/// Set up structured logging based on CLI arguments
fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("receipt_processor={}", log_level)));

    let result = if args.quiet {
        // Minimal logging for quiet mode
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    result.map_err(|e| Error::configuration(format!("Failed to initialize logging: {}", e)))?;

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Generate final processing report
fn generate_final_report(
    args: &Args,
    config: &Config,
    stats: &DispatchStats,
    store: Option<EntityCounts>,
) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => generate_human_report(config, stats, store),
        OutputFormat::Json => generate_json_report(config, stats, store),
    }
}

/// Generate human-readable report
fn generate_human_report(
    config: &Config,
    stats: &DispatchStats,
    store: Option<EntityCounts>,
) -> Result<()> {
    let duration = HumanDuration(Duration::from_millis(stats.processing_time_ms as u64));

    println!("\n{}", "Ingestion Summary".bright_green().bold());
    println!(
        "  {} {}",
        "Input directory:".bright_cyan(),
        config.input_dir.display().to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files discovered:".bright_cyan(),
        stats.files_discovered.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files ingested:".bright_cyan(),
        stats.files_succeeded.to_string().bright_white()
    );
    if stats.files_failed > 0 {
        println!(
            "  {} {}",
            "Files failed:".bright_red(),
            stats.files_failed.to_string().bright_red().bold()
        );
    }
    println!(
        "  {} {}",
        "Rows ingested:".bright_cyan(),
        stats.rows_ingested.to_string().bright_white().bold()
    );
    println!(
        "  {} {} ({:.0} rows/s)",
        "Time elapsed:".bright_cyan(),
        duration.to_string().bright_white(),
        stats.rows_per_second()
    );

    if !stats.failures_by_layer.is_empty() {
        println!("\n{}", "Failures by layer".bright_yellow());
        for (layer, count) in &stats.failures_by_layer {
            println!("  {} {}", format!("{}:", layer).bright_cyan(), count);
        }
    }

    if !stats.failures.is_empty() {
        println!("\n{}", "Failed files".bright_red().bold());
        for failure in &stats.failures {
            println!(
                "  {} {}",
                failure.path.display().to_string().bright_white(),
                failure.message
            );
        }
    }

    if let Some(counts) = store {
        println!("\n{}", "Dry run store contents".bright_yellow());
        println!("  {} {}", "Sellers:".bright_cyan(), counts.sellers);
        println!("  {} {}", "Venues:".bright_cyan(), counts.venues);
        println!("  {} {}", "Receipts:".bright_cyan(), counts.receipts);
        println!("  {} {}", "Items:".bright_cyan(), counts.items);
    }

    println!();
    Ok(())
}

/// Generate JSON report for machine consumption
fn generate_json_report(
    config: &Config,
    stats: &DispatchStats,
    store: Option<EntityCounts>,
) -> Result<()> {
    let report = RunReport {
        dry_run: config.dry_run,
        stats,
        success_rate: stats.success_rate(),
        store,
    };

    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| Error::configuration(format!("Failed to serialize report: {}", e)))?;
    println!("{}", json);
    Ok(())
}
