//! Bounded-concurrency file dispatch
//!
//! Discovery runs on a blocking task and feeds a bounded channel. The
//! dispatcher drains it, admitting at most `pool_size` files at a time through
//! a semaphore; each admitted file is decoded and decomposed row by row on its
//! own task. A failing file is reported and abandoned without disturbing its
//! siblings. The dispatcher returns only after every admitted file finished.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::app::gateway::PersistenceGateway;
use crate::app::models::EntityLayer;
use crate::app::services::decomposer::{DecomposerOptions, RowDecomposer};
use crate::app::services::discovery::discover_csv_files;
use crate::app::services::record_decoder::RecordDecoder;
use crate::config::Config;
use crate::constants::PROGRESS_TICK_MS;
use crate::{Error, Result};

/// Outcome of processing one file
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    /// Rows fully written before the file finished or failed
    pub rows_ingested: usize,
    pub error: Option<Error>,
}

/// Diagnostic record of a failed file
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    /// Data row that failed, when the failure is tied to a row
    pub row: Option<usize>,
    /// Relational layer that failed, for write errors
    pub layer: Option<EntityLayer>,
    pub message: String,
}

impl FileFailure {
    fn from_error(path: PathBuf, error: &Error) -> Self {
        let row = match error {
            Error::RowFailed { row, .. } | Error::Decode { row, .. } => Some(*row),
            _ => None,
        };
        Self {
            path,
            row,
            layer: error.layer(),
            message: error.to_string(),
        }
    }
}

/// Statistics for a dispatch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchStats {
    /// Files discovered and admitted to a worker
    pub files_discovered: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub rows_ingested: usize,
    /// Highest number of files in flight at once
    pub peak_concurrent_files: usize,
    pub failures_by_layer: BTreeMap<EntityLayer, usize>,
    pub failures: Vec<FileFailure>,
    pub processing_time_ms: u128,
}

impl DispatchStats {
    /// Files that finished, successfully or not
    pub fn files_completed(&self) -> usize {
        self.files_succeeded + self.files_failed
    }

    /// Calculate success rate percentage
    pub fn success_rate(&self) -> f64 {
        if self.files_completed() > 0 {
            (self.files_succeeded as f64 / self.files_completed() as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Calculate rows ingested per second
    pub fn rows_per_second(&self) -> f64 {
        let seconds = Duration::from_millis(self.processing_time_ms as u64).as_secs_f64();
        if seconds > 0.0 {
            self.rows_ingested as f64 / seconds
        } else {
            0.0
        }
    }

    fn record(&mut self, report: FileReport) {
        self.rows_ingested += report.rows_ingested;
        match report.error {
            None => {
                self.files_succeeded += 1;
                info!(
                    "Processed {} ({} rows)",
                    report.path.display(),
                    report.rows_ingested
                );
            }
            Some(e) => {
                self.files_failed += 1;
                error!("Error processing file {}: {}", report.path.display(), e);
                if let Some(layer) = e.layer() {
                    *self.failures_by_layer.entry(layer).or_default() += 1;
                }
                self.failures.push(FileFailure::from_error(report.path, &e));
            }
        }
    }

    fn record_panic(&mut self, join_error: JoinError) {
        self.files_failed += 1;
        error!("File worker aborted: {}", join_error);
        self.failures.push(FileFailure {
            path: PathBuf::from("<unknown>"),
            row: None,
            layer: None,
            message: join_error.to_string(),
        });
    }
}

/// Dispatches discovered files to a bounded pool of workers
pub struct FileDispatcher {
    gateway: Arc<dyn PersistenceGateway>,
    pool_size: usize,
    queue_capacity: usize,
    options: DecomposerOptions,
    show_progress: bool,
    cancellation_token: CancellationToken,
}

impl FileDispatcher {
    /// Create a dispatcher writing through `gateway`
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        config: &Config,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            pool_size: config.pool_size.max(1),
            queue_capacity: config.queue_capacity.max(1),
            options: DecomposerOptions {
                date_fallback: config.date_fallback,
                cache_lookups: config.cache_lookups,
            },
            show_progress: config.show_progress,
            cancellation_token,
        }
    }

    /// Discover and ingest every CSV file under `root`
    ///
    /// Per-file failures are recorded in the returned statistics. A traversal
    /// error is returned once the files already admitted have finished.
    pub async fn run(&self, root: &Path) -> Result<DispatchStats> {
        let start_time = Instant::now();
        info!(
            "Ingesting CSV files under {} with {} workers",
            root.display(),
            self.pool_size
        );

        let (sender, mut receiver) = mpsc::channel(self.queue_capacity);
        let discovery = {
            let root = root.to_path_buf();
            let token = self.cancellation_token.clone();
            tokio::task::spawn_blocking(move || discover_csv_files(&root, sender, token))
        };

        let progress_bar = self.show_progress.then(create_spinner);
        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut workers = JoinSet::new();
        let mut stats = DispatchStats::default();

        loop {
            let path = tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    info!("Cancellation requested, no further files will be admitted");
                    break;
                }
                next = receiver.recv() => match next {
                    Some(path) => path,
                    None => break,
                },
            };

            // Blocks while the pool is full
            let permit = tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    debug!("Cancelled before admitting {}", path.display());
                    break;
                }
                permit = semaphore.clone().acquire_owned() => permit.map_err(|e| {
                    Error::processing_interrupted(format!("admission gate closed: {}", e))
                })?,
            };
            stats.files_discovered += 1;

            while let Some(joined) = workers.try_join_next() {
                match joined {
                    Ok(report) => stats.record(report),
                    Err(e) => stats.record_panic(e),
                }
            }
            update_progress(progress_bar.as_ref(), &stats);

            debug!("Admitting {}", path.display());
            let mut decomposer = RowDecomposer::new(
                self.gateway.clone(),
                self.options,
                self.cancellation_token.clone(),
            );
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            workers.spawn(async move {
                let _permit = permit;
                let active = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(active, Ordering::SeqCst);

                let report = process_file(&path, &mut decomposer).await;

                in_flight.fetch_sub(1, Ordering::SeqCst);
                report
            });
        }

        // Stops a still-running walk at its next send
        drop(receiver);

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => stats.record(report),
                Err(e) => stats.record_panic(e),
            }
            update_progress(progress_bar.as_ref(), &stats);
        }

        stats.peak_concurrent_files = peak.load(Ordering::SeqCst);
        stats.processing_time_ms = start_time.elapsed().as_millis();

        if let Some(pb) = &progress_bar {
            pb.finish_with_message(format!(
                "Completed: {} files, {} rows",
                stats.files_completed(),
                stats.rows_ingested
            ));
        }

        let walked = discovery.await.map_err(|e| {
            Error::io("file discovery task failed", std::io::Error::other(e))
        })??;
        debug!("Discovery sent {} files", walked);

        info!(
            "Ingestion complete: {} files ({} failed), {} rows in {}ms",
            stats.files_completed(),
            stats.files_failed,
            stats.rows_ingested,
            stats.processing_time_ms
        );

        Ok(stats)
    }
}

/// Decode one file and decompose its rows in file order
///
/// The first failing row ends the file; rows written before it stay written.
pub async fn process_file(path: &Path, decomposer: &mut RowDecomposer) -> FileReport {
    let mut rows_ingested = 0;
    let error = ingest_rows(path, decomposer, &mut rows_ingested).await.err();
    FileReport {
        path: path.to_path_buf(),
        rows_ingested,
        error,
    }
}

async fn ingest_rows(
    path: &Path,
    decomposer: &mut RowDecomposer,
    rows_ingested: &mut usize,
) -> Result<()> {
    let file = path.display().to_string();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::io(format!("Failed to open file {}", file), e))?;

    let mut decoder = RecordDecoder::from_reader(file.clone(), bytes.as_slice())?;
    while let Some(row) = decoder.next() {
        let row = row?;
        decomposer
            .decompose(&row)
            .await
            .map_err(|e| Error::row_failed(&file, decoder.rows_read(), e))?;
        *rows_ingested += 1;
    }

    Ok(())
}

fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
    pb.set_message("Discovering files...");
    pb
}

fn update_progress(progress_bar: Option<&ProgressBar>, stats: &DispatchStats) {
    if let Some(pb) = progress_bar {
        pb.set_message(format!(
            "{} of {} files done, {} rows ingested",
            stats.files_completed(),
            stats.files_discovered,
            stats.rows_ingested
        ));
    }
}
