//! Input file discovery
//!
//! Walks the input directory recursively and streams every `.csv` file
//! (extension matched case-insensitively) to the dispatcher as soon as it is
//! found. Files are yielded in the order the filesystem lists them; nothing
//! downstream may rely on a particular order.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

use crate::constants::CSV_EXTENSION;
use crate::{Error, Result};

/// Check if a path names a CSV file, ignoring extension case
pub fn is_csv_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.to_lowercase().ends_with(CSV_EXTENSION))
}

/// Walk `root` and send every candidate file to `sender`
///
/// Blocking; run it on a blocking task. Stops at the first traversal error,
/// when the receiver is dropped, or when the run is cancelled. Returns the
/// number of files sent.
pub fn discover_csv_files(
    root: &Path,
    sender: mpsc::Sender<PathBuf>,
    cancellation_token: CancellationToken,
) -> Result<usize> {
    debug!("Searching for CSV files in: {}", root.display());

    let mut sent = 0;
    for entry in WalkDir::new(root) {
        if cancellation_token.is_cancelled() {
            debug!("Discovery cancelled after {} files", sent);
            break;
        }

        let entry = entry.map_err(|e| {
            Error::directory_traversal(format!("Failed to walk {}", root.display()), e)
        })?;

        if !entry.file_type().is_file() || !is_csv_file(entry.path()) {
            continue;
        }

        if sender.blocking_send(entry.into_path()).is_err() {
            debug!("Dispatcher stopped accepting files");
            break;
        }
        sent += 1;
    }

    debug!("Discovered {} CSV files", sent);
    Ok(sent)
}
