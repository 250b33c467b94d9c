//! Progress lines and the final summary of a cleanup run.

use crate::bytes::readable_bytes;
use std::fmt;

/// A line of progress emitted while a run is underway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Found {
        count: usize,
    },
    Deleting {
        key: String,
        path: String,
        storage_id: String,
        size: u64,
        dry_run: bool,
    },
    Recovered {
        bytes: u64,
        dry_run: bool,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Found { count } => write!(f, "Found {count} left over files."),
            ProgressEvent::Deleting {
                key,
                path,
                storage_id,
                size,
                dry_run,
            } => {
                let verb = if *dry_run {
                    "[dry-run] Would delete"
                } else {
                    "Deleting"
                };
                write!(
                    f,
                    " - {verb} {key} / {path} from storage {storage_id} with size {}...",
                    readable_bytes(*size)
                )
            }
            ProgressEvent::Recovered { bytes, dry_run } => {
                let verb = if *dry_run { "Would recover" } else { "Recovered" };
                write!(f, "{verb} {} from S3 storage.", readable_bytes(*bytes))
            }
        }
    }
}

/// Receives progress of a run.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Writes progress lines to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn report(&self, event: &ProgressEvent) {
        println!("{event}");
    }
}

/// Drops all progress, for callers that only want the [`ReconcileReport`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _event: &ProgressEvent) {}
}

/// What went wrong for a single entry when failures do not abort the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub file_id: i64,
    pub error: String,
}

/// Outcome of a cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Leftover chunks found.
    pub candidates: usize,
    /// Chunks whose object and catalog row were removed.
    pub deleted_entries: usize,
    /// Batch entries removed after their chunks.
    pub deleted_parents: usize,
    /// Sum of the sizes of the removed chunks.
    pub reclaimed_bytes: u64,
    /// Entries left in place because a delete failed.
    pub failures: Vec<EntryFailure>,
    pub dry_run: bool,
}

impl ReconcileReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// The closing line printed at the end of a run.
    pub fn summary(&self) -> String {
        ProgressEvent::Recovered {
            bytes: self.reclaimed_bytes,
            dry_run: self.dry_run,
        }
        .to_string()
    }
}
