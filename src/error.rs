// 🚨 Error Types - one enum per layer, aggregated at the top
// Resolution anomalies never reach here: they are logged and the entity is dropped.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias using the crate's top-level error.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for callers composing several pipeline stages.
#[derive(Debug, Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// Point lookup failed (backend unavailable, malformed row).
    #[error("lookup in {collection} failed: {source}")]
    Lookup {
        collection: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Batched write rejected; nothing from the batch was applied.
    #[error("batched write to {collection} failed: {source}")]
    Write {
        collection: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cursor over {collection} failed: {source}")]
    Cursor {
        collection: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("index creation on {collection} failed: {source}")]
    Index {
        collection: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to open store: {0}")]
    Open(#[source] rusqlite::Error),

    #[error("document encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row decoded but one of its fields did not parse.
    #[error("malformed {field} in {collection} row {row}: {reason}")]
    Malformed {
        collection: &'static str,
        field: &'static str,
        row: String,
        reason: String,
    },

    /// A visitor passed to a streaming cursor asked to stop.
    #[error("cursor visitor aborted: {0}")]
    Visitor(String),

    #[error("store connection lock poisoned")]
    Poisoned,
}

// ============================================================================
// SYNC
// ============================================================================

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("sync run cancelled")]
    Cancelled,

    #[error("sync run exceeded its deadline")]
    DeadlineExceeded,

    #[error("sync worker for shard {0} panicked")]
    WorkerPanicked(usize),

    /// Cancelled or out of time; writes committed before the stop are kept.
    #[error("{} stopped: {reason}", .committed)]
    Interrupted {
        committed: CommittedCounts,
        #[source]
        reason: Box<SyncError>,
    },

    /// A later entity type failed after earlier ones were committed.
    #[error("import failed after committing {}: {source}", describe(.committed))]
    ImportIncomplete {
        committed: Vec<CommittedCounts>,
        #[source]
        source: Box<SyncError>,
    },

    /// Some shards committed, others failed after exhausting their retries.
    #[error(
        "{entity_type} sync partially failed: {failed_shards} shard(s) failed, \
         {inserts} inserts and {updates} updates committed"
    )]
    PartialFailure {
        entity_type: &'static str,
        inserts: u64,
        updates: u64,
        failed_shards: usize,
    },
}

impl SyncError {
    /// Cancellation and deadline errors are caller decisions, not backend faults.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Store(_))
    }

    /// True when the run was cancelled or ran out of time.
    pub fn is_stop(&self) -> bool {
        match self {
            SyncError::Cancelled | SyncError::DeadlineExceeded => true,
            SyncError::Interrupted { .. } => true,
            SyncError::ImportIncomplete { source, .. } => source.is_stop(),
            _ => false,
        }
    }
}

/// Writes one entity type committed before a run stopped or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedCounts {
    pub entity_type: &'static str,
    pub inserts: u64,
    pub updates: u64,
}

impl std::fmt::Display for CommittedCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} sync ({} inserts, {} updates committed)",
            self.entity_type, self.inserts, self.updates
        )
    }
}

fn describe(committed: &[CommittedCounts]) -> String {
    committed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// ARCHIVAL
// ============================================================================

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Run cancelled or past its deadline while waiting to retry.
    #[error("archive run interrupted: {0}")]
    Interrupted(#[from] SyncError),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read {path} for upload: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("object storage rejected {key}: {reason}")]
    Backend { key: String, reason: String },
}

// ============================================================================
// SOURCES / CONFIG
// ============================================================================

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("missing source table {0}")]
    MissingTable(PathBuf),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("message encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
}
