// Transit Sync - Core Library
// Canonical transit entities, incremental sync and journey archival

pub mod archive;
pub mod change;
pub mod config;
pub mod contact;
pub mod context;
pub mod datasets;
pub mod entities;
pub mod error;
pub mod filter;
pub mod hashing;
pub mod import;
pub mod notify;
pub mod object_store;
pub mod queue;
pub mod resolver;
pub mod retry;
pub mod sources;
pub mod stats;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use archive::{ArchiveOptions, ArchiveReport, Archiver, BundleWriter};
pub use change::{Change, ChangeDetector, ChangeKind};
pub use config::Config;
pub use contact::{ContactClassifier, ContactField};
pub use context::RunContext;
pub use entities::{
    ArchivedJourney, CanonicalEntity, DataSource, Journey, Operator, OperatorGroup,
    RealtimeJourney, Service, Stop,
};
pub use error::{
    ArchiveError, CommittedCounts, ConfigError, Error, NotifyError, QueueError, Result,
    SourceError, StoreError, SyncError, UploadError,
};
pub use hashing::ContentHasher;
pub use import::{ImportPipeline, NocImportSummary};
pub use notify::{EventLogNotifier, LogNotifier, Notifier};
pub use object_store::{LocalDirObjectStore, ObjectStore};
pub use queue::{ChannelQueue, MessageQueue, RealtimeForwarder, VehicleActivity};
pub use retry::RetryPolicy;
pub use stats::{collect_stats, StoreStats};
pub use store::{Collection, EntityStore, SqliteStore};
pub use sync::{SyncExecutor, SyncReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
