//! Document store boundary.
//!
//! The sync engine and the archiver only need point lookups, one batched
//! write per shard, a cursor over aged documents and per-collection counts.
//! Documents cross the boundary as JSON values so the trait stays object safe
//! and backends can be swapped in tests.

pub mod sqlite;

pub use sqlite::{Event, SqliteStore};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::entities::CanonicalEntity;
use crate::error::StoreError;

// ============================================================================
// COLLECTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Operators,
    OperatorGroups,
    Stops,
    Services,
    Journeys,
    RealtimeJourneys,
    DatasetVersions,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Operators,
        Collection::OperatorGroups,
        Collection::Stops,
        Collection::Services,
        Collection::Journeys,
        Collection::RealtimeJourneys,
        Collection::DatasetVersions,
    ];

    /// Backend table / collection name
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Operators => "operators",
            Collection::OperatorGroups => "operator_groups",
            Collection::Stops => "stops",
            Collection::Services => "services",
            Collection::Journeys => "journeys",
            Collection::RealtimeJourneys => "realtime_journeys",
            Collection::DatasetVersions => "dataset_versions",
        }
    }

    /// Document field holding the identifier
    pub fn identifier_field(&self) -> &'static str {
        match self {
            Collection::OperatorGroups | Collection::DatasetVersions => "Identifier",
            _ => "PrimaryIdentifier",
        }
    }
}

// ============================================================================
// WRITE OPERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    /// Replace the stored document for an existing identifier
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub kind: WriteKind,
    pub identifier: String,
    pub document: Value,
    pub modified_at: DateTime<Utc>,
}

impl WriteOp {
    pub fn insert(identifier: &str, document: Value, modified_at: DateTime<Utc>) -> Self {
        WriteOp {
            kind: WriteKind::Insert,
            identifier: identifier.to_string(),
            document,
            modified_at,
        }
    }

    pub fn update(identifier: &str, document: Value, modified_at: DateTime<Utc>) -> Self {
        WriteOp {
            kind: WriteKind::Update,
            identifier: identifier.to_string(),
            document,
            modified_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteSummary {
    pub inserted: u64,
    pub modified: u64,
}

/// Visitor invoked once per document by a streaming cursor.
pub type DocumentVisitor<'a> = dyn FnMut(Value) -> Result<(), StoreError> + 'a;

// ============================================================================
// STORE TRAIT
// ============================================================================

pub trait EntityStore: Send + Sync {
    /// Create the identifier index for a collection. Idempotent.
    fn ensure_index(&self, collection: Collection) -> Result<(), StoreError>;

    /// Zero-or-one document by identifier.
    fn find_one(&self, collection: Collection, identifier: &str)
        -> Result<Option<Value>, StoreError>;

    /// Apply a mixed list of inserts and updates as one backend call.
    /// Either every operation is applied or none is.
    fn bulk_write(&self, collection: Collection, ops: &[WriteOp])
        -> Result<BulkWriteSummary, StoreError>;

    /// Stream documents whose modification time is strictly before `cutoff`.
    /// The visitor may call back into the store. Returns the number visited.
    fn for_each_modified_before(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
        visitor: &mut DocumentVisitor<'_>,
    ) -> Result<usize, StoreError>;

    fn count(&self, collection: Collection) -> Result<u64, StoreError>;

    /// Documents modified strictly after `since`.
    fn count_modified_after(
        &self,
        collection: Collection,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

// ============================================================================
// TYPED HELPERS
// ============================================================================

/// Point lookup decoded into a canonical entity.
pub fn find_entity<E: CanonicalEntity>(
    store: &dyn EntityStore,
    identifier: &str,
) -> Result<Option<E>, StoreError> {
    match store.find_one(E::COLLECTION, identifier)? {
        Some(document) => Ok(Some(serde_json::from_value(document)?)),
        None => Ok(None),
    }
}

/// Write entities that already carry their bookkeeping timestamps.
///
/// Used to seed collections owned by other subsystems (timetables, real-time
/// matching). Entities without a modification time are stamped with `now`.
pub fn insert_entities<E: CanonicalEntity>(
    store: &dyn EntityStore,
    entities: &[E],
    now: DateTime<Utc>,
) -> Result<BulkWriteSummary, StoreError> {
    let ops = entities
        .iter()
        .map(|entity| {
            let modified_at = entity.modification_datetime().unwrap_or(now);
            Ok(WriteOp::insert(
                entity.identifier(),
                serde_json::to_value(entity)?,
                modified_at,
            ))
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    store.bulk_write(E::COLLECTION, &ops)
}
