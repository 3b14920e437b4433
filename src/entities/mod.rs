// Canonical Entity Model
//
// Every entity has:
// - A stable PrimaryIdentifier that never changes between runs
// - Semantic values, fingerprinted by `unique_hash()`
// - Bookkeeping (CreationDateTime, ModificationDateTime, DataSource) that is
//   excluded from the fingerprint

pub mod datasource;
pub mod journey;
pub mod operator;
pub mod operator_group;
pub mod realtime;
pub mod stop;

pub use datasource::DataSource;
pub use journey::{FlattenedStop, Journey, JourneyPathItem, Service};
pub use operator::Operator;
pub use operator_group::OperatorGroup;
pub use realtime::{
    ArchivedJourney, ArchivedJourneyStop, RealtimeJourney, RealtimeJourneyReliability,
    RealtimeJourneyStop, RealtimeJourneyStopTimeType,
};
pub use stop::{Location, Stop, StopAssociation};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::Collection;

/// Identifier formats shared with downstream consumers.
pub const OPERATOR_ID_PREFIX: &str = "GB:NOC:";
pub const OPERATOR_GROUP_ID_PREFIX: &str = "GB:NOCGRPID:";
pub const STOP_ID_PREFIX: &str = "UK";

/// A value the sync engine can persist, fingerprint and timestamp.
pub trait CanonicalEntity: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Collection the entity lives in.
    const COLLECTION: Collection;

    /// Human-readable type name, used in logs and notifications.
    const ENTITY_TYPE: &'static str;

    /// PrimaryIdentifier (or Identifier for groups). Empty means invalid.
    fn identifier(&self) -> &str;

    /// Deterministic digest over semantic fields only.
    fn unique_hash(&self) -> String;

    fn creation_datetime(&self) -> Option<DateTime<Utc>>;

    fn modification_datetime(&self) -> Option<DateTime<Utc>>;

    /// Stamp bookkeeping fields before a write.
    fn set_bookkeeping(
        &mut self,
        creation: DateTime<Utc>,
        modification: DateTime<Utc>,
        datasource: &DataSource,
    );
}

/// Entities that carry a display name plus alternates.
pub trait AlternateNames {
    fn primary_name(&self) -> &str;
    fn other_names_mut(&mut self) -> &mut Vec<String>;
}
