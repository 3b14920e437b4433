// 📡 Real-time Journeys - live observations and their archived snapshots
//
// RealtimeJourney is mutated continuously by the matching subsystem.
// ArchivedJourney is an immutable snapshot taken once the journey has aged out.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CanonicalEntity, DataSource};
use crate::hashing::ContentHasher;
use crate::store::Collection;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RealtimeJourneyReliability {
    /// Times supplied directly by an external feed
    ExternalProvided,

    /// Derived from vehicle positions along a known track
    LocationWithTrack,

    /// Derived from vehicle positions without track geometry
    #[default]
    LocationWithoutTrack,
}

impl RealtimeJourneyReliability {
    pub fn as_str(&self) -> &'static str {
        match self {
            RealtimeJourneyReliability::ExternalProvided => "ExternalProvided",
            RealtimeJourneyReliability::LocationWithTrack => "LocationWithTrack",
            RealtimeJourneyReliability::LocationWithoutTrack => "LocationWithoutTrack",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RealtimeJourneyStopTimeType {
    #[default]
    Estimate,
    Actual,
}

/// Observed or estimated times at one stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RealtimeJourneyStop {
    pub stop_ref: String,
    pub arrival_time: DateTime<Utc>,
    pub departure_time: DateTime<Utc>,

    #[serde(default)]
    pub time_type: RealtimeJourneyStopTimeType,
}

// ============================================================================
// REALTIME JOURNEY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RealtimeJourney {
    pub primary_identifier: String,

    /// Scheduled Journey this observation was matched to
    #[serde(default)]
    pub journey_ref: String,

    /// Stop ref → observed times
    #[serde(default)]
    pub stops: BTreeMap<String, RealtimeJourneyStop>,

    #[serde(default)]
    pub reliability: RealtimeJourneyReliability,

    #[serde(default)]
    pub vehicle_ref: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

impl CanonicalEntity for RealtimeJourney {
    const COLLECTION: Collection = Collection::RealtimeJourneys;
    const ENTITY_TYPE: &'static str = "RealtimeJourney";

    fn identifier(&self) -> &str {
        &self.primary_identifier
    }

    fn unique_hash(&self) -> String {
        let stops: BTreeMap<String, String> = self
            .stops
            .iter()
            .map(|(stop_ref, stop)| {
                let value = format!(
                    "{}|{}|{:?}",
                    stop.arrival_time.to_rfc3339(),
                    stop.departure_time.to_rfc3339(),
                    stop.time_type
                );
                (stop_ref.clone(), value)
            })
            .collect();

        ContentHasher::new(Self::ENTITY_TYPE)
            .field("PrimaryIdentifier", &self.primary_identifier)
            .field("JourneyRef", &self.journey_ref)
            .map("Stops", &stops)
            .field("Reliability", self.reliability.as_str())
            .field("VehicleRef", &self.vehicle_ref)
            .finish()
    }

    fn creation_datetime(&self) -> Option<DateTime<Utc>> {
        self.creation_date_time
    }

    fn modification_datetime(&self) -> Option<DateTime<Utc>> {
        self.modification_date_time
    }

    fn set_bookkeeping(
        &mut self,
        creation: DateTime<Utc>,
        modification: DateTime<Utc>,
        datasource: &DataSource,
    ) {
        self.creation_date_time = Some(creation);
        self.modification_date_time = Some(modification);
        self.data_source = Some(datasource.clone());
    }
}

// ============================================================================
// ARCHIVED JOURNEY (immutable snapshot)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchivedJourneyStop {
    pub stop_ref: String,

    /// Always present when the scheduled journey could be resolved
    pub expected_arrival_time: Option<NaiveTime>,
    pub expected_departure_time: Option<NaiveTime>,

    pub has_actual_data: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_arrival_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_departure_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchivedJourney {
    pub primary_identifier: String,

    pub journey_ref: String,

    pub service_ref: String,
    pub service_name: String,

    pub operator_ref: String,

    pub creation_date_time: Option<DateTime<Utc>>,
    pub modification_date_time: Option<DateTime<Utc>>,

    pub data_source: Option<DataSource>,

    pub stops: Vec<ArchivedJourneyStop>,

    pub reliability: RealtimeJourneyReliability,

    pub vehicle_ref: String,
}
