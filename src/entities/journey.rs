// 🗓️ Timetable Read Model - Services and scheduled Journeys
//
// Written by the timetable importer, read by the archiver to recover the
// expected per-stop times of a real-time journey.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CanonicalEntity, DataSource};
use crate::hashing::ContentHasher;
use crate::store::Collection;

// ============================================================================
// SERVICE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Service {
    pub primary_identifier: String,

    #[serde(default)]
    pub service_name: String,

    #[serde(default)]
    pub operator_ref: String,

    #[serde(default)]
    pub transport_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

impl CanonicalEntity for Service {
    const COLLECTION: Collection = Collection::Services;
    const ENTITY_TYPE: &'static str = "Service";

    fn identifier(&self) -> &str {
        &self.primary_identifier
    }

    fn unique_hash(&self) -> String {
        ContentHasher::new(Self::ENTITY_TYPE)
            .field("PrimaryIdentifier", &self.primary_identifier)
            .field("ServiceName", &self.service_name)
            .field("OperatorRef", &self.operator_ref)
            .field("TransportType", &self.transport_type)
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
// JOURNEY
// ============================================================================

/// One link of a journey's path, from one stop to the next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JourneyPathItem {
    pub origin_stop_ref: String,
    pub destination_stop_ref: String,

    pub origin_arrival_time: NaiveTime,
    pub origin_departure_time: NaiveTime,

    pub destination_arrival_time: NaiveTime,
    pub destination_departure_time: NaiveTime,
}

/// A stop visit in timetable order with its expected times
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedStop {
    pub stop_ref: String,
    pub arrival_time: NaiveTime,
    pub departure_time: NaiveTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Journey {
    pub primary_identifier: String,

    #[serde(default)]
    pub service_ref: String,

    #[serde(default)]
    pub operator_ref: String,

    #[serde(default)]
    pub direction: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<NaiveTime>,

    #[serde(default)]
    pub path: Vec<JourneyPathItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

impl Journey {
    /// Stop visits in travel order.
    ///
    /// The first path item contributes its origin, every item contributes its
    /// destination. A stop visited twice (loop services) appears twice.
    pub fn flatten_stops(&self) -> Vec<FlattenedStop> {
        let mut stops = Vec::with_capacity(self.path.len() + 1);

        if let Some(first) = self.path.first() {
            stops.push(FlattenedStop {
                stop_ref: first.origin_stop_ref.clone(),
                arrival_time: first.origin_arrival_time,
                departure_time: first.origin_departure_time,
            });
        }

        for item in &self.path {
            stops.push(FlattenedStop {
                stop_ref: item.destination_stop_ref.clone(),
                arrival_time: item.destination_arrival_time,
                departure_time: item.destination_departure_time,
            });
        }

        stops
    }
}

impl CanonicalEntity for Journey {
    const COLLECTION: Collection = Collection::Journeys;
    const ENTITY_TYPE: &'static str = "Journey";

    fn identifier(&self) -> &str {
        &self.primary_identifier
    }

    fn unique_hash(&self) -> String {
        let path: Vec<String> = self
            .path
            .iter()
            .map(|p| {
                format!(
                    "{}@{}/{}>{}@{}/{}",
                    p.origin_stop_ref,
                    p.origin_arrival_time,
                    p.origin_departure_time,
                    p.destination_stop_ref,
                    p.destination_arrival_time,
                    p.destination_departure_time
                )
            })
            .collect();
        let departure = self.departure_time.map(|t| t.to_string());

        ContentHasher::new(Self::ENTITY_TYPE)
            .field("PrimaryIdentifier", &self.primary_identifier)
            .field("ServiceRef", &self.service_ref)
            .field("OperatorRef", &self.operator_ref)
            .field("Direction", &self.direction)
            .optional("DepartureTime", departure.as_deref())
            .sequence("Path", &path)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn link(from: &str, to: &str, dep: NaiveTime, arr: NaiveTime) -> JourneyPathItem {
        JourneyPathItem {
            origin_stop_ref: from.to_string(),
            destination_stop_ref: to.to_string(),
            origin_arrival_time: dep,
            origin_departure_time: dep,
            destination_arrival_time: arr,
            destination_departure_time: arr,
        }
    }

    #[test]
    fn test_flatten_stops_orders_visits() {
        let journey = Journey {
            primary_identifier: "J1".to_string(),
            path: vec![
                link("A", "B", t(9, 0), t(9, 5)),
                link("B", "C", t(9, 5), t(9, 12)),
            ],
            ..Default::default()
        };

        let stops = journey.flatten_stops();
        let refs: Vec<&str> = stops.iter().map(|s| s.stop_ref.as_str()).collect();

        assert_eq!(refs, vec!["A", "B", "C"]);
        assert_eq!(stops[0].departure_time, t(9, 0));
        assert_eq!(stops[2].arrival_time, t(9, 12));
    }

    #[test]
    fn test_flatten_empty_path() {
        assert!(Journey::default().flatten_stops().is_empty());
    }

    #[test]
    fn test_path_order_matters_for_hash() {
        let a = Journey {
            primary_identifier: "J1".to_string(),
            path: vec![link("A", "B", t(9, 0), t(9, 5)), link("B", "C", t(9, 5), t(9, 9))],
            ..Default::default()
        };
        let mut b = a.clone();
        b.path.reverse();

        assert_ne!(a.unique_hash(), b.unique_hash());
    }
}
