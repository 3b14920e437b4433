// 🚏 Stop Entity - a boarding point from the national stop registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AlternateNames, CanonicalEntity, DataSource};
use crate::hashing::ContentHasher;
use crate::store::Collection;

/// GeoJSON-style point: coordinates are `[longitude, latitude]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl Location {
    pub fn point(longitude: f64, latitude: f64) -> Self {
        Location {
            kind: "Point".to_string(),
            coordinates: [longitude, latitude],
        }
    }
}

/// Link from a stop to another entity, e.g. the stop area it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopAssociation {
    #[serde(rename = "Type")]
    pub kind: String,
    pub associated_identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Stop {
    pub primary_identifier: String,

    #[serde(default)]
    pub other_identifiers: BTreeMap<String, String>,

    #[serde(default)]
    pub primary_name: String,

    #[serde(default)]
    pub other_names: Vec<String>,

    #[serde(default)]
    pub status: String,

    #[serde(rename = "Type", default)]
    pub stop_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    #[serde(default)]
    pub associations: Vec<StopAssociation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

impl CanonicalEntity for Stop {
    const COLLECTION: Collection = Collection::Stops;
    const ENTITY_TYPE: &'static str = "Stop";

    fn identifier(&self) -> &str {
        &self.primary_identifier
    }

    fn unique_hash(&self) -> String {
        let location = self
            .location
            .as_ref()
            .map(|l| format!("{}:{},{}", l.kind, l.coordinates[0], l.coordinates[1]));
        let associations: Vec<String> = self
            .associations
            .iter()
            .map(|a| format!("{}:{}", a.kind, a.associated_identifier))
            .collect();

        ContentHasher::new(Self::ENTITY_TYPE)
            .field("PrimaryIdentifier", &self.primary_identifier)
            .map("OtherIdentifiers", &self.other_identifiers)
            .field("PrimaryName", &self.primary_name)
            .set("OtherNames", &self.other_names)
            .field("Status", &self.status)
            .field("Type", &self.stop_type)
            .optional("Location", location.as_deref())
            .set("Associations", &associations)
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

impl AlternateNames for Stop {
    fn primary_name(&self) -> &str {
        &self.primary_name
    }

    fn other_names_mut(&mut self) -> &mut Vec<String> {
        &mut self.other_names
    }
}
