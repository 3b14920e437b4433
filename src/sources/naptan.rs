// 🚏 NaPTAN - national stop registry rows converted into canonical Stops

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::read_table;
use crate::entities::{DataSource, Location, Stop, StopAssociation, STOP_ID_PREFIX};
use crate::error::SourceError;
use crate::filter;

pub const ORIGINAL_FORMAT: &str = "naptan";
pub const PROVIDER: &str = "Department for Transport";

/// Association type linking a stop to its stop area
pub const STOP_GROUP_ASSOCIATION: &str = "stop_group";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopPointRecord {
    #[serde(rename = "ATCOCode")]
    pub atco_code: String,
    #[serde(rename = "NaptanCode", default)]
    pub naptan_code: String,
    #[serde(rename = "CommonName", default)]
    pub common_name: String,
    #[serde(rename = "ShortCommonName", default)]
    pub short_common_name: String,
    #[serde(rename = "Landmark", default)]
    pub landmark: String,
    #[serde(rename = "Street", default)]
    pub street: String,
    #[serde(rename = "Indicator", default)]
    pub indicator: String,
    #[serde(rename = "Longitude", default)]
    pub longitude: Option<f64>,
    #[serde(rename = "Latitude", default)]
    pub latitude: Option<f64>,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "StopType", default)]
    pub stop_type: String,

    /// Stop area codes, separated by `;` or whitespace
    #[serde(rename = "StopAreaCodes", default, deserialize_with = "split_codes")]
    pub stop_area_codes: Vec<String>,
}

fn split_codes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .split(|c: char| c == ';' || c.is_whitespace())
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect())
}

impl StopPointRecord {
    pub fn to_stop(&self) -> Stop {
        let mut other_identifiers = BTreeMap::new();
        other_identifiers.insert("AtcoCode".to_string(), self.atco_code.clone());
        if !self.naptan_code.is_empty() {
            other_identifiers.insert("NaptanCode".to_string(), self.naptan_code.clone());
        }

        let location = match (self.longitude, self.latitude) {
            (Some(longitude), Some(latitude)) => Some(Location::point(longitude, latitude)),
            _ => None,
        };

        let associations = self
            .stop_area_codes
            .iter()
            .map(|code| StopAssociation {
                kind: STOP_GROUP_ASSOCIATION.to_string(),
                associated_identifier: format!("{}{}", STOP_ID_PREFIX, code),
            })
            .collect();

        let primary_identifier = if self.atco_code.is_empty() {
            String::new()
        } else {
            format!("{}{}", STOP_ID_PREFIX, self.atco_code)
        };

        Stop {
            primary_identifier,
            other_identifiers,
            primary_name: self.common_name.clone(),
            other_names: vec![
                self.short_common_name.clone(),
                self.landmark.clone(),
                self.street.clone(),
            ],
            status: self.status.clone(),
            stop_type: self.stop_type.clone(),
            location,
            associations,
            ..Default::default()
        }
    }
}

/// Load a stops CSV and convert it into filtered canonical Stops.
pub fn load_stop_points(path: &Path) -> Result<Vec<Stop>, SourceError> {
    let records: Vec<StopPointRecord> = read_table(path)?;
    let stops = filter::finalize(records.iter().map(StopPointRecord::to_stop).collect());

    info!(
        path = %path.display(),
        records = records.len(),
        stops = stops.len(),
        "loaded stop points"
    );
    Ok(stops)
}

pub fn datasource(dataset: &str) -> DataSource {
    DataSource::new(ORIGINAL_FORMAT, PROVIDER, dataset)
}
