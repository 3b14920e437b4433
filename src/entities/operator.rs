// 🚌 Operator Entity - a transport operator resolved from several source tables
//
// "PrimaryIdentifier is IDENTITY (never changes), names and contacts are VALUES"

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AlternateNames, CanonicalEntity, DataSource};
use crate::hashing::ContentHasher;
use crate::store::Collection;

// ============================================================================
// OPERATOR ENTITY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Operator {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    pub primary_identifier: String,

    /// Source-specific identifiers, e.g. {"NOC": "ABCD"}
    #[serde(default)]
    pub other_identifiers: BTreeMap<String, String>,

    // ========================================================================
    // VALUES
    // ========================================================================
    #[serde(default)]
    pub primary_name: String,

    /// Alternate names; never contains `primary_name` once filtered
    #[serde(default)]
    pub other_names: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_group_ref: Option<String>,

    #[serde(default)]
    pub transport_type: Vec<String>,

    #[serde(default)]
    pub licence: String,

    #[serde(default)]
    pub website: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub phone_number: String,

    #[serde(default)]
    pub social_media: BTreeMap<String, String>,

    // ========================================================================
    // BOOKKEEPING (excluded from hash)
    // ========================================================================
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

impl Operator {
    pub fn new(primary_identifier: &str, primary_name: &str) -> Self {
        Operator {
            primary_identifier: primary_identifier.to_string(),
            primary_name: primary_name.to_string(),
            ..Default::default()
        }
    }

    /// Add an alternate name (duplicates are resolved by the post-resolution filter)
    pub fn add_other_name(&mut self, name: &str) {
        self.other_names.push(name.to_string());
    }
}

impl CanonicalEntity for Operator {
    const COLLECTION: Collection = Collection::Operators;
    const ENTITY_TYPE: &'static str = "Operator";

    fn identifier(&self) -> &str {
        &self.primary_identifier
    }

    fn unique_hash(&self) -> String {
        ContentHasher::new(Self::ENTITY_TYPE)
            .field("PrimaryIdentifier", &self.primary_identifier)
            .map("OtherIdentifiers", &self.other_identifiers)
            .field("PrimaryName", &self.primary_name)
            .set("OtherNames", &self.other_names)
            .optional("OperatorGroupRef", self.operator_group_ref.as_deref())
            .set("TransportType", &self.transport_type)
            .field("Licence", &self.licence)
            .field("Website", &self.website)
            .field("Email", &self.email)
            .field("Address", &self.address)
            .field("PhoneNumber", &self.phone_number)
            .map("SocialMedia", &self.social_media)
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

impl AlternateNames for Operator {
    fn primary_name(&self) -> &str {
        &self.primary_name
    }

    fn other_names_mut(&mut self) -> &mut Vec<String> {
        &mut self.other_names
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_operator() -> Operator {
        let mut operator = Operator::new("GB:NOC:ABCD", "Example Buses");
        operator.other_identifiers.insert("NOC".to_string(), "ABCD".to_string());
        operator.transport_type = vec!["Bus".to_string()];
        operator.licence = "PB0001234".to_string();
        operator
    }

    #[test]
    fn test_hash_ignores_other_names_order() {
        let mut a = sample_operator();
        a.other_names = vec!["A".to_string(), "B".to_string()];

        let mut b = sample_operator();
        b.other_names = vec!["B".to_string(), "A".to_string()];

        assert_eq!(a.unique_hash(), b.unique_hash());
    }

    #[test]
    fn test_hash_ignores_bookkeeping() {
        let a = sample_operator();
        let mut b = sample_operator();

        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        b.set_bookkeeping(t0, t0, &DataSource::new("traveline-noc", "Traveline", "x"));

        assert_eq!(a.unique_hash(), b.unique_hash());
    }

    #[test]
    fn test_hash_detects_semantic_change() {
        let a = sample_operator();
        let mut b = sample_operator();
        b.email = "ops@example.co.uk".to_string();

        assert_ne!(a.unique_hash(), b.unique_hash());
    }

    #[test]
    fn test_serialized_field_names() {
        let operator = sample_operator();
        let json = serde_json::to_value(&operator).unwrap();

        assert_eq!(json["PrimaryIdentifier"], "GB:NOC:ABCD");
        assert_eq!(json["OtherIdentifiers"]["NOC"], "ABCD");
        assert!(json.get("CreationDateTime").is_none());
    }
}
