use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CanonicalEntity, DataSource, OPERATOR_GROUP_ID_PREFIX};
use crate::hashing::ContentHasher;
use crate::store::Collection;

/// Operator group (a parent company owning several operators)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperatorGroup {
    pub identifier: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

impl OperatorGroup {
    /// Create from a source group id, e.g. "42" → "GB:NOCGRPID:42"
    pub fn from_group_id(group_id: &str, name: &str) -> Self {
        OperatorGroup {
            identifier: format!("{}{}", OPERATOR_GROUP_ID_PREFIX, group_id),
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl CanonicalEntity for OperatorGroup {
    const COLLECTION: Collection = Collection::OperatorGroups;
    const ENTITY_TYPE: &'static str = "OperatorGroup";

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn unique_hash(&self) -> String {
        ContentHasher::new(Self::ENTITY_TYPE)
            .field("Identifier", &self.identifier)
            .field("Name", &self.name)
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

    #[test]
    fn test_from_group_id() {
        let group = OperatorGroup::from_group_id("42", "Example Group");

        assert_eq!(group.identifier, "GB:NOCGRPID:42");
        assert_eq!(group.name, "Example Group");
    }

    #[test]
    fn test_hash_covers_name() {
        let a = OperatorGroup::from_group_id("42", "Example Group");
        let b = OperatorGroup::from_group_id("42", "Renamed Group");

        assert_ne!(a.unique_hash(), b.unique_hash());
    }
}
