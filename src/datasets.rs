// 🏷️ Dataset Versions - skip upstream datasets that have not changed

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;
use crate::store::{Collection, EntityStore, WriteOp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetVersion {
    /// Dataset family, e.g. "GB-BODS"
    pub dataset: String,

    /// Upstream identifier within the family
    pub identifier: String,

    /// Upstream modification marker, compared verbatim
    pub last_modified: String,
}

impl DatasetVersion {
    fn storage_key(dataset: &str, identifier: &str) -> String {
        format!("{}:{}", dataset, identifier)
    }
}

pub struct DatasetVersionTracker<'s> {
    store: &'s dyn EntityStore,
}

impl<'s> DatasetVersionTracker<'s> {
    pub fn new(store: &'s dyn EntityStore) -> Self {
        DatasetVersionTracker { store }
    }

    pub fn get(&self, dataset: &str, identifier: &str) -> Result<Option<DatasetVersion>, StoreError> {
        let key = DatasetVersion::storage_key(dataset, identifier);
        match self.store.find_one(Collection::DatasetVersions, &key)? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// True when the dataset was never recorded or its marker differs.
    pub fn is_changed(
        &self,
        dataset: &str,
        identifier: &str,
        last_modified: &str,
    ) -> Result<bool, StoreError> {
        let changed = match self.get(dataset, identifier)? {
            Some(version) => version.last_modified != last_modified,
            None => true,
        };

        if !changed {
            info!(dataset, identifier, "dataset not changed");
        }
        Ok(changed)
    }

    /// Upsert the marker after a successful import.
    pub fn record(&self, dataset: &str, identifier: &str, last_modified: &str) -> Result<(), StoreError> {
        let key = DatasetVersion::storage_key(dataset, identifier);
        let version = DatasetVersion {
            dataset: dataset.to_string(),
            identifier: identifier.to_string(),
            last_modified: last_modified.to_string(),
        };
        let document = serde_json::to_value(&version)?;

        let op = if self.store.find_one(Collection::DatasetVersions, &key)?.is_some() {
            WriteOp::update(&key, document, Utc::now())
        } else {
            WriteOp::insert(&key, document, Utc::now())
        };
        self.store.bulk_write(Collection::DatasetVersions, &[op])?;
        Ok(())
    }
}
