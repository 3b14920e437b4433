// 🔀 Change Detector - Create / Update / NoOp per canonical entity
//
// Identity = PrimaryIdentifier, Change = unique_hash().
// Create stamps both timestamps with `now`. Update keeps the persisted
// CreationDateTime. NoOp produces no write at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{CanonicalEntity, DataSource};
use crate::error::StoreError;
use crate::store::WriteOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeKind {
    Create,
    Update,
    NoOp,
}

/// Pure classification against the persisted value (if any).
pub fn classify<E: CanonicalEntity>(persisted: Option<&E>, candidate: &E) -> ChangeKind {
    match persisted {
        None => ChangeKind::Create,
        Some(existing) if existing.unique_hash() != candidate.unique_hash() => ChangeKind::Update,
        Some(_) => ChangeKind::NoOp,
    }
}

/// Decision plus the write it requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Create(WriteOp),
    Update(WriteOp),
    NoOp,
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Create(_) => ChangeKind::Create,
            Change::Update(_) => ChangeKind::Update,
            Change::NoOp => ChangeKind::NoOp,
        }
    }

    pub fn into_write(self) -> Option<WriteOp> {
        match self {
            Change::Create(op) | Change::Update(op) => Some(op),
            Change::NoOp => None,
        }
    }
}

/// Stamps bookkeeping for one run: every write in the run shares `now`
/// and the run's DataSource.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    datasource: DataSource,
    now: DateTime<Utc>,
}

impl ChangeDetector {
    pub fn new(datasource: DataSource, now: DateTime<Utc>) -> Self {
        ChangeDetector { datasource, now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn datasource(&self) -> &DataSource {
        &self.datasource
    }

    pub fn detect<E: CanonicalEntity>(
        &self,
        persisted: Option<&E>,
        candidate: &E,
    ) -> Result<Change, StoreError> {
        match classify(persisted, candidate) {
            ChangeKind::NoOp => Ok(Change::NoOp),
            ChangeKind::Create => {
                let mut entity = candidate.clone();
                entity.set_bookkeeping(self.now, self.now, &self.datasource);
                Ok(Change::Create(WriteOp::insert(
                    entity.identifier(),
                    serde_json::to_value(&entity)?,
                    self.now,
                )))
            }
            ChangeKind::Update => {
                // Records written before creation time existed fall back to now
                let created = persisted
                    .and_then(|existing| existing.creation_datetime())
                    .unwrap_or(self.now);

                let mut entity = candidate.clone();
                entity.set_bookkeeping(created, self.now, &self.datasource);
                Ok(Change::Update(WriteOp::update(
                    entity.identifier(),
                    serde_json::to_value(&entity)?,
                    self.now,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Operator;
    use chrono::TimeZone;

    fn datasource() -> DataSource {
        DataSource::new("traveline-noc", "Traveline", "NOC")
    }

    fn operator(name: &str) -> Operator {
        let mut op = Operator::new("GB:NOC:ABCD", name);
        op.other_names = vec!["A".to_string(), "B".to_string()];
        op
    }

    #[test]
    fn test_missing_record_is_create() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let detector = ChangeDetector::new(datasource(), now);

        let change = detector.detect(None, &operator("Bus Co")).unwrap();
        assert_eq!(change.kind(), ChangeKind::Create);

        let op = change.into_write().unwrap();
        let written: Operator = serde_json::from_value(op.document).unwrap();
        assert_eq!(written.creation_date_time, Some(now));
        assert_eq!(written.modification_date_time, Some(now));
        assert_eq!(written.data_source.unwrap().provider, "Traveline");
    }

    #[test]
    fn test_update_keeps_creation_time() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let mut persisted = operator("Bus Co");
        persisted.set_bookkeeping(t0, t0, &datasource());

        let detector = ChangeDetector::new(datasource(), t1);
        let change = detector.detect(Some(&persisted), &operator("Bus Company")).unwrap();
        assert_eq!(change.kind(), ChangeKind::Update);

        let written: Operator = serde_json::from_value(change.into_write().unwrap().document).unwrap();
        assert_eq!(written.creation_date_time, Some(t0));
        assert_eq!(written.modification_date_time, Some(t1));
        assert_eq!(written.primary_name, "Bus Company");
    }

    #[test]
    fn test_reordered_names_are_noop() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut persisted = operator("Bus Co");
        persisted.set_bookkeeping(t0, t0, &datasource());

        let mut candidate = operator("Bus Co");
        candidate.other_names.reverse();

        assert_eq!(classify(Some(&persisted), &candidate), ChangeKind::NoOp);
        assert_eq!(
            ChangeDetector::new(datasource(), Utc::now())
                .detect(Some(&persisted), &candidate)
                .unwrap(),
            Change::NoOp
        );
    }
}
