// 📊 Store Statistics - collection sizes and live vs historical journeys

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::store::{Collection, EntityStore};

/// Default activity window for real-time journeys
pub const DEFAULT_ACTIVE_WINDOW_MINUTES: i64 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub stops: u64,
    pub operators: u64,
    pub operator_groups: u64,
    pub services: u64,
    pub active_realtime_journeys: u64,
    pub historical_realtime_journeys: u64,
}

/// Journeys modified within `active_window` of `now` count as active.
pub fn collect_stats(
    store: &dyn EntityStore,
    now: DateTime<Utc>,
    active_window: Duration,
) -> Result<StoreStats, StoreError> {
    let realtime = store.count(Collection::RealtimeJourneys)?;
    let active = store.count_modified_after(Collection::RealtimeJourneys, now - active_window)?;

    Ok(StoreStats {
        stops: store.count(Collection::Stops)?,
        operators: store.count(Collection::Operators)?,
        operator_groups: store.count(Collection::OperatorGroups)?,
        services: store.count(Collection::Services)?,
        active_realtime_journeys: active,
        historical_realtime_journeys: realtime.saturating_sub(active),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteStore, WriteOp};
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_active_and_historical_split() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        store
            .bulk_write(
                Collection::RealtimeJourneys,
                &[
                    WriteOp::insert("R1", json!({}), now - Duration::minutes(5)),
                    WriteOp::insert("R2", json!({}), now - Duration::minutes(30)),
                    WriteOp::insert("R3", json!({}), now - Duration::days(2)),
                ],
            )
            .unwrap();
        store
            .bulk_write(Collection::Stops, &[WriteOp::insert("UK1", json!({}), now)])
            .unwrap();

        let stats =
            collect_stats(&store, now, Duration::minutes(DEFAULT_ACTIVE_WINDOW_MINUTES)).unwrap();

        assert_eq!(stats.stops, 1);
        assert_eq!(stats.active_realtime_journeys, 1);
        assert_eq!(stats.historical_realtime_journeys, 2);
    }
}
