// 📬 Real-time Queue - hand vehicle observations to the matching subsystem
//
// Only the publish side lives here. Whatever consumes the queue owns the
// position-to-timetable matching.

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entities::{DataSource, Location};
use crate::error::QueueError;

pub trait MessageQueue: Send + Sync {
    fn publish(&self, payload: &str) -> Result<(), QueueError>;
}

/// In-process queue over a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    sender: Sender<String>,
}

impl ChannelQueue {
    pub fn unbounded() -> (Self, Receiver<String>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (ChannelQueue { sender }, receiver)
    }

    /// Publishing blocks while the channel is full.
    pub fn bounded(capacity: usize) -> (Self, Receiver<String>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (ChannelQueue { sender }, receiver)
    }
}

impl MessageQueue for ChannelQueue {
    fn publish(&self, payload: &str) -> Result<(), QueueError> {
        self.sender
            .send(payload.to_string())
            .map_err(|_| QueueError::Closed)
    }
}

// ============================================================================
// VEHICLE ACTIVITY
// ============================================================================

/// One vehicle position report from a live feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleActivity {
    pub vehicle_ref: String,

    #[serde(default)]
    pub line_ref: String,

    #[serde(default)]
    pub operator_ref: String,

    #[serde(default)]
    pub direction_ref: String,

    /// Journey identifier as published by the operator
    #[serde(default)]
    pub dated_vehicle_journey_ref: String,

    #[serde(default)]
    pub origin_ref: String,

    #[serde(default)]
    pub destination_ref: String,

    pub location: Location,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,

    pub recorded_at_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForwardReport {
    pub published: usize,
    pub failed: usize,
}

/// Stamps observations with the run's DataSource and publishes them as JSON.
pub struct RealtimeForwarder<'q> {
    queue: &'q dyn MessageQueue,
    datasource: DataSource,
}

impl<'q> RealtimeForwarder<'q> {
    pub fn new(queue: &'q dyn MessageQueue, datasource: DataSource) -> Self {
        RealtimeForwarder { queue, datasource }
    }

    fn publish_one(&self, activity: &VehicleActivity) -> Result<(), QueueError> {
        let mut stamped = activity.clone();
        stamped.data_source = Some(self.datasource.clone());
        let payload = serde_json::to_string(&stamped)?;
        self.queue.publish(&payload)
    }

    /// Publish every activity; failures are counted, never fatal.
    pub fn forward(&self, activities: &[VehicleActivity]) -> ForwardReport {
        let mut report = ForwardReport::default();

        for activity in activities {
            match self.publish_one(activity) {
                Ok(()) => report.published += 1,
                Err(e) => {
                    warn!(vehicle = %activity.vehicle_ref, error = %e, "failed to queue vehicle activity");
                    report.failed += 1;
                }
            }
        }

        debug!(
            published = report.published,
            failed = report.failed,
            "forwarded vehicle activity"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn activity(vehicle: &str) -> VehicleActivity {
        VehicleActivity {
            vehicle_ref: vehicle.to_string(),
            line_ref: "1A".to_string(),
            operator_ref: "ABCD".to_string(),
            direction_ref: "outbound".to_string(),
            dated_vehicle_journey_ref: "1234".to_string(),
            origin_ref: "0100A".to_string(),
            destination_ref: "0100B".to_string(),
            location: Location::point(-2.58, 51.45),
            bearing: Some(90.0),
            recorded_at_time: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            valid_until_time: None,
            data_source: None,
        }
    }

    #[test]
    fn test_forward_stamps_datasource() {
        let (queue, receiver) = ChannelQueue::unbounded();
        let datasource = DataSource::new("siri-vm", "BODS", "feed");
        let forwarder = RealtimeForwarder::new(&queue, datasource.clone());

        let report = forwarder.forward(&[activity("BUS-1"), activity("BUS-2")]);
        assert_eq!(report, ForwardReport { published: 2, failed: 0 });

        let first: VehicleActivity = serde_json::from_str(&receiver.recv().unwrap()).unwrap();
        assert_eq!(first.vehicle_ref, "BUS-1");
        assert_eq!(first.data_source, Some(datasource));
    }

    #[test]
    fn test_closed_queue_counts_failures() {
        let (queue, receiver) = ChannelQueue::unbounded();
        drop(receiver);

        let forwarder = RealtimeForwarder::new(&queue, DataSource::default());
        let report = forwarder.forward(&[activity("BUS-1")]);

        assert_eq!(report, ForwardReport { published: 0, failed: 1 });
    }
}
