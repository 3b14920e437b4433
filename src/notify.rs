// 📣 Notification Sink - one structured event per completed sync run
//
// Delivery is fire-and-forget: `send_best_effort` logs failures and never
// returns them, so a broken sink cannot fail an import.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::NotifyError;
use crate::store::{Event, SqliteStore};

pub const ACTOR: &str = "transit-sync";

pub trait Notifier: Send + Sync {
    fn send_event(&self, topic: &str, payload: &Value) -> Result<(), NotifyError>;
}

/// Deliver an event, logging instead of propagating any failure.
pub fn send_best_effort(notifier: &dyn Notifier, topic: &str, payload: &Value) {
    match notifier.send_event(topic, payload) {
        Ok(()) => info!(topic, "sent notification"),
        Err(e) => warn!(topic, error = %e, "failed to send notification"),
    }
}

/// Writes events to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_event(&self, topic: &str, payload: &Value) -> Result<(), NotifyError> {
        info!(topic, payload = %payload, "event");
        Ok(())
    }
}

/// Appends events to the store's audit trail.
pub struct EventLogNotifier<'a> {
    store: &'a SqliteStore,
}

impl<'a> EventLogNotifier<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        EventLogNotifier { store }
    }
}

impl Notifier for EventLogNotifier<'_> {
    fn send_event(&self, topic: &str, payload: &Value) -> Result<(), NotifyError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let event = Event::new(topic, "sync_run", &run_id, payload.clone(), ACTOR);
        self.store.insert_event(&event)?;
        Ok(())
    }
}
