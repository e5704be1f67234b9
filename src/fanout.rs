//! Best-effort fan-out of ingestion events to live subscribers.
//!
//! Each subscriber owns a bounded channel. A broadcast never waits: a
//! subscriber whose channel is full or closed is dropped from the set and
//! nothing is queued or replayed for it.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    SessionStart,
    Command,
    Llm,
    ProcessStart,
    ProcessEnd,
    Thinking,
    Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub r#type: EnvelopeType,
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(r#type: EnvelopeType, data: &T) -> Self {
        let data = serde_json::to_value(data).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize envelope payload");
            serde_json::Value::Null
        });
        Self { r#type, data }
    }
}

pub struct Subscription {
    pub id: Uuid,
    pub rx: mpsc::Receiver<String>,
}

pub struct Broadcaster {
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<String>>>,
    buffer: usize,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subs.insert(id, tx);
        info!(subscriber = %id, total = subs.len(), "subscriber connected");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if subs.remove(&id).is_some() {
            info!(subscriber = %id, total = subs.len(), "subscriber disconnected");
        }
    }

    /// Sends to every open subscriber and prunes the ones that cannot take it.
    /// Returns how many subscribers received the envelope.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        let json = match serde_json::to_string(envelope) {
            Ok(j) => j,
            Err(e) => {
                warn!(event_type = ?envelope.r#type, error = %e, "failed to serialize envelope");
                return 0;
            }
        };

        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        subs.retain(|id, tx| match tx.try_send(json.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = %id, "subscriber lagging, dropping it");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
        debug!(event_type = ?envelope.r#type, delivered, "broadcast envelope");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> Envelope {
        Envelope::new(EnvelopeType::Command, &json!({"tool_name": "web_search"}))
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let hub = Broadcaster::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.broadcast(&envelope()), 2);

        let msg: serde_json::Value = serde_json::from_str(&a.rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["type"], "command");
        assert_eq!(msg["data"]["tool_name"], "web_search");
        assert!(b.rx.recv().await.is_some());
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let hub = Broadcaster::new();
        let gone = hub.subscribe();
        let _kept = hub.subscribe();
        drop(gone);

        assert_eq!(hub.broadcast(&envelope()), 1);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn lagging_subscriber_is_dropped_without_blocking() {
        let hub = Broadcaster::with_buffer(1);
        let _slow = hub.subscribe();

        assert_eq!(hub.broadcast(&envelope()), 1);
        assert_eq!(hub.broadcast(&envelope()), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_replay() {
        let hub = Broadcaster::new();
        hub.broadcast(&envelope());
        let mut late = hub.subscribe();
        assert!(late.rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_removes_subscriber() {
        let hub = Broadcaster::new();
        let sub = hub.subscribe();
        hub.unsubscribe(sub.id);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn envelope_type_names() {
        let json = serde_json::to_value(Envelope::new(EnvelopeType::ProcessEnd, &json!({}))).unwrap();
        assert_eq!(json["type"], "process_end");
    }
}
