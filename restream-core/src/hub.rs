use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{activity::LogLevel, encoder::Progress, registry::Status, stats::SystemStats};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub stream_id: Uuid,
    pub status: Status,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub stream_id: Uuid,
    pub progress: Progress,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    pub stream_id: Uuid,
    pub level: LogLevel,
    pub event: String,
    pub message: String,
    /// RFC 3339
    pub occurred_at: String,
}

/// Typed envelope serialized as `{"type": ..., "payload": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum HubEvent {
    StreamStatus(StatusPayload),
    StreamProgress(ProgressPayload),
    StreamLog(LogPayload),
    SystemStats(SystemStats),
}

impl HubEvent {
    pub fn status(stream_id: Uuid, status: Status) -> Self {
        HubEvent::StreamStatus(StatusPayload { stream_id, status })
    }

    pub fn progress(stream_id: Uuid, progress: Progress) -> Self {
        HubEvent::StreamProgress(ProgressPayload {
            stream_id,
            progress,
        })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            HubEvent::StreamStatus(_) => "stream_status",
            HubEvent::StreamProgress(_) => "stream_progress",
            HubEvent::StreamLog(_) => "stream_log",
            HubEvent::SystemStats(_) => "system_stats",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl Display for SubscriberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("subscriber is closed")]
pub struct DeliveryError;

/// Receives serialized envelopes. `deliver` must not block: the hub calls
/// it for every subscriber in turn.
pub trait Subscriber: Send + Sync {
    fn deliver(&self, message: Arc<str>) -> Result<(), DeliveryError>;
    fn close(&self);
}

/// Subscriber backed by an unbounded channel; the transport drains the
/// receiver and writes to its client.
pub struct ChannelSubscriber {
    sender: Mutex<Option<mpsc::UnboundedSender<Arc<str>>>>,
}

impl ChannelSubscriber {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Arc<str>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl Subscriber for ChannelSubscriber {
    fn deliver(&self, message: Arc<str>) -> Result<(), DeliveryError> {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(message).map_err(|_| DeliveryError),
            None => Err(DeliveryError),
        }
    }

    fn close(&self) {
        self.sender.lock().take();
    }
}

/// Best-effort fan-out broadcaster.
///
/// Broadcasts are serialized under the subscriber lock, so each subscriber
/// sees events in publish order. There is no backlog: a subscriber only
/// receives what is published while it is registered.
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().insert(id, subscriber);
        log::debug!("Hub: {} registered", id);
        id
    }

    /// Registers a [`ChannelSubscriber`] and hands back its receiving end.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<Arc<str>>) {
        let (subscriber, rx) = ChannelSubscriber::new();
        (self.register(Arc::new(subscriber)), rx)
    }

    /// Removes and closes the subscriber. Unknown ids are ignored.
    pub fn unregister(&self, id: SubscriberId) {
        let removed = self.subscribers.lock().remove(&id);
        if let Some(subscriber) = removed {
            subscriber.close();
            log::debug!("Hub: {} unregistered", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Delivers `event` to every registered subscriber and returns how many
    /// accepted it. Subscribers that fail are dropped and closed.
    pub fn broadcast(&self, event: &HubEvent) -> usize {
        let message: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                log::error!("Hub: failed to encode {} event: {}", event.event_type(), e);
                return 0;
            }
        };

        let mut subscribers = self.subscribers.lock();
        let mut sent = 0;
        let mut failed = Vec::new();
        for (id, subscriber) in subscribers.iter() {
            match subscriber.deliver(Arc::clone(&message)) {
                Ok(()) => sent += 1,
                Err(e) => {
                    log::warn!("Hub: delivery to {} failed: {}, dropping", id, e);
                    failed.push(*id);
                }
            }
        }
        for id in failed {
            if let Some(subscriber) = subscribers.remove(&id) {
                subscriber.close();
            }
        }
        sent
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod hub_test;
