//! Observer registry and fan-out.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::event::{EventType, HubEvent};

/// Per-observer channel capacity used when none is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Group that receives every published order and delivery update.
pub const ADMIN_GROUP: &str = "admin";

/// A serialized message, shared between all recipients.
pub type Message = Arc<str>;

/// Identifies a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The sending half of a connection, plus the group it joined.
#[derive(Debug, Clone)]
pub struct Observer {
    group: Option<String>,
    sender: mpsc::Sender<Message>,
}

impl Observer {
    pub fn new(group: Option<String>, sender: mpsc::Sender<Message>) -> Self {
        Self { group, sender }
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: HashMap<ObserverId, Observer>,
    groups: HashMap<String, HashSet<ObserverId>>,
}

impl Registry {
    fn remove(&mut self, id: ObserverId) -> Option<Observer> {
        let observer = self.observers.remove(&id)?;
        let Some(group) = observer.group.as_deref() else {
            return Some(observer);
        };
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(&id);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }
        Some(observer)
    }

    /// Sends `message` to each of `ids`, returning delivered and failed ids.
    fn send_to<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a ObserverId>,
        message: &Message,
    ) -> (usize, Vec<ObserverId>) {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for id in ids {
            let Some(observer) = self.observers.get(id) else {
                continue;
            };
            match observer.sender.try_send(Arc::clone(message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(observer = %id, "observer buffer full, dropping observer");
                    failed.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(observer = %id, "observer disconnected");
                    failed.push(*id);
                }
            }
        }

        (delivered, failed)
    }
}

/// Fan-out hub for real-time updates.
///
/// Cloning is cheap; all clones share one registry. The registry lock is
/// only held for index updates and non-blocking sends.
#[derive(Clone)]
pub struct EventHub {
    registry: Arc<Mutex<Registry>>,
    buffer_size: usize,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl EventHub {
    /// Creates a hub whose observers buffer up to `buffer_size` messages.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an observer and returns its id.
    pub fn register(&self, observer: Observer) -> ObserverId {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = ObserverId(registry.next_id);

        if let Some(group) = observer.group.clone() {
            registry.groups.entry(group).or_default().insert(id);
        }
        tracing::debug!(observer = %id, group = ?observer.group, "observer registered");
        registry.observers.insert(id, observer);
        id
    }

    /// Creates a channel sized for this hub and registers its sender.
    pub fn subscribe(&self, group: Option<String>) -> (ObserverId, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(self.buffer_size);
        let id = self.register(Observer::new(group, sender));
        (id, receiver)
    }

    /// Removes an observer, closing its channel once pending messages drain.
    ///
    /// Returns false if the observer was already gone.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.registry().remove(id).is_some();
        if removed {
            tracing::debug!(observer = %id, "observer unregistered");
        }
        removed
    }

    /// Sends `message` to every observer. Returns how many received it.
    pub fn broadcast(&self, message: &str) -> usize {
        let message: Message = Arc::from(message);
        let mut registry = self.registry();
        let ids: Vec<ObserverId> = registry.observers.keys().copied().collect();
        let (delivered, failed) = registry.send_to(&ids, &message);
        Self::drop_failed(&mut registry, failed);
        Self::record_sent(delivered);
        delivered
    }

    /// Sends `message` to the members of `group`. Returns how many received it.
    pub fn broadcast_to_group(&self, group: &str, message: &str) -> usize {
        let message: Message = Arc::from(message);
        let mut registry = self.registry();
        let Some(members) = registry.groups.get(group) else {
            return 0;
        };
        let ids: Vec<ObserverId> = members.iter().copied().collect();
        let (delivered, failed) = registry.send_to(&ids, &message);
        Self::drop_failed(&mut registry, failed);
        Self::record_sent(delivered);
        delivered
    }

    /// Serializes `event` and sends it to the admin group.
    pub fn publish(&self, event: &HubEvent) {
        match serde_json::to_string(event) {
            Ok(message) => {
                let delivered = self.broadcast_to_group(ADMIN_GROUP, &message);
                tracing::debug!(
                    event_type = event.event_type.as_str(),
                    delivered,
                    "event published"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize hub event");
            }
        }
    }

    /// Snapshots `entity` and publishes it as `event_type`.
    pub fn publish_entity<T: Serialize>(&self, event_type: EventType, entity: &T) {
        match HubEvent::from_entity(event_type, entity) {
            Ok(event) => self.publish(&event),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    event_type = event_type.as_str(),
                    "failed to snapshot entity for hub"
                );
            }
        }
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.registry().observers.len()
    }

    /// Number of observers in `group`.
    pub fn group_size(&self, group: &str) -> usize {
        self.registry().groups.get(group).map_or(0, HashSet::len)
    }

    fn drop_failed(registry: &mut Registry, failed: Vec<ObserverId>) {
        for id in failed {
            if registry.remove(id).is_some() {
                metrics::counter!("hub_observers_dropped_total").increment(1);
            }
        }
    }

    fn record_sent(delivered: usize) {
        if delivered > 0 {
            metrics::counter!("hub_messages_sent_total").increment(delivered as u64);
        }
    }
}
