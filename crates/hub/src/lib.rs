//! Real-time event hub.
//!
//! Observers (typically WebSocket connections) register with an optional
//! group and receive serialized messages over a bounded channel. Slow or
//! disconnected observers are dropped instead of blocking publishers.

pub mod event;
pub mod hub;

pub use event::{EventType, HubEvent};
pub use hub::{ADMIN_GROUP, DEFAULT_BUFFER_SIZE, EventHub, Message, Observer, ObserverId};
