//! Order and delivery use-cases.
//!
//! [`OrderManager`] and [`DeliveryOrchestrator`] run each mutation in a
//! single store transaction and publish the resulting entity to the
//! [`hub::EventHub`] once it has committed. Nothing is published for a
//! failed operation.

pub mod deliveries;
pub mod error;
pub mod orders;
mod transaction;

use serde::Serialize;

pub use deliveries::{Assignment, DeliveryOrchestrator};
pub use error::{Result, ServiceError};
pub use orders::{OrderManager, RECENT_ORDERS_LIMIT};

/// A value with its display label, for reference lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub value: &'static str,
    pub label: &'static str,
}

impl Choice {
    pub fn new(value: &'static str, label: &'static str) -> Self {
        Self { value, label }
    }
}
