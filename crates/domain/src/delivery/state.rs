//! Delivery status state machine.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// The status of a delivery shipment.
///
/// State transitions:
/// ```text
/// Pending ──► Assigned ──► PickedUp ──► InTransit ──┬──► Delivered
///    │           │            │            │        └──► Failed
///    └───────────┴────────────┴────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 7] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Assigned,
        DeliveryStatus::PickedUp,
        DeliveryStatus::InTransit,
        DeliveryStatus::Delivered,
        DeliveryStatus::Failed,
        DeliveryStatus::Cancelled,
    ];

    /// Returns the statuses reachable from this one in a single step.
    pub fn allowed_transitions(&self) -> &'static [DeliveryStatus] {
        use DeliveryStatus::*;
        match self {
            Pending => &[Assigned, Cancelled],
            Assigned => &[PickedUp, Cancelled],
            PickedUp => &[InTransit, Cancelled],
            InTransit => &[Delivered, Failed, Cancelled],
            Delivered | Failed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Validates a transition and returns the new status.
    pub fn transition_to(self, next: DeliveryStatus) -> Result<DeliveryStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::validation(
                "status",
                format!("cannot transition delivery from {self} to {next}"),
            ))
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns true if the shipment still holds its item quantities.
    ///
    /// Failed and cancelled shipments release them for re-shipping.
    pub fn holds_quantity(&self) -> bool {
        !matches!(self, DeliveryStatus::Failed | DeliveryStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Assigned => "Assigned",
            DeliveryStatus::PickedUp => "Picked up",
            DeliveryStatus::InTransit => "In transit",
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::Failed => "Failed",
            DeliveryStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                DomainError::validation("status", format!("unknown delivery status: {s}"))
            })
    }
}
