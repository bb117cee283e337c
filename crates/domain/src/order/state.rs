//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──┬──► Completed ◄──────┐
///    │            │        │        │            │
///    │            │        │        ▼            │
///    │            │        └──► ReadyForDelivery ┘
///    │            │                 │
///    └────────────┴─────────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order was placed and awaits confirmation.
    #[default]
    Pending,

    /// Order is being prepared.
    Processing,

    /// Order has been fulfilled.
    Completed,

    /// Order is packed and waiting for a shipper.
    ReadyForDelivery,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::ReadyForDelivery,
        OrderStatus::Cancelled,
    ];

    /// Returns the statuses reachable from this one in a single step.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[
                OrderStatus::Completed,
                OrderStatus::ReadyForDelivery,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Completed => &[OrderStatus::ReadyForDelivery],
            OrderStatus::ReadyForDelivery => &[OrderStatus::Completed, OrderStatus::Cancelled],
            OrderStatus::Cancelled => &[],
        }
    }

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Validates a transition and returns the new status.
    pub fn transition_to(self, next: OrderStatus) -> Result<OrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::validation(
                "status",
                format!("cannot transition order from {self} to {next}"),
            ))
        }
    }

    /// Returns true if shippers can be assigned in this status.
    pub fn is_delivery_eligible(&self) -> bool {
        matches!(
            self,
            OrderStatus::ReadyForDelivery | OrderStatus::Completed
        )
    }

    /// Returns true if line items can still be edited.
    pub fn can_edit_items(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::ReadyForDelivery => "ready_for_delivery",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Completed => "Completed",
            OrderStatus::ReadyForDelivery => "Ready for delivery",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation("status", format!("unknown order status: {s}")))
    }
}

/// Payment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::validation(
                "payment_status",
                format!("unknown payment status: {other}"),
            )),
        }
    }
}

/// Payment methods accepted at checkout.
pub const PAYMENT_METHODS: [(&str, &str); 5] = [
    ("cash", "Cash"),
    ("card", "Card"),
    ("transfer", "Bank transfer"),
    ("momo", "MoMo"),
    ("vnpay", "VNPay"),
];
