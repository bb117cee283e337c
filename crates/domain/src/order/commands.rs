//! Order requests.

use common::{OrderItemId, VariantId};
use serde::{Deserialize, Serialize};

use super::state::{OrderStatus, PAYMENT_METHODS, PaymentStatus};
use crate::error::{DomainError, Result};
use crate::money::Money;
use crate::pricing::{DiscountIntent, DiscountRequest};
use crate::user::GuestContact;

/// Largest quantity a single line or shipment item may carry.
pub const MAX_QUANTITY: u32 = i32::MAX as u32;

fn default_payment_method() -> String {
    "cash".to_string()
}

/// A requested line on a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemInput {
    pub variant_id: VariantId,
    pub quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Create a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub customer_name: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    pub items: Vec<OrderItemInput>,
    #[serde(flatten)]
    pub discount: DiscountRequest,
    #[serde(default)]
    pub shipping_fee: Money,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateOrder {
    /// Creates a request with the given customer and no items.
    pub fn new(customer_name: impl Into<String>, customer_phone: impl Into<String>) -> Self {
        Self {
            customer_name: customer_name.into(),
            customer_phone: customer_phone.into(),
            customer_email: None,
            items: Vec::new(),
            discount: DiscountRequest::default(),
            shipping_fee: Money::zero(),
            payment_method: default_payment_method(),
            notes: None,
        }
    }

    /// Adds a line.
    pub fn item(mut self, variant_id: VariantId, quantity: u32) -> Self {
        self.items.push(OrderItemInput {
            variant_id,
            quantity,
            notes: None,
        });
        self
    }

    /// Sets the discount fields.
    pub fn discount(mut self, discount: DiscountRequest) -> Self {
        self.discount = discount;
        self
    }

    /// Sets the shipping fee.
    pub fn shipping_fee(mut self, fee: Money) -> Self {
        self.shipping_fee = fee;
        self
    }

    /// Checks everything that can be checked without the store.
    pub fn validate(&self) -> Result<DiscountIntent> {
        validate_customer(&self.customer_name, &self.customer_phone)?;
        if self.items.is_empty() {
            return Err(DomainError::validation(
                "items",
                "order must contain at least one item",
            ));
        }
        for item in &self.items {
            validate_quantity(item.quantity)?;
        }
        validate_charges(self.shipping_fee, &self.payment_method)?;
        self.discount.intent()
    }

    /// Contact details used to resolve a guest identity.
    pub fn guest_contact(&self) -> GuestContact {
        GuestContact {
            name: self.customer_name.trim().to_string(),
            phone: self.customer_phone.trim().to_string(),
            email: self
                .customer_email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        }
    }
}

/// A line submitted with an order update.
///
/// Lines with an `id` update that existing line; lines without one are new
/// and must name a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderItem {
    #[serde(default)]
    pub id: Option<OrderItemId>,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

impl UpdateOrderItem {
    pub fn existing(id: OrderItemId, quantity: u32) -> Self {
        Self {
            id: Some(id),
            variant_id: None,
            quantity,
            notes: None,
        }
    }

    pub fn new_line(variant_id: VariantId, quantity: u32) -> Self {
        Self {
            id: None,
            variant_id: Some(variant_id),
            quantity,
            notes: None,
        }
    }
}

/// Replace the editable fields and the item set of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrder {
    pub customer_name: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    pub items: Vec<UpdateOrderItem>,
    #[serde(flatten)]
    pub discount: DiscountRequest,
    #[serde(default)]
    pub shipping_fee: Money,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Rejects the update if the order changed since this version was read.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl UpdateOrder {
    pub fn new(customer_name: impl Into<String>, customer_phone: impl Into<String>) -> Self {
        Self {
            customer_name: customer_name.into(),
            customer_phone: customer_phone.into(),
            customer_email: None,
            items: Vec::new(),
            discount: DiscountRequest::default(),
            shipping_fee: Money::zero(),
            payment_method: default_payment_method(),
            payment_status: None,
            notes: None,
            expected_version: None,
        }
    }

    pub fn item(mut self, item: UpdateOrderItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn discount(mut self, discount: DiscountRequest) -> Self {
        self.discount = discount;
        self
    }

    pub fn validate(&self) -> Result<DiscountIntent> {
        validate_customer(&self.customer_name, &self.customer_phone)?;
        if self.items.is_empty() {
            return Err(DomainError::validation(
                "items",
                "order must contain at least one item",
            ));
        }
        for item in &self.items {
            validate_quantity(item.quantity)?;
            if item.id.is_none() && item.variant_id.is_none() {
                return Err(DomainError::validation(
                    "items",
                    "new order items must specify a variant",
                ));
            }
        }
        validate_charges(self.shipping_fee, &self.payment_method)?;
        self.discount.intent()
    }
}

/// Move an order to another status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOrderStatus {
    pub status: OrderStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ChangeOrderStatus {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status,
            notes: None,
        }
    }
}

fn validate_customer(name: &str, phone: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation(
            "customer_name",
            "customer name is required",
        ));
    }
    if phone.trim().is_empty() {
        return Err(DomainError::validation(
            "customer_phone",
            "customer phone is required",
        ));
    }
    Ok(())
}

fn validate_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(DomainError::validation(
            "quantity",
            "quantity must be greater than 0",
        ));
    }
    if quantity > MAX_QUANTITY {
        return Err(DomainError::validation(
            "quantity",
            format!("quantity cannot exceed {MAX_QUANTITY}"),
        ));
    }
    Ok(())
}

fn validate_charges(shipping_fee: Money, payment_method: &str) -> Result<()> {
    shipping_fee.within_limit("shipping_fee")?;
    if !PAYMENT_METHODS.iter().any(|(code, _)| *code == payment_method) {
        return Err(DomainError::validation(
            "payment_method",
            format!("unsupported payment method: {payment_method}"),
        ));
    }
    Ok(())
}
