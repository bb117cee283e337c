//! Discount codes and manual discounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{DomainError, Result};
use crate::money::Money;

/// How a discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `value` is a whole percentage of the subtotal.
    Percentage,
    /// `value` is a flat money amount.
    FixedAmount,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::FixedAmount => "fixed_amount",
        }
    }
}

impl std::fmt::Display for DiscountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DiscountType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed_amount" => Ok(DiscountType::FixedAmount),
            other => Err(DomainError::validation(
                "discount_type",
                format!("unknown discount type: {other}"),
            )),
        }
    }
}

/// A redeemable discount code as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Whole percent for [`DiscountType::Percentage`], money for fixed amounts.
    pub value: i64,
    pub min_order_amount: Money,
    /// Cap applied to percentage discounts.
    pub max_discount_amount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub is_active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl DiscountCode {
    /// Discount this code grants on `subtotal`, ignoring eligibility.
    pub fn amount_for(&self, subtotal: Money) -> Money {
        match self.discount_type {
            DiscountType::Percentage => {
                let amount = subtotal.percent(self.value);
                match self.max_discount_amount {
                    Some(cap) if amount > cap => cap,
                    _ => amount,
                }
            }
            DiscountType::FixedAmount => Money::new(self.value),
        }
    }

    /// Returns true when the usage limit has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.used_count >= limit)
    }
}

/// Why a discount code cannot be applied.
///
/// Checks run in declaration order and stop at the first failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeRejection {
    #[error("discount code not found")]
    NotFound,

    #[error("discount code is not active")]
    Inactive,

    #[error("discount code is not yet valid")]
    NotYetValid,

    #[error("discount code has expired")]
    Expired,

    #[error("discount code usage limit reached")]
    UsageExhausted,

    #[error("minimum order amount of {minimum} required to apply this code")]
    BelowMinimum { minimum: Money },
}

impl From<CodeRejection> for DomainError {
    fn from(rejection: CodeRejection) -> Self {
        DomainError::validation("discount_code", rejection.to_string())
    }
}

/// A discount code that passed every eligibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCode {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: i64,
    pub amount: Money,
}

/// Checks `code` against `subtotal` at time `now`.
pub fn evaluate_code(
    code: Option<&DiscountCode>,
    subtotal: Money,
    now: DateTime<Utc>,
) -> std::result::Result<AppliedCode, CodeRejection> {
    let code = code.ok_or(CodeRejection::NotFound)?;
    if !code.is_active {
        return Err(CodeRejection::Inactive);
    }
    if now < code.valid_from {
        return Err(CodeRejection::NotYetValid);
    }
    if now > code.valid_until {
        return Err(CodeRejection::Expired);
    }
    if code.is_exhausted() {
        return Err(CodeRejection::UsageExhausted);
    }
    if subtotal < code.min_order_amount {
        return Err(CodeRejection::BelowMinimum {
            minimum: code.min_order_amount,
        });
    }

    Ok(AppliedCode {
        code: code.code.clone(),
        discount_type: code.discount_type,
        value: code.value,
        amount: code.amount_for(subtotal),
    })
}

/// An administrator-entered discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualDiscount {
    pub discount_type: DiscountType,
    pub amount: Money,
    pub note: Option<String>,
}

/// Discount fields as submitted with an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountRequest {
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub discount_type: Option<DiscountType>,
    #[serde(default)]
    pub manual_discount_amount: Option<Money>,
    #[serde(default)]
    pub discount_note: Option<String>,
}

/// The single discount mechanism selected by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountIntent {
    None,
    Code(String),
    Manual(ManualDiscount),
}

impl DiscountRequest {
    /// Creates a request that redeems `code`.
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            discount_code: Some(code.into()),
            ..Default::default()
        }
    }

    /// Creates a request carrying a manual discount.
    pub fn manual(discount_type: DiscountType, amount: Money) -> Self {
        Self {
            discount_type: Some(discount_type),
            manual_discount_amount: Some(amount),
            ..Default::default()
        }
    }

    /// Validates the shape of the request and picks the mechanism.
    ///
    /// A blank code and a zero manual amount both count as absent.
    pub fn intent(&self) -> Result<DiscountIntent> {
        let code = self
            .discount_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let manual = self.manual_discount_amount.filter(|m| !m.is_zero());

        match (code, manual) {
            (Some(_), Some(_)) => Err(DomainError::validation(
                "discount",
                "cannot apply both a discount code and a manual discount",
            )),
            (Some(code), None) => Ok(DiscountIntent::Code(code.to_string())),
            (None, Some(amount)) => {
                if amount.is_negative() {
                    return Err(DomainError::validation(
                        "manual_discount_amount",
                        "manual discount amount must be positive",
                    ));
                }
                amount.within_limit("manual_discount_amount")?;
                let discount_type = self.discount_type.ok_or_else(|| {
                    DomainError::validation(
                        "discount_type",
                        "manual discount requires a discount type",
                    )
                })?;
                Ok(DiscountIntent::Manual(ManualDiscount {
                    discount_type,
                    amount,
                    note: self.discount_note.clone(),
                }))
            }
            (None, None) => Ok(DiscountIntent::None),
        }
    }
}

/// Result of checking a code without redeeming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountValidation {
    pub is_valid: bool,
    pub message: String,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<i64>,
    pub discount_amount: Money,
}

impl DiscountValidation {
    /// Builds the response for a standalone code check.
    pub fn check(code: Option<&DiscountCode>, order_amount: Money, now: DateTime<Utc>) -> Self {
        match evaluate_code(code, order_amount, now) {
            Ok(applied) => Self {
                is_valid: true,
                message: "discount code applied".to_string(),
                discount_type: Some(applied.discount_type),
                discount_value: Some(applied.value),
                discount_amount: applied.amount,
            },
            Err(rejection) => Self {
                is_valid: false,
                message: rejection.to_string(),
                discount_type: None,
                discount_value: None,
                discount_amount: Money::zero(),
            },
        }
    }
}
