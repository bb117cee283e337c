//! Shippers.

use chrono::{DateTime, Utc};
use common::{ShipperId, UserId};
use serde::{Deserialize, Serialize};

/// A person or company that carries deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipper {
    pub id: ShipperId,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipper {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ShipperId::new(),
            name: name.into(),
            phone: phone.into(),
            email: None,
            is_active: true,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}
