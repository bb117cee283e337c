//! Identities known to the order core.

use common::UserId;
use serde::{Deserialize, Serialize};

/// A resolved user, staff or guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub full_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_guest: bool,
}

/// Contact details used to find or create a guest.
///
/// Guests are matched by phone or email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

impl GuestContact {
    /// Returns true if `user` shares a phone number or email with this contact.
    pub fn matches(&self, user: &UserIdentity) -> bool {
        let phone_match = user.phone.as_deref() == Some(self.phone.as_str());
        let email_match = self.email.is_some() && user.email == self.email;
        phone_match || email_match
    }
}
