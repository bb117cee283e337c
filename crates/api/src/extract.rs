//! Acting-user extractors.
//!
//! The caller identifies itself with an `x-user-id` header carrying a user
//! UUID. Whether that user exists is checked inside the use-case
//! transaction, not here.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

/// Header carrying the acting user's id.
pub const USER_HEADER: &str = "x-user-id";

/// The acting user, if the request named one.
#[derive(Debug, Clone, Copy)]
pub struct MaybeActor(pub Option<UserId>);

/// The acting user; requests without one are rejected with 401.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for MaybeActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_HEADER) else {
            return Ok(MaybeActor(None));
        };

        let id = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .ok_or_else(|| ApiError::Unauthorized(format!("invalid {USER_HEADER} header")))?;
        Ok(MaybeActor(Some(id)))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match MaybeActor::from_request_parts(parts, state).await? {
            MaybeActor(Some(id)) => Ok(Actor(id)),
            MaybeActor(None) => {
                tracing::debug!(uri = %parts.uri, "request without acting user");
                Err(ApiError::Unauthorized(format!("missing {USER_HEADER} header")))
            }
        }
    }
}
