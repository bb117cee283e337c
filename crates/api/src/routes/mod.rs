pub mod deliveries;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod ws;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path identifier, rejecting malformed ones with 400.
pub(crate) fn parse_id<T: FromStr>(id: &str) -> Result<T, ApiError> {
    id.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid ID format: {id}")))
}
