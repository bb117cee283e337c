//! Helpers shared by every use-case that writes.

use std::time::Instant;

use common::UserId;
use domain::UserIdentity;
use store::StoreTx;

use crate::error::{Result, ServiceError};

/// Commits `tx` if `result` is Ok, rolls it back otherwise.
pub(crate) async fn finish<T>(tx: Box<dyn StoreTx>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

/// Records how long a transactional operation took.
pub(crate) fn record_duration(operation: &'static str, started: Instant) {
    metrics::histogram!("order_transaction_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

/// Resolves the acting user or fails with `Unauthorized`.
pub(crate) async fn require_actor(tx: &mut dyn StoreTx, actor: UserId) -> Result<UserIdentity> {
    tx.resolve_user(actor)
        .await?
        .ok_or_else(|| ServiceError::Unauthorized(format!("unknown user {actor}")))
}
