//! Transactional persistence for orders, deliveries and the records they
//! reference (users, variants, shippers, discount codes).
//!
//! Two backends implement [`Store`]: [`PostgresStore`] for production and
//! [`InMemoryStore`] for tests and local runs without a database.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use store::{Store, StoreTx};
