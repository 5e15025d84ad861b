#![forbid(unsafe_code)]

//! SQLite persistence for slots, appointments, and payments.
//!
//! One connection, one writer: all mutation goes through
//! [`BookingStore`] methods that run a single IMMEDIATE transaction each,
//! so the read-check-increment on slot capacity is never two racing
//! statements. The `payments.transaction_id` unique index is the
//! authoritative idempotency barrier for reconciliation.

use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

mod appointments;
mod error;
mod payments;
mod schema;
mod slots;

pub use error::StoreError;
pub use payments::ReconcileRecord;
pub use slots::SlotFilter;

pub const CRATE_NAME: &str = "medley-store";

#[derive(Clone)]
pub struct BookingStore {
    conn: Arc<Mutex<Connection>>,
}

impl BookingStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Test-only convenience; the database lives as long as the store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
