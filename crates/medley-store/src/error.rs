use medley_model::{AppointmentId, AppointmentStatus, SlotId};
use std::fmt::{Display, Formatter};

#[derive(Debug)]
#[non_exhaustive]
pub enum StoreError {
    SlotNotFound(SlotId),
    SlotUnavailable(SlotId),
    AppointmentNotFound(AppointmentId),
    NotCancellable(AppointmentStatus),
    /// Charge captured for an appointment that is no longer pending
    /// (cancelled, completed, or paid under another charge).
    NotSchedulable(AppointmentId, AppointmentStatus),
    /// A persisted row no longer parses under the domain model.
    Corrupt(String),
    Sqlite(rusqlite::Error),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SlotNotFound(id) => write!(f, "slot {id} not found"),
            Self::SlotUnavailable(id) => write!(f, "slot {id} at capacity or disabled"),
            Self::AppointmentNotFound(id) => write!(f, "appointment {id} not found"),
            Self::NotCancellable(status) => {
                write!(f, "appointment in status '{status}' cannot be cancelled")
            }
            Self::NotSchedulable(id, status) => {
                write!(f, "appointment {id} in status '{status}' cannot be scheduled")
            }
            Self::Corrupt(msg) => write!(f, "corrupt row: {msg}"),
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(err)
    }
}

/// True when an INSERT bounced off a UNIQUE or PRIMARY KEY constraint.
/// For the payments table that means the transaction id lost the
/// check-then-insert race, which reconciliation treats as already
/// processed rather than as a failure.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
