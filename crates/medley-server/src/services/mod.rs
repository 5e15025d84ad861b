pub mod reconciliation;
pub mod reservation;

pub use reconciliation::{ReconcileError, ReconcileOutcome, ReconciliationService};
pub use reservation::{ReservationService, ReserveError};
