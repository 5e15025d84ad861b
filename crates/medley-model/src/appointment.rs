// SPDX-License-Identifier: Apache-2.0

use crate::ids::{AppointmentId, PatientId, SlotId};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Scheduled,
    Completed,
    Cancelled,
    #[serde(rename = "no-show")]
    NoShow,
}

impl AppointmentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no-show",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, TransitionError> {
        match raw {
            "pending" => Ok(Self::Pending),
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "no-show" | "no_show" => Ok(Self::NoShow),
            other => Err(TransitionError::UnknownStatus(other.to_string())),
        }
    }
}

impl Display for AppointmentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, TransitionError> {
        match raw {
            "unpaid" => Ok(Self::Unpaid),
            "partially_paid" => Ok(Self::PartiallyPaid),
            "paid" => Ok(Self::Paid),
            other => Err(TransitionError::UnknownStatus(other.to_string())),
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransitionError {
    UnknownStatus(String),
    NotSchedulable(AppointmentStatus),
    NotCancellable(AppointmentStatus),
    PaidWithoutSchedule,
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownStatus(raw) => write!(f, "unknown status: {raw}"),
            Self::NotSchedulable(status) => {
                write!(f, "appointment in status '{status}' cannot be scheduled")
            }
            Self::NotCancellable(status) => {
                write!(f, "appointment in status '{status}' cannot be cancelled")
            }
            Self::PaidWithoutSchedule => {
                f.write_str("paid appointments must be scheduled or completed")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Validated reservation payload; becomes a pending Appointment inside the
/// reserve transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewAppointment {
    pub slot_id: SlotId,
    pub patient_id: PatientId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub fee_cents: i64,
    pub reason: String,
}

impl NewAppointment {
    /// Mints the opaque id and pins the initial state machine position.
    #[must_use]
    pub fn into_pending(self) -> Appointment {
        Appointment {
            id: AppointmentId::mint(),
            slot_id: self.slot_id,
            patient_id: self.patient_id,
            date: self.date,
            start_time: self.start_time,
            duration_minutes: self.duration_minutes,
            fee_cents: self.fee_cents,
            reason: self.reason,
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
        }
    }
}

/// One booking attempt against one slot.
///
/// `payment_status = paid` implies `status` is scheduled or completed;
/// `scheduled` is only reachable from `pending` via reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Appointment {
    pub id: AppointmentId,
    pub slot_id: SlotId,
    pub patient_id: PatientId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub fee_cents: i64,
    pub reason: String,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
}

impl Appointment {
    /// The reconciliation transition: pending → scheduled+paid.
    pub fn schedule_paid(&mut self) -> Result<(), TransitionError> {
        if self.status != AppointmentStatus::Pending {
            return Err(TransitionError::NotSchedulable(self.status));
        }
        self.status = AppointmentStatus::Scheduled;
        self.payment_status = PaymentStatus::Paid;
        Ok(())
    }

    /// Patient/admin cancellation. A paid+scheduled appointment may cancel
    /// (refund handling is a follow-up outside this path) but never re-opens
    /// to pending; completed appointments are immutable.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        match self.status {
            AppointmentStatus::Completed | AppointmentStatus::Cancelled => {
                Err(TransitionError::NotCancellable(self.status))
            }
            _ => {
                self.status = AppointmentStatus::Cancelled;
                Ok(())
            }
        }
    }

    pub fn check_invariants(&self) -> Result<(), TransitionError> {
        if self.payment_status == PaymentStatus::Paid
            && !matches!(
                self.status,
                AppointmentStatus::Scheduled | AppointmentStatus::Completed
            )
        {
            return Err(TransitionError::PaidWithoutSchedule);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Appointment {
        Appointment {
            id: AppointmentId::mint(),
            slot_id: SlotId::new(1),
            patient_id: PatientId::parse("patient-1").expect("patient id"),
            date: NaiveDate::from_ymd_opt(2026, 9, 1).expect("date"),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
            duration_minutes: 30,
            fee_cents: 5000,
            reason: "checkup".to_string(),
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
        }
    }

    #[test]
    fn schedule_paid_only_from_pending() {
        let mut apt = pending();
        apt.schedule_paid().expect("pending schedules");
        assert_eq!(apt.status, AppointmentStatus::Scheduled);
        assert_eq!(apt.payment_status, PaymentStatus::Paid);
        assert!(apt.check_invariants().is_ok());

        // A second schedule attempt must not fire; reconciliation is
        // exactly-once.
        assert_eq!(
            apt.schedule_paid(),
            Err(TransitionError::NotSchedulable(AppointmentStatus::Scheduled))
        );
    }

    #[test]
    fn cancelled_and_completed_are_terminal_for_cancel() {
        let mut apt = pending();
        apt.cancel().expect("pending cancels");
        assert_eq!(
            apt.cancel(),
            Err(TransitionError::NotCancellable(AppointmentStatus::Cancelled))
        );

        let mut done = pending();
        done.status = AppointmentStatus::Completed;
        assert!(done.cancel().is_err());
    }

    #[test]
    fn paid_pending_violates_invariants() {
        let mut apt = pending();
        apt.payment_status = PaymentStatus::Paid;
        assert_eq!(
            apt.check_invariants(),
            Err(TransitionError::PaidWithoutSchedule)
        );
    }

    #[test]
    fn status_round_trips_including_no_show() {
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Scheduled,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert_eq!(AppointmentStatus::parse(status.as_str()), Ok(status));
        }
        assert_eq!(
            serde_json::to_string(&AppointmentStatus::NoShow).expect("json"),
            "\"no-show\""
        );
    }
}
