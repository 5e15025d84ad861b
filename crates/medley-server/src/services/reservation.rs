//! The single owned mutation path for slot capacity.
//!
//! Every seat claim in the system goes through [`ReservationService`]; no
//! handler or background path increments `booked_count` directly.

use chrono::{NaiveDate, NaiveTime};
use medley_api::ReserveRequestDto;
use medley_model::{Appointment, NewAppointment, PatientId, SlotId};
use medley_store::{BookingStore, StoreError};
use std::fmt::{Display, Formatter};
use tracing::info;

pub const DURATION_MINUTES_MAX: u32 = 480;
pub const REASON_MAX_LEN: usize = 1024;

#[derive(Debug)]
#[non_exhaustive]
pub enum ReserveError {
    SlotNotFound(SlotId),
    SlotUnavailable(SlotId),
    InvalidDate(String),
    Validation {
        field: &'static str,
        reason: String,
    },
    Store(StoreError),
}

impl Display for ReserveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SlotNotFound(id) => write!(f, "slot {id} not found"),
            Self::SlotUnavailable(id) => write!(f, "slot {id} at capacity or disabled"),
            Self::InvalidDate(raw) => write!(f, "invalid appointment date '{raw}'"),
            Self::Validation { field, reason } => write!(f, "invalid {field}: {reason}"),
            Self::Store(err) => write!(f, "store failure: {err}"),
        }
    }
}

impl std::error::Error for ReserveError {}

#[derive(Clone)]
pub struct ReservationService {
    store: BookingStore,
}

impl ReservationService {
    #[must_use]
    pub fn new(store: BookingStore) -> Self {
        Self { store }
    }

    /// Validates the request, then runs the store's atomic
    /// claim-seat-and-insert unit. Validation failures never touch the
    /// store.
    pub async fn reserve(
        &self,
        request: &ReserveRequestDto,
        today: NaiveDate,
    ) -> Result<Appointment, ReserveError> {
        let new = self.validate(request, today)?;
        let appointment = self.store.reserve(new).await.map_err(map_store)?;
        info!(
            appointment_id = %appointment.id,
            slot_id = %appointment.slot_id,
            patient_id = %appointment.patient_id,
            "reservation created"
        );
        Ok(appointment)
    }

    fn validate(
        &self,
        request: &ReserveRequestDto,
        today: NaiveDate,
    ) -> Result<NewAppointment, ReserveError> {
        let date = NaiveDate::parse_from_str(&request.appointment_date, "%Y-%m-%d")
            .map_err(|_| ReserveError::InvalidDate(request.appointment_date.clone()))?;
        if date < today {
            return Err(ReserveError::InvalidDate(request.appointment_date.clone()));
        }
        let start_time = NaiveTime::parse_from_str(&request.start_time, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&request.start_time, "%H:%M"))
            .map_err(|_| ReserveError::Validation {
                field: "start_time",
                reason: format!("'{}' is not a valid time", request.start_time),
            })?;
        let patient_id =
            PatientId::parse(&request.patient_id).map_err(|e| ReserveError::Validation {
                field: "patient_id",
                reason: e.to_string(),
            })?;
        if request.duration_minutes == 0 || request.duration_minutes > DURATION_MINUTES_MAX {
            return Err(ReserveError::Validation {
                field: "duration_minutes",
                reason: format!("must be between 1 and {DURATION_MINUTES_MAX}"),
            });
        }
        if request.fee_cents < 0 {
            return Err(ReserveError::Validation {
                field: "fee_cents",
                reason: "must not be negative".to_string(),
            });
        }
        if request.reason.len() > REASON_MAX_LEN {
            return Err(ReserveError::Validation {
                field: "reason",
                reason: format!("exceeds max length {REASON_MAX_LEN}"),
            });
        }
        Ok(NewAppointment {
            slot_id: SlotId::new(request.slot_id),
            patient_id,
            date,
            start_time,
            duration_minutes: request.duration_minutes,
            fee_cents: request.fee_cents,
            reason: request.reason.clone(),
        })
    }
}

fn map_store(err: StoreError) -> ReserveError {
    match err {
        StoreError::SlotNotFound(id) => ReserveError::SlotNotFound(id),
        StoreError::SlotUnavailable(id) => ReserveError::SlotUnavailable(id),
        other => ReserveError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medley_model::NewSlot;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 25).expect("date")
    }

    async fn service_with_slot(capacity: u32) -> (ReservationService, SlotId) {
        let store = BookingStore::open_in_memory().expect("store");
        let slot = store
            .create_slot(&NewSlot {
                date: NaiveDate::from_ymd_opt(2026, 9, 1).expect("date"),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
                end_time: NaiveTime::from_hms_opt(9, 30, 0).expect("time"),
                capacity,
            })
            .await
            .expect("create slot");
        (ReservationService::new(store), slot.id)
    }

    fn request(slot_id: SlotId) -> ReserveRequestDto {
        ReserveRequestDto {
            slot_id: slot_id.as_i64(),
            patient_id: "p1".to_string(),
            appointment_date: "2026-09-01".to_string(),
            start_time: "09:00:00".to_string(),
            duration_minutes: 30,
            reason: "checkup".to_string(),
            fee_cents: 5000,
        }
    }

    #[tokio::test]
    async fn valid_requests_create_pending_appointments() {
        let (service, slot_id) = service_with_slot(1).await;
        let appointment = service
            .reserve(&request(slot_id), today())
            .await
            .expect("reserve");
        assert_eq!(appointment.slot_id, slot_id);
    }

    #[tokio::test]
    async fn unparseable_and_past_dates_are_rejected_without_side_effects() {
        let (service, slot_id) = service_with_slot(1).await;

        let mut bad = request(slot_id);
        bad.appointment_date = "tomorrow".to_string();
        assert!(matches!(
            service.reserve(&bad, today()).await,
            Err(ReserveError::InvalidDate(_))
        ));

        let mut past = request(slot_id);
        past.appointment_date = "2026-08-01".to_string();
        assert!(matches!(
            service.reserve(&past, today()).await,
            Err(ReserveError::InvalidDate(_))
        ));

        // Slot untouched by either rejection.
        service
            .reserve(&request(slot_id), today())
            .await
            .expect("seat still free");
    }

    #[tokio::test]
    async fn field_validation_is_typed() {
        let (service, slot_id) = service_with_slot(1).await;

        let mut zero = request(slot_id);
        zero.duration_minutes = 0;
        assert!(matches!(
            service.reserve(&zero, today()).await,
            Err(ReserveError::Validation {
                field: "duration_minutes",
                ..
            })
        ));

        let mut negative = request(slot_id);
        negative.fee_cents = -1;
        assert!(matches!(
            service.reserve(&negative, today()).await,
            Err(ReserveError::Validation { field: "fee_cents", .. })
        ));
    }

    #[tokio::test]
    async fn missing_slot_is_not_found() {
        let (service, _) = service_with_slot(1).await;
        let mut ghost = request(SlotId::new(999));
        ghost.slot_id = 999;
        assert!(matches!(
            service.reserve(&ghost, today()).await,
            Err(ReserveError::SlotNotFound(_))
        ));
    }
}
