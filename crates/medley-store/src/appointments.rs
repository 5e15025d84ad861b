use medley_model::{
    Appointment, AppointmentId, AppointmentStatus, NewAppointment, PatientId, PaymentStatus,
    SlotId,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::slots::{claim_seat, date_text, parse_date, parse_time, release_seat, time_text};
use crate::{BookingStore, StoreError};

const APPOINTMENT_COLUMNS: &str = "id, slot_id, patient_id, date, start_time, duration_minutes, \
                                   fee_cents, reason, status, payment_status";

type AppointmentRow = (
    String,
    i64,
    String,
    String,
    String,
    u32,
    i64,
    String,
    String,
    String,
);

fn appointment_from_row(row: AppointmentRow) -> Result<Appointment, StoreError> {
    let (id, slot_id, patient_id, date, start_time, duration, fee, reason, status, payment) = row;
    Ok(Appointment {
        id: AppointmentId::parse(&id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        slot_id: SlotId::new(slot_id),
        patient_id: PatientId::parse(&patient_id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        date: parse_date(&date)?,
        start_time: parse_time(&start_time)?,
        duration_minutes: duration,
        fee_cents: fee,
        reason,
        status: AppointmentStatus::parse(&status).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        payment_status: PaymentStatus::parse(&payment)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
    })
}

fn row_tuple(r: &rusqlite::Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
        r.get(7)?,
        r.get(8)?,
        r.get(9)?,
    ))
}

pub(crate) fn insert_appointment(conn: &Connection, apt: &Appointment) -> Result<(), StoreError> {
    conn.execute(
        &format!("INSERT INTO appointments ({APPOINTMENT_COLUMNS}) \
                  VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
        params![
            apt.id.as_str(),
            apt.slot_id.as_i64(),
            apt.patient_id.as_str(),
            date_text(apt.date),
            time_text(apt.start_time),
            apt.duration_minutes,
            apt.fee_cents,
            apt.reason,
            apt.status.as_str(),
            apt.payment_status.as_str(),
        ],
    )?;
    Ok(())
}

pub(crate) fn load_appointment(
    conn: &Connection,
    id: &AppointmentId,
) -> Result<Option<Appointment>, StoreError> {
    let row: Option<AppointmentRow> = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
            params![id.as_str()],
            row_tuple,
        )
        .optional()?;
    row.map(appointment_from_row).transpose()
}

/// The pending hold a reconciliation should converge on when the order
/// context carries no appointment id. Oldest first so racing duplicates
/// converge on one row.
pub(crate) fn find_pending(
    conn: &Connection,
    slot_id: SlotId,
    patient_id: &PatientId,
) -> Result<Option<Appointment>, StoreError> {
    let row: Option<AppointmentRow> = conn
        .query_row(
            &format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE slot_id = ?1 AND patient_id = ?2 AND status = 'pending'
                 ORDER BY rowid LIMIT 1"
            ),
            params![slot_id.as_i64(), patient_id.as_str()],
            row_tuple,
        )
        .optional()?;
    row.map(appointment_from_row).transpose()
}

/// The reconciliation transition, guarded on current status so it fires at
/// most once.
pub(crate) fn mark_scheduled_paid(
    conn: &Connection,
    id: &AppointmentId,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE appointments SET status = 'scheduled', payment_status = 'paid'
         WHERE id = ?1 AND status = 'pending'",
        params![id.as_str()],
    )?;
    Ok(changed == 1)
}

impl BookingStore {
    /// The reservation atomic unit: claim a seat and create the pending
    /// appointment in one IMMEDIATE transaction. Both commit or neither.
    pub async fn reserve(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        claim_seat(&tx, new.slot_id)?;
        let appointment = new.into_pending();
        insert_appointment(&tx, &appointment)?;
        tx.commit()?;
        debug!(
            appointment_id = %appointment.id,
            slot_id = %appointment.slot_id,
            "reserved seat"
        );
        Ok(appointment)
    }

    pub async fn get_appointment(&self, id: &AppointmentId) -> Result<Appointment, StoreError> {
        let conn = self.lock().await;
        load_appointment(&conn, id)?.ok_or_else(|| StoreError::AppointmentNotFound(id.clone()))
    }

    /// Patient/admin cancellation: flips the status and releases the seat
    /// in one transaction. Completed and already-cancelled appointments are
    /// rejected by the state machine.
    pub async fn cancel_appointment(&self, id: &AppointmentId) -> Result<Appointment, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut appointment = load_appointment(&tx, id)?
            .ok_or_else(|| StoreError::AppointmentNotFound(id.clone()))?;
        let prior = appointment.status;
        appointment
            .cancel()
            .map_err(|_| StoreError::NotCancellable(prior))?;
        tx.execute(
            "UPDATE appointments SET status = 'cancelled' WHERE id = ?1",
            params![id.as_str()],
        )?;
        release_seat(&tx, appointment.slot_id)?;
        tx.commit()?;
        debug!(appointment_id = %appointment.id, from = %prior, "cancelled appointment");
        Ok(appointment)
    }

    pub async fn appointments_for_slot(
        &self,
        slot_id: SlotId,
    ) -> Result<Vec<Appointment>, StoreError> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE slot_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt.query_map(params![slot_id.as_i64()], row_tuple)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(appointment_from_row(row?)?);
        }
        Ok(out)
    }
}
