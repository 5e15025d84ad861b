use medley_model::{
    Appointment, AppointmentId, AppointmentOrder, NewAppointment, Payment, PaymentId, PaymentKind,
    PaymentState, PaymentStatus, ProductOrder, TransactionId,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};

use crate::appointments::{
    find_pending, insert_appointment, load_appointment, mark_scheduled_paid,
};
use crate::error::is_constraint_violation;
use crate::slots::claim_seat;
use crate::{BookingStore, StoreError};

const PAYMENT_COLUMNS: &str =
    "id, amount_cents, method, state, transaction_id, kind, appointment_id, \
     product_order_ref, patient_id";

/// Outcome of the reconciliation atomic unit.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileRecord {
    /// Appointment scheduled+paid and the Payment row written, all in this
    /// call's transaction.
    Applied {
        appointment: Appointment,
        payment: Payment,
    },
    /// Product-order payment written.
    AppliedProduct { payment: Payment },
    /// The transaction id was already recorded; nothing written.
    AlreadyProcessed,
}

type PaymentRow = (
    String,
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn payment_from_row(row: PaymentRow) -> Result<Payment, StoreError> {
    let (id, amount, method, state, transaction_id, kind, appointment_id, order_ref, patient_id) =
        row;
    Ok(Payment {
        id: PaymentId::parse(&id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        amount_cents: amount,
        method,
        state: PaymentState::parse(&state).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        transaction_id: TransactionId::parse(&transaction_id)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        kind: PaymentKind::parse(&kind).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        appointment_id: appointment_id
            .map(|raw| AppointmentId::parse(&raw))
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        product_order_ref: order_ref,
        patient_id: patient_id
            .map(|raw| medley_model::PatientId::parse(&raw))
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
    })
}

fn row_tuple(r: &rusqlite::Row<'_>) -> rusqlite::Result<PaymentRow> {
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
    ))
}

fn load_payment_by_transaction(
    conn: &Connection,
    transaction_id: &TransactionId,
) -> Result<Option<Payment>, StoreError> {
    let row: Option<PaymentRow> = conn
        .query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = ?1"),
            params![transaction_id.as_str()],
            row_tuple,
        )
        .optional()?;
    row.map(payment_from_row).transpose()
}

/// Returns false when the insert bounced off the transaction-id unique
/// index, i.e. a concurrent writer recorded this charge between our
/// idempotency check and the insert. The index is the authoritative guard;
/// the earlier lookup is only the fast path.
fn insert_payment(conn: &Connection, payment: &Payment) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        &format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            payment.id.as_str(),
            payment.amount_cents,
            payment.method,
            payment.state.as_str(),
            payment.transaction_id.as_str(),
            payment.kind.as_str(),
            payment.appointment_id.as_ref().map(|id| id.as_str()),
            payment.product_order_ref,
            payment.patient_id.as_ref().map(|id| id.as_str()),
        ],
    );
    match inserted {
        Ok(_) => Ok(true),
        Err(err) if is_constraint_violation(&err) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

impl BookingStore {
    pub async fn find_payment_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>, StoreError> {
        let conn = self.lock().await;
        load_payment_by_transaction(&conn, transaction_id)
    }

    pub async fn list_payments(&self) -> Result<Vec<Payment>, StoreError> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY rowid"
        ))?;
        let rows = stmt.query_map([], row_tuple)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(payment_from_row(row?)?);
        }
        Ok(out)
    }

    /// The reconciliation atomic unit for appointment orders, all in one
    /// transaction:
    ///
    /// 1. idempotency lookup by transaction id;
    /// 2. locate the pending hold (by id, then by slot+patient), or
    ///    materialize one under the same capacity guard as `reserve`;
    /// 3. transition pending → scheduled+paid;
    /// 4. insert the Payment row.
    ///
    /// Any error rolls the whole unit back: a gateway retry re-runs it from
    /// a clean slate. `SlotUnavailable` here means the charge was captured
    /// but the seat is gone — the caller surfaces that as a reconciliation
    /// failure, never as a silent loss.
    pub async fn reconcile_appointment_payment(
        &self,
        transaction_id: &TransactionId,
        order: &AppointmentOrder,
        method: &str,
    ) -> Result<ReconcileRecord, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if load_payment_by_transaction(&tx, transaction_id)?.is_some() {
            debug!(transaction_id = %transaction_id, "charge already recorded");
            return Ok(ReconcileRecord::AlreadyProcessed);
        }

        let held = match &order.appointment_id {
            Some(id) => load_appointment(&tx, id)?,
            None => None,
        };
        let held = match held {
            Some(apt) => Some(apt),
            None => find_pending(&tx, order.slot_id, &order.patient_id)?,
        };

        let mut appointment = match held {
            Some(apt) => apt,
            None => {
                // Gateway-initiated flow with no prior hold: materialize
                // under the same capacity guard as reserve.
                claim_seat(&tx, order.slot_id)?;
                let apt = NewAppointment {
                    slot_id: order.slot_id,
                    patient_id: order.patient_id.clone(),
                    date: order.appointment_date,
                    start_time: order.start_time,
                    duration_minutes: order.duration_minutes,
                    fee_cents: order.fee_cents,
                    reason: order.reason.clone(),
                }
                .into_pending();
                insert_appointment(&tx, &apt)?;
                apt
            }
        };

        if !mark_scheduled_paid(&tx, &appointment.id)? {
            // Not pending anymore: cancelled, completed, or paid under a
            // different charge. The money is captured; flag, don't guess.
            warn!(
                transaction_id = %transaction_id,
                appointment_id = %appointment.id,
                status = %appointment.status,
                "appointment no longer schedulable during reconciliation"
            );
            return Err(StoreError::NotSchedulable(
                appointment.id.clone(),
                appointment.status,
            ));
        }
        appointment.status = medley_model::AppointmentStatus::Scheduled;
        appointment.payment_status = PaymentStatus::Paid;

        let payment = Payment {
            id: PaymentId::mint(),
            amount_cents: order.fee_cents,
            method: method.to_string(),
            state: PaymentState::Completed,
            transaction_id: transaction_id.clone(),
            kind: PaymentKind::Appointment,
            appointment_id: Some(appointment.id.clone()),
            product_order_ref: None,
            patient_id: Some(order.patient_id.clone()),
        };
        if !insert_payment(&tx, &payment)? {
            // Lost the check-then-insert race; the winner committed the
            // full unit, so dropping this transaction converges both paths.
            return Ok(ReconcileRecord::AlreadyProcessed);
        }

        tx.commit()?;
        debug!(
            transaction_id = %transaction_id,
            appointment_id = %appointment.id,
            "reconciled appointment payment"
        );
        Ok(ReconcileRecord::Applied {
            appointment,
            payment,
        })
    }

    /// Product-order branch: same idempotency barrier, no slot writes.
    pub async fn record_product_payment(
        &self,
        transaction_id: &TransactionId,
        order: &ProductOrder,
        method: &str,
    ) -> Result<ReconcileRecord, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if load_payment_by_transaction(&tx, transaction_id)?.is_some() {
            return Ok(ReconcileRecord::AlreadyProcessed);
        }
        let payment = Payment {
            id: PaymentId::mint(),
            amount_cents: order.amount_cents,
            method: method.to_string(),
            state: PaymentState::Completed,
            transaction_id: transaction_id.clone(),
            kind: PaymentKind::Product,
            appointment_id: None,
            product_order_ref: Some(order.order_ref.clone()),
            patient_id: order.patient_id.clone(),
        };
        if !insert_payment(&tx, &payment)? {
            return Ok(ReconcileRecord::AlreadyProcessed);
        }
        tx.commit()?;
        Ok(ReconcileRecord::AppliedProduct { payment })
    }
}
