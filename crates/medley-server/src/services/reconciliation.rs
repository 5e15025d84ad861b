//! Converges a settled gateway charge with local state exactly once.
//!
//! Two racing triggers call [`ReconciliationService::reconcile`] with
//! logically the same intent: the client-confirm endpoint after redirect
//! back, and the gateway webhook (at-least-once, any order, possibly
//! both). Both are thin adapters; the convergence itself happens in the
//! store's reconciliation transaction, keyed by the gateway transaction
//! id.

use crate::gateway::CheckoutSession;
use crate::telemetry::RequestMetrics;
use medley_model::{Appointment, OrderDetails, Payment, TransactionId};
use medley_store::{BookingStore, ReconcileRecord, StoreError};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Exactly this call scheduled the appointment and recorded the charge.
    Scheduled {
        appointment: Appointment,
        payment: Payment,
    },
    /// Product-order charge recorded.
    RecordedProductPayment { payment: Payment },
    /// The charge was recorded previously; both triggers treat this as
    /// success.
    AlreadyProcessed,
}

#[derive(Debug)]
#[non_exhaustive]
pub enum ReconcileError {
    /// Money captured at the gateway, booking impossible locally (slot
    /// filled or appointment no longer pending). Requires manual refund or
    /// slot reassignment; retrying cannot help.
    Failed {
        transaction_id: TransactionId,
        context: String,
    },
    Store(StoreError),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed {
                transaction_id,
                context,
            } => write!(
                f,
                "reconciliation failed for {transaction_id}: {context}"
            ),
            Self::Store(err) => write!(f, "store failure: {err}"),
        }
    }
}

impl std::error::Error for ReconcileError {}

/// Extracts the `(transaction id, order context)` pair from a gateway
/// session. Shared by the confirm and webhook entry points so both derive
/// identical keys from the same underlying session.
pub fn extract_order(
    session: &CheckoutSession,
) -> Result<(TransactionId, OrderDetails), String> {
    let transaction_id = TransactionId::parse(session.transaction_ref())
        .map_err(|e| format!("transaction id: {e}"))?;
    let raw = session
        .metadata
        .get(crate::gateway::METADATA_ORDER_DETAILS)
        .ok_or_else(|| "metadata is missing order_details".to_string())?;
    let order = OrderDetails::from_metadata(raw).map_err(|e| e.to_string())?;
    Ok((transaction_id, order))
}

#[derive(Clone)]
pub struct ReconciliationService {
    store: BookingStore,
    metrics: Arc<RequestMetrics>,
}

impl ReconciliationService {
    #[must_use]
    pub fn new(store: BookingStore, metrics: Arc<RequestMetrics>) -> Self {
        Self { store, metrics }
    }

    pub async fn reconcile(
        &self,
        transaction_id: &TransactionId,
        order: &OrderDetails,
        method: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let record = match order {
            OrderDetails::Appointment(order) => {
                self.store
                    .reconcile_appointment_payment(transaction_id, order, method)
                    .await
            }
            OrderDetails::Product(order) => {
                self.store
                    .record_product_payment(transaction_id, order, method)
                    .await
            }
        };

        match record {
            Ok(ReconcileRecord::Applied {
                appointment,
                payment,
            }) => {
                self.metrics.bump_reconcile_applied();
                info!(
                    transaction_id = %transaction_id,
                    appointment_id = %appointment.id,
                    "charge reconciled, appointment scheduled"
                );
                Ok(ReconcileOutcome::Scheduled {
                    appointment,
                    payment,
                })
            }
            Ok(ReconcileRecord::AppliedProduct { payment }) => {
                self.metrics.bump_reconcile_applied();
                info!(transaction_id = %transaction_id, "product charge recorded");
                Ok(ReconcileOutcome::RecordedProductPayment { payment })
            }
            Ok(ReconcileRecord::AlreadyProcessed) => {
                self.metrics.bump_reconcile_duplicate();
                info!(transaction_id = %transaction_id, "charge already processed");
                Ok(ReconcileOutcome::AlreadyProcessed)
            }
            Err(
                err @ (StoreError::SlotUnavailable(_)
                | StoreError::SlotNotFound(_)
                | StoreError::NotSchedulable(_, _)),
            ) => {
                self.metrics.bump_reconcile_failed();
                // Loud on purpose: money is held at the gateway with no
                // booking to show for it. This log line is the handle for
                // the manual refund/reassignment follow-up.
                error!(
                    transaction_id = %transaction_id,
                    order = %order.describe(),
                    cause = %err,
                    "reconciliation failed: payment captured but booking impossible"
                );
                Err(ReconcileError::Failed {
                    transaction_id: transaction_id.clone(),
                    context: err.to_string(),
                })
            }
            Err(err) => Err(ReconcileError::Store(err)),
        }
    }
}

impl ReconcileOutcome {
    /// Stable tag used in response bodies and log lines.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Scheduled { .. } => "scheduled",
            Self::RecordedProductPayment { .. } => "recorded",
            Self::AlreadyProcessed => "already_processed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SessionPaymentState;
    use chrono::{NaiveDate, NaiveTime};
    use medley_model::{AppointmentOrder, NewSlot, PatientId, SlotId};
    use std::collections::BTreeMap;

    async fn service_with_slot(capacity: u32) -> (ReconciliationService, BookingStore, SlotId) {
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
        let service =
            ReconciliationService::new(store.clone(), Arc::new(RequestMetrics::default()));
        (service, store, slot.id)
    }

    fn order(slot_id: SlotId) -> OrderDetails {
        OrderDetails::Appointment(AppointmentOrder {
            slot_id,
            patient_id: PatientId::parse("p1").expect("patient id"),
            appointment_id: None,
            appointment_date: NaiveDate::from_ymd_opt(2026, 9, 1).expect("date"),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
            duration_minutes: 30,
            reason: "checkup".to_string(),
            fee_cents: 5000,
        })
    }

    fn tx(raw: &str) -> TransactionId {
        TransactionId::parse(raw).expect("transaction id")
    }

    #[tokio::test]
    async fn both_orders_of_the_racing_triggers_converge() {
        let (service, store, slot_id) = service_with_slot(1).await;
        let order = order(slot_id);

        // Webhook first, confirm second.
        let first = service.reconcile(&tx("tx_1"), &order, "card").await.expect("first");
        assert!(matches!(first, ReconcileOutcome::Scheduled { .. }));
        let second = service.reconcile(&tx("tx_1"), &order, "card").await.expect("second");
        assert_eq!(second, ReconcileOutcome::AlreadyProcessed);

        assert_eq!(store.list_payments().await.expect("payments").len(), 1);
        let slot = store.get_slot(slot_id).await.expect("slot");
        assert_eq!(slot.booked_count, 1);
    }

    #[tokio::test]
    async fn concurrent_triggers_produce_one_payment_row() {
        let (service, store, slot_id) = service_with_slot(1).await;
        let order = order(slot_id);

        let a = tokio::spawn({
            let service = service.clone();
            let order = order.clone();
            async move { service.reconcile(&tx("tx_c"), &order, "card").await }
        });
        let b = tokio::spawn({
            let service = service.clone();
            let order = order.clone();
            async move { service.reconcile(&tx("tx_c"), &order, "card").await }
        });
        let (a, b) = (a.await.expect("join"), b.await.expect("join"));

        let scheduled = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Ok(ReconcileOutcome::Scheduled { .. })))
            .count();
        let duplicates = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Ok(ReconcileOutcome::AlreadyProcessed)))
            .count();
        assert_eq!((scheduled, duplicates), (1, 1), "confluent outcome");
        assert_eq!(store.list_payments().await.expect("payments").len(), 1);
    }

    #[tokio::test]
    async fn filled_slot_surfaces_as_reconciliation_failure() {
        let (service, store, slot_id) = service_with_slot(1).await;
        store
            .reserve(medley_model::NewAppointment {
                slot_id,
                patient_id: PatientId::parse("rival").expect("patient id"),
                date: NaiveDate::from_ymd_opt(2026, 9, 1).expect("date"),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
                duration_minutes: 30,
                fee_cents: 5000,
                reason: "checkup".to_string(),
            })
            .await
            .expect("rival takes the seat");

        let err = service.reconcile(&tx("tx_f"), &order(slot_id), "card").await;
        assert!(matches!(err, Err(ReconcileError::Failed { .. })));
        assert!(store.list_payments().await.expect("payments").is_empty());
    }

    #[test]
    fn extraction_derives_identical_keys_for_both_entry_points() {
        let order = order(SlotId::new(5));
        let mut metadata = BTreeMap::new();
        metadata.insert(
            crate::gateway::METADATA_ORDER_DETAILS.to_string(),
            order.to_metadata().expect("encode"),
        );
        let session = CheckoutSession {
            id: "cs_1".to_string(),
            url: String::new(),
            payment_state: SessionPaymentState::Paid,
            amount_total_cents: 5000,
            payment_intent: Some("pi_77".to_string()),
            metadata,
        };

        let (tx_id, decoded) = extract_order(&session).expect("extract");
        assert_eq!(tx_id, tx("pi_77"));
        assert_eq!(decoded, order);

        // Without a charge id the session id is the idempotency key.
        let mut bare = session.clone();
        bare.payment_intent = None;
        let (tx_id, _) = extract_order(&bare).expect("extract");
        assert_eq!(tx_id, tx("cs_1"));
    }

    #[test]
    fn extraction_rejects_missing_or_malformed_metadata() {
        let session = CheckoutSession {
            id: "cs_1".to_string(),
            url: String::new(),
            payment_state: SessionPaymentState::Paid,
            amount_total_cents: 5000,
            payment_intent: None,
            metadata: BTreeMap::new(),
        };
        assert!(extract_order(&session).is_err());

        let mut mangled = session.clone();
        mangled.metadata.insert(
            crate::gateway::METADATA_ORDER_DETAILS.to_string(),
            "{not json".to_string(),
        );
        assert!(extract_order(&mangled).is_err());
    }
}
