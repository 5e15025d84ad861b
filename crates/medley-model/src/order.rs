// SPDX-License-Identifier: Apache-2.0

use crate::ids::{AppointmentId, PatientId, SlotId};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The order context round-tripped through gateway `metadata`.
///
/// This is the sole linkage between a charge and the domain order it pays
/// for, so it is parsed strictly at every boundary crossing — the webhook
/// and the client-confirm path both decode the same bytes the checkout
/// session was created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrderDetails {
    Appointment(AppointmentOrder),
    Product(ProductOrder),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppointmentOrder {
    pub slot_id: SlotId,
    pub patient_id: PatientId,
    /// Present when the seat was already held before checkout
    /// (reserve-before-pay); absent for gateway-initiated flows where
    /// reconciliation must materialize the appointment itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<AppointmentId>,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub reason: String,
    pub fee_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductOrder {
    pub order_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDecodeError(pub String);

impl Display for OrderDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "order details decode failed: {}", self.0)
    }
}

impl std::error::Error for OrderDecodeError {}

impl OrderDetails {
    /// Serializes for the gateway metadata map. Metadata values are opaque
    /// strings on the wire, so the union travels as one JSON-encoded value.
    pub fn to_metadata(&self) -> Result<String, OrderDecodeError> {
        serde_json::to_string(self).map_err(|e| OrderDecodeError(e.to_string()))
    }

    pub fn from_metadata(raw: &str) -> Result<Self, OrderDecodeError> {
        serde_json::from_str(raw).map_err(|e| OrderDecodeError(e.to_string()))
    }

    #[must_use]
    pub fn amount_cents(&self) -> i64 {
        match self {
            Self::Appointment(order) => order.fee_cents,
            Self::Product(order) => order.amount_cents,
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Appointment(order) => format!(
                "appointment {} {} ({} min)",
                order.appointment_date, order.start_time, order.duration_minutes
            ),
            Self::Product(order) => format!("product order {}", order.order_ref),
        }
    }
}
