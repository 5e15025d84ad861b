// SPDX-License-Identifier: Apache-2.0

use crate::ids::{AppointmentId, PatientId, PaymentId, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Completed,
    Pending,
    Failed,
}

impl PaymentState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }

    /// Gateways are inconsistent about casing; accept any.
    pub fn parse(raw: &str) -> Result<Self, UnknownPaymentState> {
        match raw.to_ascii_lowercase().as_str() {
            "completed" => Ok(Self::Completed),
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            _ => Err(UnknownPaymentState(raw.to_string())),
        }
    }
}

impl Display for PaymentState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPaymentState(pub String);

impl Display for UnknownPaymentState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown payment state: {}", self.0)
    }
}

impl std::error::Error for UnknownPaymentState {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Appointment,
    Product,
}

impl PaymentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Appointment => "appointment",
            Self::Product => "product",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, UnknownPaymentState> {
        match raw {
            "appointment" => Ok(Self::Appointment),
            "product" => Ok(Self::Product),
            _ => Err(UnknownPaymentState(raw.to_string())),
        }
    }
}

impl Display for PaymentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One successfully recorded charge. Immutable once written; amendments
/// (refunds) are new rows elsewhere.
///
/// `transaction_id` is unique across all payments: it is the idempotency
/// key that suppresses duplicate recording when the confirm and webhook
/// paths race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Payment {
    pub id: PaymentId,
    pub amount_cents: i64,
    pub method: String,
    pub state: PaymentState,
    pub transaction_id: TransactionId,
    pub kind: PaymentKind,
    pub appointment_id: Option<AppointmentId>,
    pub product_order_ref: Option<String>,
    pub patient_id: Option<PatientId>,
}

impl Payment {
    /// A payment references exactly one of an appointment or a product
    /// order, matching its kind.
    pub fn check_reference(&self) -> Result<(), UnknownPaymentState> {
        let ok = match self.kind {
            PaymentKind::Appointment => {
                self.appointment_id.is_some() && self.product_order_ref.is_none()
            }
            PaymentKind::Product => {
                self.appointment_id.is_none() && self.product_order_ref.is_some()
            }
        };
        if ok {
            Ok(())
        } else {
            Err(UnknownPaymentState(format!(
                "payment {} does not reference exactly one {} order",
                self.id, self.kind
            )))
        }
    }
}
