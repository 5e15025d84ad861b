// SPDX-License-Identifier: Apache-2.0

use medley_model::{Appointment, SlotSummary};
use serde::{Deserialize, Serialize};

/// Reservation API request body. Dates and times arrive as strings and are
/// validated in the handler so a bad value maps to a field-level error
/// rather than a bare deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReserveRequestDto {
    pub slot_id: i64,
    pub patient_id: String,
    pub appointment_date: String,
    pub start_time: String,
    pub duration_minutes: u32,
    pub reason: String,
    pub fee_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppointmentResponseDto {
    pub api_version: String,
    pub appointment: Appointment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotsResponseDto {
    pub api_version: String,
    pub slots: Vec<SlotSummary>,
}

/// Requests a hosted checkout session for an order already known to the
/// system (reserve-before-pay), or a product order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCheckoutRequestDto {
    pub appointment_id: Option<String>,
    pub product_order_ref: Option<String>,
    /// Required for product orders; appointment fees come from the held
    /// appointment, never from the client.
    pub amount_cents: Option<i64>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutSessionResponseDto {
    pub api_version: String,
    pub session_id: String,
    pub url: String,
}

/// Client-confirm request after redirect back from the gateway. Only the
/// session id is trusted; everything else is re-fetched server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmRequestDto {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileResponseDto {
    pub api_version: String,
    pub outcome: String,
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment: Option<Appointment>,
}
