// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    ValidationFailed,
    InvalidParameter,
    InvalidDate,
    SlotNotFound,
    SlotUnavailable,
    AppointmentNotFound,
    AppointmentNotCancellable,
    SessionNotPaid,
    SessionNotFound,
    ReconciliationFailed,
    SignatureInvalid,
    GatewayUnavailable,
    NotReady,
    Internal,
}

impl ApiErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "validation_failed",
            Self::InvalidParameter => "invalid_parameter",
            Self::InvalidDate => "invalid_date",
            Self::SlotNotFound => "slot_not_found",
            Self::SlotUnavailable => "slot_unavailable",
            Self::AppointmentNotFound => "appointment_not_found",
            Self::AppointmentNotCancellable => "appointment_not_cancellable",
            Self::SessionNotPaid => "session_not_paid",
            Self::SessionNotFound => "session_not_found",
            Self::ReconciliationFailed => "reconciliation_failed",
            Self::SignatureInvalid => "signature_invalid",
            Self::GatewayUnavailable => "gateway_unavailable",
            Self::NotReady => "not_ready",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
    pub request_id: String,
}

impl ApiError {
    #[must_use]
    pub fn new(
        code: ApiErrorCode,
        message: impl Into<String>,
        details: Value,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            request_id: request_id.into(),
        }
    }

    #[must_use]
    pub fn invalid_param(name: &str, value: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidParameter,
            format!("invalid parameter: {name}"),
            json!({"field_errors":[{"parameter": name, "reason": "invalid", "value": value}]}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn validation_failed(field_errors: Value) -> Self {
        Self::new(
            ApiErrorCode::ValidationFailed,
            "validation failed",
            json!({"field_errors": field_errors}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn invalid_date(value: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidDate,
            "invalid appointment date",
            json!({"value": value}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn slot_not_found(slot_id: i64) -> Self {
        Self::new(
            ApiErrorCode::SlotNotFound,
            "slot not found",
            json!({"slot_id": slot_id}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn slot_unavailable(slot_id: i64) -> Self {
        Self::new(
            ApiErrorCode::SlotUnavailable,
            "slot is at capacity or disabled",
            json!({"slot_id": slot_id}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = request_id.to_string();
        self
    }
}

const _: fn() = || {
    fn assert_traits<T: Serialize + for<'de> Deserialize<'de>>() {}
    assert_traits::<ApiErrorCode>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_serialize_as_snake_case() {
        let raw = serde_json::to_string(&ApiErrorCode::SlotUnavailable).expect("json");
        assert_eq!(raw, "\"slot_unavailable\"");
        assert_eq!(
            ApiErrorCode::ReconciliationFailed.as_str(),
            "reconciliation_failed"
        );
    }

    #[test]
    fn invalid_param_carries_field_errors() {
        let err = ApiError::invalid_param("date", "not-a-date").with_request_id("req-9");
        assert_eq!(err.code, ApiErrorCode::InvalidParameter);
        assert_eq!(err.request_id, "req-9");
        assert_eq!(
            err.details["field_errors"][0]["parameter"],
            Value::from("date")
        );
    }
}
