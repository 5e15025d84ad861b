// SPDX-License-Identifier: Apache-2.0

use crate::{ApiError, ApiErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiErrorMapping {
    pub status_code: u16,
}

/// Deterministic code → status mapping; handlers never pick status codes
/// ad hoc.
#[must_use]
pub fn map_error(error: &ApiError) -> ApiErrorMapping {
    let status_code = match error.code {
        ApiErrorCode::ValidationFailed
        | ApiErrorCode::InvalidParameter
        | ApiErrorCode::InvalidDate => 400,
        ApiErrorCode::SignatureInvalid => 401,
        ApiErrorCode::SlotNotFound
        | ApiErrorCode::AppointmentNotFound
        | ApiErrorCode::SessionNotFound => 404,
        ApiErrorCode::SlotUnavailable
        | ApiErrorCode::AppointmentNotCancellable
        | ApiErrorCode::SessionNotPaid
        | ApiErrorCode::ReconciliationFailed => 409,
        ApiErrorCode::GatewayUnavailable => 502,
        ApiErrorCode::NotReady => 503,
        ApiErrorCode::Internal => 500,
    };

    ApiErrorMapping { status_code }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contention_maps_to_conflict_and_security_to_unauthorized() {
        let unavailable = ApiError::slot_unavailable(1);
        assert_eq!(map_error(&unavailable).status_code, 409);

        let sig = ApiError::new(
            ApiErrorCode::SignatureInvalid,
            "bad signature",
            json!({}),
            "req-unknown",
        );
        assert_eq!(map_error(&sig).status_code, 401);
    }

    #[test]
    fn reconciliation_failure_is_not_a_generic_500() {
        let err = ApiError::new(
            ApiErrorCode::ReconciliationFailed,
            "payment captured but booking impossible",
            json!({"transaction_id": "tx_1"}),
            "req-unknown",
        );
        let mapping = map_error(&err);
        assert_ne!(mapping.status_code, 500);
        assert_eq!(mapping.status_code, 409);
    }
}
