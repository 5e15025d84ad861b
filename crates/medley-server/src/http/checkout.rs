//! Checkout session creation and the client-confirm reconciliation path.
//!
//! Confirm never trusts the browser: it takes a session id, re-fetches the
//! session from the gateway, and derives the transaction id and order
//! context from that server-side truth with the same extraction the
//! webhook uses.

use crate::gateway::{CreateSessionRequest, GatewayError, SessionPaymentState};
use crate::http::handlers::{api_error_response, internal_error, store_error_response};
use crate::services::reconciliation::extract_order;
use crate::services::ReconcileError;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use medley_api::{
    ApiError, ApiErrorCode, CheckoutSessionResponseDto, ConfirmRequestDto,
    CreateCheckoutRequestDto, ReconcileResponseDto, API_VERSION,
};
use medley_model::{
    AppointmentId, AppointmentOrder, AppointmentStatus, OrderDetails, ProductOrder,
};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::warn;

fn gateway_error_response(err: &GatewayError, request_id: &str) -> Response {
    match err {
        GatewayError::SessionNotFound(id) => api_error_response(ApiError::new(
            ApiErrorCode::SessionNotFound,
            "checkout session not found",
            json!({"session_id": id}),
            request_id,
        )),
        other => {
            warn!(%request_id, error = %other, "gateway call failed");
            api_error_response(ApiError::new(
                ApiErrorCode::GatewayUnavailable,
                "payment gateway unavailable",
                json!({}),
                request_id,
            ))
        }
    }
}

/// Builds the order context for a checkout. Appointment fees and schedule
/// details come from the held appointment row, never from the request.
async fn order_for_checkout(
    state: &AppState,
    request: &CreateCheckoutRequestDto,
) -> Result<OrderDetails, Response> {
    let request_id = state.next_request_id();
    match (&request.appointment_id, &request.product_order_ref) {
        (Some(raw_id), None) => {
            let id = AppointmentId::parse(raw_id).map_err(|e| {
                api_error_response(
                    ApiError::invalid_param("appointment_id", &e.to_string())
                        .with_request_id(&request_id),
                )
            })?;
            let appointment = state
                .store
                .get_appointment(&id)
                .await
                .map_err(|e| store_error_response(&e, &request_id))?;
            if appointment.status != AppointmentStatus::Pending {
                return Err(api_error_response(ApiError::new(
                    ApiErrorCode::ValidationFailed,
                    "appointment is not awaiting payment",
                    json!({"status": appointment.status.as_str()}),
                    &request_id,
                )));
            }
            Ok(OrderDetails::Appointment(AppointmentOrder {
                slot_id: appointment.slot_id,
                patient_id: appointment.patient_id.clone(),
                appointment_id: Some(appointment.id.clone()),
                appointment_date: appointment.date,
                start_time: appointment.start_time,
                duration_minutes: appointment.duration_minutes,
                reason: appointment.reason.clone(),
                fee_cents: appointment.fee_cents,
            }))
        }
        (None, Some(order_ref)) => {
            let amount = request.amount_cents.ok_or_else(|| {
                api_error_response(
                    ApiError::validation_failed(
                        json!([{"field": "amount_cents", "reason": "required for product orders"}]),
                    )
                    .with_request_id(&request_id),
                )
            })?;
            if amount <= 0 {
                return Err(api_error_response(
                    ApiError::validation_failed(
                        json!([{"field": "amount_cents", "reason": "must be positive"}]),
                    )
                    .with_request_id(&request_id),
                ));
            }
            Ok(OrderDetails::Product(ProductOrder {
                order_ref: order_ref.clone(),
                patient_id: None,
                amount_cents: amount,
            }))
        }
        _ => Err(api_error_response(
            ApiError::validation_failed(json!([{
                "reason": "exactly one of appointment_id or product_order_ref is required"
            }]))
            .with_request_id(&request_id),
        )),
    }
}

pub async fn create_checkout_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateCheckoutRequestDto>,
) -> Response {
    let request_id = state.next_request_id();
    let order = match order_for_checkout(&state, &request).await {
        Ok(order) => order,
        Err(response) => return response,
    };
    let metadata_value = match order.to_metadata() {
        Ok(value) => value,
        Err(e) => {
            warn!(%request_id, error = %e, "order details encode failed");
            return internal_error(&request_id, "order encode failed");
        }
    };
    let mut metadata = BTreeMap::new();
    metadata.insert(
        crate::gateway::METADATA_ORDER_DETAILS.to_string(),
        metadata_value,
    );

    let session = state
        .gateway
        .create_session(CreateSessionRequest {
            amount_cents: order.amount_cents(),
            description: order.describe(),
            success_url: request.success_url.clone(),
            cancel_url: request.cancel_url.clone(),
            metadata,
        })
        .await;
    match session {
        Ok(session) => (
            StatusCode::CREATED,
            Json(CheckoutSessionResponseDto {
                api_version: API_VERSION.to_string(),
                session_id: session.id,
                url: session.url,
            }),
        )
            .into_response(),
        Err(err) => gateway_error_response(&err, &request_id),
    }
}

pub async fn confirm_handler(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequestDto>,
) -> Response {
    let request_id = state.next_request_id();
    let session = match state.gateway.fetch_session(&request.session_id).await {
        Ok(session) => session,
        Err(err) => return gateway_error_response(&err, &request_id),
    };
    if session.payment_state != SessionPaymentState::Paid {
        return api_error_response(ApiError::new(
            ApiErrorCode::SessionNotPaid,
            "checkout session is not paid",
            json!({"session_id": session.id}),
            &request_id,
        ));
    }
    let (transaction_id, order) = match extract_order(&session) {
        Ok(pair) => pair,
        Err(reason) => {
            warn!(%request_id, session_id = %session.id, %reason, "session metadata rejected");
            return api_error_response(
                ApiError::validation_failed(json!([{"reason": reason}]))
                    .with_request_id(&request_id),
            );
        }
    };

    let reconcile = state.reconciliation.reconcile(
        &transaction_id,
        &order,
        &state.api.default_payment_method,
    );
    let outcome = match tokio::time::timeout(state.api.request_timeout, reconcile).await {
        Ok(outcome) => outcome,
        Err(_) => return internal_error(&request_id, "reconcile timed out"),
    };
    reconcile_response(outcome, &transaction_id, &request_id)
}

/// Shared terminal mapping for both reconciliation entry points.
pub(crate) fn reconcile_response(
    outcome: Result<crate::services::ReconcileOutcome, ReconcileError>,
    transaction_id: &medley_model::TransactionId,
    request_id: &str,
) -> Response {
    use crate::services::ReconcileOutcome;

    match outcome {
        Ok(outcome) => {
            let appointment = match &outcome {
                ReconcileOutcome::Scheduled { appointment, .. } => Some(appointment.clone()),
                _ => None,
            };
            Json(ReconcileResponseDto {
                api_version: API_VERSION.to_string(),
                outcome: outcome.tag().to_string(),
                transaction_id: transaction_id.to_string(),
                appointment,
            })
            .into_response()
        }
        Err(ReconcileError::Failed {
            transaction_id,
            context,
        }) => api_error_response(ApiError::new(
            ApiErrorCode::ReconciliationFailed,
            "payment captured but booking could not be completed",
            json!({
                "transaction_id": transaction_id.as_str(),
                "context": context,
                "follow_up": "manual refund or slot reassignment required",
            }),
            request_id,
        )),
        Err(ReconcileError::Store(err)) => {
            warn!(%request_id, error = %err, "reconciliation store failure");
            internal_error(request_id, "store failure")
        }
    }
}
