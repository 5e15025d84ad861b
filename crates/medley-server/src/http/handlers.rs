use crate::services::ReserveError;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use medley_api::{
    map_error, ApiError, ApiErrorCode, AppointmentResponseDto, ReserveRequestDto,
    SlotsResponseDto, API_VERSION,
};
use medley_model::{AppointmentId, NewSlot};
use medley_store::{SlotFilter, StoreError};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

pub(crate) fn api_error_response(err: ApiError) -> Response {
    let status = StatusCode::from_u16(map_error(&err).status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"error": err}))).into_response()
}

pub(crate) fn internal_error(request_id: &str, context: &str) -> Response {
    api_error_response(ApiError::new(
        ApiErrorCode::Internal,
        "internal error",
        json!({"context": context}),
        request_id,
    ))
}

pub(crate) fn store_error_response(err: &StoreError, request_id: &str) -> Response {
    match err {
        StoreError::SlotNotFound(id) => {
            api_error_response(ApiError::slot_not_found(id.as_i64()).with_request_id(request_id))
        }
        StoreError::SlotUnavailable(id) => {
            api_error_response(ApiError::slot_unavailable(id.as_i64()).with_request_id(request_id))
        }
        StoreError::AppointmentNotFound(id) => api_error_response(ApiError::new(
            ApiErrorCode::AppointmentNotFound,
            "appointment not found",
            json!({"appointment_id": id.as_str()}),
            request_id,
        )),
        StoreError::NotCancellable(status) => api_error_response(ApiError::new(
            ApiErrorCode::AppointmentNotCancellable,
            "appointment cannot be cancelled",
            json!({"status": status.as_str()}),
            request_id,
        )),
        other => {
            warn!(%request_id, error = %other, "store failure");
            internal_error(request_id, "store failure")
        }
    }
}

pub async fn healthz_handler() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

pub async fn readyz_handler(State(state): State<AppState>) -> Response {
    // Readiness means the store answers; a torn-down database file should
    // flip the probe, not the first user request.
    match state.store.list_payments().await {
        Ok(_) => Json(json!({"ready": true})).into_response(),
        Err(err) => {
            warn!(error = %err, "readiness probe failed");
            let err = ApiError::new(
                ApiErrorCode::NotReady,
                "store unavailable",
                json!({}),
                "req-unknown",
            );
            api_error_response(err)
        }
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.metrics.render_text().into_response()
}

pub async fn version_handler() -> Response {
    Json(json!({
        "name": "medley-server",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": API_VERSION,
    }))
    .into_response()
}

pub async fn list_slots_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let request_id = state.next_request_id();
    let query: BTreeMap<String, String> = query.into_iter().collect();
    let params = match medley_api::parse_list_slots_params(&query) {
        Ok(params) => params,
        Err(err) => return api_error_response(err.with_request_id(&request_id)),
    };
    let filter = SlotFilter {
        date: params.date,
        show_all: params.show_all,
        today: chrono::Utc::now().date_naive(),
        window_days: state.api.booking_window_days,
    };
    match state.store.list_available(&filter).await {
        Ok(slots) => Json(SlotsResponseDto {
            api_version: API_VERSION.to_string(),
            slots,
        })
        .into_response(),
        Err(err) => store_error_response(&err, &request_id),
    }
}

/// Admin slot creation; the caller is authenticated as admin by the
/// deployment's front door.
pub async fn create_slot_handler(
    State(state): State<AppState>,
    Json(new_slot): Json<NewSlot>,
) -> Response {
    let request_id = state.next_request_id();
    if let Err(err) = new_slot.validate() {
        return api_error_response(
            ApiError::validation_failed(json!([{"reason": err.to_string()}]))
                .with_request_id(&request_id),
        );
    }
    match state.store.create_slot(&new_slot).await {
        Ok(slot) => (StatusCode::CREATED, Json(json!({"slot": slot}))).into_response(),
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub async fn reserve_handler(
    State(state): State<AppState>,
    Json(request): Json<ReserveRequestDto>,
) -> Response {
    let request_id = state.next_request_id();
    let today = chrono::Utc::now().date_naive();
    let reserve = state.reservations.reserve(&request, today);
    let outcome = match tokio::time::timeout(state.api.request_timeout, reserve).await {
        Ok(outcome) => outcome,
        Err(_) => return internal_error(&request_id, "reserve timed out"),
    };
    match outcome {
        Ok(appointment) => {
            state.metrics.bump_reservations();
            (
                StatusCode::CREATED,
                Json(AppointmentResponseDto {
                    api_version: API_VERSION.to_string(),
                    appointment,
                }),
            )
                .into_response()
        }
        Err(err) => {
            state.metrics.bump_reservations_rejected();
            reserve_error_response(err, &request_id)
        }
    }
}

fn reserve_error_response(err: ReserveError, request_id: &str) -> Response {
    match err {
        ReserveError::SlotNotFound(id) => {
            api_error_response(ApiError::slot_not_found(id.as_i64()).with_request_id(request_id))
        }
        ReserveError::SlotUnavailable(id) => {
            api_error_response(ApiError::slot_unavailable(id.as_i64()).with_request_id(request_id))
        }
        ReserveError::InvalidDate(raw) => {
            api_error_response(ApiError::invalid_date(&raw).with_request_id(request_id))
        }
        ReserveError::Validation { field, reason } => api_error_response(
            ApiError::validation_failed(json!([{"field": field, "reason": reason}]))
                .with_request_id(request_id),
        ),
        ReserveError::Store(err) => store_error_response(&err, request_id),
    }
}

pub async fn get_appointment_handler(
    State(state): State<AppState>,
    Path(appointment_id): Path<String>,
) -> Response {
    let request_id = state.next_request_id();
    let id = match AppointmentId::parse(&appointment_id) {
        Ok(id) => id,
        Err(e) => {
            return api_error_response(
                ApiError::invalid_param("appointment_id", &e.to_string())
                    .with_request_id(&request_id),
            )
        }
    };
    match state.store.get_appointment(&id).await {
        Ok(appointment) => Json(AppointmentResponseDto {
            api_version: API_VERSION.to_string(),
            appointment,
        })
        .into_response(),
        Err(err) => store_error_response(&err, &request_id),
    }
}

pub async fn cancel_appointment_handler(
    State(state): State<AppState>,
    Path(appointment_id): Path<String>,
) -> Response {
    let request_id = state.next_request_id();
    let id = match AppointmentId::parse(&appointment_id) {
        Ok(id) => id,
        Err(e) => {
            return api_error_response(
                ApiError::invalid_param("appointment_id", &e.to_string())
                    .with_request_id(&request_id),
            )
        }
    };
    let cancel = state.store.cancel_appointment(&id);
    let outcome = match tokio::time::timeout(state.api.request_timeout, cancel).await {
        Ok(outcome) => outcome,
        Err(_) => return internal_error(&request_id, "cancel timed out"),
    };
    match outcome {
        Ok(appointment) => Json(AppointmentResponseDto {
            api_version: API_VERSION.to_string(),
            appointment,
        })
        .into_response(),
        Err(err) => store_error_response(&err, &request_id),
    }
}
