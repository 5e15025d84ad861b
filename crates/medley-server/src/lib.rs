#![forbid(unsafe_code)]

//! The medley booking service: axum handlers over the SQLite store, with
//! the reservation and reconciliation services as the only write paths.

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod config;
pub mod gateway;
pub mod http;
pub mod services;
pub mod telemetry;

pub use config::ApiConfig;
pub use gateway::{
    CheckoutGateway, CheckoutSession, CreateSessionRequest, FakeGateway, GatewayError,
    HttpCheckoutGateway, SessionPaymentState,
};
pub use medley_store::BookingStore;
pub use services::{
    ReconcileError, ReconcileOutcome, ReconciliationService, ReservationService, ReserveError,
};
pub use telemetry::RequestMetrics;

pub const CRATE_NAME: &str = "medley-server";

#[derive(Clone)]
pub struct AppState {
    pub store: BookingStore,
    pub gateway: Arc<dyn CheckoutGateway>,
    pub reservations: ReservationService,
    pub reconciliation: ReconciliationService,
    pub metrics: Arc<RequestMetrics>,
    pub api: ApiConfig,
    request_id_seed: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(store: BookingStore, gateway: Arc<dyn CheckoutGateway>) -> Self {
        Self::with_config(store, gateway, ApiConfig::default())
    }

    #[must_use]
    pub fn with_config(
        store: BookingStore,
        gateway: Arc<dyn CheckoutGateway>,
        api: ApiConfig,
    ) -> Self {
        let metrics = Arc::new(RequestMetrics::default());
        Self {
            reservations: ReservationService::new(store.clone()),
            reconciliation: ReconciliationService::new(store.clone(), Arc::clone(&metrics)),
            store,
            gateway,
            metrics,
            api,
            request_id_seed: Arc::new(AtomicU64::new(1)),
        }
    }

    #[must_use]
    pub fn next_request_id(&self) -> String {
        format!("req-{}", self.request_id_seed.fetch_add(1, Ordering::Relaxed))
    }
}

async fn request_metrics_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    state.metrics.bump_requests();
    next.run(req).await
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(http::handlers::healthz_handler))
        .route("/readyz", get(http::handlers::readyz_handler))
        .route("/metrics", get(http::handlers::metrics_handler))
        .route("/v1/version", get(http::handlers::version_handler))
        .route(
            "/v1/slots",
            get(http::handlers::list_slots_handler).post(http::handlers::create_slot_handler),
        )
        .route("/v1/appointments", post(http::handlers::reserve_handler))
        .route(
            "/v1/appointments/:appointment_id",
            get(http::handlers::get_appointment_handler),
        )
        .route(
            "/v1/appointments/:appointment_id/cancel",
            post(http::handlers::cancel_appointment_handler),
        )
        .route(
            "/v1/checkout/sessions",
            post(http::checkout::create_checkout_handler),
        )
        .route("/v1/checkout/confirm", post(http::checkout::confirm_handler))
        .route("/v1/webhooks/checkout", post(http::webhook::webhook_handler))
        .layer(from_fn_with_state(state.clone(), request_metrics_middleware))
        .layer(DefaultBodyLimit::max(state.api.max_body_bytes))
        .with_state(state)
}
