#![forbid(unsafe_code)]

use medley_core::{ExitCode, ENV_MEDLEY_DB_PATH, ENV_MEDLEY_LOG_LEVEL};
use medley_server::{
    build_router, ApiConfig, AppState, BookingStore, CheckoutGateway, FakeGateway,
    HttpCheckoutGateway,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn load_config() -> ApiConfig {
    let defaults = ApiConfig::default();
    ApiConfig {
        max_body_bytes: env_usize("MEDLEY_MAX_BODY_BYTES", defaults.max_body_bytes),
        request_timeout: env_duration_ms("MEDLEY_REQUEST_TIMEOUT_MS", 10_000),
        booking_window_days: env_u32("MEDLEY_BOOKING_WINDOW_DAYS", defaults.booking_window_days),
        webhook_secret: env_opt("MEDLEY_WEBHOOK_SECRET"),
        webhook_max_skew_secs: env_u64(
            "MEDLEY_WEBHOOK_MAX_SKEW_SECS",
            defaults.webhook_max_skew_secs,
        ),
        default_payment_method: env::var("MEDLEY_PAYMENT_METHOD")
            .unwrap_or(defaults.default_payment_method),
        gateway_base_url: env_opt("MEDLEY_GATEWAY_BASE_URL"),
        gateway_api_key: env_opt("MEDLEY_GATEWAY_API_KEY"),
    }
}

fn build_gateway(api: &ApiConfig) -> Arc<dyn CheckoutGateway> {
    match (&api.gateway_base_url, &api.gateway_api_key) {
        (Some(base_url), Some(api_key)) => Arc::new(HttpCheckoutGateway::new(
            reqwest::Client::new(),
            base_url,
            api_key,
        )),
        _ => {
            warn!("MEDLEY_GATEWAY_BASE_URL/API_KEY unset; using in-process fake gateway");
            Arc::new(FakeGateway::default())
        }
    }
}

async fn run() -> Result<(), String> {
    let api = load_config();
    if api.webhook_secret.is_none() {
        warn!("MEDLEY_WEBHOOK_SECRET unset; all webhook deliveries will be rejected");
    }

    let db_path = env::var(ENV_MEDLEY_DB_PATH).unwrap_or_else(|_| "medley.sqlite".to_string());
    let store = BookingStore::open(&PathBuf::from(&db_path))
        .map_err(|e| format!("open store at {db_path}: {e}"))?;
    let gateway = build_gateway(&api);
    let state = AppState::with_config(store, gateway, api);

    let bind = env::var("MEDLEY_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|e| format!("bind {bind}: {e}"))?;
    info!(%bind, db = %db_path, "medley-server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .map_err(|e| format!("server error: {e}"))
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_env(ENV_MEDLEY_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    if let Err(message) = run().await {
        error!(%message, "fatal");
        std::process::exit(ExitCode::DependencyFailure as i32);
    }
}
