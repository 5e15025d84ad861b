#![allow(dead_code)]

use medley_server::{
    build_router, ApiConfig, AppState, BookingStore, CheckoutSession, FakeGateway, RequestMetrics,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const WEBHOOK_SECRET: &str = "whsec_contract_tests";

pub struct TestServer {
    pub addr: SocketAddr,
    pub gateway: Arc<FakeGateway>,
    pub store: BookingStore,
    pub metrics: Arc<RequestMetrics>,
}

impl TestServer {
    pub fn metrics_failed_total(&self) -> u64 {
        self.metrics.reconcile_failed_total()
    }
}

pub async fn spawn_server(api: ApiConfig) -> TestServer {
    let store = BookingStore::open_in_memory().expect("open store");
    let gateway = Arc::new(FakeGateway::default());
    let state = AppState::with_config(store.clone(), gateway.clone(), api);
    let metrics = Arc::clone(&state.metrics);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state))
            .await
            .expect("serve");
    });
    TestServer {
        addr,
        gateway,
        store,
        metrics,
    }
}

pub async fn spawn_default_server() -> TestServer {
    spawn_server(ApiConfig {
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        ..ApiConfig::default()
    })
    .await
}

/// Raw HTTP exchange so the tests exercise the real listener, not just the
/// router in isolation.
pub async fn send_raw(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> (u16, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if !body.is_empty() {
        req.push_str("Content-Type: application/json\r\n");
    }
    req.push_str(&format!("Content-Length: {}\r\n", body.len()));
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    req.push_str("\r\n");
    req.push_str(body);
    stream.write_all(req.as_bytes()).await.expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, payload) = response
        .split_once("\r\n\r\n")
        .expect("http response separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    (status, payload.to_string())
}

pub async fn get(addr: SocketAddr, path: &str) -> (u16, String) {
    send_raw(addr, "GET", path, &[], "").await
}

pub async fn post_json(addr: SocketAddr, path: &str, body: &str) -> (u16, String) {
    send_raw(addr, "POST", path, &[], body).await
}

pub fn sign_webhook(secret: &str, body: &str) -> String {
    let ts = chrono::Utc::now().timestamp();
    let mut payload = Vec::new();
    payload.extend_from_slice(ts.to_string().as_bytes());
    payload.push(b'.');
    payload.extend_from_slice(body.as_bytes());
    let mac = medley_core::hmac_sha256_hex(secret.as_bytes(), &payload).expect("hmac");
    format!("t={ts},v1={mac}")
}

/// The event envelope the gateway would deliver for a settled session.
pub fn completed_event_body(session: &CheckoutSession) -> String {
    serde_json::json!({
        "id": format!("evt_{}", session.id),
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session.id,
            "url": session.url,
            "payment_status": "paid",
            "amount_total": session.amount_total_cents,
            "payment_intent": session.payment_intent,
            "metadata": session.metadata,
        }}
    })
    .to_string()
}
