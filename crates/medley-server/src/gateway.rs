//! The hosted-payments provider port.
//!
//! Both reconciliation entry points go through [`CheckoutGateway`]: the
//! client-confirm path re-fetches session truth here instead of trusting
//! anything the browser sent, and checkout creation round-trips the
//! [`medley_model::OrderDetails`] union through session metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

pub const METADATA_ORDER_DETAILS: &str = "order_details";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentState {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    pub payment_state: SessionPaymentState,
    pub amount_total_cents: i64,
    /// Gateway-assigned charge id, present once the charge settles. The
    /// reconciliation transaction id falls back to the session id when the
    /// gateway has not issued one.
    pub payment_intent: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSession {
    #[must_use]
    pub fn transaction_ref(&self) -> &str {
        self.payment_intent.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionRequest {
    pub amount_cents: i64,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug)]
#[non_exhaustive]
pub enum GatewayError {
    SessionNotFound(String),
    Http(String),
    Decode(String),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "checkout session {id} not found"),
            Self::Http(msg) => write!(f, "gateway request failed: {msg}"),
            Self::Decode(msg) => write!(f, "gateway response decode failed: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    fn gateway_tag(&self) -> &'static str;

    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn fetch_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError>;
}

/// Wire shape shared by the REST adapter and the webhook event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub payment_status: String,
    pub amount_total: i64,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl WireSession {
    pub fn into_session(self) -> Result<CheckoutSession, GatewayError> {
        let payment_state = match self.payment_status.to_ascii_lowercase().as_str() {
            "paid" => SessionPaymentState::Paid,
            "unpaid" => SessionPaymentState::Unpaid,
            "no_payment_required" => SessionPaymentState::NoPaymentRequired,
            other => {
                return Err(GatewayError::Decode(format!(
                    "unknown payment_status '{other}'"
                )))
            }
        };
        Ok(CheckoutSession {
            id: self.id,
            url: self.url.unwrap_or_default(),
            payment_state,
            amount_total_cents: self.amount_total,
            payment_intent: self.payment_intent,
            metadata: self.metadata,
        })
    }
}

/// REST adapter for a hosted-payments provider.
pub struct HttpCheckoutGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct WireCreateSession<'a> {
    amount_total: i64,
    description: &'a str,
    success_url: &'a str,
    cancel_url: &'a str,
    metadata: &'a BTreeMap<String, String>,
}

impl HttpCheckoutGateway {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl CheckoutGateway for HttpCheckoutGateway {
    fn gateway_tag(&self) -> &'static str {
        "http"
    }

    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let body = WireCreateSession {
            amount_total: request.amount_cents,
            description: &request.description,
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
            metadata: &request.metadata,
        };
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GatewayError::Http(format!(
                "create session returned {}",
                response.status()
            )));
        }
        let wire: WireSession = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        wire.into_session()
    }

    async fn fetch_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/checkout/sessions/{session_id}",
                self.base_url
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::SessionNotFound(session_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(GatewayError::Http(format!(
                "fetch session returned {}",
                response.status()
            )));
        }
        let wire: WireSession = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        wire.into_session()
    }
}

/// In-process gateway for tests and local development.
pub struct FakeGateway {
    pub sessions: Mutex<HashMap<String, CheckoutSession>>,
    pub create_calls: AtomicU64,
    pub fetch_calls: AtomicU64,
    seed: AtomicU64,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            create_calls: AtomicU64::new(0),
            fetch_calls: AtomicU64::new(0),
            seed: AtomicU64::new(1),
        }
    }
}

impl FakeGateway {
    /// Marks a session as settled, as the real gateway would after the
    /// shopper pays. Returns the updated session for webhook fabrication.
    pub async fn complete_session(
        &self,
        session_id: &str,
        payment_intent: Option<&str>,
    ) -> Option<CheckoutSession> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(session_id)?;
        session.payment_state = SessionPaymentState::Paid;
        session.payment_intent = payment_intent.map(str::to_string);
        Some(session.clone())
    }
}

#[async_trait]
impl CheckoutGateway for FakeGateway {
    fn gateway_tag(&self) -> &'static str {
        "fake"
    }

    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        let n = self.seed.fetch_add(1, Ordering::Relaxed);
        let id = format!("cs_test_{n}");
        let session = CheckoutSession {
            id: id.clone(),
            url: format!("https://checkout.example/pay/{id}"),
            payment_state: SessionPaymentState::Unpaid,
            amount_total_cents: request.amount_cents,
            payment_intent: None,
            metadata: request.metadata,
        };
        self.sessions.lock().await.insert(id, session.clone());
        Ok(session)
    }

    async fn fetch_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))
    }
}
