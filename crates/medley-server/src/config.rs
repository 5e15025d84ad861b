use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    /// Rolling future window for slot listings unless `show_all` is
    /// requested.
    pub booking_window_days: u32,
    /// Shared secret for webhook signatures. Unset means every webhook is
    /// rejected; the endpoint fails closed.
    pub webhook_secret: Option<String>,
    pub webhook_max_skew_secs: u64,
    pub default_payment_method: String,
    pub gateway_base_url: Option<String>,
    pub gateway_api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 64 * 1024,
            request_timeout: Duration::from_secs(10),
            booking_window_days: 30,
            webhook_secret: None,
            webhook_max_skew_secs: 300,
            default_payment_method: "card".to_string(),
            gateway_base_url: None,
            gateway_api_key: None,
        }
    }
}
