use std::env;
use std::time::Duration;

/// Connection settings for the exam REST API.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Bearer credential supplied by the surrounding auth layer.
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Read `EXAM_API_BASE_URL`, `EXAM_API_TOKEN` and `EXAM_API_TIMEOUT_SECS`.
    ///
    /// Returns `None` when no base URL is configured.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an explicit variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let base_url = lookup("EXAM_API_BASE_URL")?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_token = lookup("EXAM_API_TOKEN").filter(|token| !token.trim().is_empty());
        let timeout_secs = lookup("EXAM_API_TIMEOUT_SECS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(Self::DEFAULT_TIMEOUT_SECS);
        Some(Self {
            base_url: base_url.trim().to_string(),
            api_token,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
