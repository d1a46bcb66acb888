//! Configuration for payment providers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use reportgate_types::DEFAULT_TOKEN_REFRESH_MARGIN;

use crate::error::{GatewayError, GatewayResult};

/// Which payment provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Paystack (static secret key)
    #[default]
    Paystack,
    /// Nomba (OAuth client credentials)
    Nomba,
}

impl ProviderKind {
    /// Get the provider name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paystack => "paystack",
            Self::Nomba => "nomba",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider selection plus per-provider credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Active provider
    pub provider: ProviderKind,
    /// Paystack settings
    pub paystack: PaystackConfig,
    /// Nomba settings
    pub nomba: NombaConfig,
}

impl GatewayConfig {
    /// Validate the settings of the active provider.
    pub fn validate(&self) -> GatewayResult<()> {
        match self.provider {
            ProviderKind::Paystack => self.paystack.validate(),
            ProviderKind::Nomba => self.nomba.validate(),
        }
    }
}

/// Paystack settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaystackConfig {
    /// API base URL
    pub base_url: String,
    /// Secret key sent as a bearer token
    pub secret_key: String,
    /// Optional callback URL passed on initialization
    pub callback_url: Option<String>,
}

impl PaystackConfig {
    /// Validate the settings.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.secret_key.trim().is_empty() {
            return Err(GatewayError::config("paystack secret_key is not set"));
        }
        if self.base_url.trim().is_empty() {
            return Err(GatewayError::config("paystack base_url is not set"));
        }
        Ok(())
    }
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.paystack.co".to_string(),
            secret_key: String::new(),
            callback_url: None,
        }
    }
}

// Secrets stay out of logs
impl std::fmt::Debug for PaystackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaystackConfig")
            .field("base_url", &self.base_url)
            .field("secret_key", &redact(&self.secret_key))
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

/// Nomba settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NombaConfig {
    /// API base URL
    pub base_url: String,
    /// Merchant account id, sent as the `accountId` header
    pub account_id: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Where Nomba redirects the payer after checkout
    pub callback_url: String,
    /// ISO currency code
    pub currency: String,
    /// Refresh bearer tokens this long before they expire
    #[serde(with = "millis_serde")]
    pub token_refresh_margin: Duration,
}

impl NombaConfig {
    /// Validate the settings.
    pub fn validate(&self) -> GatewayResult<()> {
        for (name, value) in [
            ("account_id", &self.account_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("base_url", &self.base_url),
        ] {
            if value.trim().is_empty() {
                return Err(GatewayError::config(format!("nomba {name} is not set")));
            }
        }
        Ok(())
    }
}

impl Default for NombaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.nomba.com".to_string(),
            account_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            callback_url: String::new(),
            currency: "NGN".to_string(),
            token_refresh_margin: DEFAULT_TOKEN_REFRESH_MARGIN,
        }
    }
}

impl std::fmt::Debug for NombaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NombaConfig")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("callback_url", &self.callback_url)
            .field("currency", &self.currency)
            .field("token_refresh_margin", &self.token_refresh_margin)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay between retries
    #[serde(with = "millis_serde")]
    pub base_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "millis_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Serde helper for Duration as integer milliseconds.
pub mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as milliseconds.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    /// Deserialize from milliseconds.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
