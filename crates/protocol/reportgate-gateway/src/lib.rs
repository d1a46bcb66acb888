//! Payment provider clients for the reportgate invoice core.
//!
//! Each provider implements [`PaymentProvider`]:
//!
//! - [`PaystackClient`]: static secret key, amounts as integer kobo
//! - [`NombaClient`]: OAuth client credentials with a cached bearer token,
//!   amounts as two-decimal strings
//!
//! # Conversions
//!
//! Invoice totals are whole major units. The only conversion to the
//! provider's representation is [`Amount::to_minor_units`] or
//! [`Amount::to_decimal_string`], called inside the client right before the
//! request is built.
//!
//! [`Amount::to_minor_units`]: reportgate_types::Amount::to_minor_units
//! [`Amount::to_decimal_string`]: reportgate_types::Amount::to_decimal_string
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use reportgate_gateway::{build_provider, GatewayConfig, InitializeRequest};
//! use reportgate_types::Amount;
//!
//! # async fn example() -> reportgate_gateway::GatewayResult<()> {
//! let mut config = GatewayConfig::default();
//! config.paystack.secret_key = "sk_test_xxx".into();
//!
//! let provider = build_provider(&config, Duration::from_secs(10))?;
//! let init = provider
//!     .initialize(&InitializeRequest::new("buyer@example.com", Amount::new(20_000)))
//!     .await?;
//! println!("redirect to {}", init.redirect_url);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
mod http;
pub mod nomba;
pub mod paystack;
pub mod retry;
pub mod token;
pub mod traits;

pub use config::{millis_serde, GatewayConfig, NombaConfig, PaystackConfig, ProviderKind, RetryConfig};
pub use error::{GatewayError, GatewayResult};
pub use nomba::NombaClient;
pub use paystack::PaystackClient;
pub use retry::RetryPolicy;
pub use token::{IssuedToken, TokenCache};
pub use traits::{InitializeRequest, PaymentProvider};

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

/// Build the configured provider.
pub fn build_provider(
    config: &GatewayConfig,
    timeout: Duration,
) -> GatewayResult<Arc<dyn PaymentProvider>> {
    config.validate()?;
    info!(provider = %config.provider, timeout_ms = timeout.as_millis() as u64, "Building payment provider");
    let provider: Arc<dyn PaymentProvider> = match config.provider {
        ProviderKind::Paystack => Arc::new(PaystackClient::new(&config.paystack, timeout)?),
        ProviderKind::Nomba => Arc::new(NombaClient::new(&config.nomba, timeout)?),
    };
    Ok(provider)
}
