//! The payment provider abstraction.

use async_trait::async_trait;

use reportgate_types::{current_timestamp, Amount, GatewayRef, TransactionInit, Verification};

use crate::error::GatewayResult;

/// Parameters for starting a provider transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeRequest {
    /// Payer email.
    pub email: String,
    /// Amount in major units; providers convert as their API requires.
    pub amount: Amount,
    /// Merchant-side reference (usually the invoice ref).
    pub reference: Option<String>,
    /// Where the payer lands after checkout, if the provider supports it.
    pub callback_url: Option<String>,
}

impl InitializeRequest {
    /// Create a request with no reference or callback.
    pub fn new(email: impl Into<String>, amount: Amount) -> Self {
        Self {
            email: email.into(),
            amount,
            reference: None,
            callback_url: None,
        }
    }

    /// Attach a merchant reference.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Attach a callback URL.
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Reference for one provider transaction.
    ///
    /// Providers refuse a reference they have seen before, so every call
    /// gets a fresh suffix after the merchant reference.
    pub fn transaction_reference(&self) -> String {
        let base = self.reference.as_deref().unwrap_or("RG");
        format!("{}-{}-{:04x}", base, current_timestamp(), rand::random::<u16>())
    }
}

/// A payment provider that can open and verify transactions.
///
/// `initialize` has side effects at the provider and must not be retried
/// blindly. `verify` is a read and may be retried.
///
/// A payment the provider declines is a successful `verify` call returning
/// [`VerificationStatus::Failed`](reportgate_types::VerificationStatus);
/// errors are reserved for calls the provider could not answer.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Short provider name used in logs and audit rows.
    fn name(&self) -> &'static str;

    /// Open a transaction and return the provider reference and redirect URL.
    async fn initialize(&self, request: &InitializeRequest) -> GatewayResult<TransactionInit>;

    /// Ask the provider for the outcome of a transaction.
    async fn verify(&self, gateway_ref: &GatewayRef) -> GatewayResult<Verification>;
}
