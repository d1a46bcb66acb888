//! Paystack client.
//!
//! Paystack takes amounts as integers in kobo and authenticates every call
//! with the static secret key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use reportgate_types::{GatewayRef, TransactionInit, Verification, VerificationStatus};

use crate::config::PaystackConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::http::{build_client, normalize_base_url, read_json};
use crate::traits::{InitializeRequest, PaymentProvider};

/// Standard Paystack response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: u64,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    reference: String,
    authorization_url: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    #[serde(default)]
    gateway_response: Option<String>,
    #[serde(default)]
    amount: Option<u64>,
}

/// Client for the Paystack transactions API.
#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    base_url: String,
    secret_key: String,
    callback_url: Option<String>,
}

impl PaystackClient {
    /// Create a client from config with the given request timeout.
    pub fn new(config: &PaystackConfig, timeout: Duration) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self {
            client: build_client(timeout)?,
            base_url: normalize_base_url(&config.base_url),
            secret_key: config.secret_key.clone(),
            callback_url: config.callback_url.clone(),
        })
    }

    /// Get the normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Map Paystack's transaction status onto a verification outcome.
fn map_status(status: &str) -> VerificationStatus {
    match status {
        "success" => VerificationStatus::Success,
        "failed" | "abandoned" | "reversed" | "cancelled" => VerificationStatus::Failed,
        _ => VerificationStatus::Pending,
    }
}

#[async_trait]
impl PaymentProvider for PaystackClient {
    fn name(&self) -> &'static str {
        "paystack"
    }

    async fn initialize(&self, request: &InitializeRequest) -> GatewayResult<TransactionInit> {
        let url = format!("{}/transaction/initialize", self.base_url);
        let amount = request.amount.to_minor_units()?;
        let reference = request.transaction_reference();
        debug!(url = %url, amount_minor = amount, reference = %reference, "Initializing Paystack transaction");

        let body = InitializeBody {
            email: &request.email,
            amount,
            reference: &reference,
            callback_url: request
                .callback_url
                .as_deref()
                .or(self.callback_url.as_deref()),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?;
        let body = read_json::<Envelope<InitializeData>>(response, "paystack initialize").await?;

        let envelope = body.parsed;
        if !envelope.status {
            warn!(message = %envelope.message, "Paystack declined initialization");
            return Err(GatewayError::rejected(envelope.message, body.raw));
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::malformed("paystack initialize: missing data"))?;

        let gateway_ref = GatewayRef::new(data.reference)?;
        info!(gateway_ref = %gateway_ref, "Paystack transaction initialized");
        Ok(TransactionInit {
            gateway_ref,
            redirect_url: data.authorization_url,
            raw_response: body.raw,
        })
    }

    async fn verify(&self, gateway_ref: &GatewayRef) -> GatewayResult<Verification> {
        let url = format!("{}/transaction/verify/{}", self.base_url, gateway_ref);
        debug!(url = %url, "Verifying Paystack transaction");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let body = read_json::<Envelope<VerifyData>>(response, "paystack verify").await?;

        let envelope = body.parsed;
        if !envelope.status {
            return Err(GatewayError::rejected(envelope.message, body.raw));
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::malformed("paystack verify: missing data"))?;

        let status = map_status(&data.status);
        debug!(gateway_ref = %gateway_ref, provider_status = %data.status, status = %status.as_str(), "Paystack verification");
        Ok(Verification {
            status,
            gateway_response: data.gateway_response.unwrap_or(data.status),
            amount_minor: data.amount,
            raw_response: body.raw,
        })
    }
}

impl std::fmt::Debug for PaystackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaystackClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
