//! Nomba client.
//!
//! Nomba issues short-lived bearer tokens from client credentials and takes
//! checkout amounts as two-decimal strings. Every call carries the merchant
//! `accountId` header.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use reportgate_types::{
    GatewayRef, TransactionInit, Verification, VerificationStatus, MINOR_UNITS_PER_MAJOR,
};

use crate::config::NombaConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::http::{build_client, normalize_base_url, read_json, RawBody};
use crate::token::{IssuedToken, TokenCache};
use crate::traits::{InitializeRequest, PaymentProvider};

const SUCCESS_CODE: &str = "00";
const ACCOUNT_HEADER: &str = "accountId";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    description: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn is_success(&self) -> bool {
        self.code.as_deref().map_or(true, |c| c == SUCCESS_CODE)
    }

    fn message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.description.clone())
            .or_else(|| self.code.as_ref().map(|c| format!("code {c}")))
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutOrder<'a> {
    order_reference: &'a str,
    customer_id: &'a str,
    callback_url: &'a str,
    customer_email: &'a str,
    amount: String,
    currency: &'a str,
    account_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutBody<'a> {
    order: CheckoutOrder<'a>,
    tokenize_card: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutData {
    checkout_url: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    order_reference: Option<String>,
}

/// Client for the Nomba checkout API.
#[derive(Clone)]
pub struct NombaClient {
    client: Client,
    base_url: String,
    account_id: String,
    client_id: String,
    client_secret: String,
    callback_url: String,
    currency: String,
    tokens: Arc<TokenCache>,
}

impl NombaClient {
    /// Create a client from config with the given request timeout.
    pub fn new(config: &NombaConfig, timeout: Duration) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self {
            client: build_client(timeout)?,
            base_url: normalize_base_url(&config.base_url),
            account_id: config.account_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            callback_url: config.callback_url.clone(),
            currency: config.currency.clone(),
            tokens: Arc::new(TokenCache::new(config.token_refresh_margin)),
        })
    }

    /// Get the normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The bearer token cache.
    pub fn token_cache(&self) -> &TokenCache {
        &self.tokens
    }

    async fn access_token(&self) -> GatewayResult<String> {
        self.tokens.get_or_refresh(|| self.issue_token()).await
    }

    async fn issue_token(&self) -> GatewayResult<IssuedToken> {
        let url = format!("{}/v1/auth/token/issue", self.base_url);
        debug!(url = %url, "Requesting Nomba access token");

        let response = self
            .client
            .post(&url)
            .header(ACCOUNT_HEADER, &self.account_id)
            .json(&TokenRequest {
                grant_type: "client_credentials",
                client_id: &self.client_id,
                client_secret: &self.client_secret,
            })
            .send()
            .await?;
        let body = read_json::<Envelope<TokenData>>(response, "nomba token").await?;

        let envelope = body.parsed;
        if !envelope.is_success() {
            return Err(GatewayError::Unauthorized(envelope.message()));
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::malformed("nomba token: missing data"))?;

        Ok(IssuedToken {
            access_token: data.access_token,
            expires_in: data.expires_in.map(Duration::from_secs),
        })
    }

    /// Send an authenticated request, refreshing the token once on 401.
    async fn send_authorized<T, F>(&self, build: F, context: &str) -> GatewayResult<RawBody<T>>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.access_token().await?;
        let response = build(&token).send().await?;
        match read_json(response, context).await {
            Err(GatewayError::Unauthorized(reason)) => {
                warn!(context, reason = %reason, "Bearer token refused, refreshing");
                self.tokens.invalidate().await;
                let token = self.access_token().await?;
                let response = build(&token).send().await?;
                read_json(response, context).await
            }
            other => other,
        }
    }
}

/// Map a Nomba transaction status onto a verification outcome.
///
/// Only statuses Nomba documents as final count; anything unrecognised is
/// treated as still pending.
fn map_status(status: &str) -> VerificationStatus {
    match status.trim().to_ascii_uppercase().as_str() {
        "SUCCESS" | "SUCCESSFUL" | "PAYMENT_SUCCESSFUL" | "PAID" | "COMPLETED" => {
            VerificationStatus::Success
        }
        "FAILED" | "PAYMENT_FAILED" | "UNSUCCESSFUL" | "PAYMENT_UNSUCCESSFUL" | "CANCELLED"
        | "CANCELED" | "ABANDONED" | "REVERSED" | "REFUNDED" | "DECLINED" | "EXPIRED" => {
            VerificationStatus::Failed
        }
        _ => VerificationStatus::Pending,
    }
}

/// Convert a decimal string like `"20000.00"` to minor units.
fn decimal_to_minor(text: &str) -> Option<u64> {
    let text = text.trim();
    let (whole, frac) = match text.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (text, ""),
    };
    if whole.is_empty() || frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: u64 = whole.parse().ok()?;
    let frac: u64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<u64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(MINOR_UNITS_PER_MAJOR)?.checked_add(frac)
}

/// Nomba reports amounts in major units, as a number or a string.
fn amount_to_minor(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => decimal_to_minor(s),
        Value::Number(n) => match n.as_u64() {
            Some(whole) => whole.checked_mul(MINOR_UNITS_PER_MAJOR),
            None => decimal_to_minor(&format!("{:.2}", n.as_f64()?)),
        },
        _ => None,
    }
}

/// Find the transaction record in a requery payload.
///
/// The payload is either the transaction itself or a `results` list.
fn transaction_record(data: &Value) -> Option<&Value> {
    match data.get("results").and_then(Value::as_array) {
        Some(results) => results.first(),
        None => Some(data),
    }
}

fn parse_verification(data: &Value, raw: String) -> GatewayResult<Verification> {
    let record = transaction_record(data)
        .ok_or_else(|| GatewayError::malformed("nomba requery: empty results"))?;
    let provider_status = ["status", "transactionStatus"]
        .iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
        .ok_or_else(|| GatewayError::malformed("nomba requery: missing status"))?;

    let gateway_response = record
        .get("message")
        .or_else(|| record.get("responseMessage"))
        .and_then(Value::as_str)
        .unwrap_or(provider_status)
        .to_string();

    Ok(Verification {
        status: map_status(provider_status),
        gateway_response,
        amount_minor: record.get("amount").and_then(amount_to_minor),
        raw_response: raw,
    })
}

#[async_trait]
impl PaymentProvider for NombaClient {
    fn name(&self) -> &'static str {
        "nomba"
    }

    async fn initialize(&self, request: &InitializeRequest) -> GatewayResult<TransactionInit> {
        let url = format!("{}/v1/checkout/order", self.base_url);
        let order_reference = request.transaction_reference();
        let callback_url = request.callback_url.as_deref().unwrap_or(&self.callback_url);
        let payload = CheckoutBody {
            order: CheckoutOrder {
                order_reference: &order_reference,
                customer_id: &request.email,
                callback_url,
                customer_email: &request.email,
                amount: request.amount.to_decimal_string()?,
                currency: &self.currency,
                account_id: &self.account_id,
            },
            tokenize_card: false,
        };
        debug!(url = %url, order_reference = %order_reference, amount = %payload.order.amount, "Creating Nomba checkout order");

        let body = self
            .send_authorized::<Envelope<CheckoutData>, _>(
                |token| {
                    self.client
                        .post(&url)
                        .header(ACCOUNT_HEADER, &self.account_id)
                        .bearer_auth(token)
                        .json(&payload)
                },
                "nomba checkout",
            )
            .await?;

        let envelope = body.parsed;
        if !envelope.is_success() {
            let message = envelope.message();
            warn!(message = %message, "Nomba declined checkout order");
            return Err(GatewayError::rejected(message, body.raw));
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::malformed("nomba checkout: missing data"))?;

        let reference = data
            .session_id
            .or(data.order_reference)
            .unwrap_or(order_reference);
        let gateway_ref = GatewayRef::new(reference)?;
        info!(gateway_ref = %gateway_ref, "Nomba checkout order created");
        Ok(TransactionInit {
            gateway_ref,
            redirect_url: data.checkout_url,
            raw_response: body.raw,
        })
    }

    async fn verify(&self, gateway_ref: &GatewayRef) -> GatewayResult<Verification> {
        let url = format!("{}/v1/transactions/requery/{}", self.base_url, gateway_ref);
        debug!(url = %url, "Requerying Nomba transaction");

        let body = self
            .send_authorized::<Envelope<Value>, _>(
                |token| {
                    self.client
                        .get(&url)
                        .header(ACCOUNT_HEADER, &self.account_id)
                        .bearer_auth(token)
                },
                "nomba requery",
            )
            .await?;

        let envelope = body.parsed;
        if !envelope.is_success() {
            return Err(GatewayError::rejected(envelope.message(), body.raw));
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::malformed("nomba requery: missing data"))?;

        let verification = parse_verification(&data, body.raw)?;
        debug!(gateway_ref = %gateway_ref, status = %verification.status, "Nomba verification");
        Ok(verification)
    }
}

impl std::fmt::Debug for NombaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NombaClient")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decimal_to_minor() {
        assert_eq!(decimal_to_minor("20000.00"), Some(2_000_000));
        assert_eq!(decimal_to_minor("20000"), Some(2_000_000));
        assert_eq!(decimal_to_minor("12.5"), Some(1_250));
        assert_eq!(decimal_to_minor("0.07"), Some(7));
        assert_eq!(decimal_to_minor("1.234"), None);
        assert_eq!(decimal_to_minor("abc"), None);
        assert_eq!(decimal_to_minor(".50"), None);
    }

    #[test]
    fn test_amount_to_minor_number_forms() {
        assert_eq!(amount_to_minor(&json!(20000)), Some(2_000_000));
        assert_eq!(amount_to_minor(&json!(199.99)), Some(19_999));
        assert_eq!(amount_to_minor(&json!("150.00")), Some(15_000));
        assert_eq!(amount_to_minor(&json!(null)), None);
    }

    #[test]
    fn test_map_status() {
        assert_eq!(map_status("SUCCESS"), VerificationStatus::Success);
        assert_eq!(map_status("PAYMENT_SUCCESSFUL"), VerificationStatus::Success);
        assert_eq!(map_status("FAILED"), VerificationStatus::Failed);
        assert_eq!(map_status("CANCELLED"), VerificationStatus::Failed);
        assert_eq!(map_status("UNSUCCESSFUL"), VerificationStatus::Failed);
        assert_eq!(map_status("PAYMENT_UNSUCCESSFUL"), VerificationStatus::Failed);
        assert_eq!(map_status("success"), VerificationStatus::Success);
        assert_eq!(map_status("PENDING"), VerificationStatus::Pending);
        assert_eq!(map_status("NEW"), VerificationStatus::Pending);
        // Unknown wording never counts as paid
        assert_eq!(map_status("SUCCESS_PENDING_REVIEW"), VerificationStatus::Pending);
    }

    #[test]
    fn test_parse_verification_results_list() {
        let data = json!({
            "results": [{"status": "SUCCESS", "amount": "20000.00", "message": "Approved"}]
        });
        let v = parse_verification(&data, "{}".into()).unwrap();
        assert_eq!(v.status, VerificationStatus::Success);
        assert_eq!(v.amount_minor, Some(2_000_000));
        assert_eq!(v.gateway_response, "Approved");
    }

    #[test]
    fn test_parse_verification_flat_record() {
        let data = json!({"transactionStatus": "FAILED"});
        let v = parse_verification(&data, "{}".into()).unwrap();
        assert_eq!(v.status, VerificationStatus::Failed);
        assert_eq!(v.gateway_response, "FAILED");
        assert_eq!(v.amount_minor, None);

        assert!(matches!(
            parse_verification(&json!({"results": []}), String::new()),
            Err(GatewayError::Malformed(_))
        ));
        assert!(parse_verification(&json!({"amount": 5}), String::new()).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = NombaConfig {
            account_id: "acc".into(),
            client_id: "cid".into(),
            client_secret: "super-secret".into(),
            ..NombaConfig::default()
        };
        let client = NombaClient::new(&config, Duration::from_secs(5)).unwrap();
        assert!(!format!("{client:?}").contains("super-secret"));
        assert_eq!(client.base_url(), "https://api.nomba.com");
    }
}
