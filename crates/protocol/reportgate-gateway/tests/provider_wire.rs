//! Provider clients against a local fake provider.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use reportgate_gateway::{
    GatewayConfig, GatewayError, InitializeRequest, NombaClient, NombaConfig, PaymentProvider,
    PaystackClient, PaystackConfig, ProviderKind,
};
use reportgate_types::{Amount, GatewayRef, VerificationStatus};

#[derive(Clone, Default)]
struct Fake {
    bodies: Arc<Mutex<Vec<Value>>>,
    headers: Arc<Mutex<Vec<HeaderMap>>>,
    references: Arc<Mutex<HashSet<String>>>,
    token_calls: Arc<AtomicU32>,
    reject_first_bearer: Arc<AtomicU32>,
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ============================================================================
// Paystack
// ============================================================================

async fn paystack_initialize(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    fake.headers.lock().unwrap().push(headers);
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let reference = body["reference"].as_str().unwrap_or_default().to_string();
    fake.bodies.lock().unwrap().push(body);

    if !fake.references.lock().unwrap().insert(reference) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": false, "message": "Duplicate Transaction Reference"})),
        );
    }

    if email == "declined@example.com" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": false, "message": "Invalid Email Address Passed"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/abc",
                "access_code": "abc",
                "reference": "T-REF-001"
            }
        })),
    )
}

async fn paystack_verify(Path(reference): Path<String>) -> (StatusCode, Json<Value>) {
    let (status, gateway_response) = match reference.as_str() {
        "T-PAID" => ("success", "Approved"),
        "T-DECLINED" => ("failed", "Declined"),
        "T-ABANDONED" => ("abandoned", "The transaction was not completed"),
        "T-BUSY" => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": false, "message": "try later"})),
            )
        }
        _ => ("ongoing", "Pending"),
    };
    (
        StatusCode::OK,
        Json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": status,
                "gateway_response": gateway_response,
                "amount": 2_000_000,
                "customer": {"email": "buyer@example.com"}
            }
        })),
    )
}

async fn paystack(fake: Fake) -> PaystackClient {
    let app = Router::new()
        .route("/transaction/initialize", post(paystack_initialize))
        .route("/transaction/verify/:reference", get(paystack_verify))
        .with_state(fake);
    let base_url = serve(app).await;
    let config = PaystackConfig {
        base_url: format!("{}/", base_url),
        secret_key: "sk_test_wire".into(),
        callback_url: None,
    };
    PaystackClient::new(&config, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_paystack_sends_amount_in_kobo() {
    let fake = Fake::default();
    let client = paystack(fake.clone()).await;

    let init = client
        .initialize(
            &InitializeRequest::new("buyer@example.com", Amount::new(20_000))
                .with_reference("INV-ABCD1234"),
        )
        .await
        .unwrap();

    assert_eq!(init.gateway_ref.as_str(), "T-REF-001");
    assert_eq!(init.redirect_url, "https://checkout.paystack.com/abc");
    assert!(init.raw_response.contains("Authorization URL created"));

    let bodies = fake.bodies.lock().unwrap();
    assert_eq!(bodies[0]["amount"], json!(2_000_000));
    assert_eq!(bodies[0]["email"], json!("buyer@example.com"));
    assert!(bodies[0]["reference"]
        .as_str()
        .unwrap()
        .starts_with("INV-ABCD1234-"));

    let headers = fake.headers.lock().unwrap();
    assert_eq!(
        headers[0].get("authorization").unwrap(),
        "Bearer sk_test_wire"
    );
}

#[tokio::test]
async fn test_paystack_restart_uses_fresh_reference() {
    let fake = Fake::default();
    let client = paystack(fake.clone()).await;
    let request = InitializeRequest::new("buyer@example.com", Amount::new(20_000))
        .with_reference("INV-ABCD1234");

    // The first transaction may exist at the provider even if its reply was lost
    client.initialize(&request).await.unwrap();
    client.initialize(&request).await.unwrap();

    let bodies = fake.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    assert_ne!(bodies[0]["reference"], bodies[1]["reference"]);
}

#[tokio::test]
async fn test_paystack_rejection_keeps_message_and_body() {
    let client = paystack(Fake::default()).await;

    let err = client
        .initialize(&InitializeRequest::new("declined@example.com", Amount::new(100)))
        .await
        .unwrap_err();

    match err {
        GatewayError::Rejected { message, raw } => {
            assert_eq!(message, "Invalid Email Address Passed");
            assert!(raw.contains("\"status\":false"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_paystack_verify_outcomes() {
    let client = paystack(Fake::default()).await;

    let paid = client.verify(&GatewayRef::new("T-PAID").unwrap()).await.unwrap();
    assert_eq!(paid.status, VerificationStatus::Success);
    assert_eq!(paid.amount_minor, Some(2_000_000));
    assert_eq!(paid.gateway_response, "Approved");

    let declined = client
        .verify(&GatewayRef::new("T-DECLINED").unwrap())
        .await
        .unwrap();
    assert_eq!(declined.status, VerificationStatus::Failed);

    let abandoned = client
        .verify(&GatewayRef::new("T-ABANDONED").unwrap())
        .await
        .unwrap();
    assert_eq!(abandoned.status, VerificationStatus::Failed);

    let pending = client
        .verify(&GatewayRef::new("T-OTHER").unwrap())
        .await
        .unwrap();
    assert_eq!(pending.status, VerificationStatus::Pending);

    let busy = client.verify(&GatewayRef::new("T-BUSY").unwrap()).await;
    assert!(matches!(
        busy,
        Err(GatewayError::Unavailable { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_provider_is_transport_error() {
    let config = PaystackConfig {
        // Port 9 (discard) is closed on test machines
        base_url: "http://127.0.0.1:9".into(),
        secret_key: "sk".into(),
        callback_url: None,
    };
    let client = PaystackClient::new(&config, Duration::from_secs(2)).unwrap();
    let err = client
        .initialize(&InitializeRequest::new("a@b.c", Amount::new(1)))
        .await
        .unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
}

// ============================================================================
// Nomba
// ============================================================================

async fn nomba_token(State(fake): State<Fake>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(headers.get("accountId").unwrap(), "acc-1");
    assert_eq!(body["grant_type"], json!("client_credentials"));
    let n = fake.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(Duration::from_millis(30)).await;
    Json(json!({
        "code": "00",
        "description": "Success",
        "data": {"access_token": format!("tok-{n}"), "expires_in": 3600}
    }))
}

async fn nomba_checkout(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if fake
        .reject_first_bearer
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return (StatusCode::UNAUTHORIZED, Json(json!({"code": "401"})));
    }
    fake.headers.lock().unwrap().push(headers);
    fake.bodies.lock().unwrap().push(body);
    (
        StatusCode::OK,
        Json(json!({
            "code": "00",
            "description": "Success",
            "data": {"checkoutUrl": "https://checkout.nomba.com/s-1", "sessionId": "S-1"}
        })),
    )
}

async fn nomba_requery(Path(id): Path<String>) -> Json<Value> {
    let status = if id == "S-1" { "SUCCESS" } else { "PENDING" };
    Json(json!({
        "code": "00",
        "data": {"results": [{"status": status, "amount": "20000.00"}]}
    }))
}

async fn nomba(fake: Fake) -> NombaClient {
    let app = Router::new()
        .route("/v1/auth/token/issue", post(nomba_token))
        .route("/v1/checkout/order", post(nomba_checkout))
        .route("/v1/transactions/requery/:id", get(nomba_requery))
        .with_state(fake);
    let base_url = serve(app).await;
    let config = NombaConfig {
        base_url,
        account_id: "acc-1".into(),
        client_id: "cid".into(),
        client_secret: "secret".into(),
        callback_url: "https://app.example.com/callback".into(),
        ..NombaConfig::default()
    };
    NombaClient::new(&config, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_nomba_checkout_sends_decimal_amount() {
    let fake = Fake::default();
    let client = nomba(fake.clone()).await;

    let init = client
        .initialize(
            &InitializeRequest::new("buyer@example.com", Amount::new(20_000))
                .with_reference("INV-ABCD1234"),
        )
        .await
        .unwrap();
    assert_eq!(init.gateway_ref.as_str(), "S-1");
    assert_eq!(init.redirect_url, "https://checkout.nomba.com/s-1");

    let bodies = fake.bodies.lock().unwrap();
    let order = &bodies[0]["order"];
    assert_eq!(order["amount"], json!("20000.00"));
    assert_eq!(order["currency"], json!("NGN"));
    assert_eq!(order["customerEmail"], json!("buyer@example.com"));
    assert_eq!(order["accountId"], json!("acc-1"));
    assert_eq!(order["callbackUrl"], json!("https://app.example.com/callback"));
    assert_eq!(bodies[0]["tokenizeCard"], json!(false));

    let headers = fake.headers.lock().unwrap();
    assert_eq!(headers[0].get("authorization").unwrap(), "Bearer tok-1");
}

#[tokio::test]
async fn test_nomba_token_fetched_once_for_concurrent_callers() {
    let fake = Fake::default();
    let client = Arc::new(nomba(fake.clone()).await);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .verify(&GatewayRef::new("S-1").unwrap())
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        let verification = handle.await.unwrap();
        assert_eq!(verification.status, VerificationStatus::Success);
        assert_eq!(verification.amount_minor, Some(2_000_000));
    }
    assert_eq!(fake.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.token_cache().refresh_count(), 1);
}

#[tokio::test]
async fn test_nomba_refreshes_token_after_401() {
    let fake = Fake::default();
    fake.reject_first_bearer.store(1, Ordering::SeqCst);
    let client = nomba(fake.clone()).await;

    let init = client
        .initialize(&InitializeRequest::new("buyer@example.com", Amount::new(500)))
        .await
        .unwrap();
    assert_eq!(init.gateway_ref.as_str(), "S-1");
    assert_eq!(fake.token_calls.load(Ordering::SeqCst), 2);

    let headers = fake.headers.lock().unwrap();
    assert_eq!(headers[0].get("authorization").unwrap(), "Bearer tok-2");
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_gateway_config_from_toml() {
    let config: GatewayConfig = toml::from_str(
        r#"
        provider = "nomba"

        [nomba]
        account_id = "acc"
        client_id = "cid"
        client_secret = "sec"
        token_refresh_margin = 30000
        "#,
    )
    .unwrap();

    assert_eq!(config.provider, ProviderKind::Nomba);
    assert_eq!(config.nomba.token_refresh_margin, Duration::from_secs(30));
    assert_eq!(config.nomba.base_url, "https://api.nomba.com");
    assert_eq!(config.paystack.base_url, "https://api.paystack.co");
    assert!(config.validate().is_ok());
}
