//! Mock implementation of the `PaymentProvider` trait for testing.
//!
//! Records every request in memory and answers verifications from a
//! per-reference script, so tests can drive a payment through any
//! sequence of provider outcomes.

use async_trait::async_trait;
use reportgate_gateway::{GatewayError, GatewayResult, InitializeRequest, PaymentProvider};
use reportgate_types::{GatewayRef, TransactionInit, Verification, VerificationStatus};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A call the provider could not answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Connection dropped.
    Network,
    /// No answer in time.
    Timeout,
    /// Provider answered 503.
    Unavailable,
    /// Provider refused the request with a message.
    Rejected(String),
}

impl MockFailure {
    fn to_error(&self) -> GatewayError {
        match self {
            Self::Network => GatewayError::network("mock: connection reset"),
            Self::Timeout => GatewayError::timeout("mock: no response"),
            Self::Unavailable => GatewayError::Unavailable {
                status: 503,
                body: r#"{"status":false,"message":"Service unavailable"}"#.to_string(),
            },
            Self::Rejected(message) => GatewayError::rejected(
                message.clone(),
                json!({"status": false, "message": message}).to_string(),
            ),
        }
    }
}

/// What a scripted verification returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Paid, for the amount the transaction was opened with.
    Success,
    /// Paid, reporting this many minor units.
    SuccessWithAmount(u64),
    /// Declined with a reason.
    Failed(String),
    /// No outcome yet.
    Pending,
    /// The call itself failed.
    Error(MockFailure),
}

struct MockProviderInner {
    /// Every initialize request received.
    initialized: Vec<InitializeRequest>,
    /// Minor amount each issued gateway ref was opened for.
    amounts: HashMap<String, u64>,
    /// Per gateway ref, outcomes consumed one per verify call.
    scripts: HashMap<String, VecDeque<MockOutcome>>,
    /// Outcome once a script is exhausted.
    default_outcome: MockOutcome,
    /// Verify calls per gateway ref.
    verify_calls: HashMap<String, usize>,
    /// When set, initialize fails this way.
    init_failure: Option<MockFailure>,
    /// Delay before answering initialize.
    init_delay: Option<Duration>,
    /// Delay before answering verify.
    verify_delay: Option<Duration>,
    /// Gateway refs to hand out before generated ones.
    next_refs: VecDeque<String>,
    /// Auto-incrementing reference counter.
    ref_counter: u64,
}

/// A mock implementation of the `PaymentProvider` trait for testing.
///
/// Uses `Arc<RwLock<...>>` internally, so it is cheap to clone and
/// all clones share the same state. Verifications answer `Success` unless
/// scripted otherwise.
#[derive(Clone)]
pub struct MockProvider {
    inner: Arc<RwLock<MockProviderInner>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a provider that opens every transaction and reports it paid.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockProviderInner {
                initialized: Vec::new(),
                amounts: HashMap::new(),
                scripts: HashMap::new(),
                default_outcome: MockOutcome::Success,
                verify_calls: HashMap::new(),
                init_failure: None,
                init_delay: None,
                verify_delay: None,
                next_refs: VecDeque::new(),
                ref_counter: 0,
            })),
        }
    }

    /// Answer unscripted verifications with `outcome`.
    pub fn with_default_outcome(self, outcome: MockOutcome) -> Self {
        self.inner.write().unwrap().default_outcome = outcome;
        self
    }

    /// Make every initialize call fail.
    pub fn with_init_failure(self, failure: MockFailure) -> Self {
        self.set_init_failure(Some(failure));
        self
    }

    /// Delay every initialize answer.
    pub fn with_init_delay(self, delay: Duration) -> Self {
        self.inner.write().unwrap().init_delay = Some(delay);
        self
    }

    /// Delay every verify answer.
    pub fn with_verify_delay(self, delay: Duration) -> Self {
        self.inner.write().unwrap().verify_delay = Some(delay);
        self
    }

    /// Set the initialize failure mode at runtime.
    pub fn set_init_failure(&self, failure: Option<MockFailure>) {
        self.inner.write().unwrap().init_failure = failure;
    }

    /// Issue `gateway_ref` on the next successful initialize.
    pub fn queue_gateway_ref(&self, gateway_ref: impl Into<String>) {
        self.inner
            .write()
            .unwrap()
            .next_refs
            .push_back(gateway_ref.into());
    }

    /// Answer the next verifications of `gateway_ref` with `outcomes`, in order.
    pub fn script_verify(&self, gateway_ref: &GatewayRef, outcomes: Vec<MockOutcome>) {
        self.inner
            .write()
            .unwrap()
            .scripts
            .entry(gateway_ref.as_str().to_string())
            .or_default()
            .extend(outcomes);
    }

    // =========================================================================
    // Assertion Helpers
    // =========================================================================

    /// Get all initialize requests received.
    pub fn initialized(&self) -> Vec<InitializeRequest> {
        self.inner.read().unwrap().initialized.clone()
    }

    /// Get the number of initialize calls.
    pub fn init_calls(&self) -> usize {
        self.inner.read().unwrap().initialized.len()
    }

    /// Get the number of verify calls for a gateway ref.
    pub fn verify_calls(&self, gateway_ref: &GatewayRef) -> usize {
        self.inner
            .read()
            .unwrap()
            .verify_calls
            .get(gateway_ref.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Get the number of verify calls across all gateway refs.
    pub fn total_verify_calls(&self) -> usize {
        self.inner.read().unwrap().verify_calls.values().sum()
    }

    /// Get the minor amount a gateway ref was opened for.
    pub fn opened_amount_minor(&self, gateway_ref: &GatewayRef) -> Option<u64> {
        self.inner
            .read()
            .unwrap()
            .amounts
            .get(gateway_ref.as_str())
            .copied()
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn initialize(&self, request: &InitializeRequest) -> GatewayResult<TransactionInit> {
        let delay = self.inner.read().unwrap().init_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.write().unwrap();
        inner.initialized.push(request.clone());
        if let Some(failure) = &inner.init_failure {
            return Err(failure.to_error());
        }

        let minor = request
            .amount
            .to_minor_units()
            .map_err(|e| GatewayError::InvalidAmount(e.to_string()))?;
        let reference = match inner.next_refs.pop_front() {
            Some(r) => r,
            None => {
                inner.ref_counter += 1;
                format!("MOCK-{:06}", inner.ref_counter)
            }
        };
        inner.amounts.insert(reference.clone(), minor);

        let raw = json!({
            "status": true,
            "data": {
                "reference": reference,
                "authorization_url": format!("https://checkout.mock/{reference}"),
                "amount": minor,
            }
        });
        Ok(TransactionInit {
            gateway_ref: GatewayRef::new(reference.clone())
                .map_err(|e| GatewayError::malformed(e.to_string()))?,
            redirect_url: format!("https://checkout.mock/{reference}"),
            raw_response: raw.to_string(),
        })
    }

    async fn verify(&self, gateway_ref: &GatewayRef) -> GatewayResult<Verification> {
        let (outcome, opened, delay) = {
            let mut inner = self.inner.write().unwrap();
            let key = gateway_ref.as_str().to_string();
            *inner.verify_calls.entry(key.clone()).or_insert(0) += 1;
            let scripted = inner.scripts.get_mut(&key).and_then(VecDeque::pop_front);
            let outcome = scripted.unwrap_or_else(|| inner.default_outcome.clone());
            (outcome, inner.amounts.get(&key).copied(), inner.verify_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (status, message, amount_minor) = match outcome {
            MockOutcome::Success => (VerificationStatus::Success, "Approved".to_string(), opened),
            MockOutcome::SuccessWithAmount(minor) => {
                (VerificationStatus::Success, "Approved".to_string(), Some(minor))
            }
            MockOutcome::Failed(reason) => (VerificationStatus::Failed, reason, opened),
            MockOutcome::Pending => (VerificationStatus::Pending, "Pending".to_string(), opened),
            MockOutcome::Error(failure) => return Err(failure.to_error()),
        };

        let raw = json!({
            "status": true,
            "data": {
                "reference": gateway_ref.as_str(),
                "status": status.as_str(),
                "gateway_response": message,
                "amount": amount_minor,
            }
        });
        Ok(Verification {
            status,
            gateway_response: message,
            amount_minor,
            raw_response: raw.to_string(),
        })
    }
}
