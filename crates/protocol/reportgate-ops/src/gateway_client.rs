//! Audited access to the payment provider.
//!
//! Every provider call leaves a row in the payment attempt log before its
//! result is handed back, so the audit trail survives even when the ledger
//! update that follows fails.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use reportgate_gateway::{GatewayError, GatewayResult, InitializeRequest, PaymentProvider, RetryPolicy};
use reportgate_types::{
    current_timestamp, Amount, AttemptStatus, GatewayRef, InvoiceRef, PaymentAttempt,
    TransactionInit, Verification,
};

use crate::error::{OpsError, OpsResult};
use crate::helpers::with_deadline;
use crate::ledger::InvoiceLedger;

/// Payment provider wrapped with deadlines and an audit trail.
pub struct GatewayClient {
    provider: Arc<dyn PaymentProvider>,
    ledger: Arc<InvoiceLedger>,
    timeout: Duration,
}

impl GatewayClient {
    /// Wrap a provider. `timeout` bounds each provider call.
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        ledger: Arc<InvoiceLedger>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            ledger,
            timeout,
        }
    }

    /// Name of the wrapped provider.
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Open a provider transaction for `amount` (major units).
    ///
    /// Never retried: a lost response may still have created the
    /// transaction at the provider.
    pub async fn initialize_transaction(
        &self,
        invoice_ref: Option<&InvoiceRef>,
        email: &str,
        amount: Amount,
    ) -> OpsResult<TransactionInit> {
        let mut request = InitializeRequest::new(email, amount);
        if let Some(r) = invoice_ref {
            request = request.with_reference(r.as_str());
        }

        debug!(provider = self.provider.name(), invoice_ref = ?invoice_ref.map(InvoiceRef::as_str), amount = %amount, "Initializing transaction");
        let result = with_deadline(self.timeout, self.provider.initialize(&request)).await;

        let now = current_timestamp();
        let mut attempt = PaymentAttempt {
            id: 0,
            invoice_ref: invoice_ref.cloned(),
            gateway_ref: None,
            email: email.to_string(),
            amount,
            status: AttemptStatus::Initialized,
            gateway_response: None,
            raw_response: None,
            redirect_url: None,
            created_at: now,
            updated_at: now,
        };
        match &result {
            Ok(init) => {
                attempt.gateway_ref = Some(init.gateway_ref.clone());
                attempt.redirect_url = Some(init.redirect_url.clone());
                attempt.raw_response = Some(init.raw_response.clone());
            }
            Err(e) => {
                attempt.status = if e.is_transport() {
                    AttemptStatus::NetworkError
                } else {
                    AttemptStatus::Failed
                };
                attempt.gateway_response = Some(e.to_string());
                attempt.raw_response = e.raw_response().map(str::to_string);
            }
        }
        self.audit(attempt).await;

        match result {
            Ok(init) => {
                info!(
                    provider = self.provider.name(),
                    gateway_ref = %init.gateway_ref,
                    "Transaction initialized"
                );
                Ok(init)
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Transaction initialization failed");
                let reference = invoice_ref.map_or_else(|| email.to_string(), |r| r.to_string());
                Err(OpsError::gateway(reference, e))
            }
        }
    }

    /// Ask the provider for a transaction outcome, retrying transport
    /// failures under `policy`.
    ///
    /// A declined payment is `Ok` with a `Failed` status. Each individual
    /// call is audited.
    pub async fn verify_transaction(
        &self,
        gateway_ref: &GatewayRef,
        policy: &RetryPolicy,
    ) -> OpsResult<Verification> {
        policy
            .run(gateway_ref.as_str(), || self.verify_once(gateway_ref))
            .await
            .map_err(|e| OpsError::gateway(gateway_ref, e))
    }

    async fn verify_once(&self, gateway_ref: &GatewayRef) -> GatewayResult<Verification> {
        debug!(provider = self.provider.name(), gateway_ref = %gateway_ref, "Verifying transaction");
        let result = with_deadline(self.timeout, self.provider.verify(gateway_ref)).await;

        match &result {
            Ok(v) => {
                self.audit_verification(
                    gateway_ref,
                    v.status.attempt_status(),
                    v.gateway_response.clone(),
                    v.raw_response.clone(),
                )
                .await;
            }
            Err(e) if e.is_transport() => self.audit_transport_failure(gateway_ref, e).await,
            Err(e) => {
                // Provider answered but refused; keep the status, store the answer
                self.audit_verification(
                    gateway_ref,
                    None,
                    e.to_string(),
                    e.raw_response().unwrap_or_default().to_string(),
                )
                .await;
            }
        }
        result
    }

    async fn audit(&self, attempt: PaymentAttempt) {
        if let Err(e) = self.ledger.record_attempt(attempt).await {
            error!(error = %e, "Failed to record payment attempt");
        }
    }

    async fn audit_verification(
        &self,
        gateway_ref: &GatewayRef,
        status: Option<AttemptStatus>,
        gateway_response: String,
        raw_response: String,
    ) {
        match self
            .ledger
            .record_verification(gateway_ref, status, gateway_response, raw_response)
            .await
        {
            Ok(0) => debug!(gateway_ref = %gateway_ref, "No live attempt to update"),
            Ok(_) => {}
            Err(e) => error!(gateway_ref = %gateway_ref, error = %e, "Failed to record verification"),
        }
    }

    /// Append a `network_error` row; the live attempt keeps its status.
    async fn audit_transport_failure(&self, gateway_ref: &GatewayRef, err: &GatewayError) {
        let prior = match self.ledger.attempts_for_gateway_ref(gateway_ref).await {
            Ok(attempts) => attempts.into_iter().next(),
            Err(e) => {
                error!(gateway_ref = %gateway_ref, error = %e, "Failed to load attempts for audit");
                None
            }
        };

        let now = current_timestamp();
        let attempt = PaymentAttempt {
            id: 0,
            invoice_ref: prior.as_ref().and_then(|a| a.invoice_ref.clone()),
            gateway_ref: Some(gateway_ref.clone()),
            email: prior.as_ref().map(|a| a.email.clone()).unwrap_or_default(),
            amount: prior.as_ref().map(|a| a.amount).unwrap_or_default(),
            status: AttemptStatus::NetworkError,
            gateway_response: Some(err.to_string()),
            raw_response: None,
            redirect_url: None,
            created_at: now,
            updated_at: now,
        };
        self.audit(attempt).await;
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
