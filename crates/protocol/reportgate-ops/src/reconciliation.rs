//! Payment reconciliation.
//!
//! Drives an invoice from `PENDING` to a terminal state:
//! initialize at the provider, attach the gateway ref, verify, mark, and
//! grant the report. Confirming is safe to repeat; the ledger's conditional
//! updates and the one-grant-per-invoice rule absorb duplicates.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use reportgate_gateway::RetryPolicy;
use reportgate_types::{
    Amount, AttemptStatus, GatewayRef, Invoice, InvoiceRef, InvoiceStatus, UserReport,
    VerificationStatus,
};

use crate::entitlement::ReportEntitlementGate;
use crate::error::{OpsError, OpsResult};
use crate::gateway_client::GatewayClient;
use crate::ledger::InvoiceLedger;

/// Where to send the payer to complete a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStart {
    /// The invoice being paid
    pub invoice_ref: InvoiceRef,
    /// Provider transaction reference
    pub gateway_ref: GatewayRef,
    /// Provider checkout page
    pub redirect_url: String,
}

/// Outcome of confirming a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Paid; the report is unlocked.
    Paid {
        /// The invoice
        invoice_ref: InvoiceRef,
        /// The report grant
        report: UserReport,
    },
    /// The provider reported the payment as failed.
    Failed {
        /// The invoice
        invoice_ref: InvoiceRef,
        /// Provider's explanation
        reason: String,
    },
    /// No outcome yet; verify again later.
    Pending {
        /// The invoice
        invoice_ref: InvoiceRef,
    },
}

impl Confirmation {
    /// Whether the report may now be generated.
    pub fn is_report_eligible(&self) -> bool {
        matches!(self, Self::Paid { .. })
    }

    /// The invoice this outcome is about.
    pub fn invoice_ref(&self) -> &InvoiceRef {
        match self {
            Self::Paid { invoice_ref, .. }
            | Self::Failed { invoice_ref, .. }
            | Self::Pending { invoice_ref } => invoice_ref,
        }
    }

    /// Message safe to show the payer.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Paid { .. } => "Payment confirmed. Your report is ready.",
            Self::Failed { .. } => "Payment failed. Please start a new payment.",
            Self::Pending { .. } => "Payment not yet confirmed. Please try again shortly.",
        }
    }
}

/// Orchestrates the ledger, the provider and the entitlement gate.
pub struct ReconciliationService {
    ledger: Arc<InvoiceLedger>,
    gateway: Arc<GatewayClient>,
    entitlements: Arc<ReportEntitlementGate>,
    verify_retry: RetryPolicy,
}

impl ReconciliationService {
    /// Create a service. `verify_retry` governs verification only.
    pub fn new(
        ledger: Arc<InvoiceLedger>,
        gateway: Arc<GatewayClient>,
        entitlements: Arc<ReportEntitlementGate>,
        verify_retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            gateway,
            entitlements,
            verify_retry,
        }
    }

    /// Open a provider transaction for a `PENDING` invoice and attach it.
    ///
    /// `amount` must equal the invoice total. If the invoice already has a
    /// different gateway ref by the time the new one comes back, the call
    /// fails with `Conflict` and the new provider transaction is abandoned.
    pub async fn start_payment(
        &self,
        invoice_ref: &InvoiceRef,
        email: &str,
        amount: Amount,
    ) -> OpsResult<PaymentStart> {
        let invoice = self.ledger.get(invoice_ref).await?;

        if amount != invoice.total {
            return Err(OpsError::AmountMismatch {
                reference: invoice_ref.to_string(),
                expected: invoice.total.to_string(),
                actual: amount.to_string(),
            });
        }
        if invoice.status != InvoiceStatus::Pending {
            return Err(match invoice.gateway_ref {
                Some(attached) => OpsError::Conflict {
                    invoice_ref: invoice_ref.clone(),
                    attached,
                    requested: None,
                },
                None => OpsError::InvalidState {
                    reference: invoice_ref.to_string(),
                    status: invoice.status,
                    operation: "start payment for",
                },
            });
        }

        let init = self
            .gateway
            .initialize_transaction(Some(invoice_ref), email, amount)
            .await?;

        if let Err(e) = self.ledger.attach_gateway_ref(invoice_ref, &init.gateway_ref).await {
            warn!(
                invoice_ref = %invoice_ref,
                gateway_ref = %init.gateway_ref,
                error = %e,
                "Provider transaction opened but not attached"
            );
            self.abandon_attempt(invoice_ref, &init.gateway_ref, &e, init.raw_response)
                .await;
            return Err(e);
        }

        info!(invoice_ref = %invoice_ref, gateway_ref = %init.gateway_ref, "Payment started");
        Ok(PaymentStart {
            invoice_ref: invoice_ref.clone(),
            gateway_ref: init.gateway_ref,
            redirect_url: init.redirect_url,
        })
    }

    /// Verify a payment and settle the invoice accordingly.
    ///
    /// An unknown gateway ref fails with `NotFound` before the provider is
    /// contacted. Transport failures leave the invoice untouched.
    pub async fn confirm_payment(&self, gateway_ref: &GatewayRef) -> OpsResult<Confirmation> {
        let invoice = self
            .ledger
            .find_by_gateway_ref(gateway_ref)
            .await?
            .ok_or_else(|| {
                warn!(gateway_ref = %gateway_ref, "Confirmation for unknown gateway ref");
                OpsError::not_found(gateway_ref)
            })?;

        match invoice.status {
            InvoiceStatus::Paid => {
                debug!(invoice_ref = %invoice.invoice_ref, "Already paid, skipping provider");
                return self.paid(invoice).await;
            }
            InvoiceStatus::Failed => {
                return Ok(Confirmation::Failed {
                    reason: invoice.failure_reason.unwrap_or_default(),
                    invoice_ref: invoice.invoice_ref,
                })
            }
            InvoiceStatus::Pending => {
                return Err(OpsError::InvalidState {
                    reference: gateway_ref.to_string(),
                    status: invoice.status,
                    operation: "confirm payment for",
                })
            }
            InvoiceStatus::AwaitingVerification => {}
        }

        let verification = self
            .gateway
            .verify_transaction(gateway_ref, &self.verify_retry)
            .await?;

        match verification.status {
            VerificationStatus::Success => {
                if let Some(paid_minor) = verification.amount_minor {
                    if !invoice.total.matches_minor_units(paid_minor) {
                        error!(
                            invoice_ref = %invoice.invoice_ref,
                            gateway_ref = %gateway_ref,
                            expected = %invoice.total,
                            paid_minor,
                            operator_queue = true,
                            "Provider reported success for a different amount"
                        );
                        return Err(OpsError::AmountMismatch {
                            reference: gateway_ref.to_string(),
                            expected: format!("{} major units", invoice.total),
                            actual: format!("{} minor units", paid_minor),
                        });
                    }
                }

                let paid = match self.ledger.mark_paid(gateway_ref).await {
                    Err(OpsError::NotFound(r)) => {
                        error!(
                            gateway_ref = %gateway_ref,
                            operator_queue = true,
                            "Provider reported success for a gateway ref missing from the ledger"
                        );
                        return Err(OpsError::NotFound(r));
                    }
                    other => other?,
                };
                self.paid(paid).await
            }
            VerificationStatus::Failed => {
                let invoice = self
                    .ledger
                    .mark_failed(gateway_ref, &verification.gateway_response)
                    .await?;
                if invoice.status == InvoiceStatus::Paid {
                    // A concurrent confirmation won with a success
                    return self.paid(invoice).await;
                }
                info!(
                    invoice_ref = %invoice.invoice_ref,
                    gateway_ref = %gateway_ref,
                    reason = %verification.gateway_response,
                    "Payment failed"
                );
                Ok(Confirmation::Failed {
                    invoice_ref: invoice.invoice_ref,
                    reason: verification.gateway_response,
                })
            }
            VerificationStatus::Pending => {
                debug!(invoice_ref = %invoice.invoice_ref, gateway_ref = %gateway_ref, "Payment still pending");
                Ok(Confirmation::Pending {
                    invoice_ref: invoice.invoice_ref,
                })
            }
        }
    }

    /// Close the attempt of a provider transaction the invoice refused, so
    /// the invoice keeps a single live attempt.
    ///
    /// Store failures are left alone: the attach may have landed.
    async fn abandon_attempt(
        &self,
        invoice_ref: &InvoiceRef,
        gateway_ref: &GatewayRef,
        cause: &OpsError,
        raw: String,
    ) {
        let reason = match cause {
            OpsError::Conflict { attached, .. } => {
                format!("superseded: invoice already attached to {}", attached)
            }
            OpsError::InvalidState { reference, status, .. } if reference == invoice_ref.as_str() => {
                format!("superseded: invoice is {}", status)
            }
            _ => return,
        };
        if let Err(e) = self
            .ledger
            .record_verification(gateway_ref, Some(AttemptStatus::Failed), reason, raw)
            .await
        {
            warn!(gateway_ref = %gateway_ref, error = %e, "Failed to close abandoned attempt");
        }
    }

    async fn paid(&self, invoice: Invoice) -> OpsResult<Confirmation> {
        let report = self.entitlements.grant_if_paid(&invoice).await?;
        Ok(Confirmation::Paid {
            invoice_ref: invoice.invoice_ref,
            report,
        })
    }
}

impl std::fmt::Debug for ReconciliationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationService")
            .field("gateway", &self.gateway)
            .field("verify_retry", &self.verify_retry)
            .finish_non_exhaustive()
    }
}
