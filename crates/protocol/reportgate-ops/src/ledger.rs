//! The invoice state machine.
//!
//! `PENDING -> AWAITING_VERIFICATION -> {PAID | FAILED}`. Every transition
//! is one conditional update in the store; when it does not take effect the
//! ledger re-reads the row to decide between idempotent success and an
//! error. No application-level locks are held.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use reportgate_store::{InvoiceStore, PaymentAttemptStore, ReportStore, StoreError};
use reportgate_types::{
    current_timestamp, Amount, AttemptStatus, GatewayRef, Invoice, InvoiceRef, InvoiceStatus,
    PaymentAttempt, UserId,
};

use crate::error::{OpsError, OpsResult};
use crate::helpers::run_store;

/// How many fresh refs to try before giving up on a create.
const MAX_REF_ATTEMPTS: usize = 5;

/// What an attach attempt found.
enum AttachOutcome {
    Attached,
    AlreadyAttached,
    Missing,
    Conflict(GatewayRef),
    WrongState(InvoiceStatus),
    RefTaken,
}

/// Authoritative owner of invoices and their payment attempts.
pub struct InvoiceLedger {
    invoices: Arc<dyn InvoiceStore>,
    attempts: Arc<dyn PaymentAttemptStore>,
    store_timeout: Duration,
}

impl InvoiceLedger {
    /// Create a ledger over the given stores.
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        attempts: Arc<dyn PaymentAttemptStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            invoices,
            attempts,
            store_timeout,
        }
    }

    /// Create a ledger over a [`ReportStore`].
    pub fn from_store(store: &ReportStore, store_timeout: Duration) -> Self {
        Self::new(
            store.invoices.clone(),
            store.attempts.clone(),
            store_timeout,
        )
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    /// Create a `PENDING` invoice and return its ref.
    ///
    /// The ref is only returned once the row is committed.
    pub async fn create_invoice(
        &self,
        user_id: UserId,
        total: Amount,
        payload: impl Into<String>,
    ) -> OpsResult<InvoiceRef> {
        let invoices = Arc::clone(&self.invoices);
        let payload = payload.into();

        let invoice = run_store(self.store_timeout, "create invoice", move || {
            for _ in 0..MAX_REF_ATTEMPTS {
                let invoice = Invoice::new(
                    InvoiceRef::generate(),
                    user_id,
                    total,
                    payload.clone(),
                    current_timestamp(),
                );
                match invoices.insert(&invoice) {
                    Ok(()) => return Ok(invoice),
                    Err(StoreError::Duplicate(taken)) => {
                        debug!(invoice_ref = %taken, "Invoice ref collision, regenerating");
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(StoreError::invalid_data("could not allocate a unique invoice ref"))
        })
        .await?;

        info!(
            invoice_ref = %invoice.invoice_ref,
            user_id,
            total = %total,
            "Invoice created"
        );
        Ok(invoice.invoice_ref)
    }

    /// Load an invoice by ref.
    pub async fn get(&self, invoice_ref: &InvoiceRef) -> OpsResult<Invoice> {
        let invoices = Arc::clone(&self.invoices);
        let r = invoice_ref.clone();
        run_store(self.store_timeout, format!("get {}", invoice_ref), move || {
            invoices.get(&r)
        })
        .await?
        .ok_or_else(|| OpsError::not_found(invoice_ref))
    }

    /// Load the invoice a gateway ref is attached to, if any.
    pub async fn find_by_gateway_ref(&self, gateway_ref: &GatewayRef) -> OpsResult<Option<Invoice>> {
        let invoices = Arc::clone(&self.invoices);
        let g = gateway_ref.clone();
        run_store(
            self.store_timeout,
            format!("lookup {}", gateway_ref),
            move || invoices.get_by_gateway_ref(&g),
        )
        .await
    }

    /// All invoices of a user, newest first.
    pub async fn invoices_for_user(&self, user_id: UserId) -> OpsResult<Vec<Invoice>> {
        let invoices = Arc::clone(&self.invoices);
        run_store(
            self.store_timeout,
            format!("list invoices of user {}", user_id),
            move || invoices.list_for_user(user_id),
        )
        .await
    }

    /// Attach a gateway ref, moving `PENDING -> AWAITING_VERIFICATION`.
    ///
    /// Re-attaching the same ref is a no-op. A different ref fails with
    /// `Conflict`: only one payment may be live per invoice.
    pub async fn attach_gateway_ref(
        &self,
        invoice_ref: &InvoiceRef,
        gateway_ref: &GatewayRef,
    ) -> OpsResult<()> {
        let invoices = Arc::clone(&self.invoices);
        let (r, g) = (invoice_ref.clone(), gateway_ref.clone());

        let outcome = run_store(
            self.store_timeout,
            format!("attach {} to {}", gateway_ref, invoice_ref),
            move || {
                match invoices.attach_gateway_ref(&r, &g, current_timestamp()) {
                    Ok(true) => return Ok(AttachOutcome::Attached),
                    Ok(false) => {}
                    Err(StoreError::Duplicate(_)) => return Ok(AttachOutcome::RefTaken),
                    Err(e) => return Err(e),
                }
                Ok(match invoices.get(&r)? {
                    None => AttachOutcome::Missing,
                    Some(inv) => match inv.gateway_ref {
                        Some(existing) if existing == g => AttachOutcome::AlreadyAttached,
                        Some(existing) => AttachOutcome::Conflict(existing),
                        None => AttachOutcome::WrongState(inv.status),
                    },
                })
            },
        )
        .await?;

        match outcome {
            AttachOutcome::Attached => {
                info!(invoice_ref = %invoice_ref, gateway_ref = %gateway_ref, "Gateway ref attached");
                Ok(())
            }
            AttachOutcome::AlreadyAttached => {
                debug!(invoice_ref = %invoice_ref, gateway_ref = %gateway_ref, "Gateway ref already attached");
                Ok(())
            }
            AttachOutcome::Missing => Err(OpsError::not_found(invoice_ref)),
            AttachOutcome::Conflict(attached) => {
                warn!(
                    invoice_ref = %invoice_ref,
                    attached = %attached,
                    requested = %gateway_ref,
                    "Refusing second gateway ref"
                );
                Err(OpsError::Conflict {
                    invoice_ref: invoice_ref.clone(),
                    attached,
                    requested: Some(gateway_ref.clone()),
                })
            }
            AttachOutcome::WrongState(status) => Err(OpsError::InvalidState {
                reference: invoice_ref.to_string(),
                status,
                operation: "attach gateway ref to",
            }),
            AttachOutcome::RefTaken => {
                warn!(
                    invoice_ref = %invoice_ref,
                    gateway_ref = %gateway_ref,
                    "Gateway ref belongs to another invoice"
                );
                Err(OpsError::InvalidState {
                    reference: gateway_ref.to_string(),
                    status: InvoiceStatus::AwaitingVerification,
                    operation: "reuse gateway ref for",
                })
            }
        }
    }

    /// Move `AWAITING_VERIFICATION -> PAID`.
    ///
    /// Already `PAID` is an idempotent success. Returns the invoice as it
    /// stands afterwards.
    pub async fn mark_paid(&self, gateway_ref: &GatewayRef) -> OpsResult<Invoice> {
        let invoice = self
            .transition(gateway_ref, InvoiceStatus::Paid, None)
            .await?;

        match invoice.status {
            InvoiceStatus::Paid => Ok(invoice),
            status => Err(OpsError::InvalidState {
                reference: gateway_ref.to_string(),
                status,
                operation: "mark paid",
            }),
        }
    }

    /// Move `AWAITING_VERIFICATION -> FAILED`.
    ///
    /// A `PAID` invoice is never un-paid: the call succeeds and returns the
    /// paid invoice unchanged. Already `FAILED` is an idempotent success.
    pub async fn mark_failed(&self, gateway_ref: &GatewayRef, reason: &str) -> OpsResult<Invoice> {
        let invoice = self
            .transition(gateway_ref, InvoiceStatus::Failed, Some(reason))
            .await?;

        match invoice.status {
            InvoiceStatus::Failed => Ok(invoice),
            InvoiceStatus::Paid => {
                warn!(
                    invoice_ref = %invoice.invoice_ref,
                    gateway_ref = %gateway_ref,
                    reason,
                    "Ignoring failure signal for paid invoice"
                );
                Ok(invoice)
            }
            status => Err(OpsError::InvalidState {
                reference: gateway_ref.to_string(),
                status,
                operation: "mark failed",
            }),
        }
    }

    /// Conditionally move the invoice to `to`, then return the current row.
    async fn transition(
        &self,
        gateway_ref: &GatewayRef,
        to: InvoiceStatus,
        reason: Option<&str>,
    ) -> OpsResult<Invoice> {
        let invoices = Arc::clone(&self.invoices);
        let g = gateway_ref.clone();
        let reason = reason.map(str::to_string);

        let (won, invoice) = run_store(
            self.store_timeout,
            format!("mark {} {}", gateway_ref, to),
            move || {
                let won = invoices.transition(
                    &g,
                    InvoiceStatus::AwaitingVerification,
                    to,
                    reason.as_deref(),
                    current_timestamp(),
                )?;
                Ok((won, invoices.get_by_gateway_ref(&g)?))
            },
        )
        .await?;

        let invoice = invoice.ok_or_else(|| OpsError::not_found(gateway_ref))?;
        if won {
            info!(
                invoice_ref = %invoice.invoice_ref,
                gateway_ref = %gateway_ref,
                status = %to,
                "Invoice transitioned"
            );
        } else {
            debug!(
                invoice_ref = %invoice.invoice_ref,
                gateway_ref = %gateway_ref,
                status = %invoice.status,
                requested = %to,
                "Transition not applied, row already moved"
            );
        }
        Ok(invoice)
    }

    // =========================================================================
    // Payment Attempts
    // =========================================================================

    /// Append an attempt to the audit trail.
    pub async fn record_attempt(&self, attempt: PaymentAttempt) -> OpsResult<i64> {
        let attempts = Arc::clone(&self.attempts);
        let context = match &attempt.gateway_ref {
            Some(g) => format!("record attempt {}", g),
            None => "record attempt".to_string(),
        };
        run_store(self.store_timeout, context, move || attempts.record(&attempt)).await
    }

    /// Update the live attempt for `gateway_ref` with a verification result.
    pub async fn record_verification(
        &self,
        gateway_ref: &GatewayRef,
        status: Option<AttemptStatus>,
        gateway_response: String,
        raw_response: String,
    ) -> OpsResult<usize> {
        let attempts = Arc::clone(&self.attempts);
        let g = gateway_ref.clone();
        run_store(
            self.store_timeout,
            format!("update attempt {}", gateway_ref),
            move || {
                attempts.update_verification(
                    &g,
                    status,
                    &gateway_response,
                    &raw_response,
                    current_timestamp(),
                )
            },
        )
        .await
    }

    /// Attempts made for an invoice, oldest first.
    pub async fn attempts_for(&self, invoice_ref: &InvoiceRef) -> OpsResult<Vec<PaymentAttempt>> {
        let attempts = Arc::clone(&self.attempts);
        let r = invoice_ref.clone();
        run_store(
            self.store_timeout,
            format!("list attempts of {}", invoice_ref),
            move || attempts.list_for_invoice(&r),
        )
        .await
    }

    /// Attempts recorded under a gateway ref, oldest first.
    pub async fn attempts_for_gateway_ref(
        &self,
        gateway_ref: &GatewayRef,
    ) -> OpsResult<Vec<PaymentAttempt>> {
        let attempts = Arc::clone(&self.attempts);
        let g = gateway_ref.clone();
        run_store(
            self.store_timeout,
            format!("list attempts of {}", gateway_ref),
            move || attempts.list_for_gateway_ref(&g),
        )
        .await
    }
}

impl std::fmt::Debug for InvoiceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceLedger")
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}
