//! Concurrent state transitions against a real database file.

use std::sync::Arc;
use std::thread;

use reportgate_store::{
    InvoiceStore, ReportStore, ReportStoreConfig, UserReportStore,
};
use reportgate_types::{
    Amount, GatewayRef, Invoice, InvoiceRef, InvoiceStatus, UserReport, REPORT_RETENTION_DAYS,
};
use tempfile::TempDir;

fn open(dir: &TempDir) -> ReportStore {
    ReportStore::open(ReportStoreConfig::new(dir.path())).unwrap()
}

fn awaiting_invoice(store: &ReportStore, gateway_ref: &GatewayRef) -> InvoiceRef {
    let inv = Invoice::new(InvoiceRef::generate(), 7, Amount::new(20_000), "{}", 1_000);
    store.invoices.insert(&inv).unwrap();
    assert!(store
        .invoices
        .attach_gateway_ref(&inv.invoice_ref, gateway_ref, 1_001)
        .unwrap());
    inv.invoice_ref
}

#[test]
fn test_exactly_one_transition_wins() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let g = GatewayRef::new("T-race").unwrap();
    let invoice_ref = awaiting_invoice(&store, &g);

    let invoices = Arc::clone(&store.invoices);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let invoices = Arc::clone(&invoices);
            let g = g.clone();
            thread::spawn(move || {
                // Half try to pay, half try to fail
                let to = if i % 2 == 0 {
                    InvoiceStatus::Paid
                } else {
                    InvoiceStatus::Failed
                };
                invoices
                    .transition(&g, InvoiceStatus::AwaitingVerification, to, None, 2_000)
                    .unwrap()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);

    let status = store.invoices.get(&invoice_ref).unwrap().unwrap().status;
    assert!(status.is_terminal());
}

#[test]
fn test_concurrent_grants_create_one_report() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let g = GatewayRef::new("T-grant").unwrap();
    let invoice_ref = awaiting_invoice(&store, &g);
    store
        .invoices
        .transition(
            &g,
            InvoiceStatus::AwaitingVerification,
            InvoiceStatus::Paid,
            None,
            2_000,
        )
        .unwrap();

    let reports = Arc::clone(&store.reports);
    let inserted = (0..6)
        .map(|_| {
            let reports = Arc::clone(&reports);
            let invoice_ref = invoice_ref.clone();
            thread::spawn(move || {
                let report =
                    UserReport::new(7, invoice_ref, None, 3_000, REPORT_RETENTION_DAYS);
                reports.insert_if_paid(&report).unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|inserted| *inserted)
        .count();

    assert_eq!(inserted, 1);
    assert_eq!(store.reports.count().unwrap(), 1);
}

#[test]
fn test_separate_connections_see_same_rows() {
    let dir = TempDir::new().unwrap();
    let writer = open(&dir);
    let reader = open(&dir);

    let g = GatewayRef::new("T-shared").unwrap();
    let invoice_ref = awaiting_invoice(&writer, &g);

    let seen = reader.invoices.get_by_gateway_ref(&g).unwrap().unwrap();
    assert_eq!(seen.invoice_ref, invoice_ref);
    assert_eq!(seen.status, InvoiceStatus::AwaitingVerification);
}
