//! SQL schema initialization.
//!
//! This module defines the database schema for SQLite storage.

use rusqlite::Connection;

use crate::error::Result;

/// Schema version for migration tracking.
pub const SCHEMA_VERSION: u32 = 1;

/// Initialize the database schema.
///
/// Creates all tables and indexes if they don't exist.
/// This function is idempotent - calling it multiple times is safe.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // WAL lets readers proceed while a verification write is in flight
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let current_version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    // No migrations yet; tables are created idempotently
    create_tables(conn)?;
    if current_version.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
    }

    Ok(())
}

/// Create all database tables.
fn create_tables(conn: &Connection) -> Result<()> {
    // Invoices: the single source of truth for payment status
    conn.execute(
        "CREATE TABLE IF NOT EXISTS invoices (
            ref TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            total INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            gateway_ref TEXT UNIQUE,
            payload TEXT NOT NULL,
            failure_reason TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invoices_user ON invoices(user_id, created_at)",
        [],
    )?;

    // Payment attempts: append/update-only audit trail
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_ref TEXT,
            gateway_ref TEXT,
            email TEXT NOT NULL,
            amount INTEGER NOT NULL,
            status TEXT NOT NULL,
            gateway_response TEXT,
            raw_response TEXT,
            redirect_url TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attempts_gateway_ref ON payment_attempts(gateway_ref)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attempts_invoice ON payment_attempts(invoice_ref)",
        [],
    )?;

    // Report entitlements, at most one per invoice
    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_reports (
            report_id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            invoice_ref TEXT NOT NULL UNIQUE REFERENCES invoices(ref),
            report_name TEXT,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_reports_user ON user_reports(user_id, expires_at)",
        [],
    )?;

    // Read-through cache entries
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cache_entries_expiry ON cache_entries(expires_at)",
        [],
    )?;

    // Lookup dataset rows (JSON objects)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS dataset_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}
