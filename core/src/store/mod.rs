//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The desk calls store methods; it never executes SQL directly.
//!
//! Every mutating desk operation runs inside one `begin_write()`
//! transaction: the write lock is taken before anything is read, and the
//! case's aggregates are committed together with the change that caused
//! them, or not at all. Reads that touch more than one statement take a
//! `begin_read()` snapshot instead.

use crate::{
    error::DeskResult,
    ledger::AccountVector,
    reconciliation::{CaseHeader, RawDemand, RecoveryCost},
    schema::{FieldRole, LedgerField, StatutoryBasis},
    types::{Amount, CaseId, TxnId},
};
use chrono::NaiveDate;
use rusqlite::{types::Type, Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod case;
mod event;
mod transaction;

pub use event::EventLogEntry;

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub struct CaseStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
    busy_timeout_ms: u64,
}

impl CaseStore {
    pub fn open(path: &str, busy_timeout_ms: u64) -> DeskResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
            busy_timeout_ms,
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> DeskResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> DeskResult<Self> {
        match &self.path {
            Some(p) => Self::open(p, self.busy_timeout_ms),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> DeskResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_cases.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_event_log.sql"))?;
        Ok(())
    }

    /// Start an IMMEDIATE transaction: the database write lock is held from
    /// here until commit or drop (drop rolls back).
    ///
    /// Store methods keep using `self.conn`; they run inside the open
    /// transaction because it lives on the same connection.
    pub fn begin_write(&self) -> DeskResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Start a DEFERRED transaction so a read spanning several statements
    /// sees one snapshot. Never call it while a write is open on this store.
    pub fn begin_read(&self) -> DeskResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Deferred,
        )?)
    }
}

// ── Row types ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CaseRow {
    pub header: CaseHeader,
    pub demand: RawDemand,
    pub cost: RecoveryCost,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct NewCaseRow<'a> {
    pub establishment_code: &'a str,
    pub case_number: &'a str,
    pub basis: StatutoryBasis,
    pub demand: &'a RawDemand,
    pub cost: RecoveryCost,
    pub created_at: &'a str,
}

/// One payment event against a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryTransaction {
    pub txn_id: TxnId,
    pub case_id: CaseId,
    pub amount: Amount,
    pub cost_only: Amount,
    pub date: NaiveDate,
    pub reference: String,
    pub mode: Option<String>,
    pub remarks: Option<String>,
    pub allocation: AccountVector,
    pub manual: bool,
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

// ── Column helpers ────────────────────────────────────────────────

/// Per-sub-account column names for one field role, in schema order.
fn role_columns(role: FieldRole) -> Vec<String> {
    LedgerField::all()
        .filter(|f| f.role == role)
        .map(LedgerField::name)
        .collect()
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(raw: &str, idx: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_basis(raw: &str, idx: usize) -> rusqlite::Result<StatutoryBasis> {
    StatutoryBasis::parse(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, idx: usize) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
