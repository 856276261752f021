use super::{format_date, parse_date, parse_json, CaseStore, RecoveryTransaction};
use crate::{
    error::DeskResult,
    ledger::AccountVector,
    types::CaseId,
};
use rusqlite::{params, OptionalExtension, Row};

const TXN_COLUMNS: &str = "txn_id, case_id, amount, cost_only, txn_date, reference, mode, remarks,
     allocation_json, manual, deleted, created_at, updated_at";

fn map_txn(row: &Row<'_>) -> rusqlite::Result<RecoveryTransaction> {
    let date: String = row.get(4)?;
    let allocation: String = row.get(8)?;
    Ok(RecoveryTransaction {
        txn_id: row.get(0)?,
        case_id: row.get(1)?,
        amount: row.get(2)?,
        cost_only: row.get(3)?,
        date: parse_date(&date, 4)?,
        reference: row.get(5)?,
        mode: row.get(6)?,
        remarks: row.get(7)?,
        allocation: parse_json(&allocation, 8)?,
        manual: row.get::<_, i32>(9)? != 0,
        deleted: row.get::<_, i32>(10)? != 0,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl CaseStore {
    // ── Recovery transactions ─────────────────────────────────────

    pub fn insert_txn(&self, t: &RecoveryTransaction) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO recovery_txn (
                txn_id, case_id, amount, cost_only, txn_date, reference, mode, remarks,
                allocation_json, manual, deleted, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                t.txn_id,
                t.case_id,
                t.amount,
                t.cost_only,
                format_date(t.date),
                t.reference,
                t.mode,
                t.remarks,
                serde_json::to_string(&t.allocation)?,
                if t.manual { 1 } else { 0 },
                if t.deleted { 1 } else { 0 },
                t.created_at,
                t.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Replace every mutable column of an existing transaction.
    pub fn update_txn(&self, t: &RecoveryTransaction) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE recovery_txn
             SET amount = ?1, cost_only = ?2, txn_date = ?3, reference = ?4, mode = ?5,
                 remarks = ?6, allocation_json = ?7, manual = ?8, updated_at = ?9
             WHERE txn_id = ?10",
            params![
                t.amount,
                t.cost_only,
                format_date(t.date),
                t.reference,
                t.mode,
                t.remarks,
                serde_json::to_string(&t.allocation)?,
                if t.manual { 1 } else { 0 },
                t.updated_at,
                t.txn_id,
            ],
        )?;
        Ok(())
    }

    pub fn mark_txn_deleted(&self, txn_id: &str, updated_at: &str) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE recovery_txn SET deleted = 1, updated_at = ?1 WHERE txn_id = ?2",
            params![updated_at, txn_id],
        )?;
        Ok(())
    }

    /// A live transaction by id.
    pub fn txn(&self, txn_id: &str) -> DeskResult<Option<RecoveryTransaction>> {
        let sql =
            format!("SELECT {TXN_COLUMNS} FROM recovery_txn WHERE txn_id = ?1 AND deleted = 0");
        let row = self
            .conn
            .query_row(&sql, params![txn_id], map_txn)
            .optional()?;
        Ok(row)
    }

    /// Live transactions of a case, oldest payment first.
    pub fn live_txns(&self, case_id: CaseId) -> DeskResult<Vec<RecoveryTransaction>> {
        let sql = format!(
            "SELECT {TXN_COLUMNS} FROM recovery_txn
             WHERE case_id = ?1 AND deleted = 0
             ORDER BY txn_date ASC, created_at ASC, txn_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![case_id], map_txn)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Allocation vectors of every live transaction of a case.
    pub fn live_allocations(&self, case_id: CaseId) -> DeskResult<Vec<AccountVector>> {
        let mut stmt = self.conn.prepare(
            "SELECT allocation_json FROM recovery_txn
             WHERE case_id = ?1 AND deleted = 0",
        )?;
        let rows = stmt
            .query_map(params![case_id], |row| {
                let raw: String = row.get(0)?;
                parse_json(&raw, 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
