use super::CaseStore;
use crate::{error::DeskResult, types::CaseId};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub case_id: Option<CaseId>,
    pub establishment_code: String,
    pub event_type: String,
    pub payload: String,
    pub operator: String,
    pub created_at: String,
}

fn map_entry(row: &Row<'_>) -> rusqlite::Result<EventLogEntry> {
    Ok(EventLogEntry {
        id: Some(row.get(0)?),
        case_id: row.get(1)?,
        establishment_code: row.get(2)?,
        event_type: row.get(3)?,
        payload: row.get(4)?,
        operator: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl CaseStore {
    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO event_log
                 (case_id, establishment_code, event_type, payload, operator, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.case_id,
                entry.establishment_code,
                entry.event_type,
                entry.payload,
                entry.operator,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_case(&self, case_id: CaseId) -> DeskResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_id, establishment_code, event_type, payload, operator, created_at
             FROM event_log WHERE case_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![case_id], map_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> DeskResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(count)
    }
}
