use super::{parse_basis, role_columns, CaseRow, CaseStore, NewCaseRow};
use crate::{
    error::DeskResult,
    ledger::AccountVector,
    reconciliation::{
        normalize_demand, CaseAggregates, CaseHeader, RawDemand, RecoveryCost, SectionTotals,
    },
    schema::{FieldRole, Section, StatutoryBasis, SubAccount},
    types::{CaseId, EstablishmentCode},
};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Row};

const HEADER_COLUMNS: &str = "case_id, establishment_code, case_number, basis, \
     recovery_cost_charged, recovery_cost_received, deleted";

fn section_prefix(section: Section) -> &'static str {
    match section {
        Section::A => "sec_a",
        Section::B => "sec_b",
        Section::C => "sec_c",
    }
}

fn map_header(row: &Row<'_>) -> rusqlite::Result<(CaseHeader, RecoveryCost, bool)> {
    let basis: String = row.get("basis")?;
    Ok((
        CaseHeader {
            case_id: row.get("case_id")?,
            establishment_code: row.get("establishment_code")?,
            case_number: row.get("case_number")?,
            basis: parse_basis(&basis, 3)?,
        },
        RecoveryCost {
            charged: row.get("recovery_cost_charged")?,
            received: row.get("recovery_cost_received")?,
        },
        row.get::<_, i32>("deleted")? != 0,
    ))
}

fn map_demand(row: &Row<'_>) -> rusqlite::Result<RawDemand> {
    let mut demand = RawDemand::default();
    for (account, column) in SubAccount::all().zip(role_columns(FieldRole::Demand)) {
        demand.set(account, row.get::<_, Option<i64>>(column.as_str())?);
    }
    Ok(demand)
}

fn map_vector(row: &Row<'_>, role: FieldRole) -> rusqlite::Result<AccountVector> {
    let mut v = AccountVector::zero();
    for (account, column) in SubAccount::all().zip(role_columns(role)) {
        v.set(account, row.get(column.as_str())?);
    }
    Ok(v)
}

impl CaseStore {
    // ── Case record ───────────────────────────────────────────────

    pub fn insert_case(&self, c: &NewCaseRow<'_>) -> DeskResult<CaseId> {
        let demand_cols = role_columns(FieldRole::Demand);
        let mut columns = vec![
            "establishment_code".to_string(),
            "case_number".to_string(),
            "basis".to_string(),
            "recovery_cost_charged".to_string(),
            "recovery_cost_received".to_string(),
            "created_at".to_string(),
            "updated_at".to_string(),
        ];
        let mut values = vec![
            Value::Text(c.establishment_code.to_string()),
            Value::Text(c.case_number.to_string()),
            Value::Text(c.basis.tag()),
            Value::Integer(c.cost.charged),
            Value::Integer(c.cost.received),
            Value::Text(c.created_at.to_string()),
            Value::Text(c.created_at.to_string()),
        ];
        for (account, column) in SubAccount::all().zip(demand_cols) {
            columns.push(column);
            values.push(c.demand.get(account).map_or(Value::Null, Value::Integer));
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO case_record ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Header, stored demand and cost of a case, live or deleted.
    pub fn case_row(&self, case_id: CaseId) -> DeskResult<Option<CaseRow>> {
        let sql = format!(
            "SELECT {HEADER_COLUMNS}, {} FROM case_record WHERE case_id = ?1",
            role_columns(FieldRole::Demand).join(", ")
        );
        let row = self
            .conn
            .query_row(&sql, params![case_id], |row| {
                let (header, cost, deleted) = map_header(row)?;
                Ok(CaseRow {
                    header,
                    demand: map_demand(row)?,
                    cost,
                    deleted,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Live case id for an establishment's case number.
    pub fn find_case_id(
        &self,
        establishment_code: &str,
        case_number: &str,
    ) -> DeskResult<Option<CaseId>> {
        let id = self
            .conn
            .query_row(
                "SELECT case_id FROM case_record
                 WHERE establishment_code = ?1 AND case_number = ?2 AND deleted = 0",
                params![establishment_code, case_number],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// True if the key is taken, including by a deleted case.
    pub fn case_key_taken(&self, establishment_code: &str, case_number: &str) -> DeskResult<bool> {
        let taken: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM case_record
             WHERE establishment_code = ?1 AND case_number = ?2",
            params![establishment_code, case_number],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    pub fn live_case_ids(&self, establishment_code: &str) -> DeskResult<Vec<CaseId>> {
        let mut stmt = self.conn.prepare(
            "SELECT case_id FROM case_record
             WHERE establishment_code = ?1 AND deleted = 0
             ORDER BY case_id ASC",
        )?;
        let ids = stmt
            .query_map(params![establishment_code], |row| row.get(0))?
            .collect::<Result<Vec<CaseId>, _>>()?;
        Ok(ids)
    }

    pub fn establishment_codes(&self) -> DeskResult<Vec<EstablishmentCode>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT establishment_code FROM case_record
             WHERE deleted = 0 ORDER BY establishment_code ASC",
        )?;
        let codes = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(codes)
    }

    pub fn update_demand(
        &self,
        case_id: CaseId,
        demand: &RawDemand,
        basis: StatutoryBasis,
        updated_at: &str,
    ) -> DeskResult<()> {
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (account, column) in SubAccount::all().zip(role_columns(FieldRole::Demand)) {
            values.push(demand.get(account).map_or(Value::Null, Value::Integer));
            assignments.push(format!("{column} = ?{}", values.len()));
        }
        values.push(Value::Text(basis.tag()));
        assignments.push(format!("basis = ?{}", values.len()));
        values.push(Value::Text(updated_at.to_string()));
        assignments.push(format!("updated_at = ?{}", values.len()));
        values.push(Value::Integer(case_id));
        let sql = format!(
            "UPDATE case_record SET {} WHERE case_id = ?{}",
            assignments.join(", "),
            values.len()
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    /// Replicate the establishment cost ledger onto every one of its cases.
    pub fn set_establishment_cost(
        &self,
        establishment_code: &str,
        cost: RecoveryCost,
        updated_at: &str,
    ) -> DeskResult<usize> {
        let n = self.conn.execute(
            "UPDATE case_record
             SET recovery_cost_charged = ?1, recovery_cost_received = ?2, updated_at = ?3
             WHERE establishment_code = ?4",
            params![cost.charged, cost.received, updated_at, establishment_code],
        )?;
        Ok(n)
    }

    /// The establishment's cost ledger as replicated on its cases.
    /// Prefers a live case; None if the establishment has no case at all.
    pub fn establishment_cost(&self, establishment_code: &str) -> DeskResult<Option<RecoveryCost>> {
        let cost = self
            .conn
            .query_row(
                "SELECT recovery_cost_charged, recovery_cost_received
                 FROM case_record WHERE establishment_code = ?1
                 ORDER BY deleted ASC, case_id ASC LIMIT 1",
                params![establishment_code],
                |row| {
                    Ok(RecoveryCost {
                        charged: row.get(0)?,
                        received: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(cost)
    }

    pub fn mark_case_deleted(&self, case_id: CaseId, updated_at: &str) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE case_record SET deleted = 1, updated_at = ?1 WHERE case_id = ?2",
            params![updated_at, case_id],
        )?;
        Ok(())
    }

    // ── Aggregates ────────────────────────────────────────────────

    /// Persist the output of a reconciliation pass. Demand and cost inputs
    /// are left untouched.
    pub fn write_aggregates(&self, agg: &CaseAggregates, updated_at: &str) -> DeskResult<()> {
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        let mut set = |column: String, value: Value| {
            values.push(value);
            assignments.push(format!("{column} = ?{}", values.len()));
        };

        for (role, vector) in [
            (FieldRole::Recovered, &agg.recovered),
            (FieldRole::Outstanding, &agg.outstanding),
        ] {
            for (account, column) in SubAccount::all().zip(role_columns(role)) {
                set(column, Value::Integer(vector.get(account)));
            }
        }
        for section in Section::ALL {
            let totals = agg.section(section).copied().unwrap_or(SectionTotals {
                section,
                demand: 0,
                recovered: 0,
                outstanding: 0,
            });
            let prefix = section_prefix(section);
            set(format!("{prefix}_demand"), Value::Integer(totals.demand));
            set(format!("{prefix}_recovered"), Value::Integer(totals.recovered));
            set(format!("{prefix}_outstanding"), Value::Integer(totals.outstanding));
        }
        set("demand_total".into(), Value::Integer(agg.demand_total));
        set("recovered_total".into(), Value::Integer(agg.recovered_total));
        set("outstanding_total".into(), Value::Integer(agg.outstanding_total));
        set("cost_outstanding".into(), Value::Integer(agg.cost_outstanding));
        set("outstanding_with_cost".into(), Value::Integer(agg.outstanding_with_cost));
        set("txn_count".into(), Value::Integer(agg.transaction_count as i64));
        set("updated_at".into(), Value::Text(updated_at.to_string()));

        values.push(Value::Integer(agg.case_id()));
        let sql = format!(
            "UPDATE case_record SET {} WHERE case_id = ?{}",
            assignments.join(", "),
            values.len()
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    /// Aggregates as last persisted by a reconciliation pass.
    pub fn load_aggregates(&self, case_id: CaseId) -> DeskResult<Option<CaseAggregates>> {
        let agg = self
            .conn
            .query_row(
                "SELECT * FROM case_record WHERE case_id = ?1 AND deleted = 0",
                params![case_id],
                map_aggregates,
            )
            .optional()?;
        Ok(agg)
    }

    pub fn establishment_aggregates(
        &self,
        establishment_code: &str,
    ) -> DeskResult<Vec<CaseAggregates>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM case_record
             WHERE establishment_code = ?1 AND deleted = 0
             ORDER BY case_id ASC",
        )?;
        let rows = stmt
            .query_map(params![establishment_code], map_aggregates)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn map_aggregates(row: &Row<'_>) -> rusqlite::Result<CaseAggregates> {
    let (header, cost, _) = map_header(row)?;
    let basis = header.basis;
    let (demand, notices) = normalize_demand(&map_demand(row)?, basis);

    let mut sections = Vec::new();
    for section in basis.sections() {
        let prefix = section_prefix(section);
        sections.push(SectionTotals {
            section,
            demand: row.get(format!("{prefix}_demand").as_str())?,
            recovered: row.get(format!("{prefix}_recovered").as_str())?,
            outstanding: row.get(format!("{prefix}_outstanding").as_str())?,
        });
    }

    Ok(CaseAggregates {
        header,
        demand,
        recovered: map_vector(row, FieldRole::Recovered)?,
        outstanding: map_vector(row, FieldRole::Outstanding)?,
        sections,
        demand_total: row.get("demand_total")?,
        recovered_total: row.get("recovered_total")?,
        outstanding_total: row.get("outstanding_total")?,
        cost,
        cost_outstanding: row.get("cost_outstanding")?,
        outstanding_with_cost: row.get("outstanding_with_cost")?,
        transaction_count: row.get::<_, i64>("txn_count")? as usize,
        notices,
    })
}
