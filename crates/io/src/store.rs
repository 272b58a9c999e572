// Persistent store on SQLite.
//
// Masters and vouchers are keyed by natural fields (see upsert.rs). Dates are
// stored as ISO text (%Y-%m-%d), timestamps as RFC 3339.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql, Transaction};
use serde::Serialize;

use tallyflow_core::{DocumentKind, ImportAudit, ImportStatus};
use tallyflow_recon::{ReconOutput, ReconReport, TableCounts};

use crate::error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS companies (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    gstin TEXT,
    address TEXT,
    state TEXT,
    pincode TEXT,
    email TEXT,
    phone TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_companies_name ON companies(name);

CREATE TABLE IF NOT EXISTS ledgers (
    id INTEGER PRIMARY KEY,
    company_id INTEGER REFERENCES companies(id),
    name TEXT NOT NULL,
    parent_group TEXT,
    mailing_name TEXT,
    gstin TEXT,
    pan TEXT,
    email TEXT,
    phone TEXT,
    address TEXT,
    state TEXT,
    pincode TEXT,
    opening_balance REAL,
    ledger_type TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledgers_key ON ledgers(company_id, name);

CREATE TABLE IF NOT EXISTS units (
    id INTEGER PRIMARY KEY,
    company_id INTEGER REFERENCES companies(id),
    name TEXT NOT NULL,
    symbol TEXT,
    formal_name TEXT,
    is_simple_unit INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_units_key ON units(company_id, name);

CREATE TABLE IF NOT EXISTS stock_items (
    id INTEGER PRIMARY KEY,
    company_id INTEGER REFERENCES companies(id),
    name TEXT NOT NULL,
    base_unit TEXT NOT NULL DEFAULT 'PCS',
    category TEXT,
    gst_applicable INTEGER NOT NULL DEFAULT 0,
    hsn_code TEXT,
    gst_rate REAL,
    standard_rate REAL,
    opening_balance REAL,
    opening_value REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stock_items_key ON stock_items(company_id, name);

CREATE TABLE IF NOT EXISTS vouchers (
    id INTEGER PRIMARY KEY,
    company_id INTEGER REFERENCES companies(id),
    voucher_number TEXT NOT NULL,
    voucher_type TEXT NOT NULL,
    voucher_date TEXT NOT NULL,      -- %Y-%m-%d
    raw_date TEXT NOT NULL,
    party_name TEXT,
    party_ledger TEXT,
    amount REAL NOT NULL DEFAULT 0,
    narration TEXT,
    irn TEXT UNIQUE,
    ack_no TEXT,
    ack_date TEXT,
    gstin TEXT,
    place_of_supply TEXT,
    billing_city TEXT,
    reference_number TEXT,
    due_date TEXT,
    is_cancelled INTEGER NOT NULL DEFAULT 0,
    raw_xml TEXT,
    dedup_key TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_vouchers_dedup ON vouchers(dedup_key);
CREATE INDEX IF NOT EXISTS idx_vouchers_date ON vouchers(voucher_date);

CREATE TABLE IF NOT EXISTS voucher_lines (
    id INTEGER PRIMARY KEY,
    voucher_id INTEGER NOT NULL REFERENCES vouchers(id) ON DELETE CASCADE,
    sequence INTEGER NOT NULL,
    kind TEXT NOT NULL,              -- ledger | inventory
    ledger_name TEXT NOT NULL,
    amount REAL NOT NULL,
    is_tax_line INTEGER NOT NULL DEFAULT 0,
    tax_head TEXT,
    tax_rate REAL,
    stock_item_name TEXT,
    quantity REAL,
    unit TEXT,
    rate REAL,
    discount REAL,
    gstin_of_party TEXT
);
CREATE INDEX IF NOT EXISTS idx_voucher_lines_voucher ON voucher_lines(voucher_id);

CREATE TABLE IF NOT EXISTS import_audits (
    id INTEGER PRIMARY KEY,
    file_path TEXT NOT NULL,
    file_name TEXT NOT NULL,
    document_kind TEXT NOT NULL,
    status TEXT NOT NULL,            -- running | success | partial | error
    masters_processed INTEGER NOT NULL DEFAULT 0,
    vouchers_processed INTEGER NOT NULL DEFAULT 0,
    vouchers_inserted INTEGER NOT NULL DEFAULT 0,
    vouchers_updated INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    warnings TEXT,                   -- JSON array, NULL when empty
    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS vendor_groups (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    parent TEXT,
    base_unit TEXT NOT NULL DEFAULT 'PCS',
    guid TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alternate_units (
    id INTEGER PRIMARY KEY,
    item_name TEXT NOT NULL UNIQUE,
    pkg_factor REAL NOT NULL DEFAULT 1.0,
    pkg_unit TEXT NOT NULL DEFAULT 'PKG',
    base_unit TEXT NOT NULL DEFAULT 'PCS',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS item_group_mappings (
    id INTEGER PRIMARY KEY,
    item_name TEXT NOT NULL UNIQUE,
    group_name TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_item_group_mappings_group ON item_group_mappings(group_name);
"#;

/// Concurrent importers each hold their own connection; a writer waits this
/// long for another's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const AUDIT_COLUMNS: &str = "id, file_path, file_name, document_kind, status, masters_processed, \
     vouchers_processed, vouchers_inserted, vouchers_updated, error_message, warnings, started_at, finished_at";

pub(crate) fn now_stamp() -> String {
    Utc::now().to_rfc3339()
}

/// Row counts of the import tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub companies: usize,
    pub ledgers: usize,
    pub units: usize,
    pub stock_items: usize,
    pub vouchers: usize,
    pub voucher_lines: usize,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    // -----------------------------------------------------------------------
    // Import audits
    // -----------------------------------------------------------------------

    /// Insert the audit row for an import that is starting and record its id.
    pub fn begin_audit(&self, audit: &mut ImportAudit) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO import_audits (file_path, file_name, document_kind, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                audit.file_path,
                audit.file_name,
                audit.document_kind.as_str(),
                audit.status.as_str(),
                audit.started_at.to_rfc3339(),
            ],
        )?;
        audit.id = Some(self.conn.last_insert_rowid());
        Ok(())
    }

    /// Write the final state of an audit. Inserts when `begin_audit` never ran.
    pub fn finish_audit(&self, audit: &mut ImportAudit) -> Result<(), StoreError> {
        let warnings = if audit.warnings.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&audit.warnings)?)
        };
        let kind = audit.document_kind.as_str();
        let status = audit.status.as_str();
        let started = audit.started_at.to_rfc3339();
        let finished = audit.finished_at.map(|t| t.to_rfc3339());
        let mut values: Vec<&dyn ToSql> = vec![
            &audit.file_path,
            &audit.file_name,
            &kind,
            &status,
            &audit.masters_processed,
            &audit.vouchers_processed,
            &audit.vouchers_inserted,
            &audit.vouchers_updated,
            &audit.error_message,
            &warnings,
            &started,
            &finished,
        ];

        match audit.id {
            Some(id) => {
                values.push(&id);
                self.conn.execute(
                    "UPDATE import_audits SET file_path = ?1, file_name = ?2, document_kind = ?3, status = ?4,
                        masters_processed = ?5, vouchers_processed = ?6, vouchers_inserted = ?7,
                        vouchers_updated = ?8, error_message = ?9, warnings = ?10, started_at = ?11,
                        finished_at = ?12
                     WHERE id = ?13",
                    values.as_slice(),
                )?;
            }
            None => {
                self.conn.execute(
                    "INSERT INTO import_audits (file_path, file_name, document_kind, status, masters_processed,
                        vouchers_processed, vouchers_inserted, vouchers_updated, error_message, warnings,
                        started_at, finished_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    values.as_slice(),
                )?;
                audit.id = Some(self.conn.last_insert_rowid());
            }
        }
        Ok(())
    }

    /// Most recent audits first.
    pub fn recent_audits(&self, limit: usize) -> Result<Vec<ImportAudit>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {AUDIT_COLUMNS} FROM import_audits ORDER BY id DESC LIMIT ?1"))?;
        let rows = stmt.query_map([limit as i64], audit_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn audit(&self, id: i64) -> Result<Option<ImportAudit>, StoreError> {
        Ok(self
            .conn
            .query_row(&format!("SELECT {AUDIT_COLUMNS} FROM import_audits WHERE id = ?1"), [id], audit_from_row)
            .optional()?)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn counts(&self) -> Result<StoreCounts, StoreError> {
        let count = |table: &str| -> Result<usize, StoreError> {
            let n: i64 = self.conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
            Ok(n as usize)
        };
        Ok(StoreCounts {
            companies: count("companies")?,
            ledgers: count("ledgers")?,
            units: count("units")?,
            stock_items: count("stock_items")?,
            vouchers: count("vouchers")?,
            voucher_lines: count("voucher_lines")?,
        })
    }

    /// Distinct stock item names across companies; the reconciliation targets.
    pub fn stock_item_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT name FROM stock_items ORDER BY name")?;
        let names = stmt.query_map([], |r| r.get(0))?;
        Ok(names.collect::<Result<Vec<String>, _>>()?)
    }

    // -----------------------------------------------------------------------
    // Reconciliation tables
    // -----------------------------------------------------------------------

    /// Write resolved reconciliation values in one transaction. Existing rows
    /// are overwritten by key.
    pub fn apply_reconciliation(&mut self, output: &ReconOutput) -> Result<ReconReport, StoreError> {
        let mut report = ReconReport::for_output(output);
        let now = now_stamp();
        let tx = self.conn.transaction()?;

        for g in &output.vendor_groups {
            let values = vec![
                opt_text(g.parent.as_deref()),
                Value::Text(g.base_unit.clone()),
                opt_text(g.guid.as_deref()),
            ];
            let inserted = upsert_named(&tx, "vendor_groups", "name", &g.name, &["parent", "base_unit", "guid"], values, &now)?;
            tally(&mut report.vendor_groups, inserted);
        }

        for a in &output.alternate_units {
            let values = vec![
                Value::Real(a.pkg_factor),
                Value::Text(a.pkg_unit.clone()),
                Value::Text(a.base_unit.clone()),
            ];
            let inserted = upsert_named(
                &tx,
                "alternate_units",
                "item_name",
                &a.item_name,
                &["pkg_factor", "pkg_unit", "base_unit"],
                values,
                &now,
            )?;
            tally(&mut report.alternate_units, inserted);
        }

        for m in &output.item_groups {
            let values = vec![Value::Text(m.group_name.clone())];
            let inserted = upsert_named(&tx, "item_group_mappings", "item_name", &m.item_name, &["group_name"], values, &now)?;
            tally(&mut report.item_groups, inserted);
        }

        tx.commit()?;
        log::info!(
            "Reconciliation stored: groups {}+{}, alternate units {}+{}, item groups {}+{} (added+updated)",
            report.vendor_groups.added,
            report.vendor_groups.updated,
            report.alternate_units.added,
            report.alternate_units.updated,
            report.item_groups.added,
            report.item_groups.updated
        );
        Ok(report)
    }

    pub fn pkg_factor(&self, item_name: &str) -> Result<Option<f64>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT pkg_factor FROM alternate_units WHERE item_name = ?1", [item_name], |r| r.get(0))
            .optional()?)
    }

    pub fn item_group(&self, item_name: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT group_name FROM item_group_mappings WHERE item_name = ?1", [item_name], |r| r.get(0))
            .optional()?
            .flatten())
    }
}

fn tally(counts: &mut TableCounts, inserted: bool) {
    if inserted {
        counts.added += 1;
    } else {
        counts.updated += 1;
    }
}

pub(crate) fn opt_text(v: Option<&str>) -> Value {
    v.map_or(Value::Null, |s| Value::Text(s.to_string()))
}

/// Overwrite the row with this key, or insert one. Returns true on insert.
fn upsert_named(
    tx: &Transaction<'_>,
    table: &str,
    key_col: &str,
    key: &str,
    cols: &[&str],
    mut values: Vec<Value>,
    now: &str,
) -> Result<bool, StoreError> {
    let existing: Option<i64> = tx
        .query_row(&format!("SELECT id FROM {table} WHERE {key_col} = ?1"), [key], |r| r.get(0))
        .optional()?;

    match existing {
        Some(id) => {
            let sets: Vec<String> = cols.iter().enumerate().map(|(i, c)| format!("{c} = ?{}", i + 1)).collect();
            let sql = format!(
                "UPDATE {table} SET {}, updated_at = ?{} WHERE id = ?{}",
                sets.join(", "),
                cols.len() + 1,
                cols.len() + 2
            );
            values.push(Value::Text(now.to_string()));
            values.push(Value::Integer(id));
            tx.execute(&sql, params_from_iter(values))?;
            Ok(false)
        }
        None => {
            let placeholders: Vec<String> = (1..=cols.len() + 3).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {table} ({key_col}, {}, created_at, updated_at) VALUES ({})",
                cols.join(", "),
                placeholders.join(", ")
            );
            values.insert(0, Value::Text(key.to_string()));
            values.push(Value::Text(now.to_string()));
            values.push(Value::Text(now.to_string()));
            tx.execute(&sql, params_from_iter(values))?;
            Ok(true)
        }
    }
}

fn parse_stamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<ImportAudit> {
    let kind: String = row.get(3)?;
    let status: String = row.get(4)?;
    let warnings: Option<String> = row.get(10)?;
    let warnings = match warnings {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?,
        None => Vec::new(),
    };
    let started: String = row.get(11)?;
    let finished: Option<String> = row.get(12)?;

    Ok(ImportAudit {
        id: Some(row.get(0)?),
        file_path: row.get(1)?,
        file_name: row.get(2)?,
        document_kind: DocumentKind::parse(&kind),
        status: ImportStatus::parse(&status),
        masters_processed: row.get(5)?,
        vouchers_processed: row.get(6)?,
        vouchers_inserted: row.get(7)?,
        vouchers_updated: row.get(8)?,
        error_message: row.get(9)?,
        warnings,
        started_at: parse_stamp(11, &started)?,
        finished_at: finished.as_deref().map(|s| parse_stamp(12, s)).transpose()?,
    })
}
