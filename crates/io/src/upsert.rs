// Idempotent persistence of a parsed document.
//
// Masters are keyed by name (scoped to the company for everything but the
// company itself); vouchers by IRN, else by dedup key. Updates only overwrite
// columns the incoming record actually carries.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use tallyflow_core::{MasterRecord, Voucher, VoucherIdentity};

use crate::error::StoreError;
use crate::parse::ParsedDocument;
use crate::store::{now_stamp, opt_text};

/// How many changed fields an update log line spells out.
const DIFF_LOG_LIMIT: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertOutcome {
    pub company_id: Option<i64>,
    pub masters_processed: u32,
    pub vouchers_processed: u32,
    pub vouchers_inserted: u32,
    pub vouchers_updated: u32,
    /// Skipped and failed vouchers, in document order.
    pub warnings: Vec<String>,
}

type Columns = Vec<(&'static str, Value)>;

/// Persist one document in a single transaction.
///
/// Each voucher runs inside its own savepoint: a failing voucher is rolled
/// back alone and reported as a warning. Errors opening or committing the
/// transaction, or writing a master, abort the whole document.
pub fn upsert_document(conn: &mut Connection, doc: &ParsedDocument) -> Result<UpsertOutcome, StoreError> {
    let now = now_stamp();
    let mut tx = conn.transaction()?;
    let mut out = UpsertOutcome::default();

    for master in doc.masters() {
        let id = upsert_master(&tx, &master, out.company_id, &now)?;
        if matches!(master, MasterRecord::Company(_)) {
            out.company_id = Some(id);
        }
        out.masters_processed += 1;
    }

    for voucher in &doc.vouchers {
        out.vouchers_processed += 1;
        let Some(date) = voucher.date else {
            out.warnings.push(format!("Skipped voucher {} - no date", voucher.number));
            continue;
        };

        let sp = tx.savepoint()?;
        match upsert_voucher(&sp, voucher, date, out.company_id, &now) {
            Ok(inserted) => {
                sp.commit()?;
                if inserted {
                    out.vouchers_inserted += 1;
                } else {
                    out.vouchers_updated += 1;
                }
            }
            Err(e) => {
                // Dropping the savepoint rolls back this voucher only.
                log::error!("Voucher upsert failed: {e}");
                out.warnings.push(format!("Voucher error: {e}"));
            }
        }
    }

    tx.commit()?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Masters
// ---------------------------------------------------------------------------

fn upsert_master(conn: &Connection, master: &MasterRecord, company_id: Option<i64>, now: &str) -> Result<i64, StoreError> {
    let (table, cols) = master_columns(master);
    let name = Value::Text(master.name().to_string());

    let (filter, keys) = match master {
        MasterRecord::Company(_) => ("name = ?1", vec![name.clone()]),
        _ => ("name = ?1 AND company_id IS ?2", vec![name.clone(), id_value(company_id)]),
    };

    match find_row(conn, table, filter, keys, &cols)? {
        Some((id, _)) => {
            update_row(conn, table, id, &cols, Vec::new(), now)?;
            Ok(id)
        }
        None => {
            let mut row: Columns = vec![("name", name)];
            if !matches!(master, MasterRecord::Company(_)) {
                row.push(("company_id", id_value(company_id)));
            }
            row.extend(cols);
            insert_row(conn, table, row, now)
        }
    }
}

fn master_columns(master: &MasterRecord) -> (&'static str, Columns) {
    match master {
        MasterRecord::Company(c) => (
            "companies",
            vec![
                ("gstin", opt_text(c.gstin.as_deref())),
                ("address", opt_text(c.address.as_deref())),
                ("state", opt_text(c.state.as_deref())),
                ("pincode", opt_text(c.pincode.as_deref())),
                ("email", opt_text(c.email.as_deref())),
                ("phone", opt_text(c.phone.as_deref())),
            ],
        ),
        MasterRecord::Ledger(l) => (
            "ledgers",
            vec![
                ("parent_group", opt_text(l.parent_group.as_deref())),
                ("mailing_name", opt_text(l.mailing_name.as_deref())),
                ("gstin", opt_text(l.gstin.as_deref())),
                ("pan", opt_text(l.pan.as_deref())),
                ("email", opt_text(l.email.as_deref())),
                ("phone", opt_text(l.phone.as_deref())),
                ("address", opt_text(l.address.as_deref())),
                ("state", opt_text(l.state.as_deref())),
                ("pincode", opt_text(l.pincode.as_deref())),
                ("opening_balance", opt_real(l.opening_balance)),
                // Null without a parent group, so an update keeps the stored type.
                (
                    "ledger_type",
                    match l.parent_group {
                        Some(_) => Value::Text(l.ledger_type.as_str().to_string()),
                        None => Value::Null,
                    },
                ),
            ],
        ),
        MasterRecord::Unit(u) => (
            "units",
            vec![
                ("symbol", opt_text(u.symbol.as_deref())),
                ("formal_name", opt_text(u.formal_name.as_deref())),
                ("is_simple_unit", flag(u.is_simple_unit)),
            ],
        ),
        MasterRecord::StockItem(s) => (
            "stock_items",
            vec![
                ("base_unit", Value::Text(s.base_unit.clone())),
                ("category", opt_text(s.category.as_deref())),
                ("gst_applicable", flag(s.gst_applicable)),
                ("hsn_code", opt_text(s.hsn_code.as_deref())),
                ("gst_rate", opt_real(s.gst_rate)),
                ("standard_rate", opt_real(s.standard_rate)),
                ("opening_balance", opt_real(s.opening_balance)),
                ("opening_value", opt_real(s.opening_value)),
            ],
        ),
    }
}

// ---------------------------------------------------------------------------
// Vouchers
// ---------------------------------------------------------------------------

/// Returns true when the voucher was inserted, false when updated.
fn upsert_voucher(
    conn: &Connection,
    voucher: &Voucher,
    date: NaiveDate,
    company_id: Option<i64>,
    now: &str,
) -> Result<bool, StoreError> {
    let (filter, key) = match voucher.identity() {
        VoucherIdentity::Irn(irn) => ("irn = ?1", irn),
        VoucherIdentity::DedupKey(key) => ("dedup_key = ?1", key),
    };
    let cols = voucher_columns(voucher, date);

    let (id, inserted) = match find_row(conn, "vouchers", filter, vec![Value::Text(key.to_string())], &cols)? {
        Some((id, old)) => {
            let diffs = describe_changes(&old, &cols);
            if !diffs.is_empty() {
                let shown = &diffs[..diffs.len().min(DIFF_LOG_LIMIT)];
                log::debug!("Updating voucher {}: {}", voucher.number, shown.join(", "));
            }
            update_row(conn, "vouchers", id, &cols, vec![("company_id", id_value(company_id))], now)?;
            (id, false)
        }
        None => {
            let mut row = cols;
            row.push(("company_id", id_value(company_id)));
            (insert_row(conn, "vouchers", row, now)?, true)
        }
    };

    replace_lines(conn, id, voucher)?;
    Ok(inserted)
}

fn voucher_columns(v: &Voucher, date: NaiveDate) -> Columns {
    vec![
        ("voucher_number", Value::Text(v.number.clone())),
        ("voucher_type", Value::Text(v.voucher_type.clone())),
        ("voucher_date", Value::Text(date.format("%Y-%m-%d").to_string())),
        ("raw_date", Value::Text(v.raw_date.clone())),
        ("party_name", opt_text(v.party_name.as_deref())),
        ("party_ledger", opt_text(v.party_ledger.as_deref())),
        ("amount", Value::Real(v.amount)),
        ("narration", opt_text(v.narration.as_deref())),
        ("irn", opt_text(v.irn.as_deref().filter(|s| !s.is_empty()))),
        ("ack_no", opt_text(v.ack_no.as_deref())),
        ("ack_date", opt_text(v.ack_date.as_deref())),
        ("gstin", opt_text(v.gstin.as_deref())),
        ("place_of_supply", opt_text(v.place_of_supply.as_deref())),
        ("billing_city", opt_text(v.billing_city.as_deref())),
        ("reference_number", opt_text(v.reference_number.as_deref())),
        ("due_date", v.due_date.map_or(Value::Null, |d| Value::Text(d.format("%Y-%m-%d").to_string()))),
        ("is_cancelled", flag(v.is_cancelled)),
        ("raw_xml", opt_text(v.raw_xml.as_deref())),
        ("dedup_key", Value::Text(v.dedup_key.clone())),
    ]
}

/// Lines have no identity of their own: drop whatever the voucher had and
/// write the parsed set.
fn replace_lines(conn: &Connection, voucher_id: i64, voucher: &Voucher) -> Result<(), StoreError> {
    conn.execute("DELETE FROM voucher_lines WHERE voucher_id = ?1", [voucher_id])?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO voucher_lines (voucher_id, sequence, kind, ledger_name, amount, is_tax_line, tax_head,
            tax_rate, stock_item_name, quantity, unit, rate, discount, gstin_of_party)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )?;
    for line in &voucher.lines {
        stmt.execute(params![
            voucher_id,
            line.sequence,
            line.kind.as_str(),
            line.ledger_name,
            line.amount,
            line.is_tax_line,
            line.tax_head,
            line.tax_rate,
            line.stock_item_name,
            line.quantity,
            line.unit,
            line.rate,
            line.discount,
            line.gstin_of_party,
        ])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn id_value(id: Option<i64>) -> Value {
    id.map_or(Value::Null, Value::Integer)
}

fn opt_real(v: Option<f64>) -> Value {
    v.map_or(Value::Null, Value::Real)
}

fn flag(b: bool) -> Value {
    Value::Integer(i64::from(b))
}

/// Id and current values of `cols` for the first row matching `filter`.
fn find_row(
    conn: &Connection,
    table: &str,
    filter: &str,
    keys: Vec<Value>,
    cols: &[(&'static str, Value)],
) -> Result<Option<(i64, Vec<Value>)>, StoreError> {
    let names: Vec<&str> = cols.iter().map(|(c, _)| *c).collect();
    let sql = format!("SELECT id, {} FROM {table} WHERE {filter} LIMIT 1", names.join(", "));
    let row = conn
        .query_row(&sql, params_from_iter(keys), |r| {
            let id: i64 = r.get(0)?;
            let values = (1..=cols.len()).map(|i| r.get::<_, Value>(i)).collect::<Result<Vec<_>, _>>()?;
            Ok((id, values))
        })
        .optional()?;
    Ok(row)
}

/// `col = COALESCE(new, col)` for every column, plus plain assignments.
fn update_row(
    conn: &Connection,
    table: &str,
    id: i64,
    cols: &[(&'static str, Value)],
    assign: Columns,
    now: &str,
) -> Result<(), StoreError> {
    let mut sets: Vec<String> = Vec::with_capacity(cols.len() + assign.len() + 1);
    let mut values: Vec<Value> = Vec::with_capacity(sets.capacity() + 1);

    for (col, value) in cols {
        values.push(value.clone());
        sets.push(format!("{col} = COALESCE(?{}, {col})", values.len()));
    }
    for (col, value) in assign {
        values.push(value);
        sets.push(format!("{col} = ?{}", values.len()));
    }
    values.push(Value::Text(now.to_string()));
    sets.push(format!("updated_at = ?{}", values.len()));
    values.push(Value::Integer(id));

    let sql = format!("UPDATE {table} SET {} WHERE id = ?{}", sets.join(", "), values.len());
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

fn insert_row(conn: &Connection, table: &str, mut cols: Columns, now: &str) -> Result<i64, StoreError> {
    cols.push(("created_at", Value::Text(now.to_string())));
    cols.push(("updated_at", Value::Text(now.to_string())));

    let names: Vec<&str> = cols.iter().map(|(c, _)| *c).collect();
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    let sql = format!("INSERT INTO {table} ({}) VALUES ({})", names.join(", "), placeholders.join(", "));
    conn.execute(&sql, params_from_iter(cols.into_iter().map(|(_, v)| v)))?;
    Ok(conn.last_insert_rowid())
}

/// `"field: old -> new"` for every incoming non-null value that differs.
fn describe_changes(old: &[Value], cols: &[(&'static str, Value)]) -> Vec<String> {
    cols.iter()
        .zip(old)
        .filter(|((_, new), old)| *new != Value::Null && new != *old)
        .map(|((name, new), old)| format!("{name}: {} -> {}", show(old), show(new)))
        .collect()
}

fn show(v: &Value) -> String {
    match v {
        Value::Null => "null".into(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(s) if s.len() > 40 => format!("{:?}...", s.chars().take(40).collect::<String>()),
        Value::Text(s) => format!("{s:?}"),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
