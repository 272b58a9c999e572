// Per-record extraction rules, shared by the structural and streaming parsers.
//
// Each extractor takes one element (COMPANY, LEDGER, UNIT, STOCKITEM or
// VOUCHER) and yields either the typed record plus any notes about fields it
// had to default, or a failure describing why the record was unusable.

use std::sync::OnceLock;

use regex::Regex;
use tallyflow_core::{
    parse_tally_date, Company, Ledger, LedgerType, LineKind, StockItem, Unit, Voucher, VoucherLine,
};

use crate::tree::Element;

/// A successfully extracted record plus notes about defaulted fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub value: T,
    pub notes: Vec<String>,
}

/// A record that could not be extracted. Never aborts the containing message.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub tag: &'static str,
    pub reason: String,
}

impl std::fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Could not parse {}: {}", self.tag, self.reason)
    }
}

pub type RecordResult<T> = Result<Extraction<T>, RecordFailure>;

// ── Field aliases ──────────────────────────────────────────────────────────

/// Where a field may live on an element. Tally is inconsistent about
/// attribute-vs-element placement and renamed several tags across releases.
#[derive(Debug, Clone, Copy)]
enum Src {
    Attr(&'static str),
    Child(&'static str),
}

use Src::{Attr, Child};

const NAME: &[Src] = &[Attr("NAME"), Child("NAME")];
const COMPANY_NAME: &[Src] = &[Attr("NAME"), Child("NAME"), Child("BASICCOMPANYNAME")];

const VOUCHER_NUMBER: &[Src] = &[Attr("VOUCHERNUMBER"), Child("VOUCHERNUMBER")];
const VOUCHER_TYPE: &[Src] = &[Attr("VOUCHERTYPENAME"), Child("VOUCHERTYPENAME")];
const VOUCHER_DATE: &[Src] = &[Attr("DATE"), Child("DATE")];
const PARTY: &[Src] = &[Child("PARTYNAME"), Attr("PARTYNAME")];
const PARTY_LEDGER: &[Src] = &[Child("PARTYLEDGERNAME")];
const IRN: &[Src] = &[Child("IRN")];
const ACK_NO: &[Src] = &[Child("IRNACKNO")];
const ACK_DATE: &[Src] = &[Child("IRNACKDATE")];
const TOTAL: &[Src] = &[Child("VOUCHERTOTAL"), Child("AMOUNT")];
const GSTIN: &[Src] = &[Child("GSTREGISTRATIONNUMBER"), Child("GSTNO"), Child("CMPGSTIN")];
const PLACE_OF_SUPPLY: &[Src] = &[Child("PLACEOFSUPPLY"), Child("DESTINATIONSTATE")];
const BILLING_CITY: &[Src] = &[Child("BILLTOPLACE"), Child("SHIPCITY")];
const REFERENCE: &[Src] = &[Child("REFERENCE"), Child("REFNO")];
const DUE_DATE: &[Src] = &[Child("DUEDATE"), Child("BILLDATE")];
const NARRATION: &[Src] = &[Child("NARRATION")];
const COMPANY_HINT: &[Src] = &[Child("CMPNAME")];

const LEDGER_CONTAINERS: [&str; 2] = ["ALLLEDGERENTRIES.LIST", "LEDGERENTRIES.LIST"];
const INVENTORY_CONTAINERS: [&str; 2] = ["ALLINVENTORYENTRIES.LIST", "INVENTORYENTRIES.LIST"];

const TAX_KEYWORDS: [&str; 8] = ["cgst", "sgst", "igst", "cess", "tax", "gst", "tds", "tcs"];

/// First non-blank value among the aliases, in order.
fn first_of<'a>(el: &'a Element, aliases: &[Src]) -> Option<&'a str> {
    aliases.iter().find_map(|src| match *src {
        Attr(key) => el.attr_text(key),
        Child(tag) => el.child_text(tag),
    })
}

fn owned(v: Option<&str>) -> Option<String> {
    v.map(str::to_string)
}

fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_uppercase().as_str(), "YES" | "TRUE" | "1")
}

fn flag(el: &Element, tag: &str) -> bool {
    el.child_text(tag).is_some_and(is_truthy)
}

// ── Value parsing ──────────────────────────────────────────────────────────

/// Plain number with thousands separators removed.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").trim().parse::<f64>().ok()
}

fn qty_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([+-]?\s*[\d.,]+)\s*([A-Za-z].*)?\s*$").expect("valid regex"))
}

/// Parse a quantity such as `10 PC`, ` 20 PC` or `5.5 KGS`.
pub fn parse_quantity(raw: &str) -> Option<(f64, Option<String>)> {
    let raw = raw.trim();
    let caps = qty_re().captures(raw)?;
    let num: String = caps[1].chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    let qty = num.parse::<f64>().ok()?;
    let unit = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|u| !u.is_empty());
    Some((qty, unit))
}

/// Parse a rate such as `1066.96/PC`; only the numeric prefix is kept.
pub fn parse_rate(raw: &str) -> Option<f64> {
    let head = raw.split('/').next().unwrap_or(raw);
    parse_number(head)
}

/// Canonical unit spelling: PC/NOS/NO/UNIT/U → PCS, KGS → KG, MTRS/M → MTR.
pub fn normalize_unit(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    match upper.as_str() {
        "PC" | "NOS" | "NO" | "UNIT" | "U" => "PCS".to_string(),
        "KGS" => "KG".to_string(),
        "MTRS" | "M" => "MTR".to_string(),
        _ => upper,
    }
}

/// Title-case voucher type names. Unknown types pass through; blank is `Unknown`.
pub fn normalize_voucher_type(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "Unknown".to_string();
    }
    let canonical = match raw.to_uppercase().as_str() {
        "SALES" => "Sales",
        "PURCHASE" => "Purchase",
        "RECEIPT" => "Receipt",
        "PAYMENT" => "Payment",
        "JOURNAL" => "Journal",
        "CONTRA" => "Contra",
        "DEBIT NOTE" | "DEBITNOTE" => "Debit Note",
        "CREDIT NOTE" | "CREDITNOTE" => "Credit Note",
        "SALES ORDER" => "Sales Order",
        "PURCHASE ORDER" => "Purchase Order",
        "DELIVERY NOTE" => "Delivery Note",
        "RECEIPT NOTE" => "Receipt Note",
        "REJECTION IN" => "Rejection In",
        "REJECTION OUT" => "Rejection Out",
        "STOCK JOURNAL" => "Stock Journal",
        "PAYROLL" => "Payroll",
        "MEMORANDUM" => "Memorandum",
        _ => return raw.to_string(),
    };
    canonical.to_string()
}

/// True when the text names a tax head (CGST, "Output IGST 18%", TDS, ...).
pub fn is_tax_name(s: &str) -> bool {
    let lower = s.to_lowercase();
    TAX_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Collects notes for fields that had to be defaulted.
struct Notes {
    context: String,
    notes: Vec<String>,
}

impl Notes {
    fn new(context: impl Into<String>) -> Self {
        Self { context: context.into(), notes: Vec::new() }
    }

    fn note(&mut self, msg: String) {
        self.notes.push(format!("{}: {}", self.context, msg));
    }

    /// Optional number: absent → `None`, unparseable → `None` plus a note.
    fn number(&mut self, field: &str, raw: Option<&str>, parse: fn(&str) -> Option<f64>) -> Option<f64> {
        let raw = raw?;
        let parsed = parse(raw);
        if parsed.is_none() {
            self.note(format!("unparseable {field} {raw:?}"));
        }
        parsed
    }

    /// Required amount: absent → 0, unparseable → 0 plus a note.
    fn amount(&mut self, field: &str, raw: Option<&str>) -> f64 {
        match raw {
            Some(raw) => self.number(field, Some(raw), parse_number).unwrap_or(0.0),
            None => 0.0,
        }
    }

    fn date(&mut self, field: &str, raw: Option<&str>) -> Option<chrono::NaiveDate> {
        let raw = raw?;
        let parsed = parse_tally_date(raw);
        if parsed.is_none() {
            self.note(format!("could not parse {field} {raw:?}"));
        }
        parsed
    }

    fn finish<T>(self, value: T) -> RecordResult<T> {
        Ok(Extraction { value, notes: self.notes })
    }
}

fn opening_quantity(raw: &str) -> Option<f64> {
    parse_quantity(raw).map(|(q, _)| q)
}

/// Address either as a direct ADDRESS child or as ADDRESS.LIST lines.
fn address(el: &Element) -> Option<String> {
    if let Some(a) = el.child_text("ADDRESS") {
        return Some(a.to_string());
    }
    let lines: Vec<&str> = el
        .child("ADDRESS.LIST")?
        .children_named("ADDRESS")
        .map(|a| a.text.trim())
        .filter(|t| !t.is_empty())
        .collect();
    (!lines.is_empty()).then(|| lines.join(", "))
}

fn require_name<'a>(el: &'a Element, tag: &'static str, aliases: &[Src]) -> Result<&'a str, RecordFailure> {
    first_of(el, aliases).ok_or_else(|| RecordFailure { tag, reason: "missing NAME".to_string() })
}

// ── Masters ────────────────────────────────────────────────────────────────

pub fn extract_company(el: &Element) -> RecordResult<Company> {
    let name = require_name(el, "COMPANY", COMPANY_NAME)?;
    Notes::new(format!("Company {name}")).finish(Company {
        name: name.to_string(),
        gstin: owned(el.child_text("GSTIN").or_else(|| el.child_text("GSTREGISTRATIONNUMBER"))),
        address: address(el).or_else(|| owned(el.child_text("BASICCOMPANYFORMALNAME"))),
        state: owned(el.child_text("BASICCOMPANYSTATE").or_else(|| el.child_text("STATENAME"))),
        pincode: owned(el.child_text("PINCODE")),
        email: owned(el.child_text("EMAIL")),
        phone: owned(el.child_text("PHONE")),
    })
}

pub fn extract_ledger(el: &Element) -> RecordResult<Ledger> {
    let name = require_name(el, "LEDGER", NAME)?;
    let mut notes = Notes::new(format!("Ledger {name}"));
    let parent = el.child_text("PARENT");
    let opening_balance = notes.number("opening balance", el.child_text("OPENINGBALANCE"), opening_quantity);

    notes.finish(Ledger {
        name: name.to_string(),
        parent_group: owned(parent),
        mailing_name: owned(el.child_text("MAILINGNAME")),
        gstin: owned(el.child_text("PARTYGSTIN").or_else(|| el.child_text("GSTIN"))),
        pan: owned(el.child_text("INCOMETAXNUMBER")),
        email: owned(el.child_text("EMAIL")),
        phone: owned(el.child_text("LEDPHONE")),
        address: address(el),
        state: owned(el.child_text("STATENAME")),
        pincode: owned(el.child_text("PINCODE")),
        opening_balance,
        ledger_type: LedgerType::from_parent_group(parent.unwrap_or("")),
    })
}

pub fn extract_unit(el: &Element) -> RecordResult<Unit> {
    let name = require_name(el, "UNIT", NAME)?;
    Notes::new(format!("Unit {name}")).finish(Unit {
        name: name.to_string(),
        symbol: Some(el.child_text("ORIGINALNAME").unwrap_or(name).to_string()),
        formal_name: owned(el.child_text("FORMALNAME")),
        is_simple_unit: if el.has_child("ISSIMPLEUNIT") { flag(el, "ISSIMPLEUNIT") } else { true },
    })
}

pub fn extract_stock_item(el: &Element) -> RecordResult<StockItem> {
    let name = require_name(el, "STOCKITEM", NAME)?;
    let mut notes = Notes::new(format!("Stock item {name}"));

    let gst = el.child("GSTDETAILS.LIST");
    let hsn = el
        .child_text("HSNCODE")
        .or_else(|| el.child_text("HSN"))
        .or_else(|| gst.and_then(|g| g.child_text("HSNCODE")));
    let gst_rate_raw = el.child_text("TAXRATE").or_else(|| el.child_text("GSTRATE"));
    let gst_applicable = flag(el, "GSTAPPLICABLE")
        || el
            .child_text("ISGSTAPPLICABLE")
            .is_some_and(|v| v.eq_ignore_ascii_case("YES"));

    let base_unit = el
        .child_text("BASEUNITS")
        .or_else(|| el.child_text("UNITS"))
        .map(normalize_unit)
        .unwrap_or_else(|| "PCS".to_string());

    let gst_rate = notes.number("GST rate", gst_rate_raw, parse_number);
    let standard_rate = notes.number("standard rate", el.child_text("STANDARDRATE"), parse_rate);
    let opening_balance = notes.number("opening balance", el.child_text("OPENINGBALANCE"), opening_quantity);
    let opening_value = notes
        .number("opening value", el.child_text("OPENINGVALUE"), parse_number)
        .map(f64::abs);

    notes.finish(StockItem {
        name: name.to_string(),
        base_unit,
        category: owned(el.child_text("CATEGORY")),
        gst_applicable,
        hsn_code: owned(hsn),
        gst_rate,
        standard_rate,
        opening_balance,
        opening_value,
    })
}

// ── Vouchers ───────────────────────────────────────────────────────────────

pub fn extract_voucher(el: &Element) -> RecordResult<Voucher> {
    let number = first_of(el, VOUCHER_NUMBER);
    let raw_date = first_of(el, VOUCHER_DATE);
    let irn = first_of(el, IRN);
    if number.is_none() && raw_date.is_none() && irn.is_none() {
        return Err(RecordFailure {
            tag: "VOUCHER",
            reason: "no voucher number, date or IRN".to_string(),
        });
    }

    let number = number.unwrap_or("");
    let mut notes = Notes::new(format!("Voucher {number}"));
    let voucher_type = normalize_voucher_type(first_of(el, VOUCHER_TYPE).unwrap_or(""));
    let raw_date = raw_date.unwrap_or("");
    let date = notes.date("date", Some(raw_date).filter(|d| !d.is_empty()));
    let due_date = notes.date("due date", first_of(el, DUE_DATE));
    let declared = notes.amount("amount", first_of(el, TOTAL));

    let party_name = first_of(el, PARTY);
    let party_ledger = first_of(el, PARTY_LEDGER).or(party_name);
    let company_hint = first_of(el, COMPANY_HINT).unwrap_or("");

    let lines = extract_lines(el, &mut notes);
    let amount = Voucher::resolve_amount(declared, &lines);

    notes.finish(Voucher {
        number: number.to_string(),
        dedup_key: Voucher::compose_dedup_key(&voucher_type, number, company_hint, raw_date),
        voucher_type,
        date,
        raw_date: raw_date.to_string(),
        party_name: owned(party_name),
        party_ledger: owned(party_ledger),
        amount,
        narration: owned(first_of(el, NARRATION)),
        irn: owned(irn),
        ack_no: owned(first_of(el, ACK_NO)),
        ack_date: owned(first_of(el, ACK_DATE)),
        gstin: owned(first_of(el, GSTIN)),
        place_of_supply: owned(first_of(el, PLACE_OF_SUPPLY)),
        billing_city: owned(first_of(el, BILLING_CITY)),
        reference_number: owned(first_of(el, REFERENCE)),
        due_date,
        is_cancelled: el.attr_text("ISCANCELLED").is_some_and(is_truthy) || flag(el, "ISCANCELLED"),
        raw_xml: Some(el.to_xml()),
        lines,
    })
}

/// Financial lines first, then inventory lines, one sequence across both.
fn extract_lines(voucher: &Element, notes: &mut Notes) -> Vec<VoucherLine> {
    let mut lines = Vec::new();
    let mut seq = 0u32;

    for tag in LEDGER_CONTAINERS {
        for entry in voucher.children_named(tag) {
            let ledger_name = entry.child_text("LEDGERNAME").unwrap_or("");
            let tax_type = entry.child_text("TAXTYPE");
            let is_tax = is_tax_name(ledger_name) || tax_type.is_some_and(is_tax_name);
            let tax_head = match tax_type {
                Some(t) => Some(t.to_string()),
                None if is_tax => Some(ledger_name.to_string()),
                None => None,
            };
            lines.push(VoucherLine {
                sequence: seq,
                kind: LineKind::Ledger,
                ledger_name: ledger_name.to_string(),
                amount: notes.amount("line amount", entry.child_text("AMOUNT")),
                is_tax_line: is_tax,
                tax_head,
                tax_rate: notes.number("tax rate", entry.child_text("TAXRATE"), parse_number),
                stock_item_name: None,
                quantity: None,
                unit: None,
                rate: None,
                discount: None,
                gstin_of_party: owned(entry.child_text("GSTREGNO")),
            });
            seq += 1;
        }
    }

    for tag in INVENTORY_CONTAINERS {
        for entry in voucher.children_named(tag) {
            // Empty placeholders carry no item and are not real movements.
            let Some(item) = entry.child_text("STOCKITEMNAME") else {
                continue;
            };
            let qty_raw = entry.child_text("ACTUALQTY").or_else(|| entry.child_text("BILLEDQTY"));
            let parsed_qty = qty_raw.and_then(parse_quantity);
            if let (Some(raw), None) = (qty_raw, &parsed_qty) {
                notes.note(format!("unparseable quantity {raw:?}"));
            }
            let (quantity, qty_unit) = match parsed_qty {
                Some((q, u)) => (Some(q), u),
                None => (None, None),
            };

            lines.push(VoucherLine {
                sequence: seq,
                kind: LineKind::Inventory,
                ledger_name: item.to_string(),
                amount: notes.amount("item amount", entry.child_text("AMOUNT")).abs(),
                is_tax_line: false,
                tax_head: None,
                tax_rate: None,
                stock_item_name: Some(item.to_string()),
                quantity,
                unit: owned(entry.child_text("UNIT")).or(qty_unit),
                rate: notes.number("rate", entry.child_text("RATE"), parse_rate),
                discount: notes.number("discount", entry.child_text("DISCOUNT"), parse_number),
                gstin_of_party: None,
            });
            seq += 1;
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::parse_tree;
    use chrono::NaiveDate;

    fn voucher(xml: &str) -> Extraction<Voucher> {
        extract_voucher(&parse_tree(xml).unwrap()).unwrap()
    }

    #[test]
    fn quantity_with_unit() {
        assert_eq!(parse_quantity(" 10 PC"), Some((10.0, Some("PC".to_string()))));
        assert_eq!(parse_quantity("1,250.5 KGS"), Some((1250.5, Some("KGS".to_string()))));
        assert_eq!(parse_quantity("-3"), Some((-3.0, None)));
        assert_eq!(parse_quantity("PC 10"), None);
        assert_eq!(parse_quantity(""), None);
    }

    #[test]
    fn rate_takes_prefix_before_slash() {
        assert_eq!(parse_rate("1066.96/PC"), Some(1066.96));
        assert_eq!(parse_rate("1,200"), Some(1200.0));
        assert_eq!(parse_rate("abc/PC"), None);
    }

    #[test]
    fn voucher_type_synonyms() {
        assert_eq!(normalize_voucher_type("SALES"), "Sales");
        assert_eq!(normalize_voucher_type("debitnote"), "Debit Note");
        assert_eq!(normalize_voucher_type("Tax Invoice"), "Tax Invoice");
        assert_eq!(normalize_voucher_type(""), "Unknown");
    }

    #[test]
    fn units_normalize() {
        assert_eq!(normalize_unit("nos"), "PCS");
        assert_eq!(normalize_unit("KGS"), "KG");
        assert_eq!(normalize_unit("Mtrs"), "MTR");
        assert_eq!(normalize_unit("BOX"), "BOX");
    }

    #[test]
    fn sales_voucher_fields_and_lines() {
        let x = voucher(
            r#"<VOUCHER VCHTYPE="Sales" ISCANCELLED="No">
                <DATE>20240115</DATE>
                <VOUCHERTYPENAME>SALES</VOUCHERTYPENAME>
                <VOUCHERNUMBER>SI/001</VOUCHERNUMBER>
                <PARTYNAME>Acme Traders</PARTYNAME>
                <CMPNAME>Kona Cycles</CMPNAME>
                <IRN>abc123</IRN>
                <ALLLEDGERENTRIES.LIST><LEDGERNAME>Acme Traders</LEDGERNAME><AMOUNT>-11,800.00</AMOUNT></ALLLEDGERENTRIES.LIST>
                <ALLLEDGERENTRIES.LIST><LEDGERNAME>Sales 18%</LEDGERNAME><AMOUNT>10000</AMOUNT></ALLLEDGERENTRIES.LIST>
                <ALLLEDGERENTRIES.LIST><LEDGERNAME>Output CGST</LEDGERNAME><AMOUNT>900</AMOUNT><TAXRATE>9</TAXRATE></ALLLEDGERENTRIES.LIST>
                <ALLLEDGERENTRIES.LIST><LEDGERNAME>Round Off</LEDGERNAME><TAXTYPE>SGST</TAXTYPE><AMOUNT>900</AMOUNT></ALLLEDGERENTRIES.LIST>
                <ALLINVENTORYENTRIES.LIST><STOCKITEMNAME>Bolt M5</STOCKITEMNAME><ACTUALQTY> 10 PC</ACTUALQTY><RATE>1000/PC</RATE><AMOUNT>-10000</AMOUNT></ALLINVENTORYENTRIES.LIST>
                <ALLINVENTORYENTRIES.LIST><AMOUNT>0</AMOUNT></ALLINVENTORYENTRIES.LIST>
            </VOUCHER>"#,
        );
        let v = x.value;
        assert!(x.notes.is_empty(), "{:?}", x.notes);
        assert_eq!(v.number, "SI/001");
        assert_eq!(v.voucher_type, "Sales");
        assert_eq!(v.date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(v.party_ledger.as_deref(), Some("Acme Traders"));
        // No declared total: inventory values count toward the debit side.
        assert_eq!(v.amount, 21800.0);
        assert!(!v.is_cancelled);
        assert_eq!(v.dedup_key, "Sales|SI/001|Kona Cycles|20240115");
        assert!(v.raw_xml.as_deref().unwrap().starts_with("<VOUCHER VCHTYPE=\"Sales\""));

        assert_eq!(v.lines.len(), 5);
        let seqs: Vec<u32> = v.lines.iter().map(|l| l.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert!(!v.lines[1].is_tax_line);
        assert!(v.lines[2].is_tax_line);
        assert_eq!(v.lines[2].tax_head.as_deref(), Some("Output CGST"));
        assert_eq!(v.lines[2].tax_rate, Some(9.0));
        assert!(v.lines[3].is_tax_line);
        assert_eq!(v.lines[3].tax_head.as_deref(), Some("SGST"));

        let inv = &v.lines[4];
        assert_eq!(inv.kind, LineKind::Inventory);
        assert_eq!(inv.stock_item_name.as_deref(), Some("Bolt M5"));
        assert_eq!(inv.quantity, Some(10.0));
        assert_eq!(inv.unit.as_deref(), Some("PC"));
        assert_eq!(inv.rate, Some(1000.0));
        assert_eq!(inv.amount, 10000.0);
    }

    #[test]
    fn attribute_aliases_and_cancellation() {
        let v = voucher(
            r#"<VOUCHER VOUCHERNUMBER="R-9" VOUCHERTYPENAME="receipt" DATE="15-01-2024" PARTYNAME="Cash">
                <ISCANCELLED>Yes</ISCANCELLED><VOUCHERTOTAL>500</VOUCHERTOTAL></VOUCHER>"#,
        )
        .value;
        assert_eq!(v.number, "R-9");
        assert_eq!(v.voucher_type, "Receipt");
        assert_eq!(v.date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(v.party_name.as_deref(), Some("Cash"));
        assert_eq!(v.amount, 500.0);
        assert!(v.is_cancelled);
    }

    #[test]
    fn bad_date_is_null_with_note() {
        let x = voucher("<VOUCHER><VOUCHERNUMBER>J1</VOUCHERNUMBER><DATE>31-31-2024</DATE></VOUCHER>");
        assert_eq!(x.value.date, None);
        assert_eq!(x.value.raw_date, "31-31-2024");
        assert_eq!(x.notes.len(), 1);
        assert!(x.notes[0].contains("31-31-2024"));
    }

    #[test]
    fn bad_numbers_default_with_notes() {
        let x = voucher(
            "<VOUCHER><VOUCHERNUMBER>J2</VOUCHERNUMBER><DATE>20240101</DATE>\
             <LEDGERENTRIES.LIST><LEDGERNAME>X</LEDGERNAME><AMOUNT>twelve</AMOUNT></LEDGERENTRIES.LIST></VOUCHER>",
        );
        assert_eq!(x.value.lines[0].amount, 0.0);
        assert_eq!(x.notes.len(), 1);
    }

    #[test]
    fn anonymous_voucher_fails() {
        let el = parse_tree("<VOUCHER><NARRATION>nothing</NARRATION></VOUCHER>").unwrap();
        let err = extract_voucher(&el).unwrap_err();
        assert_eq!(err.tag, "VOUCHER");
    }

    #[test]
    fn stock_item_master() {
        let el = parse_tree(
            r#"<STOCKITEM NAME="Bolt M5"><BASEUNITS>Nos</BASEUNITS><OPENINGBALANCE> 9 PC</OPENINGBALANCE>
               <OPENINGVALUE>-1,500</OPENINGVALUE><GSTDETAILS.LIST><HSNCODE>7318</HSNCODE></GSTDETAILS.LIST>
               <STANDARDRATE>150/PC</STANDARDRATE><GSTAPPLICABLE>Yes</GSTAPPLICABLE></STOCKITEM>"#,
        )
        .unwrap();
        let item = extract_stock_item(&el).unwrap().value;
        assert_eq!(item.base_unit, "PCS");
        assert_eq!(item.opening_balance, Some(9.0));
        assert_eq!(item.opening_value, Some(1500.0));
        assert_eq!(item.hsn_code.as_deref(), Some("7318"));
        assert_eq!(item.standard_rate, Some(150.0));
        assert!(item.gst_applicable);
    }

    #[test]
    fn master_without_name_fails() {
        let el = parse_tree("<LEDGER><PARENT>Sundry Debtors</PARENT></LEDGER>").unwrap();
        assert_eq!(extract_ledger(&el).unwrap_err().tag, "LEDGER");
    }

    #[test]
    fn ledger_and_unit_masters() {
        let el = parse_tree(
            r#"<LEDGER NAME="Acme"><PARENT>Sundry Debtors</PARENT><ADDRESS.LIST><ADDRESS>1 Main St</ADDRESS><ADDRESS>Pune</ADDRESS></ADDRESS.LIST></LEDGER>"#,
        )
        .unwrap();
        let l = extract_ledger(&el).unwrap().value;
        assert_eq!(l.ledger_type, LedgerType::Debtor);
        assert_eq!(l.address.as_deref(), Some("1 Main St, Pune"));
        assert_eq!(l.opening_balance, None);

        let u = extract_unit(&parse_tree(r#"<UNIT NAME="PC"/>"#).unwrap()).unwrap().value;
        assert_eq!(u.symbol.as_deref(), Some("PC"));
        assert!(u.is_simple_unit);
    }
}
