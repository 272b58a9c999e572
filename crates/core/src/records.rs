use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Masters
// ---------------------------------------------------------------------------

/// A company detected from a COMPANY element (or the SVCURRENTCOMPANY hint).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Simplified ledger classification, inferred from the ledger's parent group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LedgerType {
    Debtor,
    Creditor,
    Bank,
    Cash,
    Tax,
    Sales,
    Purchase,
    Capital,
    Expense,
    Income,
    #[default]
    Other,
}

impl LedgerType {
    /// Infer from a Tally parent group such as "Sundry Debtors" or "Duties & Taxes".
    /// Checks run in a fixed order; the first keyword hit wins.
    pub fn from_parent_group(parent: &str) -> Self {
        let pg = parent.to_lowercase();
        let has = |needle: &str| pg.contains(needle);

        if has("debtor") {
            Self::Debtor
        } else if has("creditor") {
            Self::Creditor
        } else if has("bank") {
            Self::Bank
        } else if has("cash") {
            Self::Cash
        } else if has("tax") || has("duties") || has("gst") {
            Self::Tax
        } else if has("sales") {
            Self::Sales
        } else if has("purchase") {
            Self::Purchase
        } else if has("capital") || has("equity") {
            Self::Capital
        } else if has("expense") {
            Self::Expense
        } else if has("income") {
            Self::Income
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debtor => "Debtor",
            Self::Creditor => "Creditor",
            Self::Bank => "Bank",
            Self::Cash => "Cash",
            Self::Tax => "Tax",
            Self::Sales => "Sales",
            Self::Purchase => "Purchase",
            Self::Capital => "Capital",
            Self::Expense => "Expense",
            Self::Income => "Income",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for LedgerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub name: String,
    pub parent_group: Option<String>,
    pub mailing_name: Option<String>,
    pub gstin: Option<String>,
    pub pan: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub opening_balance: Option<f64>,
    pub ledger_type: LedgerType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub symbol: Option<String>,
    pub formal_name: Option<String>,
    pub is_simple_unit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub name: String,
    /// Canonical base unit (PC/NOS → PCS, KGS → KG, ...).
    pub base_unit: String,
    pub category: Option<String>,
    pub gst_applicable: bool,
    pub hsn_code: Option<String>,
    pub gst_rate: Option<f64>,
    pub standard_rate: Option<f64>,
    pub opening_balance: Option<f64>,
    /// Always non-negative; Tally writes credit-side values as negatives.
    pub opening_value: Option<f64>,
}

/// One master record of any kind. The natural key is the name, scoped to the
/// owning company for everything except the company itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MasterRecord {
    Company(Company),
    Ledger(Ledger),
    Unit(Unit),
    StockItem(StockItem),
}

impl MasterRecord {
    pub fn name(&self) -> &str {
        match self {
            Self::Company(c) => &c.name,
            Self::Ledger(l) => &l.name,
            Self::Unit(u) => &u.name,
            Self::StockItem(s) => &s.name,
        }
    }

    /// Source tag name, used in warnings.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Company(_) => "COMPANY",
            Self::Ledger(_) => "LEDGER",
            Self::Unit(_) => "UNIT",
            Self::StockItem(_) => "STOCKITEM",
        }
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Financial entry (ALLLEDGERENTRIES.LIST / LEDGERENTRIES.LIST).
    Ledger,
    /// Stock movement (ALLINVENTORYENTRIES.LIST / INVENTORYENTRIES.LIST).
    Inventory,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ledger => "ledger",
            Self::Inventory => "inventory",
        }
    }
}

/// A single voucher line. Lines carry no natural key; `sequence` orders them
/// within the voucher across both ledger and inventory entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherLine {
    pub sequence: u32,
    pub kind: LineKind,
    pub ledger_name: String,
    /// Positive = debit, negative = credit (Tally convention).
    pub amount: f64,
    pub is_tax_line: bool,
    pub tax_head: Option<String>,
    pub tax_rate: Option<f64>,
    pub stock_item_name: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub rate: Option<f64>,
    pub discount: Option<f64>,
    pub gstin_of_party: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub number: String,
    pub voucher_type: String,
    /// `None` when the raw date matched no known format. Such vouchers are
    /// never persisted.
    pub date: Option<NaiveDate>,
    /// Date exactly as it appeared in the source, before parsing.
    pub raw_date: String,
    pub party_name: Option<String>,
    pub party_ledger: Option<String>,
    pub amount: f64,
    pub narration: Option<String>,
    pub irn: Option<String>,
    pub ack_no: Option<String>,
    pub ack_date: Option<String>,
    pub gstin: Option<String>,
    pub place_of_supply: Option<String>,
    pub billing_city: Option<String>,
    pub reference_number: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub is_cancelled: bool,
    pub raw_xml: Option<String>,
    pub dedup_key: String,
    pub lines: Vec<VoucherLine>,
}

/// How a voucher is looked up in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherIdentity<'a> {
    Irn(&'a str),
    DedupKey(&'a str),
}

impl Voucher {
    /// IRN when present, otherwise the composite dedup key.
    pub fn identity(&self) -> VoucherIdentity<'_> {
        match self.irn.as_deref() {
            Some(irn) if !irn.is_empty() => VoucherIdentity::Irn(irn),
            _ => VoucherIdentity::DedupKey(&self.dedup_key),
        }
    }

    /// Composite identity for vouchers without an IRN.
    ///
    /// Uses the raw date string rather than the parsed date so that two
    /// identical but unparseable dates still produce the same key.
    pub fn compose_dedup_key(voucher_type: &str, number: &str, company_hint: &str, raw_date: &str) -> String {
        format!("{voucher_type}|{number}|{company_hint}|{raw_date}")
    }

    /// Declared total when non-zero, else the larger of the debit and credit
    /// sides of the lines.
    pub fn resolve_amount(declared: f64, lines: &[VoucherLine]) -> f64 {
        if declared != 0.0 || lines.is_empty() {
            return declared;
        }
        let debit: f64 = lines.iter().filter(|l| l.amount > 0.0).map(|l| l.amount).sum();
        let credit: f64 = lines.iter().filter(|l| l.amount < 0.0).map(|l| l.amount).sum();
        debit.max(credit.abs())
    }
}
