//! `tallyflow-core`: record types shared by the import pipeline and the
//! reconciliation engine.
//!
//! No IO lives here: parsing, persistence and reconciliation sit in the
//! `tallyflow-io` and `tallyflow-recon` crates.

pub mod audit;
pub mod dates;
pub mod records;

pub use audit::{DocumentKind, ImportAudit, ImportStatus, MAX_AUDIT_WARNINGS};
pub use dates::parse_tally_date;
pub use records::{
    Company, Ledger, LedgerType, LineKind, MasterRecord, StockItem, Unit, Voucher, VoucherIdentity,
    VoucherLine,
};
