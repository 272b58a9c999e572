// Tally document parsing.
//
// A document is an ENVELOPE whose TALLYMESSAGE containers hold masters
// (COMPANY, LEDGER, UNIT, STOCKITEM) and/or VOUCHERs.
//
// Record selection, shared by both parsers:
// - message mode (the document has at least one TALLYMESSAGE): only the
//   outermost TALLYMESSAGE elements are extracted; anything outside them
//   is ignored.
// - root mode (no TALLYMESSAGE anywhere): the document element is treated as
//   the single message.

use tallyflow_core::{Company, DocumentKind, Ledger, MasterRecord, StockItem, Unit, Voucher};

use crate::error::ParseError;
use crate::extract::{
    extract_company, extract_ledger, extract_stock_item, extract_unit, extract_voucher, RecordResult,
};
use crate::tree::{parse_tree, Element};

use quick_xml::events::Event;
use quick_xml::Reader;

/// Documents above this size are parsed one message at a time.
pub const STREAMING_THRESHOLD: usize = 50 * 1024 * 1024;

pub(crate) const MESSAGE_TAG: &str = "TALLYMESSAGE";
pub(crate) const COMPANY_TAG: &str = "COMPANY";
pub(crate) const RECORD_TAGS: [&str; 5] = ["COMPANY", "LEDGER", "UNIT", "STOCKITEM", "VOUCHER"];
pub(crate) const CURRENT_COMPANY_TAG: &str = "SVCURRENTCOMPANY";
pub(crate) const COMPANY_GSTIN_TAG: &str = "CMPGSTIN";

/// Everything extracted from one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub company: Option<Company>,
    pub ledgers: Vec<Ledger>,
    pub units: Vec<Unit>,
    pub stock_items: Vec<StockItem>,
    pub vouchers: Vec<Voucher>,
    pub kind: DocumentKind,
    /// Per-record failures and defaulted fields, in document order.
    pub warnings: Vec<String>,
}

impl ParsedDocument {
    pub fn master_count(&self) -> usize {
        usize::from(self.company.is_some()) + self.ledgers.len() + self.units.len() + self.stock_items.len()
    }

    /// Masters in upsert order: company first, then ledgers, units, stock items.
    pub fn masters(&self) -> impl Iterator<Item = MasterRecord> + '_ {
        self.company
            .iter()
            .cloned()
            .map(MasterRecord::Company)
            .chain(self.ledgers.iter().cloned().map(MasterRecord::Ledger))
            .chain(self.units.iter().cloned().map(MasterRecord::Unit))
            .chain(self.stock_items.iter().cloned().map(MasterRecord::StockItem))
    }

    fn absorb<T>(&mut self, results: Vec<RecordResult<T>>, mut sink: impl FnMut(&mut Self, T)) {
        for result in results {
            match result {
                Ok(extraction) => {
                    self.warnings.extend(extraction.notes);
                    sink(self, extraction.value);
                }
                Err(failure) => {
                    log::warn!("{failure}");
                    self.warnings.push(failure.to_string());
                }
            }
        }
    }

    /// Merge one message's results. A later company replaces an earlier one.
    pub(crate) fn absorb_batch(&mut self, batch: RecordBatch) {
        self.absorb(batch.companies, |doc, c| doc.company = Some(c));
        self.absorb(batch.ledgers, |doc, l| doc.ledgers.push(l));
        self.absorb(batch.units, |doc, u| doc.units.push(u));
        self.absorb(batch.stock_items, |doc, s| doc.stock_items.push(s));
        self.absorb(batch.vouchers, |doc, v| doc.vouchers.push(v));
    }

    /// Apply the SVCURRENTCOMPANY fallback and classify.
    pub(crate) fn finish(mut self, hints: CompanyHints) -> Self {
        if self.company.is_none() {
            if let Some(name) = hints.name {
                self.company = Some(Company { name, gstin: hints.gstin, ..Default::default() });
            }
        }
        self.kind = DocumentKind::classify(self.master_count() > 0, !self.vouchers.is_empty());
        self
    }
}

/// Extraction results for one message, before they are merged.
#[derive(Debug, Default)]
pub struct RecordBatch {
    pub companies: Vec<RecordResult<Company>>,
    pub ledgers: Vec<RecordResult<Ledger>>,
    pub units: Vec<RecordResult<Unit>>,
    pub stock_items: Vec<RecordResult<StockItem>>,
    pub vouchers: Vec<RecordResult<Voucher>>,
}

impl RecordBatch {
    /// Append `other` after this batch's records, per record type.
    pub(crate) fn append(&mut self, mut other: RecordBatch) {
        self.companies.append(&mut other.companies);
        self.ledgers.append(&mut other.ledgers);
        self.units.append(&mut other.units);
        self.stock_items.append(&mut other.stock_items);
        self.vouchers.append(&mut other.vouchers);
    }
}

/// Extract one message: COMPANY at any depth, the rest as direct children.
pub fn extract_message(msg: &Element) -> RecordBatch {
    RecordBatch {
        companies: msg.descendants_named(COMPANY_TAG).map(extract_company).collect(),
        ledgers: msg.children_named("LEDGER").map(extract_ledger).collect(),
        units: msg.children_named("UNIT").map(extract_unit).collect(),
        stock_items: msg.children_named("STOCKITEM").map(extract_stock_item).collect(),
        vouchers: msg.children_named("VOUCHER").map(extract_voucher).collect(),
    }
}

/// First non-blank SVCURRENTCOMPANY / CMPGSTIN seen anywhere in the document.
#[derive(Debug, Clone, Default)]
pub(crate) struct CompanyHints {
    pub name: Option<String>,
    pub gstin: Option<String>,
}

impl CompanyHints {
    pub fn offer(&mut self, tag: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let slot = match tag {
            CURRENT_COMPANY_TAG => &mut self.name,
            COMPANY_GSTIN_TAG => &mut self.gstin,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(text.to_string());
        }
    }
}

/// Parse sanitized text, switching to the streaming parser for large input.
pub fn parse_document(text: &str) -> Result<ParsedDocument, ParseError> {
    if text.len() > STREAMING_THRESHOLD {
        log::info!("Using streaming parse for large document ({} bytes)", text.len());
        crate::stream::parse_streaming(text)
    } else {
        parse_structural(text)
    }
}

/// Build the whole tree, then walk its messages.
pub fn parse_structural(text: &str) -> Result<ParsedDocument, ParseError> {
    let root = parse_tree(text)?;

    let mut hints = CompanyHints::default();
    for el in root.descendants() {
        if el.name == CURRENT_COMPANY_TAG || el.name == COMPANY_GSTIN_TAG {
            hints.offer(&el.name, &el.text);
        }
    }

    let mut messages = Vec::new();
    outermost_messages(&root, &mut messages);
    if messages.is_empty() {
        messages.push(&root);
    }

    let mut doc = ParsedDocument::default();
    for msg in messages {
        doc.absorb_batch(extract_message(msg));
    }
    Ok(doc.finish(hints))
}

fn outermost_messages<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
    if el.name == MESSAGE_TAG {
        out.push(el);
        return;
    }
    for child in &el.children {
        outermost_messages(child, out);
    }
}

/// Whether any TALLYMESSAGE start tag occurs. Stops at the first one; read
/// errors end the scan and are left for the real parse to report.
pub(crate) fn has_messages(text: &str) -> bool {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == MESSAGE_TAG.as_bytes() => {
                return true
            }
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = r#"<ENVELOPE>
        <HEADER><TALLYREQUEST>Import Data</TALLYREQUEST></HEADER>
        <BODY><IMPORTDATA>
            <REQUESTDESC><STATICVARIABLES><SVCURRENTCOMPANY>Kona Cycles</SVCURRENTCOMPANY></STATICVARIABLES></REQUESTDESC>
            <REQUESTDATA>
                <TALLYMESSAGE><LEDGER NAME="Acme Traders"><PARENT>Sundry Debtors</PARENT></LEDGER></TALLYMESSAGE>
                <TALLYMESSAGE><UNIT NAME="PC"/><STOCKITEM NAME="Bolt M5"><BASEUNITS>PC</BASEUNITS></STOCKITEM></TALLYMESSAGE>
                <TALLYMESSAGE><LEDGER><PARENT>Orphan</PARENT></LEDGER></TALLYMESSAGE>
            </REQUESTDATA>
        </IMPORTDATA></BODY>
    </ENVELOPE>"#;

    #[test]
    fn master_document() {
        let doc = parse_structural(MASTER).unwrap();
        assert_eq!(doc.kind, DocumentKind::Master);
        assert_eq!(doc.ledgers.len(), 1);
        assert_eq!(doc.units.len(), 1);
        assert_eq!(doc.stock_items.len(), 1);
        assert_eq!(doc.company.as_ref().map(|c| c.name.as_str()), Some("Kona Cycles"));
        assert_eq!(doc.warnings, vec!["Could not parse LEDGER: missing NAME".to_string()]);
        assert_eq!(doc.master_count(), 4);
    }

    #[test]
    fn explicit_company_beats_hint_and_last_wins() {
        let xml = r#"<ENVELOPE><SVCURRENTCOMPANY>Hint Co</SVCURRENTCOMPANY><CMPGSTIN>27AAA</CMPGSTIN>
            <TALLYMESSAGE><COMPANY NAME="First"/></TALLYMESSAGE>
            <TALLYMESSAGE><X><COMPANY><NAME>Second</NAME></COMPANY></X></TALLYMESSAGE>
        </ENVELOPE>"#;
        let doc = parse_structural(xml).unwrap();
        let company = doc.company.unwrap();
        assert_eq!(company.name, "Second");
        assert_eq!(company.gstin, None);
    }

    #[test]
    fn hint_company_carries_gstin() {
        let xml = "<ENVELOPE><SVCURRENTCOMPANY>  </SVCURRENTCOMPANY><SVCURRENTCOMPANY>Kona</SVCURRENTCOMPANY>\
                   <CMPGSTIN>27ABCDE1234F1Z5</CMPGSTIN><VOUCHER VOUCHERNUMBER=\"1\" DATE=\"20240101\"/></ENVELOPE>";
        let doc = parse_structural(xml).unwrap();
        let company = doc.company.as_ref().unwrap();
        assert_eq!(company.name, "Kona");
        assert_eq!(company.gstin.as_deref(), Some("27ABCDE1234F1Z5"));
        assert_eq!(doc.kind, DocumentKind::Mixed);
    }

    #[test]
    fn root_acts_as_message_without_wrappers() {
        let xml = "<ENVELOPE><VOUCHER><VOUCHERNUMBER>7</VOUCHERNUMBER><DATE>20240102</DATE></VOUCHER></ENVELOPE>";
        let doc = parse_structural(xml).unwrap();
        assert_eq!(doc.kind, DocumentKind::Transaction);
        assert_eq!(doc.vouchers.len(), 1);
    }

    #[test]
    fn records_outside_messages_are_ignored() {
        let xml = r#"<ENVELOPE><BODY><COMPANY NAME="Outside Co"/></BODY><LEDGER NAME="Bank"/>
            <TALLYMESSAGE><LEDGER NAME="Cash"/></TALLYMESSAGE></ENVELOPE>"#;
        let doc = parse_structural(xml).unwrap();
        assert_eq!(doc.company, None);
        let names: Vec<&str> = doc.ledgers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Cash"]);
    }

    #[test]
    fn nested_message_is_read_once() {
        let xml = r#"<ENVELOPE><TALLYMESSAGE><TALLYMESSAGE><COMPANY NAME="Inner"/>
            <LEDGER NAME="Deep"/></TALLYMESSAGE></TALLYMESSAGE></ENVELOPE>"#;
        let doc = parse_structural(xml).unwrap();
        assert_eq!(doc.company.as_ref().map(|c| c.name.as_str()), Some("Inner"));
        assert!(doc.ledgers.is_empty());
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn message_scan() {
        assert!(has_messages(MASTER));
        assert!(has_messages("<TALLYMESSAGE/>"));
        assert!(!has_messages("<ENVELOPE><TALLYMESSAGES/></ENVELOPE>"));
        assert!(!has_messages("<ENVELOPE><LEDGER"));
    }

    #[test]
    fn empty_envelope_is_unknown() {
        let doc = parse_structural("<ENVELOPE><HEADER/></ENVELOPE>").unwrap();
        assert_eq!(doc.kind, DocumentKind::Unknown);
    }

    #[test]
    fn malformed_markup_fails_document() {
        assert!(matches!(
            parse_document("<ENVELOPE><TALLYMESSAGE></ENVELOPE>"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn masters_iterate_company_first() {
        let doc = parse_structural(MASTER).unwrap();
        let tags: Vec<&str> = doc.masters().map(|m| m.tag()).collect();
        assert_eq!(tags, vec!["COMPANY", "LEDGER", "UNIT", "STOCKITEM"]);
    }
}
