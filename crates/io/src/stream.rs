// Streaming variant of the document parser.
//
// Only the message currently being read is materialized. Once its closing tag
// arrives the subtree is extracted and dropped, so peak memory tracks the
// largest single message rather than the whole document. A cheap pre-scan
// picks message mode or root mode so record selection matches the
// structural parser.

use crate::error::ParseError;
use crate::parse::{
    extract_message, has_messages, CompanyHints, ParsedDocument, RecordBatch, COMPANY_GSTIN_TAG,
    COMPANY_TAG, CURRENT_COMPANY_TAG, MESSAGE_TAG, RECORD_TAGS,
};
use crate::tree::{walk, Element, Node, TreeBuilder};

pub fn parse_streaming(text: &str) -> Result<ParsedDocument, ParseError> {
    let message_mode = has_messages(text);

    let mut doc = ParsedDocument::default();
    let mut hints = CompanyHints::default();
    let mut builder = TreeBuilder::default();
    // Root mode: records are gathered into one batch so they are absorbed
    // exactly as the document element would be.
    let mut pending = RecordBatch::default();

    // Names of all open elements; cheap compared to the elements themselves.
    let mut path: Vec<String> = Vec::new();
    let mut hint_text = String::new();

    walk(text, |node| match node {
        Node::Open(el) => {
            if is_hint_tag(&el.name) {
                hint_text.clear();
            }
            let starts_subtree = !builder.is_building()
                && if message_mode {
                    el.name == MESSAGE_TAG
                } else {
                    (el.name == COMPANY_TAG && !path.is_empty())
                        || (path.len() == 1 && RECORD_TAGS.contains(&el.name.as_str()))
                };
            path.push(el.name.clone());
            if starts_subtree || builder.is_building() {
                builder.open(el);
            }
        }
        Node::Text(t) => {
            if path.last().is_some_and(|n| is_hint_tag(n)) {
                hint_text.push_str(t);
            }
            builder.text(t);
        }
        Node::Close => {
            let Some(name) = path.pop() else {
                return;
            };
            if is_hint_tag(&name) {
                hints.offer(&name, &hint_text);
                hint_text.clear();
            }
            if !builder.is_building() {
                return;
            }
            if let Some(done) = builder.close() {
                if message_mode {
                    doc.absorb_batch(extract_message(&done));
                } else {
                    let root_name = path.first().cloned().unwrap_or_default();
                    pending.append(extract_message(&as_message(done, root_name)));
                }
            }
        }
    })?;

    if !message_mode {
        doc.absorb_batch(pending);
    }
    Ok(doc.finish(hints))
}

fn is_hint_tag(name: &str) -> bool {
    name == CURRENT_COMPANY_TAG || name == COMPANY_GSTIN_TAG
}

/// Wrap a bare record so it can go through message extraction.
fn as_message(done: Element, root_name: String) -> Element {
    let mut msg = Element::new(root_name);
    msg.children.push(done);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_structural;
    use tallyflow_core::DocumentKind;

    const MIXED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
    <ENVELOPE>
      <HEADER><TALLYREQUEST>Import Data</TALLYREQUEST></HEADER>
      <BODY><IMPORTDATA>
        <REQUESTDESC><STATICVARIABLES><SVCURRENTCOMPANY>Kona Cycles</SVCURRENTCOMPANY></STATICVARIABLES></REQUESTDESC>
        <REQUESTDATA>
          <TALLYMESSAGE xmlns:UDF="TallyUDF">
            <LEDGER NAME="Acme Traders"><PARENT>Sundry Debtors</PARENT><GSTIN>27AAACA1234A1Z5</GSTIN></LEDGER>
          </TALLYMESSAGE>
          <TALLYMESSAGE xmlns:UDF="TallyUDF">
            <VOUCHER VCHTYPE="Sales">
              <DATE>20240115</DATE><VOUCHERTYPENAME>Sales</VOUCHERTYPENAME><VOUCHERNUMBER>SI/001</VOUCHERNUMBER>
              <PARTYNAME>Acme Traders &amp; Sons</PARTYNAME><CMPGSTIN>27KONA0000K1Z1</CMPGSTIN>
              <ALLLEDGERENTRIES.LIST><LEDGERNAME>Acme Traders</LEDGERNAME><AMOUNT>-11800</AMOUNT></ALLLEDGERENTRIES.LIST>
              <ALLLEDGERENTRIES.LIST><LEDGERNAME>Sales</LEDGERNAME><AMOUNT>10000</AMOUNT></ALLLEDGERENTRIES.LIST>
              <ALLLEDGERENTRIES.LIST><LEDGERNAME>CGST</LEDGERNAME><AMOUNT>900</AMOUNT></ALLLEDGERENTRIES.LIST>
              <ALLLEDGERENTRIES.LIST><LEDGERNAME>SGST</LEDGERNAME><AMOUNT>900</AMOUNT></ALLLEDGERENTRIES.LIST>
            </VOUCHER>
            <VOUCHER><NARRATION>placeholder</NARRATION></VOUCHER>
          </TALLYMESSAGE>
        </REQUESTDATA>
      </IMPORTDATA></BODY>
    </ENVELOPE>"#;

    #[test]
    fn matches_structural_parser() {
        let streamed = parse_streaming(MIXED).unwrap();
        let built = parse_structural(MIXED).unwrap();
        assert_eq!(streamed, built);
        assert_eq!(streamed.kind, DocumentKind::Mixed);
        assert_eq!(streamed.vouchers[0].amount, 11800.0);
        assert_eq!(streamed.vouchers[0].party_name.as_deref(), Some("Acme Traders & Sons"));
        assert_eq!(streamed.warnings.len(), 1);
    }

    #[test]
    fn hints_accumulate_while_streaming() {
        let doc = parse_streaming(MIXED).unwrap();
        let company = doc.company.unwrap();
        assert_eq!(company.name, "Kona Cycles");
        assert_eq!(company.gstin.as_deref(), Some("27KONA0000K1Z1"));
    }

    #[test]
    fn bare_records_under_root() {
        let xml = r#"<ENVELOPE><STOCKITEM NAME="Bolt"/><VOUCHER VOUCHERNUMBER="9" DATE="20240101"/></ENVELOPE>"#;
        let streamed = parse_streaming(xml).unwrap();
        assert_eq!(streamed, parse_structural(xml).unwrap());
        assert_eq!(streamed.stock_items.len(), 1);
        assert_eq!(streamed.vouchers.len(), 1);
    }

    fn assert_parity(xml: &str) -> ParsedDocument {
        let streamed = parse_streaming(xml).unwrap();
        assert_eq!(streamed, parse_structural(xml).unwrap());
        streamed
    }

    #[test]
    fn root_record_beside_message_is_ignored() {
        let doc = assert_parity(
            r#"<ENVELOPE><LEDGER NAME="Bank"/><TALLYMESSAGE><LEDGER NAME="Cash"/></TALLYMESSAGE></ENVELOPE>"#,
        );
        let names: Vec<&str> = doc.ledgers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Cash"]);
        assert_eq!(doc.master_count(), 1);
    }

    #[test]
    fn company_outside_messages_is_ignored() {
        let doc = assert_parity(
            r#"<ENVELOPE><BODY><COMPANY NAME="Outside Co"/></BODY>
            <TALLYMESSAGE><LEDGER NAME="Cash"/></TALLYMESSAGE></ENVELOPE>"#,
        );
        assert_eq!(doc.company, None);
        assert_eq!(doc.ledgers.len(), 1);
    }

    #[test]
    fn nested_message_is_read_once() {
        let doc = assert_parity(
            r#"<ENVELOPE><TALLYMESSAGE><X><COMPANY NAME="Kona"/></X>
            <TALLYMESSAGE><COMPANY NAME="Inner"/></TALLYMESSAGE></TALLYMESSAGE></ENVELOPE>"#,
        );
        assert_eq!(doc.company.as_ref().map(|c| c.name.as_str()), Some("Inner"));
        assert_eq!(doc.master_count(), 1);
    }

    #[test]
    fn root_mode_company_at_depth() {
        let doc = assert_parity(
            r#"<ENVELOPE><BODY><COMPANY NAME="First"/><COMPANY NAME="Second"/></BODY><UNIT NAME="PC"/></ENVELOPE>"#,
        );
        assert_eq!(doc.company.as_ref().map(|c| c.name.as_str()), Some("Second"));
        assert_eq!(doc.units.len(), 1);
    }

    #[test]
    fn document_element_company_is_not_a_record() {
        let doc = assert_parity(r#"<COMPANY NAME="Self"><LEDGER NAME="Cash"/></COMPANY>"#);
        assert_eq!(doc.company, None);
        assert_eq!(doc.ledgers.len(), 1);
    }

    #[test]
    fn root_mode_warnings_follow_record_type_order() {
        let doc = assert_parity("<ENVELOPE><STOCKITEM/><LEDGER/><STOCKITEM NAME=\"Bolt\"/></ENVELOPE>");
        assert_eq!(
            doc.warnings,
            vec![
                "Could not parse LEDGER: missing NAME".to_string(),
                "Could not parse STOCKITEM: missing NAME".to_string(),
            ]
        );
        assert_eq!(doc.stock_items.len(), 1);
    }

    #[test]
    fn malformed_stream_fails() {
        assert!(parse_streaming("<ENVELOPE><TALLYMESSAGE><VOUCHER></TALLYMESSAGE></ENVELOPE>").is_err());
    }
}
