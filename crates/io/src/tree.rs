// Minimal element tree over quick-xml events.
//
// Tally exports use a fixed tag vocabulary with no namespaces worth keeping,
// so elements are plain name/attrs/text/children. The event walker is shared
// by the full-document parser and the streaming parser.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    /// Concatenated direct text content, untrimmed.
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, trimmed, `None` when absent or blank.
    pub fn attr_text(&self, key: &str) -> Option<&str> {
        self.attr(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// First direct child with this name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of the first direct child with this name, `None` when the
    /// child is missing or its text is blank. Later siblings with the same
    /// name are not consulted.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// All descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: self.children.iter().rev().collect() }
    }

    pub fn descendants_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.descendants().filter(move |e| e.name == name)
    }

    /// Compact re-serialization. Whitespace-only text is dropped.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            push_escaped(out, v, true);
            out.push('"');
        }
        let text = self.text.trim();
        if text.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        push_escaped(out, text, false);
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

fn push_escaped(out: &mut String, s: &str, in_attr: bool) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attr => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Resolve the body of a `&...;` reference: the five predefined entities plus
/// decimal and hex character references.
pub(crate) fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let num = name.strip_prefix('#')?;
            let cp = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(cp)
        }
    }
}

/// Resolve references inside an attribute value. Unknown references are
/// left as written.
pub(crate) fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';').and_then(|semi| resolve_entity(&tail[1..semi]).map(|c| (semi, c))) {
            Some((semi, c)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Event walking
// ---------------------------------------------------------------------------

/// Normalized parse events: entities resolved, nesting validated.
pub(crate) enum Node<'a> {
    Open(Element),
    Text(&'a str),
    Close,
}

fn open_element(e: &BytesStart<'_>) -> Element {
    let mut el = Element::new(String::from_utf8_lossy(e.name().as_ref()));
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = unescape(&String::from_utf8_lossy(&attr.value));
        el.attrs.push((key, value));
    }
    el
}

/// Walk `xml`, feeding each node to `visit`. Fails on mismatched or unclosed
/// tags, undefined entities, a second root element or a missing root.
pub(crate) fn walk<F>(xml: &str, mut visit: F) -> Result<(), ParseError>
where
    F: FnMut(Node<'_>),
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut open: Vec<String> = Vec::new();
    let mut seen_root = false;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(ev) => ev,
            Err(e) => {
                return Err(ParseError::Malformed(format!(
                    "{e} (at byte {})",
                    reader.buffer_position()
                )))
            }
        };
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if open.is_empty() {
                    if seen_root {
                        return Err(ParseError::Malformed(
                            "junk after document element".to_string(),
                        ));
                    }
                    seen_root = true;
                }
                let el = open_element(e);
                let self_closing = matches!(event, Event::Empty(_));
                if !self_closing {
                    open.push(el.name.clone());
                }
                visit(Node::Open(el));
                if self_closing {
                    visit(Node::Close);
                }
            }
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match open.pop() {
                    Some(expected) if expected == name => visit(Node::Close),
                    Some(expected) => {
                        return Err(ParseError::Malformed(format!(
                            "mismatched tag: expected </{expected}>, found </{name}>"
                        )))
                    }
                    None => {
                        return Err(ParseError::Malformed(format!("unexpected </{name}>")))
                    }
                }
            }
            Event::Text(ref e) => {
                if !open.is_empty() {
                    visit(Node::Text(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Event::CData(ref e) => {
                if !open.is_empty() {
                    visit(Node::Text(&String::from_utf8_lossy(e.as_ref())));
                }
            }
            Event::GeneralRef(ref e) => {
                let name = String::from_utf8_lossy(e.as_ref()).to_string();
                let c = resolve_entity(&name).ok_or_else(|| {
                    ParseError::Malformed(format!("undefined entity &{name};"))
                })?;
                if !open.is_empty() {
                    visit(Node::Text(c.encode_utf8(&mut [0u8; 4])));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(name) = open.last() {
        return Err(ParseError::Malformed(format!("unclosed tag <{name}>")));
    }
    if !seen_root {
        return Err(ParseError::Malformed("no element found".to_string()));
    }
    Ok(())
}

/// Assembles elements from a node stream. Used whole for small documents and
/// per-subtree by the streaming parser.
#[derive(Debug, Default)]
pub(crate) struct TreeBuilder {
    stack: Vec<Element>,
}

impl TreeBuilder {
    pub fn is_building(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn open(&mut self, el: Element) {
        self.stack.push(el);
    }

    pub fn text(&mut self, s: &str) {
        if let Some(top) = self.stack.last_mut() {
            top.text.push_str(s);
        }
    }

    /// Close the innermost element. Returns it once the outermost element
    /// of the current subtree is complete.
    pub fn close(&mut self) -> Option<Element> {
        let done = self.stack.pop()?;
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(done);
                None
            }
            None => Some(done),
        }
    }
}

/// Parse a whole document into its root element.
pub fn parse_tree(xml: &str) -> Result<Element, ParseError> {
    let mut builder = TreeBuilder::default();
    let mut root = None;
    walk(xml, |node| match node {
        Node::Open(el) => builder.open(el),
        Node::Text(t) => builder.text(t),
        Node::Close => {
            if let Some(done) = builder.close() {
                root = Some(done);
            }
        }
    })?;
    root.ok_or_else(|| ParseError::Malformed("no element found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_tree() {
        let root = parse_tree(
            r#"<ENVELOPE><BODY><LEDGER NAME="Cash"><PARENT> Cash-in-Hand </PARENT></LEDGER></BODY></ENVELOPE>"#,
        )
        .unwrap();
        assert_eq!(root.name, "ENVELOPE");
        let ledger = root.descendants_named("LEDGER").next().unwrap();
        assert_eq!(ledger.attr("NAME"), Some("Cash"));
        assert_eq!(ledger.child_text("PARENT"), Some("Cash-in-Hand"));
    }

    #[test]
    fn entities_and_char_refs_resolved() {
        let root = parse_tree(r#"<A N="R &amp; D &#65;">x &lt; y &#x20B9;<![CDATA[<raw>]]></A>"#).unwrap();
        assert_eq!(root.attr("N"), Some("R & D A"));
        assert_eq!(root.text, "x < y \u{20b9}<raw>");
    }

    #[test]
    fn mismatched_tag_is_malformed() {
        let err = parse_tree("<A><B></A></B>").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn unclosed_tag_is_malformed() {
        assert!(parse_tree("<A><B></B>").is_err());
    }

    #[test]
    fn empty_document_is_malformed() {
        assert!(parse_tree("").is_err());
        assert!(parse_tree("<?xml version=\"1.0\"?>\n").is_err());
    }

    #[test]
    fn undefined_entity_is_malformed() {
        assert!(parse_tree("<A>&nbsp;</A>").is_err());
    }

    #[test]
    fn descendants_in_document_order() {
        let root = parse_tree("<R><A><C/></A><B/></R>").unwrap();
        let names: Vec<&str> = root.descendants().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C", "B"]);
    }

    #[test]
    fn first_child_wins_for_text() {
        let root = parse_tree("<V><AMOUNT></AMOUNT><AMOUNT>5</AMOUNT></V>").unwrap();
        assert_eq!(root.child_text("AMOUNT"), None);
        assert_eq!(root.children_named("AMOUNT").count(), 2);
    }

    #[test]
    fn serializes_compactly() {
        let root = parse_tree("<V A=\"1 &quot;x&quot;\">\n  <N>R &amp; D</N>\n  <E/>\n</V>").unwrap();
        assert_eq!(root.to_xml(), "<V A=\"1 &quot;x&quot;\"><N>R &amp; D</N><E/></V>");
    }

    #[test]
    fn unescape_leaves_unknown_references() {
        assert_eq!(unescape("a &amp; b &bogus; c &#66;"), "a & b &bogus; c B");
    }
}
