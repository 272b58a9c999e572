//! Name normalization shared by every MKCP source.

use std::sync::OnceLock;

use regex::Regex;

fn pkg_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(.+?)\s*\(\s*(\d+(?:\.\d+)?)\s*(?:PCS|PKG|PC|NOS|SET|PAIR|ROLL|MTR|KG|BOX)?\s*\)\s*$")
            .expect("valid regex")
    })
}

fn group_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\(.*?\)\s*$").expect("valid regex"))
}

/// Collapse whitespace, trim, upper-case.
pub fn norm(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/// Split `"BELL CROWN MINI ( 300 PCS )"` into `("BELL CROWN MINI", Some(300.0))`.
/// Names without a quantity suffix come back unchanged with `None`.
pub fn split_pkg_suffix(raw: &str) -> (&str, Option<f64>) {
    let raw = raw.trim();
    match pkg_suffix_re().captures(raw) {
        Some(caps) => {
            let name = caps.get(1).map_or(raw, |m| m.as_str().trim());
            let factor = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
            (name, factor)
        }
        None => (raw, None),
    }
}

/// Matching key for a source item name: quantity suffix stripped, normalized.
pub fn clean_item_name(raw: &str) -> String {
    norm(split_pkg_suffix(raw).0)
}

/// Drop a trailing `( … )` (HSN code or rate) from a group name.
pub fn strip_group_suffix(raw: &str) -> String {
    group_suffix_re().replace(raw.trim(), "").trim().to_string()
}

/// Numeric prefix of a price-list rate such as `"300.00/PKG"`.
pub fn rate_factor(rate: &str) -> Option<f64> {
    let head = rate.split('/').next().unwrap_or_default().trim();
    head.parse::<f64>().ok().filter(|f| f.is_finite())
}
