// Loaders for the MKCP reconciliation sources.
//
// Each source is optional. A missing or unreadable file contributes nothing
// and is logged; it never fails the run.

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};

use tallyflow_recon::{
    ConversionEntry, MatchPolicy, PriceLevelEntry, PriceListItem, ReconReport, SourceSet, StockItemEntry,
    VendorGroup,
};

use crate::error::StoreError;
use crate::sanitize::{sanitize, SanitizeOptions};
use crate::store::Store;
use crate::tree::{parse_tree, Element};

pub const STOCK_GROUPS_FILE: &str = "STOCK GROUPS.xml";
pub const STOCK_ITEMS_FILE: &str = "STOCK ITEM.xml";
pub const PRICE_LIST_FILE: &str = "PRICE LIST ST.xml";

/// Conversion table file names, in lookup order.
pub const CONVERSION_TABLE_FILES: [&str; 4] = [
    "PKG CONVERSION.xlsx",
    "pkg conversion.xlsx",
    "PKG_CONVERSION.xlsx",
    "PKG CONVERSION.xls",
];

const CONVERSION_SHEET: &str = "Price List";

/// Load every source found in `dir`, reconcile against the stored stock
/// items and write the result.
pub fn reconcile_dir(store: &mut Store, dir: &Path, policy: &MatchPolicy) -> Result<ReconReport, StoreError> {
    let sources = load_sources(dir);
    let names = store.stock_item_names()?;
    let output = tallyflow_recon::run(&sources, &names, policy);
    store.apply_reconciliation(&output)
}

pub fn load_sources(dir: &Path) -> SourceSet {
    let conversions = match find_conversion_table(dir) {
        Some(path) => load_conversion_table(&path),
        None => {
            log::warn!("MKCP: no package conversion table in {}", dir.display());
            Vec::new()
        }
    };
    log::info!("MKCP: {} package factors from the conversion table", conversions.len());

    let price_list = read_tree(&dir.join(PRICE_LIST_FILE)).map(|r| price_list(&r)).unwrap_or_default();
    log::info!("MKCP: {} items from {PRICE_LIST_FILE}", price_list.len());

    let vendor_groups = read_tree(&dir.join(STOCK_GROUPS_FILE)).map(|r| stock_groups(&r)).unwrap_or_default();
    log::info!("MKCP: {} stock groups from {STOCK_GROUPS_FILE}", vendor_groups.len());

    let stock_items = read_tree(&dir.join(STOCK_ITEMS_FILE)).map(|r| stock_items(&r)).unwrap_or_default();
    log::info!("MKCP: {} item group entries from {STOCK_ITEMS_FILE}", stock_items.len());

    SourceSet { vendor_groups, stock_items, price_list, conversions }
}

pub fn find_conversion_table(dir: &Path) -> Option<PathBuf> {
    CONVERSION_TABLE_FILES.iter().map(|name| dir.join(name)).find(|p| p.is_file())
}

// ---------------------------------------------------------------------------
// XML sources
// ---------------------------------------------------------------------------

/// Read, sanitize and parse one export. These files are usually UTF-16LE.
fn read_tree(path: &Path) -> Option<Element> {
    if !path.is_file() {
        log::warn!("MKCP: {} not found, skipping", path.display());
        return None;
    }
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            log::error!("MKCP: could not read {}: {e}", path.display());
            return None;
        }
    };
    let source = path.display().to_string();
    let clean = sanitize(&raw, &SanitizeOptions { source: &source, backup_dir: None });
    match parse_tree(&clean.text) {
        Ok(root) => Some(root),
        Err(e) => {
            log::error!("MKCP: failed to parse {}: {e}", path.display());
            None
        }
    }
}

/// `root` and all of its descendants with this tag.
fn all_named<'a>(root: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    std::iter::once(root).chain(root.descendants()).filter(move |e| e.name == name)
}

fn name_attr(el: &Element) -> Option<&str> {
    el.attr("NAME").map(str::trim).filter(|n| !n.is_empty())
}

/// STOCKGROUP elements; the first occurrence of a name wins.
pub fn stock_groups(root: &Element) -> Vec<VendorGroup> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for el in all_named(root, "STOCKGROUP") {
        let Some(name) = name_attr(el) else { continue };
        if !seen.insert(name.to_string()) {
            continue;
        }
        out.push(VendorGroup {
            name: name.to_string(),
            parent: el.child_text("PARENT").map(str::to_string),
            base_unit: el.child_text("BASEUNITS").unwrap_or("PCS").to_string(),
            guid: el.child_text("GUID").map(str::to_string),
        });
    }
    out
}

pub fn stock_items(root: &Element) -> Vec<StockItemEntry> {
    all_named(root, "STOCKITEM")
        .filter_map(|el| {
            Some(StockItemEntry {
                name: name_attr(el)?.to_string(),
                parent: el.child_text("PARENT").map(str::to_string),
            })
        })
        .collect()
}

pub fn price_list(root: &Element) -> Vec<PriceListItem> {
    all_named(root, "STOCKITEM")
        .filter_map(|el| {
            let name = name_attr(el)?;
            let levels = el
                .children_named("FULLPRICELIST.LIST")
                .map(|pl| PriceLevelEntry {
                    level: pl.child_text("PRICELEVEL").unwrap_or_default().to_string(),
                    date: pl.child_text("DATE").unwrap_or_default().to_string(),
                    rate: pl.child_text("RATE").unwrap_or_default().to_string(),
                })
                .collect();
            Some(PriceListItem { name: name.to_string(), levels })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Conversion table
// ---------------------------------------------------------------------------

/// Read the conversion workbook.
///
/// Rows alternate: a name row carries a positive S.No. in column A and the
/// item name in column B; the conversion row after it carries the factor in
/// column C. The header row is skipped.
pub fn load_conversion_table(path: &Path) -> Vec<ConversionEntry> {
    let mut workbook = match open_workbook_auto(path) {
        Ok(wb) => wb,
        Err(e) => {
            log::error!("MKCP: could not open {}: {e}", path.display());
            return Vec::new();
        }
    };

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet = if sheet_names.iter().any(|s| s == CONVERSION_SHEET) {
        CONVERSION_SHEET.to_string()
    } else if let Some(first) = sheet_names.first() {
        log::warn!(
            "MKCP: '{CONVERSION_SHEET}' sheet not found in {}; using first sheet '{first}'",
            path.display()
        );
        first.clone()
    } else {
        log::error!("MKCP: {} has no sheets", path.display());
        return Vec::new();
    };

    let range = match workbook.worksheet_range(&sheet) {
        Ok(range) => range,
        Err(e) => {
            log::error!("MKCP: failed to read sheet '{sheet}' of {}: {e}", path.display());
            return Vec::new();
        }
    };

    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let cell = |row: &[Data], col: u32| -> Option<Data> {
        col.checked_sub(start_col)
            .and_then(|i| row.get(i as usize))
            .filter(|d| !matches!(d, Data::Empty))
            .cloned()
    };

    let mut out = Vec::new();
    let mut pending: Option<String> = None;
    for (idx, row) in range.rows().enumerate() {
        if start_row as usize + idx == 0 {
            continue;
        }

        let serial = cell(row, 0).and_then(|d| cell_number(&d));
        if serial.is_some_and(|n| n > 0.0) {
            pending = cell(row, 1)
                .map(|d| d.to_string().trim().to_string())
                .filter(|n| !n.is_empty() && !matches!(n.to_lowercase().as_str(), "particulars" | "none"));
            continue;
        }

        let Some(raw_factor) = cell(row, 2) else { continue };
        let Some(name) = pending.take() else { continue };
        match cell_number(&raw_factor) {
            Some(factor) if factor > 0.0 => out.push(ConversionEntry { name, factor }),
            _ => log::debug!("MKCP: skipping factor {raw_factor} for '{name}'"),
        }
    }
    out
}

fn cell_number(d: &Data) -> Option<f64> {
    match d {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.replace(',', "").trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUPS: &str = r#"<ENVELOPE><BODY><DATA><TALLYMESSAGE>
        <STOCKGROUP NAME="FASTENERS"><PARENT>SPARES</PARENT><BASEUNITS>PKG</BASEUNITS><GUID>g-1</GUID></STOCKGROUP>
        <STOCKGROUP NAME="BELLS"/>
        <STOCKGROUP NAME="FASTENERS"><PARENT>OTHER</PARENT></STOCKGROUP>
    </TALLYMESSAGE></DATA></BODY></ENVELOPE>"#;

    const PRICES: &str = r#"<ENVELOPE><TALLYMESSAGE>
        <STOCKITEM NAME="BELL CROWN MINI ( 300 PCS )">
            <PARENT>BELLS ( 8714 )</PARENT>
            <FULLPRICELIST.LIST><DATE>20240401</DATE><PRICELEVEL>Kona</PRICELEVEL><RATE>300.00/PKG</RATE></FULLPRICELIST.LIST>
            <FULLPRICELIST.LIST><DATE>20240501</DATE><PRICELEVEL>Retail</PRICELEVEL><RATE>9/PKG</RATE></FULLPRICELIST.LIST>
        </STOCKITEM>
        <STOCKITEM><PARENT>nameless</PARENT></STOCKITEM>
    </TALLYMESSAGE></ENVELOPE>"#;

    #[test]
    fn groups_first_occurrence_and_defaults() {
        let groups = stock_groups(&parse_tree(GROUPS).unwrap());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].parent.as_deref(), Some("SPARES"));
        assert_eq!(groups[0].base_unit, "PKG");
        assert_eq!(groups[1].base_unit, "PCS");
        assert_eq!(groups[1].guid, None);
    }

    #[test]
    fn price_levels_and_parents() {
        let root = parse_tree(PRICES).unwrap();
        let items = price_list(&root);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].levels.len(), 2);
        assert_eq!(items[0].levels[0].rate, "300.00/PKG");

        let entries = stock_items(&root);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].parent.as_deref(), Some("BELLS ( 8714 )"));
    }

    #[test]
    fn root_element_itself_counts() {
        let root = parse_tree(r#"<STOCKGROUP NAME="SOLO"/>"#).unwrap();
        assert_eq!(stock_groups(&root).len(), 1);
    }

    #[test]
    fn missing_directory_yields_empty_sources() {
        let dir = tempfile::tempdir().unwrap();
        let sources = load_sources(&dir.path().join("absent"));
        assert!(sources.vendor_groups.is_empty());
        assert!(sources.conversions.is_empty());
    }

    #[test]
    fn numeric_cells() {
        assert_eq!(cell_number(&Data::String(" 1,200 ".into())), Some(1200.0));
        assert_eq!(cell_number(&Data::Int(3)), Some(3.0));
        assert_eq!(cell_number(&Data::String("n/a".into())), None);
        assert_eq!(cell_number(&Data::Bool(true)), None);
    }
}
