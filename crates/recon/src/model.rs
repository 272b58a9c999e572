use serde::Serialize;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One STOCKGROUP from the stock-groups export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorGroup {
    pub name: String,
    pub parent: Option<String>,
    pub base_unit: String,
    pub guid: Option<String>,
}

/// One STOCKITEM from the stock-items export, reduced to its group.
#[derive(Debug, Clone, PartialEq)]
pub struct StockItemEntry {
    pub name: String,
    pub parent: Option<String>,
}

/// One FULLPRICELIST entry, kept as raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevelEntry {
    pub level: String,
    pub date: String,
    pub rate: String,
}

/// One STOCKITEM from the price-list export.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceListItem {
    pub name: String,
    pub levels: Vec<PriceLevelEntry>,
}

/// One name/factor pair from the conversion table.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionEntry {
    pub name: String,
    pub factor: f64,
}

/// Everything the loaders could read. Any part may be empty.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    pub vendor_groups: Vec<VendorGroup>,
    pub stock_items: Vec<StockItemEntry>,
    pub price_list: Vec<PriceListItem>,
    pub conversions: Vec<ConversionEntry>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternateUnit {
    pub item_name: String,
    /// Base units per package.
    pub pkg_factor: f64,
    pub pkg_unit: String,
    pub base_unit: String,
}

impl AlternateUnit {
    pub fn new(item_name: impl Into<String>, pkg_factor: f64) -> Self {
        Self {
            item_name: item_name.into(),
            pkg_factor,
            pkg_unit: "PKG".into(),
            base_unit: "PCS".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemGroupMapping {
    pub item_name: String,
    pub group_name: String,
}

/// How a stored name found its source entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Prefix,
    Fuzzy { distance: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconStats {
    pub factors_exact: usize,
    pub factors_prefix: usize,
    pub factors_fuzzy: usize,
    /// Factor source keys no stored item claimed.
    pub unmatched_factors: usize,
    /// Group source keys no stored item claimed.
    pub unmatched_groups: usize,
    /// Stored items that fell back to the virtual group.
    pub virtual_group_items: usize,
    pub sources: SourceCounts,
}

/// Usable entries contributed by each source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceCounts {
    pub conversion_table: usize,
    pub price_list: usize,
    pub stock_groups: usize,
    pub stock_items: usize,
}

/// Resolved values, one per key, ready to be written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconOutput {
    pub vendor_groups: Vec<VendorGroup>,
    pub alternate_units: Vec<AlternateUnit>,
    pub item_groups: Vec<ItemGroupMapping>,
    pub stats: ReconStats,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub added: usize,
    pub updated: usize,
}

/// Outcome of writing a `ReconOutput` to the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconReport {
    pub vendor_groups: TableCounts,
    pub alternate_units: TableCounts,
    pub item_groups: TableCounts,
    pub unmatched_factors: usize,
    pub unmatched_groups: usize,
    pub sources: SourceCounts,
}

impl ReconReport {
    /// Report skeleton carrying the run's counts; table counts are filled in
    /// by whoever persists the output.
    pub fn for_output(output: &ReconOutput) -> Self {
        Self {
            unmatched_factors: output.stats.unmatched_factors,
            unmatched_groups: output.stats.unmatched_groups,
            sources: output.stats.sources.clone(),
            ..Default::default()
        }
    }
}
