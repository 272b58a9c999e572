use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use tallyflow_core::parse_tally_date;

use crate::config::MatchPolicy;
use crate::matcher::{find_match, SourceKeys};
use crate::model::{
    AlternateUnit, ConversionEntry, ItemGroupMapping, MatchKind, PriceListItem, ReconOutput, ReconStats,
    SourceSet, StockItemEntry, VendorGroup,
};
use crate::normalize::{clean_item_name, norm, rate_factor, split_pkg_suffix, strip_group_suffix};

/// How many fuzzy pairs the summary log line spells out.
const FUZZY_LOG_LIMIT: usize = 5;

/// Resolve package factors and group mappings for every stored item name.
///
/// Source entries no stored item claims are kept under their own normalized
/// name. Output lists are sorted by key so repeated runs write identically.
pub fn run(sources: &SourceSet, stored_item_names: &[String], policy: &MatchPolicy) -> ReconOutput {
    let mut stats = ReconStats::default();

    let vendor_groups = dedupe_groups(&sources.vendor_groups);
    stats.sources.stock_groups = vendor_groups.len();

    let price_factors = price_list_factors(&sources.price_list, policy);
    let table_factors = conversion_factors(&sources.conversions);
    stats.sources.price_list = price_factors.len();
    stats.sources.conversion_table = table_factors.len();

    // Conversion table overrides the price list for the same key.
    let mut factors = price_factors;
    for (key, factor) in table_factors.iter() {
        factors.insert(key.to_string(), *factor);
    }

    let group_keys = group_sources(&sources.stock_items);
    stats.sources.stock_items = group_keys.len();

    let names = unique_names(stored_item_names);

    // Factors
    let mut claimed = vec![false; factors.len()];
    let mut resolved: BTreeMap<String, f64> = BTreeMap::new();
    let mut fuzzy_pairs: Vec<(String, String, usize)> = Vec::new();
    for name in &names {
        let Some((i, kind)) = find_match(&norm(name), &factors, policy) else {
            continue;
        };
        let (key, factor) = factors.entry(i);
        claimed[i] = true;
        resolved.insert(name.to_string(), *factor);
        match kind {
            MatchKind::Exact => stats.factors_exact += 1,
            MatchKind::Prefix => stats.factors_prefix += 1,
            MatchKind::Fuzzy { distance } => {
                stats.factors_fuzzy += 1;
                fuzzy_pairs.push((name.to_string(), key.to_string(), distance));
            }
        }
    }
    log_fuzzy(&fuzzy_pairs);

    let mut alternate: BTreeMap<String, f64> = BTreeMap::new();
    for (i, (key, factor)) in factors.iter().enumerate() {
        if !claimed[i] {
            stats.unmatched_factors += 1;
            alternate.insert(key.to_string(), *factor);
        }
    }
    if stats.unmatched_factors > 0 {
        log::debug!(
            "{} package factor entries had no matching stock item; keeping them under their own names",
            stats.unmatched_factors
        );
    }
    alternate.extend(resolved);

    // Groups
    let mut claimed = vec![false; group_keys.len()];
    let mut groups: BTreeMap<String, String> = BTreeMap::new();
    let mut stored_groups: Vec<(String, String)> = Vec::new();
    for name in &names {
        let group = match find_match(&norm(name), &group_keys, policy) {
            Some((i, _)) => {
                claimed[i] = true;
                group_keys.entry(i).1.clone()
            }
            None => {
                stats.virtual_group_items += 1;
                policy.virtual_group.clone()
            }
        };
        stored_groups.push((name.to_string(), group));
    }
    for (i, (key, group)) in group_keys.iter().enumerate() {
        if !claimed[i] {
            stats.unmatched_groups += 1;
            groups.insert(key.to_string(), group.clone());
        }
    }
    groups.extend(stored_groups);

    log::info!(
        "Reconciled {} stock items: {} exact, {} prefix, {} fuzzy; {} factor and {} group entries unmatched",
        names.len(),
        stats.factors_exact,
        stats.factors_prefix,
        stats.factors_fuzzy,
        stats.unmatched_factors,
        stats.unmatched_groups
    );

    ReconOutput {
        vendor_groups,
        alternate_units: alternate.into_iter().map(|(name, f)| AlternateUnit::new(name, f)).collect(),
        item_groups: groups
            .into_iter()
            .map(|(item_name, group_name)| ItemGroupMapping { item_name, group_name })
            .collect(),
        stats,
    }
}

fn unique_names(names: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty() && seen.insert(*n))
        .collect()
}

/// First occurrence of each group name wins.
fn dedupe_groups(groups: &[VendorGroup]) -> Vec<VendorGroup> {
    let mut seen = HashSet::new();
    groups.iter().filter(|g| seen.insert(g.name.as_str())).cloned().collect()
}

/// Factor per clean item name: the latest entry at the policy's price level,
/// else the quantity suffix in the item's name.
pub fn price_list_factors(items: &[PriceListItem], policy: &MatchPolicy) -> SourceKeys<f64> {
    let mut out = SourceKeys::default();
    for item in items {
        let (clean, name_factor) = split_pkg_suffix(&item.name);
        let key = norm(clean);
        if key.is_empty() {
            continue;
        }

        let mut latest: Option<(Option<NaiveDate>, f64)> = None;
        for entry in &item.levels {
            if !entry.level.trim().eq_ignore_ascii_case(policy.price_level.trim()) {
                continue;
            }
            let Some(factor) = rate_factor(&entry.rate).filter(|f| *f > 0.0) else {
                continue;
            };
            let date = parse_tally_date(&entry.date);
            // Later date wins; an equal date lets the later entry through.
            if latest.map_or(true, |(best, _)| date >= best) {
                latest = Some((date, factor));
            }
        }

        let factor = latest.map(|(_, f)| f).or(name_factor).filter(|f| *f > 0.0);
        if let Some(factor) = factor {
            out.insert(key, factor);
        }
    }
    out
}

fn conversion_factors(entries: &[ConversionEntry]) -> SourceKeys<f64> {
    let mut out = SourceKeys::default();
    for entry in entries {
        let key = clean_item_name(&entry.name);
        if !key.is_empty() && entry.factor > 0.0 && entry.factor.is_finite() {
            out.insert(key, entry.factor);
        }
    }
    out
}

/// Group per clean item name, HSN suffix stripped. Items without a parent
/// contribute nothing.
fn group_sources(items: &[StockItemEntry]) -> SourceKeys<String> {
    let mut out = SourceKeys::default();
    for item in items {
        let Some(parent) = item.parent.as_deref().map(strip_group_suffix).filter(|p| !p.is_empty()) else {
            continue;
        };
        let key = clean_item_name(&item.name);
        if !key.is_empty() {
            out.insert(key, parent);
        }
    }
    out
}

fn log_fuzzy(pairs: &[(String, String, usize)]) {
    if pairs.is_empty() {
        return;
    }
    let shown: Vec<String> = pairs
        .iter()
        .take(FUZZY_LOG_LIMIT)
        .map(|(stored, key, d)| format!("'{stored}'->'{key}'(d={d})"))
        .collect();
    let more = if pairs.len() > FUZZY_LOG_LIMIT { ", ..." } else { "" };
    log::info!("{} items matched by edit distance: {}{more}", pairs.len(), shown.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriceLevelEntry;

    fn level(level: &str, date: &str, rate: &str) -> PriceLevelEntry {
        PriceLevelEntry { level: level.into(), date: date.into(), rate: rate.into() }
    }

    fn priced(name: &str, levels: Vec<PriceLevelEntry>) -> PriceListItem {
        PriceListItem { name: name.into(), levels }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn factor_of(out: &ReconOutput, item: &str) -> Option<f64> {
        out.alternate_units.iter().find(|a| a.item_name == item).map(|a| a.pkg_factor)
    }

    fn group_of<'a>(out: &'a ReconOutput, item: &str) -> Option<&'a str> {
        out.item_groups.iter().find(|g| g.item_name == item).map(|g| g.group_name.as_str())
    }

    #[test]
    fn latest_price_level_entry_wins() {
        let items = vec![priced(
            "Bell Crown",
            vec![
                level("Kona", "20240101", "100/PKG"),
                level("Kona", "20240301", "300/PKG"),
                level("kona", "20240201", "200/PKG"),
                level("Retail", "20250101", "999/PKG"),
            ],
        )];
        let f = price_list_factors(&items, &MatchPolicy::default());
        assert_eq!(f.get("BELL CROWN"), Some(&300.0));
    }

    #[test]
    fn equal_dates_keep_later_entry() {
        let items = vec![priced(
            "Hub",
            vec![level("Kona", "20240101", "10/PKG"), level("Kona", "20240101", "12/PKG")],
        )];
        let f = price_list_factors(&items, &MatchPolicy::default());
        assert_eq!(f.get("HUB"), Some(&12.0));
    }

    #[test]
    fn name_suffix_is_fallback() {
        let items = vec![
            priced("Spoke ( 36 PCS )", vec![level("Kona", "20240101", "0/PKG")]),
            priced("Rim", vec![]),
        ];
        let f = price_list_factors(&items, &MatchPolicy::default());
        assert_eq!(f.get("SPOKE"), Some(&36.0));
        assert_eq!(f.get("RIM"), None);
    }

    #[test]
    fn conversion_table_overrides_price_list() {
        let sources = SourceSet {
            price_list: vec![priced("Bell Crown Mini (300 PCS)", vec![])],
            conversions: vec![ConversionEntry { name: "BELL CROWN MINI ( 250 PCS )".into(), factor: 250.0 }],
            ..Default::default()
        };
        let out = run(&sources, &names(&["Bell Crown Mini"]), &MatchPolicy::default());
        assert_eq!(factor_of(&out, "Bell Crown Mini"), Some(250.0));
        assert_eq!(out.stats.factors_exact, 1);
        assert_eq!(out.stats.unmatched_factors, 0);
    }

    #[test]
    fn unmatched_source_kept_under_normalized_name() {
        let sources = SourceSet {
            conversions: vec![ConversionEntry { name: "  mystery   part (4)".into(), factor: 4.0 }],
            ..Default::default()
        };
        let out = run(&sources, &names(&["Saddle"]), &MatchPolicy::default());
        assert_eq!(factor_of(&out, "MYSTERY PART"), Some(4.0));
        assert_eq!(out.stats.unmatched_factors, 1);
        assert_eq!(factor_of(&out, "Saddle"), None);
    }

    #[test]
    fn groups_resolve_or_fall_back() {
        let sources = SourceSet {
            stock_items: vec![
                StockItemEntry { name: "SCREWM5".into(), parent: Some("FASTENERS ( 7318 )".into()) },
                StockItemEntry { name: "Orphan Bit".into(), parent: Some("TOOLS".into()) },
                StockItemEntry { name: "Loose".into(), parent: None },
            ],
            ..Default::default()
        };
        let out = run(&sources, &names(&["SCREW-M5", "Pedal"]), &MatchPolicy::default());
        assert_eq!(group_of(&out, "SCREW-M5"), Some("FASTENERS"));
        assert_eq!(group_of(&out, "Pedal"), Some("Togo Cycles"));
        assert_eq!(group_of(&out, "ORPHAN BIT"), Some("TOOLS"));
        assert_eq!(out.stats.virtual_group_items, 1);
        assert_eq!(out.stats.unmatched_groups, 1);
        assert_eq!(out.stats.sources.stock_items, 2);
    }

    #[test]
    fn vendor_groups_first_occurrence() {
        let g = |name: &str, parent: &str| VendorGroup {
            name: name.into(),
            parent: Some(parent.into()),
            base_unit: "PCS".into(),
            guid: None,
        };
        let sources = SourceSet { vendor_groups: vec![g("A", "X"), g("B", "Y"), g("A", "Z")], ..Default::default() };
        let out = run(&sources, &[], &MatchPolicy::default());
        assert_eq!(out.vendor_groups.len(), 2);
        assert_eq!(out.vendor_groups[0].parent.as_deref(), Some("X"));
    }

    #[test]
    fn duplicate_stored_names_counted_once() {
        let sources = SourceSet {
            conversions: vec![ConversionEntry { name: "HUB".into(), factor: 2.0 }],
            ..Default::default()
        };
        let out = run(&sources, &names(&["Hub", "Hub", " "]), &MatchPolicy::default());
        assert_eq!(out.stats.factors_exact, 1);
        assert_eq!(out.alternate_units, vec![AlternateUnit::new("Hub", 2.0)]);
    }
}
