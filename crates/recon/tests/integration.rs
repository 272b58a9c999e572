use tallyflow_recon::{
    run, ConversionEntry, MatchPolicy, PriceLevelEntry, PriceListItem, ReconOutput, SourceSet, StockItemEntry,
    VendorGroup,
};

fn kona(date: &str, rate: &str) -> PriceLevelEntry {
    PriceLevelEntry { level: "Kona".into(), date: date.into(), rate: rate.into() }
}

fn stored(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn factor(out: &ReconOutput, item: &str) -> Option<f64> {
    out.alternate_units.iter().find(|a| a.item_name == item).map(|a| a.pkg_factor)
}

fn mkcp_sources() -> SourceSet {
    SourceSet {
        vendor_groups: vec![
            VendorGroup { name: "FASTENERS".into(), parent: Some("SPARES".into()), base_unit: "PKG".into(), guid: Some("g-1".into()) },
            VendorGroup { name: "BELLS".into(), parent: None, base_unit: "PCS".into(), guid: None },
        ],
        stock_items: vec![
            StockItemEntry { name: "SCREW M5 ( 100 PCS )".into(), parent: Some("FASTENERS ( 7318 )".into()) },
            StockItemEntry { name: "BELL CROWN MINI".into(), parent: Some("BELLS".into()) },
        ],
        price_list: vec![
            PriceListItem {
                name: "BELL CROWN MINI ( 300 PCS )".into(),
                levels: vec![kona("20230401", "250.00/PKG"), kona("20240401", "300.00/PKG")],
            },
            PriceListItem { name: "SCREWM5".into(), levels: vec![kona("20240101", "100/PKG")] },
            PriceListItem { name: "SPOKE 14G".into(), levels: vec![kona("20240101", "36/PKG")] },
        ],
        conversions: vec![ConversionEntry { name: "SPOKE 14G ( 72 PCS )".into(), factor: 72.0 }],
    }
}

#[test]
fn later_dated_price_level_rate_is_selected() {
    let out = run(&mkcp_sources(), &stored(&["Bell Crown Mini"]), &MatchPolicy::default());
    assert_eq!(factor(&out, "Bell Crown Mini"), Some(300.0));
}

#[test]
fn conversion_table_beats_price_list() {
    let out = run(&mkcp_sources(), &stored(&["Spoke 14G"]), &MatchPolicy::default());
    assert_eq!(factor(&out, "Spoke 14G"), Some(72.0));
}

#[test]
fn fuzzy_match_resolves_punctuation_drift() {
    let out = run(&mkcp_sources(), &stored(&["SCREW-M5"]), &MatchPolicy::default());
    assert_eq!(factor(&out, "SCREW-M5"), Some(100.0));
    assert_eq!(out.stats.factors_fuzzy, 1);
}

#[test]
fn unmatched_source_entries_are_retained() {
    let out = run(&mkcp_sources(), &stored(&["Bell Crown Mini"]), &MatchPolicy::default());
    assert_eq!(factor(&out, "SCREWM5"), Some(100.0));
    assert_eq!(factor(&out, "SPOKE 14G"), Some(72.0));
    assert_eq!(out.stats.unmatched_factors, 2);
    assert_eq!(out.stats.sources.price_list, 3);
    assert_eq!(out.stats.sources.conversion_table, 1);
}

#[test]
fn group_mapping_and_virtual_group() {
    let out = run(&mkcp_sources(), &stored(&["Screw M5", "Saddle Gel"]), &MatchPolicy::default());
    let group = |item: &str| out.item_groups.iter().find(|g| g.item_name == item).map(|g| g.group_name.clone());
    assert_eq!(group("Screw M5").as_deref(), Some("FASTENERS"));
    assert_eq!(group("Saddle Gel").as_deref(), Some("Togo Cycles"));
    assert_eq!(group("BELL CROWN MINI").as_deref(), Some("BELLS"));
    assert_eq!(out.vendor_groups.len(), 2);
}

#[test]
fn custom_policy_changes_level_and_virtual_group() {
    let policy = MatchPolicy::from_toml("price_level = \"Retail\"\nvirtual_group = \"Misc\"\n").unwrap();
    let sources = SourceSet {
        price_list: vec![PriceListItem {
            name: "Hub".into(),
            levels: vec![
                kona("20240101", "10/PKG"),
                PriceLevelEntry { level: "RETAIL".into(), date: "20240101".into(), rate: "20/PKG".into() },
            ],
        }],
        ..Default::default()
    };
    let out = run(&sources, &stored(&["Hub", "Chain"]), &policy);
    assert_eq!(factor(&out, "Hub"), Some(20.0));
    assert_eq!(out.item_groups.iter().filter(|g| g.group_name == "Misc").count(), 2);
}

#[test]
fn output_serializes() {
    let out = run(&mkcp_sources(), &stored(&["Bell Crown Mini"]), &MatchPolicy::default());
    let json = serde_json::to_value(&out).unwrap();
    assert_eq!(json["alternate_units"][0]["pkg_unit"], "PKG");
    assert_eq!(json["stats"]["sources"]["stock_groups"], 2);
}
