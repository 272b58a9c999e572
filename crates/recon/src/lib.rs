//! `tallyflow-recon` reconciles package-conversion factors and vendor-group
//! assignments across the MKCP exports.
//!
//! Pure engine crate: receives pre-loaded sources and the names of the stock
//! items already in the store, returns the resolved values. Loading the
//! sources and persisting the output live in `tallyflow-io`.

pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod model;
pub mod normalize;

pub use config::MatchPolicy;
pub use engine::run;
pub use error::ReconError;
pub use model::{
    AlternateUnit, ConversionEntry, ItemGroupMapping, PriceLevelEntry, PriceListItem, ReconOutput,
    ReconReport, ReconStats, SourceCounts, SourceSet, StockItemEntry, TableCounts, VendorGroup,
};
