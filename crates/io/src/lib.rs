//! Tally XML ingestion.
//!
//! Raw export bytes go through [`sanitize`], then [`parse_document`] (tree or
//! streaming depending on size), then [`upsert_document`] into a [`Store`].
//! [`Importer`] wraps one attempt with its audit row; [`InboxService`] runs
//! imports as files arrive. [`mkcp`] feeds the reconciliation engine.

pub mod error;
pub mod extract;
pub mod import;
pub mod mkcp;
pub mod parse;
pub mod sanitize;
pub mod store;
pub mod stream;
pub mod tree;
pub mod upsert;
pub mod watch;

pub use error::{ImportError, ParseError, StoreError, WatchError};
pub use import::Importer;
pub use mkcp::reconcile_dir;
pub use parse::{parse_document, parse_structural, ParsedDocument, STREAMING_THRESHOLD};
pub use sanitize::{sanitize, SanitizeOptions, Sanitized};
pub use store::{Store, StoreCounts};
pub use stream::parse_streaming;
pub use upsert::{upsert_document, UpsertOutcome};
pub use watch::{InFlight, InboxConfig, InboxService};
