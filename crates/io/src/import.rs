// One import attempt: read, sanitize, parse, upsert, audit.

use std::path::{Path, PathBuf};

use tallyflow_core::ImportAudit;

use crate::error::{ImportError, StoreError};
use crate::parse::parse_document;
use crate::sanitize::{sanitize, SanitizeOptions};
use crate::store::Store;
use crate::upsert::upsert_document;

/// Runs imports against one store connection.
///
/// Every attempt writes exactly one `import_audits` row: it is inserted as
/// `running` before any work and finalized afterwards, whatever happened in
/// between. Only a failure to write that row surfaces as an error.
pub struct Importer {
    store: Store,
    backup_dir: Option<PathBuf>,
}

impl Importer {
    pub fn new(store: Store) -> Self {
        Self { store, backup_dir: None }
    }

    /// Keep a timestamped copy of every raw input in `dir`.
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn import_file(&mut self, path: &Path) -> Result<ImportAudit, StoreError> {
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let source = path.display().to_string();
        self.attempt(&source, &file_name, || {
            std::fs::read(path).map_err(|e| ImportError::Read { path: path.display().to_string(), source: e })
        })
    }

    /// Import an in-memory buffer. `file_name` labels the audit row and backup.
    pub fn import_bytes(&mut self, raw: &[u8], file_name: &str) -> Result<ImportAudit, StoreError> {
        self.attempt(file_name, file_name, || Ok(raw.to_vec()))
    }

    fn attempt(
        &mut self,
        source: &str,
        file_name: &str,
        read: impl FnOnce() -> Result<Vec<u8>, ImportError>,
    ) -> Result<ImportAudit, StoreError> {
        let mut audit = ImportAudit::begin(source, file_name);
        self.store.begin_audit(&mut audit)?;

        let result = read().and_then(|raw| self.run(&mut audit, source, &raw));
        match result {
            Ok(()) => audit.finish(None),
            Err(e) => {
                log::error!("Import failed for {file_name}: {e}");
                audit.finish(Some(e.to_string()));
            }
        }

        self.store.finish_audit(&mut audit)?;
        Ok(audit)
    }

    fn run(&mut self, audit: &mut ImportAudit, source: &str, raw: &[u8]) -> Result<(), ImportError> {
        log::info!("Importing {} ({} bytes)", audit.file_name, raw.len());

        let opts = SanitizeOptions { source, backup_dir: self.backup_dir.as_deref() };
        let sanitized = sanitize(raw, &opts);
        audit.push_warnings(sanitized.warnings);

        let doc = parse_document(&sanitized.text)?;
        audit.document_kind = doc.kind;
        audit.push_warnings(doc.warnings.iter().cloned());

        let outcome = upsert_document(self.store.conn_mut(), &doc)?;
        audit.masters_processed = outcome.masters_processed;
        audit.vouchers_processed = outcome.vouchers_processed;
        audit.vouchers_inserted = outcome.vouchers_inserted;
        audit.vouchers_updated = outcome.vouchers_updated;
        audit.push_warnings(outcome.warnings);

        log::info!(
            "{}: {} inserted, {} updated, {} masters processed",
            audit.file_name,
            audit.vouchers_inserted,
            audit.vouchers_updated,
            audit.masters_processed
        );
        Ok(())
    }
}
