// Inbox watcher: imports `*.xml` files as they land in a directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use tallyflow_core::ImportAudit;

use crate::error::{StoreError, WatchError};
use crate::import::Importer;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct InboxConfig {
    pub inbox_dir: PathBuf,
    pub database_path: PathBuf,
    pub backup_dir: Option<PathBuf>,
    /// Wait before importing so a file still being copied in can finish.
    pub settle_delay: Duration,
    /// Interval for the polling fallback when native events are unavailable.
    pub poll_interval: Duration,
}

impl InboxConfig {
    pub fn new(inbox_dir: impl Into<PathBuf>, database_path: impl Into<PathBuf>) -> Self {
        Self {
            inbox_dir: inbox_dir.into(),
            database_path: database_path.into(),
            backup_dir: None,
            settle_delay: Duration::from_millis(500),
            poll_interval: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// In-flight set
// ---------------------------------------------------------------------------

/// Paths currently being imported. Cloning shares the set.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlight {
    /// Claim `path`. `None` when another worker already holds it; otherwise
    /// the claim lasts until the guard drops.
    pub fn admit(&self, path: &Path) -> Option<InFlightGuard> {
        if !self.paths.lock().insert(path.to_path_buf()) {
            return None;
        }
        Some(InFlightGuard { set: self.clone(), path: path.to_path_buf() })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlight,
    path: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.paths.lock().remove(&self.path);
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Owns the directory watcher. Constructed once; `start` and `stop` may be
/// called repeatedly. Each detected file is imported on its own thread with
/// its own store connection.
pub struct InboxService {
    config: Arc<InboxConfig>,
    in_flight: InFlight,
    watcher: Option<Box<dyn Watcher + Send>>,
}

impl InboxService {
    pub fn new(config: InboxConfig) -> Self {
        Self { config: Arc::new(config), in_flight: InFlight::default(), watcher: None }
    }

    pub fn config(&self) -> &InboxConfig {
        &self.config
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.watcher.is_some() {
            return Err(WatchError::AlreadyRunning);
        }
        let inbox = &self.config.inbox_dir;
        if inbox.exists() && !inbox.is_dir() {
            return Err(WatchError::MissingInbox(inbox.display().to_string()));
        }
        std::fs::create_dir_all(inbox)?;

        let config = Arc::clone(&self.config);
        let in_flight = self.in_flight.clone();
        let handler = move |event: Result<Event, notify::Error>| match event {
            Ok(event) => dispatch(&config, &in_flight, event),
            Err(e) => log::warn!("Watcher error: {e}"),
        };

        let mut watcher: Box<dyn Watcher + Send> = match notify::recommended_watcher(handler.clone()) {
            Ok(w) => {
                log::info!("File watcher started (native) on {}", inbox.display());
                Box::new(w)
            }
            Err(e) => {
                log::warn!("Native watcher unavailable ({e}), falling back to polling");
                let poll = notify::Config::default().with_poll_interval(self.config.poll_interval);
                let w = notify::PollWatcher::new(handler, poll)?;
                log::info!(
                    "File watcher started (polling every {:?}) on {}",
                    self.config.poll_interval,
                    inbox.display()
                );
                Box::new(w)
            }
        };
        watcher.watch(inbox, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Stop watching. Imports already running finish on their own threads.
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            log::info!("File watcher stopped");
        }
    }

    /// Import every `*.xml` already in the inbox, in name order, on the
    /// calling thread. Files another worker holds are skipped.
    pub fn scan_existing(&self) -> Result<Vec<ImportAudit>, WatchError> {
        let inbox = &self.config.inbox_dir;
        if !inbox.is_dir() {
            return Err(WatchError::MissingInbox(inbox.display().to_string()));
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(inbox)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_xml(p))
            .collect();
        files.sort();

        if files.is_empty() {
            log::info!("No existing XML files in inbox");
            return Ok(Vec::new());
        }
        log::info!("Processing {} existing XML file(s) in inbox", files.len());

        let mut audits = Vec::with_capacity(files.len());
        for path in files {
            let Some(_guard) = self.in_flight.admit(&path) else { continue };
            match import_one(&self.config, &path) {
                Ok(audit) => audits.push(audit),
                Err(e) => log::error!("Failed to import {}: {e}", path.display()),
            }
        }
        Ok(audits)
    }
}

impl Drop for InboxService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_xml(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("xml")) && path.is_file()
}

fn dispatch(config: &Arc<InboxConfig>, in_flight: &InFlight, event: Event) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    for path in event.paths.into_iter().filter(|p| is_xml(p)) {
        let config = Arc::clone(config);
        let in_flight = in_flight.clone();
        std::thread::spawn(move || {
            let Some(_guard) = in_flight.admit(&path) else {
                log::debug!("{} already being imported", path.display());
                return;
            };
            std::thread::sleep(config.settle_delay);
            log::info!("Watcher detected: {}", path.display());
            if let Err(e) = import_one(&config, &path) {
                log::error!("Watcher import error for {}: {e}", path.display());
            }
        });
    }
}

fn import_one(config: &InboxConfig, path: &Path) -> Result<ImportAudit, StoreError> {
    let mut importer = Importer::new(Store::open(&config.database_path)?);
    if let Some(dir) = &config.backup_dir {
        importer = importer.with_backup_dir(dir);
    }
    importer.import_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tallyflow_core::ImportStatus;

    const DOC: &str = "<ENVELOPE><TALLYMESSAGE><VOUCHER><DATE>20240101</DATE><VOUCHERNUMBER>1</VOUCHERNUMBER>\
        <VOUCHERTOTAL>5</VOUCHERTOTAL></VOUCHER></TALLYMESSAGE></ENVELOPE>";

    #[test]
    fn admission_is_exclusive_until_guard_drops() {
        let set = InFlight::default();
        let path = Path::new("/inbox/a.xml");
        let guard = set.admit(path).unwrap();
        assert!(set.admit(path).is_none());
        assert!(set.admit(Path::new("/inbox/b.xml")).is_some());
        assert!(set.contains(path));
        drop(guard);
        assert!(!set.contains(path));
        assert!(set.admit(path).is_some());
    }

    #[test]
    fn scan_imports_xml_only_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = dir.path().join("inbox");
        std::fs::create_dir(&inbox).unwrap();
        std::fs::write(inbox.join("b.xml"), DOC).unwrap();
        std::fs::write(inbox.join("a.XML"), DOC).unwrap();
        std::fs::write(inbox.join("notes.txt"), "ignore").unwrap();

        let service = InboxService::new(InboxConfig::new(&inbox, dir.path().join("tally.db")));
        let audits = service.scan_existing().unwrap();
        let names: Vec<&str> = audits.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.XML", "b.xml"]);
        assert_eq!(audits[0].vouchers_inserted, 1);
        assert_eq!(audits[1].vouchers_updated, 1);
        assert!(service.in_flight().is_empty());
    }

    #[test]
    fn scan_requires_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let service = InboxService::new(InboxConfig::new(dir.path().join("missing"), dir.path().join("t.db")));
        assert!(matches!(service.scan_existing(), Err(WatchError::MissingInbox(_))));
    }

    #[test]
    fn start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = InboxService::new(InboxConfig::new(dir.path().join("inbox"), dir.path().join("t.db")));
        service.start().unwrap();
        assert!(service.is_running());
        assert!(matches!(service.start(), Err(WatchError::AlreadyRunning)));
        service.stop();
        assert!(!service.is_running());
    }

    #[test]
    fn dropped_file_is_imported() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = dir.path().join("inbox");
        let db = dir.path().join("tally.db");
        let mut config = InboxConfig::new(&inbox, &db);
        config.settle_delay = Duration::from_millis(50);
        config.poll_interval = Duration::from_millis(100);

        let mut service = InboxService::new(config);
        service.start().unwrap();
        std::fs::write(inbox.join("day.xml"), DOC).unwrap();

        let deadline = Instant::now() + Duration::from_secs(15);
        let mut imported = false;
        while Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(100));
            let Ok(store) = Store::open(&db) else { continue };
            let Ok(audits) = store.recent_audits(10) else { continue };
            if audits.iter().any(|a| a.status == ImportStatus::Success) {
                imported = true;
                assert_eq!(store.counts().unwrap().vouchers, 1);
                break;
            }
        }
        service.stop();
        assert!(imported, "inbox file was not imported in time");
    }
}
