// tallyflow CLI - Tally XML ingestion and MKCP reconciliation

mod exit_codes;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use tallyflow_config::{ConfigError, Settings};
use tallyflow_core::{ImportAudit, ImportStatus};
use tallyflow_io::{reconcile_dir, Importer, InboxConfig, InboxService, Store, StoreError, WatchError};
use tallyflow_recon::ReconReport;

use exit_codes::{EXIT_ERROR, EXIT_PARTIAL, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "tallyflow")]
#[command(about = "Import Tally XML exports into SQLite and reconcile MKCP package data")]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/tallyflow/settings.toml)
    #[arg(long, global = true, env = "TALLYFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one or more Tally XML files
    #[command(after_help = "\
Examples:
  tallyflow import DayBook.xml
  tallyflow import exports/*.xml --json")]
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print audit records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import every XML file already in the inbox
    Scan {
        #[arg(long)]
        json: bool,
    },

    /// Watch the inbox and import files as they arrive (runs until killed)
    Watch {
        /// Skip importing files already in the inbox at startup
        #[arg(long)]
        no_scan: bool,
    },

    /// Reconcile MKCP exports against imported stock items
    #[command(after_help = "\
Reads STOCK GROUPS.xml, STOCK ITEM.xml, PRICE LIST ST.xml and
PKG CONVERSION.xlsx from the MKCP directory. Missing files are skipped.")]
    Reconcile {
        /// MKCP directory (default: mkcp_dir from settings)
        #[arg(long)]
        dir: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Show recent import audit records, newest first
    Audits {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = Settings::load(cli.config.as_deref())
        .map_err(CliError::config)
        .and_then(|settings| {
            init_logging(&settings.log_level);
            run(cli.command, &settings)
        });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn run(command: Commands, settings: &Settings) -> Result<(), CliError> {
    match command {
        Commands::Import { files, json } => cmd_import(settings, &files, json),
        Commands::Scan { json } => cmd_scan(settings, json),
        Commands::Watch { no_scan } => cmd_watch(settings, no_scan),
        Commands::Reconcile { dir, json } => cmd_reconcile(settings, dir.as_deref(), json),
        Commands::Audits { limit, json } => cmd_audits(settings, limit, json),
    }
}

/// Log records from the library crates go through the `log` facade; the fmt
/// subscriber picks them up. RUST_LOG overrides the settings level.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn config(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::NotFound(_) => Some(format!("default location: {}", Settings::config_path_display())),
            ConfigError::Parse { .. } => Some("settings are TOML; see `[reconcile]` for policy keys".to_string()),
            _ => None,
        };
        Self { code: EXIT_USAGE, message: err.to_string(), hint }
    }

    pub fn store(err: StoreError) -> Self {
        Self::error(err.to_string())
    }

    pub fn watch(err: WatchError) -> Self {
        let hint = match &err {
            WatchError::MissingInbox(_) => Some("set inbox_dir in settings or TALLYFLOW_INBOX".to_string()),
            _ => None,
        };
        Self { code: EXIT_ERROR, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// import / scan
// ============================================================================

fn open_store(settings: &Settings) -> Result<Store, CliError> {
    Store::open(&settings.database_path).map_err(CliError::store)
}

fn importer(settings: &Settings) -> Result<Importer, CliError> {
    let importer = Importer::new(open_store(settings)?);
    Ok(match settings.backup_dir() {
        Some(dir) => importer.with_backup_dir(dir),
        None => importer,
    })
}

fn inbox_config(settings: &Settings) -> InboxConfig {
    let mut config = InboxConfig::new(&settings.inbox_dir, &settings.database_path);
    config.backup_dir = settings.backup_dir().map(Path::to_path_buf);
    config.settle_delay = settings.settle_delay();
    config.poll_interval = settings.poll_interval();
    config
}

fn cmd_import(settings: &Settings, files: &[PathBuf], json: bool) -> Result<(), CliError> {
    if let Some(missing) = files.iter().find(|f| !f.is_file()) {
        return Err(CliError::args(format!("{}: no such file", missing.display())));
    }

    let mut importer = importer(settings)?;
    let mut audits = Vec::with_capacity(files.len());
    for file in files {
        audits.push(importer.import_file(file).map_err(CliError::store)?);
    }
    report_imports(&audits, json)
}

fn cmd_scan(settings: &Settings, json: bool) -> Result<(), CliError> {
    let service = InboxService::new(inbox_config(settings));
    let audits = service.scan_existing().map_err(CliError::watch)?;
    report_imports(&audits, json)
}

fn report_imports(audits: &[ImportAudit], json: bool) -> Result<(), CliError> {
    if json {
        print_json(&audits)?;
    } else {
        for audit in audits {
            print_audit_line(audit);
        }
    }

    let failed = audits.iter().filter(|a| a.status == ImportStatus::Error).count();
    let partial = audits.iter().filter(|a| a.status == ImportStatus::Partial).count();
    if failed > 0 {
        return Err(CliError::error(format!("{failed} of {} import(s) failed", audits.len()))
            .with_hint("tallyflow audits shows the error messages"));
    }
    if partial > 0 {
        return Err(CliError {
            code: EXIT_PARTIAL,
            message: format!("{partial} import(s) finished with warnings"),
            hint: Some("tallyflow audits --json lists the warnings".to_string()),
        });
    }
    Ok(())
}

fn print_audit_line(audit: &ImportAudit) {
    let mut line = format!(
        "{:<8} {}  inserted={} updated={} masters={} warnings={}",
        audit.status.as_str(),
        audit.file_name,
        audit.vouchers_inserted,
        audit.vouchers_updated,
        audit.masters_processed,
        audit.warnings.len()
    );
    if let Some(err) = &audit.error_message {
        line.push_str(&format!("  error: {err}"));
    }
    println!("{line}");
}

// ============================================================================
// watch
// ============================================================================

fn cmd_watch(settings: &Settings, no_scan: bool) -> Result<(), CliError> {
    let mut service = InboxService::new(inbox_config(settings));
    service.start().map_err(CliError::watch)?;
    if !no_scan {
        service.scan_existing().map_err(CliError::watch)?;
    }
    eprintln!("Watching {} (Ctrl-C to stop)", settings.inbox_dir.display());
    loop {
        std::thread::park();
    }
}

// ============================================================================
// reconcile
// ============================================================================

fn cmd_reconcile(settings: &Settings, dir: Option<&Path>, json: bool) -> Result<(), CliError> {
    let dir = dir.unwrap_or(&settings.mkcp_dir);
    if !dir.is_dir() {
        return Err(CliError::args(format!("MKCP directory {} does not exist", dir.display()))
            .with_hint("pass --dir or set mkcp_dir in settings"));
    }

    let mut store = open_store(settings)?;
    let report = reconcile_dir(&mut store, dir, &settings.reconcile).map_err(CliError::store)?;
    if json {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &ReconReport) {
    let s = &report.sources;
    println!(
        "sources: {} conversion factors, {} price list factors, {} stock groups, {} item groups",
        s.conversion_table, s.price_list, s.stock_groups, s.stock_items
    );
    for (table, counts) in [
        ("vendor_groups", report.vendor_groups),
        ("alternate_units", report.alternate_units),
        ("item_group_mappings", report.item_groups),
    ] {
        println!("{table:<20} added={} updated={}", counts.added, counts.updated);
    }
    println!("unmatched: {} factors, {} groups", report.unmatched_factors, report.unmatched_groups);
}

// ============================================================================
// audits
// ============================================================================

fn cmd_audits(settings: &Settings, limit: usize, json: bool) -> Result<(), CliError> {
    if limit == 0 {
        return Err(CliError::args("--limit must be at least 1"));
    }
    let store = open_store(settings)?;
    let audits = store.recent_audits(limit).map_err(CliError::store)?;
    if json {
        return print_json(&audits);
    }
    if audits.is_empty() {
        println!("no imports recorded");
        return Ok(());
    }
    for audit in &audits {
        print!("{}  ", audit.started_at.format("%Y-%m-%d %H:%M:%S"));
        print_audit_line(audit);
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::error(format!("JSON output: {e}")))?;
    println!("{text}");
    Ok(())
}
