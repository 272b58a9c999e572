use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Warnings kept on an audit record. Anything beyond this is dropped.
pub const MAX_AUDIT_WARNINGS: usize = 100;

/// What a parsed document turned out to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Master,
    Transaction,
    Mixed,
    #[default]
    Unknown,
}

impl DocumentKind {
    pub fn classify(has_masters: bool, has_vouchers: bool) -> Self {
        match (has_masters, has_vouchers) {
            (true, true) => Self::Mixed,
            (true, false) => Self::Master,
            (false, true) => Self::Transaction,
            (false, false) => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Transaction => "transaction",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "master" => Self::Master,
            "transaction" => Self::Transaction,
            "mixed" => Self::Mixed,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one import attempt. `Running` only exists between the audit
/// row being opened and the import finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Running,
    Success,
    /// Finished without a terminal error but with warnings.
    Partial,
    Error,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "success" => Self::Success,
            "partial" => Self::Partial,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record for one attempted file import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportAudit {
    /// Row id once persisted.
    pub id: Option<i64>,
    pub file_path: String,
    pub file_name: String,
    pub document_kind: DocumentKind,
    pub status: ImportStatus,
    pub masters_processed: u32,
    pub vouchers_processed: u32,
    pub vouchers_inserted: u32,
    pub vouchers_updated: u32,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportAudit {
    pub fn begin(file_path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            id: None,
            file_path: file_path.into(),
            file_name: file_name.into(),
            document_kind: DocumentKind::Unknown,
            status: ImportStatus::Running,
            masters_processed: 0,
            vouchers_processed: 0,
            vouchers_inserted: 0,
            vouchers_updated: 0,
            error_message: None,
            warnings: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append warnings, keeping at most [`MAX_AUDIT_WARNINGS`].
    pub fn push_warnings<I>(&mut self, warnings: I)
    where
        I: IntoIterator<Item = String>,
    {
        let room = MAX_AUDIT_WARNINGS.saturating_sub(self.warnings.len());
        self.warnings.extend(warnings.into_iter().take(room));
    }

    /// Close the audit. An error message always wins; otherwise any warning
    /// makes the import partial.
    pub fn finish(&mut self, error: Option<String>) {
        self.status = match (&error, self.warnings.is_empty()) {
            (Some(_), _) => ImportStatus::Error,
            (None, true) => ImportStatus::Success,
            (None, false) => ImportStatus::Partial,
        };
        self.error_message = error;
        self.finished_at = Some(Utc::now());
    }
}
