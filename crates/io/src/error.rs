use thiserror::Error;

/// Document-level parse failure. Per-record problems never surface here;
/// they become warnings on the parsed document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Markup the tree builder cannot recover from: mismatched or unclosed
    /// tags, undefined entities, no root element.
    #[error("XML parse error: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("could not encode warnings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not open database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("could not create database directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Terminal failure of one import. The audit row still gets written.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure to start the inbox watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("inbox directory {0} does not exist")]
    MissingInbox(String),

    #[error("watcher already running")]
    AlreadyRunning,

    #[error("file watcher: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
