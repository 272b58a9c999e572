// Application settings
// Loaded from ~/.config/tallyflow/settings.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tallyflow_recon::MatchPolicy;

use crate::error::ConfigError;

pub const ENV_INBOX: &str = "TALLYFLOW_INBOX";
pub const ENV_DATABASE: &str = "TALLYFLOW_DATABASE";
pub const ENV_BACKUP_DIR: &str = "TALLYFLOW_BACKUP_DIR";
pub const ENV_MKCP_DIR: &str = "TALLYFLOW_MKCP_DIR";
pub const ENV_LOG_LEVEL: &str = "TALLYFLOW_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory watched for Tally exports.
    pub inbox_dir: PathBuf,

    pub database_path: PathBuf,

    /// Raw copies of every import land here. An empty path disables backups.
    pub backup_dir: Option<PathBuf>,

    /// Directory holding the MKCP reconciliation exports.
    pub mkcp_dir: PathBuf,

    pub settle_delay_ms: u64,

    /// Only used when native file events are unavailable.
    pub poll_interval_ms: u64,

    /// Default log filter; RUST_LOG wins when set.
    pub log_level: String,

    pub reconcile: MatchPolicy,
}

fn data_root() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("tallyflow")
}

impl Default for Settings {
    fn default() -> Self {
        let root = data_root();
        Self {
            inbox_dir: root.join("inbox"),
            database_path: root.join("tallyflow.db"),
            backup_dir: Some(root.join("raw_backups")),
            mkcp_dir: root.join("mkcp"),
            settle_delay_ms: 500,
            poll_interval_ms: 5_000,
            log_level: "info".to_string(),
            reconcile: MatchPolicy::default(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tallyflow");
        config_dir.join("settings.toml")
    }

    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }

    /// Resolve settings for a run.
    ///
    /// An explicit path must exist. Otherwise the default path is used when
    /// present (and seeded with defaults when not). Environment overrides are
    /// applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Self::load_from(path)?,
            None => {
                let path = Self::config_path();
                if path.exists() {
                    Self::load_from(&path)?
                } else {
                    let settings = Self::default();
                    settings.create_default_file(&path);
                    settings
                }
            }
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Apply `TALLYFLOW_*` overrides. An empty `TALLYFLOW_BACKUP_DIR`
    /// disables backups; other empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = set(ENV_INBOX) {
            self.inbox_dir = PathBuf::from(v);
        }
        if let Some(v) = set(ENV_DATABASE) {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_BACKUP_DIR) {
            self.backup_dir = (!v.trim().is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = set(ENV_MKCP_DIR) {
            self.mkcp_dir = PathBuf::from(v);
        }
        if let Some(v) = set(ENV_LOG_LEVEL) {
            self.log_level = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reconcile.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn backup_dir(&self) -> Option<&Path> {
        self.backup_dir.as_deref().filter(|p| !p.as_os_str().is_empty())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write { path: parent.to_path_buf(), source })?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }

    /// Seed the settings file so there is something to edit. Failure only logs.
    fn create_default_file(&self, path: &Path) {
        match self.save(path) {
            Ok(()) => log::info!("Wrote default settings to {}", path.display()),
            Err(e) => log::warn!("{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            r#"
inbox_dir = "/srv/tally/inbox"
settle_delay_ms = 250

[reconcile]
price_level = "Wholesale"
"#,
        )
        .unwrap();

        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.inbox_dir, PathBuf::from("/srv/tally/inbox"));
        assert_eq!(s.settle_delay(), Duration::from_millis(250));
        assert_eq!(s.reconcile.price_level, "Wholesale");
        assert_eq!(s.reconcile.max_distance, 3);
        assert_eq!(s.log_level, "info");
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn bad_toml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "settle_delay_ms = \"soon\"").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("settings.toml"));
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let mut s = Settings::default();
        s.reconcile.min_distance = 5;
        assert!(matches!(s.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_INBOX, "/tmp/in"),
            (ENV_DATABASE, ""),
            (ENV_BACKUP_DIR, ""),
            (ENV_LOG_LEVEL, "debug"),
        ]
        .into_iter()
        .collect();

        let mut s = Settings::default();
        let db = s.database_path.clone();
        s.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(s.inbox_dir, PathBuf::from("/tmp/in"));
        assert_eq!(s.database_path, db);
        assert_eq!(s.backup_dir, None);
        assert_eq!(s.log_level, "debug");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let mut s = Settings::default();
        s.mkcp_dir = PathBuf::from("/data/mkcp");
        s.backup_dir = Some(PathBuf::new());
        s.save(&path).unwrap();
        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, s);
        assert_eq!(loaded.backup_dir(), None);
    }
}
