//! Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum SettingsError {
    #[snafu(display("failed to parse settings: {detail}"))]
    Parse { detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    #[default]
    Off,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: LogLevel,
    /// Directory for log files; stderr when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalSettings {
    pub on: bool,
    pub path: Option<PathBuf>,
    pub sync_to_disk: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskSettings {
    pub on: bool,
    pub path: Option<PathBuf>,
}

/// Top-level settings: where the catalog, the per-table block stores, and
/// the WAL live, and whether they are enabled at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log: LogSettings,
    pub wal: WalSettings,
    pub disk: DiskSettings,
    /// Directory of the catalog and main database files.
    pub main_path: PathBuf,
}

impl Settings {
    /// Everything off: a process-local, in-memory engine.
    pub fn in_memory() -> Self {
        Settings::default()
    }

    /// Fully durable configuration rooted at `dir`: on-disk block stores,
    /// WAL with per-record fsync, catalog under `dir`.
    pub fn durable(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Settings {
            log: LogSettings::default(),
            wal: WalSettings {
                on: true,
                path: Some(dir.join("wal")),
                sync_to_disk: true,
            },
            disk: DiskSettings {
                on: true,
                path: Some(dir.join("data")),
            },
            main_path: dir,
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, SettingsError> {
        toml::from_str(input).map_err(|e| SettingsError::Parse {
            detail: e.to_string(),
        })
    }

    pub fn wal_directory(&self) -> Option<PathBuf> {
        if !self.wal.on {
            return None;
        }
        Some(
            self.wal
                .path
                .clone()
                .unwrap_or_else(|| self.main_path.join("wal")),
        )
    }

    pub fn disk_directory(&self) -> Option<PathBuf> {
        if !self.disk.on {
            return None;
        }
        Some(
            self.disk
                .path
                .clone()
                .unwrap_or_else(|| self.main_path.join("data")),
        )
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.main_path.join("catalog.oxb")
    }
}

/// Install a global `tracing` subscriber honoring the log settings.
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(settings: &LogSettings) {
    use tracing_subscriber::filter::LevelFilter;

    let level = match settings.level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Off => LevelFilter::OFF,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_fully_in_memory() {
        let settings = Settings::in_memory();
        assert!(!settings.wal.on);
        assert!(!settings.disk.on);
        assert!(settings.wal_directory().is_none());
        assert!(settings.disk_directory().is_none());
    }

    #[test]
    fn parse_from_toml() {
        let settings = Settings::from_toml(
            r#"
            main_path = "/var/lib/oxbow"

            [log]
            level = "debug"

            [wal]
            on = true
            sync_to_disk = true

            [disk]
            on = true
            path = "/var/lib/oxbow/blocks"
            "#,
        )
        .unwrap();
        assert_eq!(settings.log.level, LogLevel::Debug);
        assert!(settings.wal.on);
        assert!(settings.wal.sync_to_disk);
        assert_eq!(
            settings.disk_directory(),
            Some(PathBuf::from("/var/lib/oxbow/blocks"))
        );
        // wal path defaults under main_path
        assert_eq!(
            settings.wal_directory(),
            Some(PathBuf::from("/var/lib/oxbow/wal"))
        );
    }

    #[test]
    fn durable_layout() {
        let settings = Settings::durable("/tmp/ox");
        assert!(settings.wal.on && settings.disk.on);
        assert_eq!(settings.catalog_path(), PathBuf::from("/tmp/ox/catalog.oxb"));
    }
}
