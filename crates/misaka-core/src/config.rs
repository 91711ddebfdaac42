//! Layered configuration: defaults, then an optional TOML file, then
//! `MISAKA_`-prefixed environment variables, built the idiomatic way for
//! this ecosystem to build layered config — via `figment`.

use crate::error::Result;
use crate::file::IoMode;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage-layer settings: where segments live, how big they grow, which
/// I/O backend writes them, and how often the active segment is fsynced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// Directory holding every category's segment files.
    pub data_dir: PathBuf,
    /// Maximum size in bytes of a single segment before rotation.
    pub segment_cap_bytes: u64,
    /// Which [`FileWriter`](crate::file::FileWriter) backend to open segments with.
    pub io_mode: IoModeConfig,
    /// Periodic-fsync interval for the active segment of each category.
    pub sync_interval_ms: u64,
}

impl StorageConfig {
    /// The sync interval as a [`Duration`], for handing to the segment layer.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

/// Mirrors [`IoMode`] but implements `Serialize`/`Deserialize` so it can
/// round-trip through TOML and environment variables; `From`/`Into`
/// converts freely between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoModeConfig {
    /// Positional reads/writes on a plain OS file handle.
    Positional,
    /// Memory-mapped, fixed-capacity file.
    Mmap,
}

impl From<IoModeConfig> for IoMode {
    fn from(value: IoModeConfig) -> Self {
        match value {
            IoModeConfig::Positional => IoMode::Positional,
            IoModeConfig::Mmap => IoMode::Mmap,
        }
    }
}

/// RESP server listen settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Address (`host:port`) the RESP server binds.
    pub listen_addr: String,
}

/// Structured-logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Directory log files are written to; `None` logs to stdout only.
    pub dir: Option<PathBuf>,
    /// `tracing` filter directive (e.g. `"info"`, `"misaka_core=debug"`).
    pub level: String,
}

/// The full, layered configuration tree for a `misaka-core` engine plus its
/// supplemented server/CLI surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MisakaConfig {
    /// Storage layer settings: data directory, segment size, fsync interval.
    pub storage: StorageConfig,
    /// RESP server settings: listen address.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for MisakaConfig {
    fn default() -> Self {
        MisakaConfig {
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
                segment_cap_bytes: 64 * 1024 * 1024,
                io_mode: IoModeConfig::Positional,
                sync_interval_ms: 1_000,
            },
            server: ServerConfig {
                listen_addr: "127.0.0.1:6380".to_string(),
            },
            logging: LoggingConfig {
                dir: None,
                level: "info".to_string(),
            },
        }
    }
}

impl MisakaConfig {
    /// Builds the config from defaults, an optional TOML file, then
    /// `MISAKA_`-prefixed environment variables (highest priority last).
    pub fn load(path_to_toml: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(MisakaConfig::default()));
        if let Some(path) = path_to_toml {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("MISAKA_").split("_"));
        Ok(figment.extract()?)
    }

    /// The engine's backend [`IoMode`], converted from its config form.
    pub fn io_mode(&self) -> IoMode {
        self.storage.io_mode.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_load_with_no_overrides() {
        let config = MisakaConfig::load(None).unwrap();
        assert_eq!(config, MisakaConfig::default());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"
            [storage]
            data_dir = "/tmp/misaka-data"
            segment_cap_bytes = 1048576
            io_mode = "mmap"
            sync_interval_ms = 500

            [server]
            listen_addr = "0.0.0.0:7000"

            [logging]
            level = "debug"
        "#)
        .unwrap();

        let config = MisakaConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/misaka-data"));
        assert_eq!(config.storage.segment_cap_bytes, 1048576);
        assert_eq!(config.io_mode(), IoMode::Mmap);
        assert_eq!(config.server.listen_addr, "0.0.0.0:7000");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn env_vars_override_toml_and_defaults() {
        // SAFETY-by-convention: this test runs under `cargo test`'s
        // single-process-per-binary default and does not run concurrently
        // with another test reading this variable.
        std::env::set_var("MISAKA_SERVER_LISTEN_ADDR", "0.0.0.0:9999");
        let config = MisakaConfig::load(None).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:9999");
        std::env::remove_var("MISAKA_SERVER_LISTEN_ADDR");
    }
}
