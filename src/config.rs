//! Daemon configuration (§2.3): a TOML file loaded with `toml` + `serde`,
//! following the same shape the original config file used — a top-level
//! struct of per-concern sections, each with its own defaults so that an
//! absent file (or an absent section within a present file) still produces
//! a fully usable configuration.

use std::path::Path;

use serde::Deserialize;

/// Top-level config loaded from `sysdbd.conf`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SysdbConfig {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// `unix:/path/to/socket` entries (§6).
    #[serde(default = "default_addresses")]
    pub addresses: Vec<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self { addresses: default_addresses() }
    }
}

fn default_addresses() -> Vec<String> {
    vec!["unix:/var/run/sysdbd/sysdbd.sock".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_dispatch_queue_depth")]
    pub dispatch_queue_depth: usize,
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            dispatch_queue_depth: default_dispatch_queue_depth(),
            listen_backlog: default_listen_backlog(),
        }
    }
}

fn default_worker_threads() -> usize {
    5
}

fn default_dispatch_queue_depth() -> usize {
    1024
}

fn default_listen_backlog() -> u32 {
    32
}

/// The collector periodically sweeps the store for per-object maintenance
/// (interval re-estimation and the like); which backends actually feed it
/// is out of scope here, so this only controls whether the scheduler runs
/// at all and how often it ticks absent any per-task override.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_collector_interval_secs")]
    pub default_interval_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { enabled: true, default_interval_secs: default_collector_interval_secs() }
    }
}

fn default_true() -> bool {
    true
}

fn default_collector_interval_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogConfig {
    /// Overrides `RUST_LOG` when set; otherwise the environment wins.
    pub filter: Option<String>,
}

impl SysdbConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: SysdbConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = SysdbConfig::load("/nonexistent/path/sysdbd.conf").unwrap();
        assert_eq!(config.server.worker_threads, 5);
        assert_eq!(config.listen.addresses, vec!["unix:/var/run/sysdbd/sysdbd.sock".to_string()]);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sysdbd.conf");
        std::fs::write(&path, "[listen]\naddresses = [\"unix:/tmp/a.sock\"]\n").unwrap();
        let config = SysdbConfig::load(&path).unwrap();
        assert_eq!(config.listen.addresses, vec!["unix:/tmp/a.sock".to_string()]);
        assert_eq!(config.server.dispatch_queue_depth, 1024);
        assert!(config.collector.enabled);
    }

    #[test]
    fn zero_worker_threads_still_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sysdbd.conf");
        std::fs::write(&path, "[collector]\nenabled = false\n").unwrap();
        let config = SysdbConfig::load(&path).unwrap();
        assert!(!config.collector.enabled);
        assert_eq!(config.collector.default_interval_secs, 15);
    }
}
