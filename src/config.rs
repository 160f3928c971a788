use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{FleetError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "./example.yml";

/// One configuration schema for both roles. The coordinator reads `api`,
/// `server`, `mongo` and `log`; a worker reads `server` (the coordinator
/// address it dials), `worker` and `log`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub mongo: MongoConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Operator HTTP bind address.
    pub uri: String,
    /// `debug` logs every bound request; anything else stays quiet.
    pub mode: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            uri: "0.0.0.0:8080".to_string(),
            mode: "release".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Coordinator RPC address: the bind address for the coordinator role,
    /// the dial address for the worker role.
    pub uri: String,
    pub ping_interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            uri: "127.0.0.1:1234".to_string(),
            ping_interval_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker RPC bind address, also advertised to the coordinator.
    pub uri: String,
    /// Unique worker name; the coordinator keys its registry on this.
    pub name: String,
    pub group: String,
    /// Optional legacy self-reconcile file (JSON array of jobs). Empty
    /// disables the file poller.
    pub reconcile_file: String,
    pub reconcile_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            uri: "127.0.0.1:9001".to_string(),
            name: "worker".to_string(),
            group: String::new(),
            reconcile_file: String::new(),
            reconcile_interval_seconds: 60,
        }
    }
}

/// Archival sink parameters. Parsed for completeness; the control plane
/// only feeds the seam in `archive`, never a live driver.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file appended to alongside stdout. Empty means stdout only.
    pub filename: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| FleetError::Config(format!("read {}: {e}", path.display())))?;
        serde_yaml::from_str(&data)
            .map_err(|e| FleetError::Config(format!("parse {}: {e}", path.display())))
    }

    /// Liveness period shared by the coordinator ping loop and the worker
    /// registration loop. Clamped away from zero.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.server.ping_interval_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let yaml = r#"
api:
  uri: "0.0.0.0:8100"
  mode: "debug"
server:
  uri: "127.0.0.1:1299"
  ping_interval_seconds: 2
worker:
  uri: "127.0.0.1:9001"
  name: "w1"
  group: "batch"
mongo:
  uri: "mongodb://localhost:27017"
  database: "cron"
  collection: "jobs"
log:
  filename: "cronfleet.log"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.api.uri, "0.0.0.0:8100");
        assert_eq!(cfg.api.mode, "debug");
        assert_eq!(cfg.server.ping_interval_seconds, 2);
        assert_eq!(cfg.worker.name, "w1");
        assert_eq!(cfg.worker.reconcile_interval_seconds, 60);
        assert_eq!(cfg.mongo.collection, "jobs");
        assert_eq!(cfg.log.filename, "cronfleet.log");
    }

    #[test]
    fn missing_sections_take_defaults() {
        let cfg: Config = serde_yaml::from_str("api:\n  uri: \"0.0.0.0:8100\"\n").unwrap();
        assert_eq!(cfg.api.mode, "release");
        assert_eq!(cfg.server.ping_interval_seconds, 1);
        assert!(cfg.worker.reconcile_file.is_empty());
        assert!(cfg.mongo.uri.is_empty());
    }

    #[test]
    fn ping_interval_never_zero() {
        let mut cfg = Config::default();
        cfg.server.ping_interval_seconds = 0;
        assert_eq!(cfg.ping_interval(), Duration::from_secs(1));
    }
}
