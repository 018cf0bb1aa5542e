//! Daemon configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `CONDUIT_*` environment variables (`__` separates nested keys,
//! e.g. `CONDUIT_RPC__PORT=9700`).

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use conduit_api_rpc::server::{
    DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_RATE, DEFAULT_RPC_HOST, DEFAULT_RPC_PORT,
};
use conduit_core::application::router::{DEFAULT_NAMESPACE, DEFAULT_SERVICE_ID};
use conduit_core::application::worker::constants::*;
use conduit_core::application::{CacheConfig, RouterConfig, WorkerConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "CONDUIT";
const DB_FILE_NAME: &str = "queues.db";
const FALLBACK_DATA_DIR: &str = "~/.conduit";
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    /// `json` or `pretty`
    pub log_format: String,
    pub service_id: String,
    pub rpc: RpcSettings,
    pub router: RouterSettings,
    pub integration: IntegrationSettings,
    pub worker: WorkerSettings,
    pub cache: CacheSettings,
    pub inventory: InventorySettings,
    /// Keyed by queue name; `_` may stand in for `-` (env vars cannot carry dashes)
    pub queues: BTreeMap<String, QueueSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub host: String,
    pub port: u16,
    pub rate_limit_burst: u32,
    pub rate_limit_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    pub enabled: bool,
    /// `host:port` of the Server; no probing when unset
    pub server_addr: Option<String>,
    pub probe_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub gate_closed_sleep_ms: u64,
    pub idle_sleep_ms: u64,
    pub retry_backoff_secs: u64,
    pub error_sleep_ms: u64,
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub refresh_wait_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InventorySettings {
    /// JSON array of job objects served by the job listing
    pub jobs_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub durable: bool,
    /// Program run once per item; the queue is not drained when unset
    pub command: Option<String>,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join(DB_FILE_NAME),
            log_dir: None,
            log_format: "pretty".to_string(),
            service_id: DEFAULT_SERVICE_ID.to_string(),
            rpc: RpcSettings::default(),
            router: RouterSettings::default(),
            integration: IntegrationSettings::default(),
            worker: WorkerSettings::default(),
            cache: CacheSettings::default(),
            inventory: InventorySettings::default(),
            queues: BTreeMap::new(),
        }
    }
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            rate_limit_rate: DEFAULT_RATE_LIMIT_RATE,
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            server_addr: None,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            gate_closed_sleep_ms: GATE_CLOSED_SLEEP_DURATION.as_millis() as u64,
            idle_sleep_ms: IDLE_SLEEP_DURATION.as_millis() as u64,
            retry_backoff_secs: TEMPORARY_FAILURE_BACKOFF.as_secs(),
            error_sleep_ms: ERROR_RECOVERY_SLEEP_DURATION.as_millis() as u64,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE.as_secs(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            refresh_wait_secs: DEFAULT_CACHE_REFRESH_WAIT.as_secs(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            durable: true,
            command: None,
            args: Vec::new(),
            timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional TOML file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.expand_paths();
        Ok(settings)
    }

    fn expand_paths(&mut self) {
        self.db_path = expand(&self.db_path);
        self.log_dir = self.log_dir.as_deref().map(expand);
        self.inventory.jobs_file = self.inventory.jobs_file.as_deref().map(expand);
    }

    /// Settings for a queue, defaulted when not configured
    pub fn queue(&self, name: &str) -> QueueSettings {
        self.queues
            .get(name)
            .or_else(|| self.queues.get(&name.replace('-', "_")))
            .cloned()
            .unwrap_or_default()
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            gate_closed_sleep: Duration::from_millis(self.worker.gate_closed_sleep_ms),
            idle_sleep: Duration::from_millis(self.worker.idle_sleep_ms),
            retry_backoff: Duration::from_secs(self.worker.retry_backoff_secs),
            error_sleep: Duration::from_millis(self.worker.error_sleep_ms),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            refresh_wait: Duration::from_secs(self.cache.refresh_wait_secs),
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            namespace: self.router.namespace.clone(),
            service_id: self.service_id.clone(),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.worker.shutdown_grace_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.integration.probe_interval_secs.max(1))
    }
}

fn default_data_dir() -> PathBuf {
    match directories::ProjectDirs::from("dev", "conduit", "conduit") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => PathBuf::from(shellexpand::tilde(FALLBACK_DATA_DIR).into_owned()),
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
