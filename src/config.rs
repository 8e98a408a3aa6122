//! Orchestrator configuration and loading.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub concurrency: ConcurrencyConfig,
    pub container: ContainerConfig,
    pub local_llm: LocalLlmConfig,
    pub remote: RemoteConfig,
    pub health: HealthConfig,
}

impl OrchestratorConfig {
    /// Load configuration with a layered fallback chain: explicit path
    /// -> `.orchestrator.yml` in the working directory -> user config dir ->
    /// compiled-in default.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".orchestrator.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("orchestrator").join("orchestrator.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Scheduler and in-flight execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    #[serde(rename = "max-concurrent-tasks")]
    pub max_concurrent_tasks: usize,

    #[serde(rename = "scheduler-tick-secs")]
    pub scheduler_tick_secs: u64,

    #[serde(rename = "task-timeout-seconds")]
    pub task_timeout_seconds: u64,

    #[serde(rename = "status-stream-interval-secs")]
    pub status_stream_interval_secs: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_concurrent_tasks: 10, scheduler_tick_secs: 1, task_timeout_seconds: 300, status_stream_interval_secs: 2 }
    }
}

/// Container-worker pool defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    #[serde(rename = "daemon-socket-path")]
    pub daemon_socket_path: String,

    #[serde(rename = "pool-size")]
    pub pool_size: usize,

    #[serde(rename = "auto-scale")]
    pub auto_scale: bool,

    #[serde(rename = "max-pool-size")]
    pub max_pool_size: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self { daemon_socket_path: "/var/run/docker.sock".to_string(), pool_size: 3, auto_scale: true, max_pool_size: 10 }
    }
}

/// Local-LLM worker endpoint defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalLlmConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "concurrency-cap")]
    pub concurrency_cap: usize,
}

impl Default for LocalLlmConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:11434".to_string(), concurrency_cap: 2 }
    }
}

/// Remote-worker defaults applied when none are supplied at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    #[serde(rename = "default-cap")]
    pub default_cap: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { default_cap: 8 }
    }
}

/// Health-check and auto-scale loop cadence and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    #[serde(rename = "health-check-interval-secs")]
    pub health_check_interval_secs: u64,

    /// Auto-scale fires when `queue_size > available_workers * auto_scale_queue_multiplier`.
    #[serde(rename = "auto-scale-queue-multiplier")]
    pub auto_scale_queue_multiplier: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { health_check_interval_secs: 30, auto_scale_queue_multiplier: 2 }
    }
}
