//! Configuration loading from TOML files
//!
//! The binary picks the file (`--config`, else `CONFIG_FILE`, else
//! config/dev.toml); missing or invalid files fall back to defaults.

use crate::services::fence_index::CandidatePolicy;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Deployment identifier used as a metrics label
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "geofence".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Which fences are evaluated for an asset's points
    #[serde(default)]
    pub candidate_policy: CandidatePolicy,
    /// Bound on waiting for a (device, fence) lock before reporting a conflict
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Largest accepted batch
    #[serde(default = "default_max_batch_points")]
    pub max_batch_points: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            candidate_policy: CandidatePolicy::default(),
            lock_timeout_ms: default_lock_timeout_ms(),
            max_batch_points: default_max_batch_points(),
        }
    }
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_max_batch_points() -> usize {
    10_000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SeedConfig {
    /// JSON file with fences and devices loaded at startup
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for transition event egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "transitions.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: default_prometheus_port() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    candidate_policy: CandidatePolicy,
    lock_timeout_ms: u64,
    max_batch_points: usize,
    seed_file: Option<String>,
    egress_file: String,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            candidate_policy: CandidatePolicy::TagMatch,
            lock_timeout_ms: default_lock_timeout_ms(),
            max_batch_points: default_max_batch_points(),
            seed_file: None,
            egress_file: default_egress_file(),
            metrics_interval_secs: default_metrics_interval(),
            prometheus_port: default_prometheus_port(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if toml_config.engine.max_batch_points == 0 {
            anyhow::bail!("engine.max_batch_points must be positive in {}", path.display());
        }

        Ok(Self {
            site_id: toml_config.site.id,
            candidate_policy: toml_config.engine.candidate_policy,
            lock_timeout_ms: toml_config.engine.lock_timeout_ms,
            max_batch_points: toml_config.engine.max_batch_points,
            seed_file: toml_config.seed.file,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn candidate_policy(&self) -> CandidatePolicy {
        self.candidate_policy
    }

    pub fn lock_timeout_ms(&self) -> u64 {
        self.lock_timeout_ms
    }

    pub fn max_batch_points(&self) -> usize {
        self.max_batch_points
    }

    pub fn seed_file(&self) -> Option<&str> {
        self.seed_file.as_deref()
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to set the candidate policy
    pub fn with_candidate_policy(mut self, policy: CandidatePolicy) -> Self {
        self.candidate_policy = policy;
        self
    }

    /// Builder method to set the batch size limit
    pub fn with_max_batch_points(mut self, max: usize) -> Self {
        self.max_batch_points = max;
        self
    }

    /// Builder method to set the per-pair lock timeout
    pub fn with_lock_timeout_ms(mut self, ms: u64) -> Self {
        self.lock_timeout_ms = ms;
        self
    }
}
