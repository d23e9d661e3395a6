use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use jobscout_core::Source;
use jobscout_storage::{BackoffPolicy, HttpClientConfig, RenderSettings};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::SyncError;

pub const REGISTRY_FILE: &str = "sources.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub worker_count: usize,
    /// Politeness delay bounds between one source's own requests, in seconds.
    pub request_delay_min: f64,
    pub request_delay_max: f64,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub cache_ttl_hours: u64,
    pub probe_timeout_secs: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            request_delay_min: 2.0,
            request_delay_max: 5.0,
            timeout_secs: 30,
            max_retries: 3,
            cache_ttl_hours: 12,
            probe_timeout_secs: 10,
        }
    }
}

impl ScrapingConfig {
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_retries: self.max_retries,
            ..BackoffPolicy::default()
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600))
    }

    /// Uniform random pause in `[request_delay_min, request_delay_max]`.
    pub fn politeness_delay(&self) -> Duration {
        let min = self.request_delay_min.max(0.0);
        let max = self.request_delay_max.max(min);
        if max <= 0.0 || Duration::try_from_secs_f64(max).is_err() {
            return Duration::ZERO;
        }
        let secs = if max > min {
            rand::rng().random_range(min..=max)
        } else {
            min
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.worker_count == 0 {
            return Err(SyncError::NoWorkers);
        }
        for secs in [self.request_delay_min, self.request_delay_max] {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(SyncError::DelayOutOfRange(secs));
            }
        }
        if self.cache_ttl_hours.checked_mul(3600).is_none() {
            return Err(SyncError::CacheTtlTooLarge(self.cache_ttl_hours));
        }
        if self.request_delay_min > self.request_delay_max {
            return Err(SyncError::InvalidDelay {
                min: self.request_delay_min,
                max: self.request_delay_max,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub min_content_bytes: usize,
    pub wait_secs: u64,
    pub settle_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            min_content_bytes: 5000,
            wait_secs: 10,
            settle_secs: 3,
        }
    }
}

impl RenderConfig {
    pub fn settings(&self, page_timeout: Duration) -> RenderSettings {
        RenderSettings {
            page_timeout,
            min_content_bytes: self.min_content_bytes,
            max_wait: Duration::from_secs(self.wait_secs),
            settle: Duration::from_secs(self.settle_secs),
            ..RenderSettings::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub titles: Vec<String>,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalConfig {
    pub source: Source,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the portal's built-in search endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Overrides whether the portal is fetched through the headless browser.
    #[serde(default)]
    pub render: Option<bool>,
}

impl PortalConfig {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            enabled: default_enabled(),
            base_url: None,
            max_pages: default_max_pages(),
            render: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_pages() -> u32 {
    1
}

/// Contents of `sources.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRegistry {
    #[serde(default)]
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub queries: QueryConfig,
    #[serde(default)]
    pub portals: Vec<PortalConfig>,
}

impl SourceRegistry {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(text).context("parsing source registry")?;
        registry.validate()?;
        Ok(registry)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        self.scraping.validate()?;
        let mut seen = BTreeSet::new();
        for portal in &self.portals {
            if !seen.insert(portal.source) {
                return Err(SyncError::DuplicatePortal(portal.source));
            }
        }
        if self.enabled_portals().next().is_none() {
            return Err(SyncError::NoEnabledSources);
        }
        Ok(())
    }

    pub fn enabled_portals(&self) -> impl Iterator<Item = &PortalConfig> {
        self.portals.iter().filter(|p| p.enabled)
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: Option<String>,
    pub cache_dir: PathBuf,
    pub cache_enabled: bool,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    pub reports_dir: PathBuf,
    pub workspace_root: PathBuf,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let workspace_root = std::env::var("JOBSCOUT_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            cache_dir: std::env::var("JOBSCOUT_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./.cache")),
            cache_enabled: env_flag("JOBSCOUT_CACHE_ENABLED", true),
            scheduler_enabled: env_flag("JOBSCOUT_SCHEDULER_ENABLED", false),
            sync_cron: std::env::var("JOBSCOUT_SYNC_CRON")
                .unwrap_or_else(|_| "0 0 6 * * *".to_string()),
            reports_dir: std::env::var("JOBSCOUT_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("reports")),
            workspace_root,
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.workspace_root.join(REGISTRY_FILE)
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}
