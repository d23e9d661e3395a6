use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobscout_core::{PortalOutcome, Source};
use jobscout_storage::{ChromeRenderer, Fetcher, FsCacheBackend, ReqwestTransport, ResponseCache};
use serde::Serialize;
use tokio::fs;
use tokio::sync::mpsc::UnboundedSender;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{SourceRegistry, SyncConfig};
use crate::gate::{AdmissionSummary, DedupGate, PgJobStore};
use crate::orchestrator::{Orchestrator, ProgressEvent, ScrapeRun};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: BTreeMap<Source, PortalOutcome>,
    pub raw_count: usize,
    pub duplicates_removed: usize,
    pub unique_count: usize,
    /// `None` when no job store is configured.
    pub admission: Option<AdmissionSummary>,
    pub reports_dir: String,
}

/// Fetcher wired the way a live run needs it: reqwest transport, Chrome
/// render fallback and, when enabled, the on-disk response cache.
pub fn build_fetcher(config: &SyncConfig, registry: &SourceRegistry) -> Result<Fetcher> {
    let scraping = &registry.scraping;
    let transport = ReqwestTransport::new(scraping.http_client_config())?;
    let renderer = ChromeRenderer::new(
        registry
            .render
            .settings(Duration::from_secs(scraping.timeout_secs)),
    );
    let mut fetcher = Fetcher::new(Arc::new(transport), scraping.backoff())
        .with_renderer(Arc::new(renderer));
    if config.cache_enabled {
        let backend = FsCacheBackend::new(config.cache_dir.clone());
        fetcher = fetcher.with_cache(ResponseCache::new(Arc::new(backend), scraping.cache_ttl()));
    }
    Ok(fetcher)
}

pub struct ScrapePipeline {
    config: SyncConfig,
    registry: SourceRegistry,
    orchestrator: Orchestrator,
    gate: Option<DedupGate>,
}

impl ScrapePipeline {
    pub fn new(config: SyncConfig, registry: SourceRegistry, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            registry,
            orchestrator,
            gate: None,
        }
    }

    /// Load `sources.yaml`, build the live fetcher and connect the job store
    /// when `DATABASE_URL` is set.
    pub async fn from_config(config: SyncConfig) -> Result<Self> {
        let registry = SourceRegistry::load(&config.registry_path()).await?;
        let fetcher = build_fetcher(&config, &registry)?;
        let orchestrator = Orchestrator::new(Arc::new(fetcher), registry.scraping.clone());
        let gate = match &config.database_url {
            Some(url) => {
                let store = PgJobStore::connect(url).await?;
                store.migrate().await?;
                Some(DedupGate::new(Arc::new(store)))
            }
            None => {
                warn!("DATABASE_URL is not set; scraped jobs will only be reported");
                None
            }
        };
        Ok(Self {
            gate,
            ..Self::new(config, registry, orchestrator)
        })
    }

    pub fn with_gate(mut self, gate: DedupGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_progress(mut self, progress: UnboundedSender<ProgressEvent>) -> Self {
        self.orchestrator = self.orchestrator.with_progress(progress);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, "scrape run started");

        let run = self
            .orchestrator
            .run(&self.registry.portals, &self.registry.queries)
            .await?;
        let admission = match &self.gate {
            Some(gate) => Some(gate.admit_all(&run.records).await?),
            None => None,
        };

        let finished_at = Utc::now();
        let mut summary = RunSummary {
            run_id,
            started_at,
            finished_at,
            outcomes: run.outcomes.clone(),
            raw_count: run.raw_count,
            duplicates_removed: run.duplicates_removed,
            unique_count: run.records.len(),
            admission,
            reports_dir: String::new(),
        };
        let reports_dir = self.write_reports(&summary, &run).await?;
        summary.reports_dir = reports_dir.display().to_string();
        Ok(summary)
    }

    pub async fn maybe_build_scheduler(self: Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let cron = self.config.sync_cron.clone();
        let pipeline = self.clone();
        let job = Job::new_async(&cron, move |_uuid, _l| {
            let pipeline = pipeline.clone();
            Box::pin(async move {
                match pipeline.run_once().await {
                    Ok(summary) => info!(
                        run_id = %summary.run_id,
                        unique = summary.unique_count,
                        "scheduled scrape finished"
                    ),
                    Err(err) => error!(error = %format!("{err:#}"), "scheduled scrape failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }

    async fn write_reports(&self, summary: &RunSummary, run: &ScrapeRun) -> Result<PathBuf> {
        let reports_dir = self.config.reports_dir.join(summary.run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let brief = format!(
            "# Job Scout Run\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Raw records: {}\n- Duplicates removed: {}\n- Unique records: {}\n{}\n## Sources\n{}\n",
            summary.run_id,
            summary.started_at,
            summary.finished_at,
            summary.raw_count,
            summary.duplicates_removed,
            summary.unique_count,
            summary
                .admission
                .map(|a| format!("- Stored: {} (skipped {})\n", a.inserted, a.skipped))
                .unwrap_or_default(),
            summary
                .outcomes
                .iter()
                .map(|(source, o)| format!(
                    "- {}: {} ({} jobs, {:.1}s)",
                    source, o.status, o.count, o.elapsed_secs
                ))
                .collect::<Vec<_>>()
                .join("\n")
        );
        fs::write(reports_dir.join("scrape_brief.md"), brief)
            .await
            .context("writing scrape_brief.md")?;

        let report_json = serde_json::to_vec_pretty(&serde_json::json!({
            "summary": summary,
            "records": run.records,
        }))
        .context("serializing run report")?;
        fs::write(reports_dir.join("run_report.json"), report_json)
            .await
            .context("writing run_report.json")?;

        Ok(reports_dir)
    }
}
