use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use jobscout_adapters::{adapter_for_source, PageContext, SourceAdapter};
use jobscout_core::{PortalOutcome, PortalStatus, RawJobRecord, Source};
use jobscout_storage::{FetchMode, Fetcher};
use serde::Serialize;
use tokio::sync::{mpsc::UnboundedSender, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{PortalConfig, QueryConfig, ScrapingConfig};
use crate::dedup::dedup_batch;
use crate::SyncError;

pub type AdapterLookup = Arc<dyn Fn(Source) -> Box<dyn SourceAdapter> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    SourceStarted {
        source: Source,
        total: usize,
    },
    SourceFinished {
        source: Source,
        status: PortalStatus,
        count: usize,
        done: usize,
        total: usize,
    },
}

/// Resolved settings for one enabled portal.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePlan {
    pub source: Source,
    pub base_url: String,
    pub max_pages: u32,
    pub render: bool,
}

impl SourcePlan {
    fn resolve(portal: &PortalConfig, adapter: &dyn SourceAdapter) -> Self {
        Self {
            source: portal.source,
            base_url: portal
                .base_url
                .clone()
                .unwrap_or_else(|| adapter.default_base_url().to_string()),
            max_pages: portal.max_pages.max(1),
            render: portal.render.unwrap_or_else(|| adapter.default_render()),
        }
    }

    fn fetch_mode(&self) -> FetchMode {
        if self.render {
            FetchMode::Render
        } else {
            FetchMode::Plain
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeRun {
    pub records: Vec<RawJobRecord>,
    pub outcomes: BTreeMap<Source, PortalOutcome>,
    pub raw_count: usize,
    pub duplicates_removed: usize,
}

impl ScrapeRun {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| o.status == PortalStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

#[derive(Debug, Default)]
struct SourceHarvest {
    records: Vec<RawJobRecord>,
    requests: usize,
    fetched: usize,
}

impl SourceHarvest {
    fn outcome(&self, elapsed_secs: f64) -> PortalOutcome {
        if self.requests > 0 && self.fetched == 0 {
            PortalOutcome::failed(elapsed_secs)
        } else {
            PortalOutcome::success(self.records.len(), elapsed_secs)
        }
    }
}

/// Runs every enabled portal concurrently on a bounded pool and merges the results.
pub struct Orchestrator {
    fetcher: Arc<Fetcher>,
    scraping: ScrapingConfig,
    adapters: AdapterLookup,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("fetcher", &self.fetcher)
            .field("scraping", &self.scraping)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(fetcher: Arc<Fetcher>, scraping: ScrapingConfig) -> Self {
        Self {
            fetcher,
            scraping,
            adapters: Arc::new(adapter_for_source),
            progress: None,
        }
    }

    pub fn with_adapters(
        mut self,
        lookup: impl Fn(Source) -> Box<dyn SourceAdapter> + Send + Sync + 'static,
    ) -> Self {
        self.adapters = Arc::new(lookup);
        self
    }

    pub fn with_progress(mut self, progress: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn scraping(&self) -> &ScrapingConfig {
        &self.scraping
    }

    pub fn plans(&self, portals: &[PortalConfig]) -> Vec<SourcePlan> {
        portals
            .iter()
            .filter(|p| p.enabled)
            .map(|p| SourcePlan::resolve(p, (self.adapters)(p.source).as_ref()))
            .collect()
    }

    /// Probe every enabled portal's endpoint; results are telemetry only.
    pub async fn probe_all(&self, plans: &[SourcePlan]) -> BTreeMap<Source, bool> {
        let mut probes = JoinSet::new();
        for plan in plans {
            let fetcher = self.fetcher.clone();
            let source = plan.source;
            let url = plan.base_url.clone();
            probes.spawn(async move { (source, fetcher.probe(&url).await) });
        }

        let mut reachable = BTreeMap::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((source, ok)) => {
                    if ok {
                        info!(source = %source, "portal reachable");
                    } else {
                        warn!(source = %source, "portal probe failed; scraping anyway");
                    }
                    reachable.insert(source, ok);
                }
                Err(err) => warn!(error = %err, "probe task aborted"),
            }
        }
        reachable
    }

    pub async fn run(
        &self,
        portals: &[PortalConfig],
        queries: &QueryConfig,
    ) -> Result<ScrapeRun, SyncError> {
        let plans = self.plans(portals);
        if plans.is_empty() {
            return Err(SyncError::NoEnabledSources);
        }
        let total = plans.len();
        let now = Utc::now();

        self.probe_all(&plans).await;

        let pool = Arc::new(Semaphore::new(self.scraping.worker_count.max(1)));
        let queries = Arc::new(queries.clone());
        let mut tasks = JoinSet::new();
        for plan in plans.iter().cloned() {
            let pool = pool.clone();
            let fetcher = self.fetcher.clone();
            let adapters = self.adapters.clone();
            let scraping = self.scraping.clone();
            let queries = queries.clone();
            let progress = self.progress.clone();
            tasks.spawn(async move {
                let _permit = pool.acquire_owned().await;
                if let Some(tx) = &progress {
                    let _ = tx.send(ProgressEvent::SourceStarted {
                        source: plan.source,
                        total,
                    });
                }
                let source = plan.source;
                let started = Instant::now();
                let span = info_span!("source_task", source = %source);
                // Panics inside the source task surface here as a JoinError.
                let joined = tokio::spawn(
                    async move {
                        let adapter = (adapters)(plan.source);
                        scrape_source(&fetcher, adapter.as_ref(), &plan, &queries, &scraping, now)
                            .await
                    }
                    .instrument(span),
                )
                .await;
                let elapsed = started.elapsed().as_secs_f64();
                let (outcome, records) = match joined {
                    Ok(Ok(harvest)) => {
                        let outcome = harvest.outcome(elapsed);
                        if outcome.status == PortalStatus::Failed {
                            error!(source = %source, requests = harvest.requests, "every fetch failed");
                        }
                        (outcome, harvest.records)
                    }
                    Ok(Err(err)) => {
                        error!(source = %source, error = %format!("{err:#}"), "source task failed");
                        (PortalOutcome::failed(elapsed), Vec::new())
                    }
                    Err(err) => {
                        error!(source = %source, error = %err, "source task panicked");
                        (PortalOutcome::failed(elapsed), Vec::new())
                    }
                };
                (source, outcome, records)
            });
        }

        let mut outcomes = BTreeMap::new();
        let mut harvested: BTreeMap<Source, Vec<RawJobRecord>> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (source, outcome, records) = match joined {
                Ok(done) => done,
                Err(err) => {
                    error!(error = %err, "source supervisor aborted");
                    continue;
                }
            };
            info!(
                source = %source,
                status = %outcome.status,
                count = outcome.count,
                elapsed_secs = outcome.elapsed_secs,
                "source finished"
            );
            outcomes.insert(source, outcome);
            harvested.insert(source, records);
            if let Some(tx) = &self.progress {
                let _ = tx.send(ProgressEvent::SourceFinished {
                    source,
                    status: outcome.status,
                    count: outcome.count,
                    done: outcomes.len(),
                    total,
                });
            }
        }
        for plan in &plans {
            outcomes
                .entry(plan.source)
                .or_insert_with(|| PortalOutcome::failed(0.0));
        }

        let merged = harvested.into_values().flatten().collect::<Vec<_>>();
        let raw_count = merged.len();
        let records = dedup_batch(merged);
        let run = ScrapeRun {
            duplicates_removed: raw_count - records.len(),
            records,
            outcomes,
            raw_count,
        };
        info!(
            succeeded = run.succeeded(),
            failed = run.failed(),
            raw = run.raw_count,
            duplicates_removed = run.duplicates_removed,
            unique = run.records.len(),
            "scrape run finished"
        );
        Ok(run)
    }
}

/// One source's sequential walk over its planned listing pages.
async fn scrape_source(
    fetcher: &Fetcher,
    adapter: &dyn SourceAdapter,
    plan: &SourcePlan,
    queries: &QueryConfig,
    scraping: &ScrapingConfig,
    now: DateTime<Utc>,
) -> Result<SourceHarvest> {
    let requests = adapter.listing_requests(
        &plan.base_url,
        &queries.titles,
        &queries.locations,
        plan.max_pages,
    )?;
    let mode = plan.fetch_mode();
    let mut harvest = SourceHarvest {
        requests: requests.len(),
        ..SourceHarvest::default()
    };

    for (idx, request) in requests.iter().enumerate() {
        if idx > 0 {
            tokio::time::sleep(scraping.politeness_delay()).await;
        }
        let body = match fetcher.fetch(&request.url, mode).await {
            Ok(body) => body,
            Err(err) => {
                warn!(url = %request.url, error = %err, "listing fetch failed");
                continue;
            }
        };
        harvest.fetched += 1;

        let ctx = PageContext::for_request(&plan.base_url, request, now);
        match adapter.parse_listing(&body, &ctx) {
            Ok(records) => {
                debug!(url = %request.url, count = records.len(), "listing parsed");
                harvest.records.extend(records);
            }
            Err(err) => warn!(url = %request.url, error = %err, "listing parse failed"),
        }
    }
    Ok(harvest)
}
