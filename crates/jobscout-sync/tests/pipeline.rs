use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jobscout_adapters::{
    adapter_for_source, AdapterError, ListingRequest, PageContext, SourceAdapter, Strategy,
};
use jobscout_core::{PortalStatus, RawJobRecord, Source};
use jobscout_storage::{BackoffPolicy, FetchError, Fetcher, HttpTransport};
use jobscout_sync::{
    AdmissionSummary, DedupGate, MemoryJobStore, Orchestrator, PortalConfig, ProgressEvent,
    QueryConfig, ScrapePipeline, ScrapingConfig, SourceRegistry, SyncConfig, SyncError,
};
use tokio::sync::mpsc;

fn ld_page(company: &str, role: &str, url: &str) -> String {
    format!(
        r#"<html><head><script type="application/ld+json">
{{"@context":"https://schema.org","@type":"JobPosting","title":"{role}",
 "hiringOrganization":{{"@type":"Organization","name":"{company}"}},
 "jobLocation":{{"@type":"Place","address":{{"addressLocality":"Bengaluru"}}}},
 "url":"{url}","datePosted":"2026-03-09"}}
</script></head><body></body></html>"#
    )
}

/// Serves canned bodies by URL prefix after failing each URL a fixed number of times.
struct ScriptedTransport {
    pages: Vec<(String, String)>,
    failures_before_success: HashMap<String, usize>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            failures_before_success: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn page(mut self, prefix: &str, body: String) -> Self {
        self.pages.push((prefix.to_string(), body));
        self
    }

    fn failing(mut self, prefix: &str, times: usize) -> Self {
        self.failures_before_success.insert(prefix.to_string(), times);
        self
    }

    fn calls_to(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.starts_with(prefix))
            .map(|(_, n)| *n)
            .sum()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str, _user_agent: &str) -> Result<String, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(url.to_string()).or_default();
            *n += 1;
            *n
        };
        let failures = self
            .failures_before_success
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map_or(0, |(_, n)| *n);
        if call <= failures {
            return Err(FetchError::HttpStatus {
                status: 503,
                url: url.to_string(),
            });
        }
        self.pages
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }

    async fn probe(&self, _url: &str, _user_agent: &str) -> Result<u16, FetchError> {
        Ok(200)
    }
}

fn portal(source: Source, base_url: &str, max_pages: u32) -> PortalConfig {
    PortalConfig {
        base_url: Some(base_url.to_string()),
        max_pages,
        render: Some(false),
        ..PortalConfig::new(source)
    }
}

fn quiet_scraping() -> ScrapingConfig {
    ScrapingConfig {
        request_delay_min: 0.0,
        request_delay_max: 0.0,
        ..ScrapingConfig::default()
    }
}

fn queries() -> QueryConfig {
    QueryConfig {
        titles: vec!["Product Manager".to_string()],
        locations: vec!["Bengaluru".to_string()],
    }
}

fn orchestrator(transport: Arc<ScriptedTransport>) -> Orchestrator {
    let fetcher = Fetcher::new(transport, BackoffPolicy::immediate(3));
    Orchestrator::new(Arc::new(fetcher), quiet_scraping())
}

fn acme_transport() -> ScriptedTransport {
    ScriptedTransport::new()
        .page(
            "https://naukri.test/",
            ld_page("Acme Bank", "Product Manager", "https://naukri.test/job/acme-1"),
        )
        .page(
            "https://iimjobs.test/",
            ld_page("ACME BANK", "Product Manager (Fintech)", "https://iimjobs.test/j/acme-1"),
        )
}

fn acme_registry() -> SourceRegistry {
    SourceRegistry {
        scraping: quiet_scraping(),
        queries: queries(),
        portals: vec![
            portal(Source::Naukri, "https://naukri.test", 2),
            portal(Source::IimJobs, "https://iimjobs.test", 1),
        ],
        ..SourceRegistry::default()
    }
}

#[tokio::test]
async fn cross_portal_duplicate_reaches_the_store_once() {
    let transport = Arc::new(acme_transport());
    let registry = acme_registry();
    let store = Arc::new(MemoryJobStore::new());

    let run = orchestrator(transport)
        .run(&registry.portals, &registry.queries)
        .await
        .unwrap();
    // Two Naukri pages repeat the same posting; IIMJobs words it differently.
    assert_eq!(run.raw_count, 3);
    assert_eq!(run.duplicates_removed, 1);
    assert_eq!(run.records.len(), 2);

    let summary = DedupGate::new(store.clone())
        .admit_all(&run.records)
        .await
        .unwrap();
    assert_eq!(summary, AdmissionSummary { inserted: 1, skipped: 1 });
    let stored = store.jobs();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record.source, Source::Naukri);
    assert_eq!(stored[0].identity.normalized_company, "acme bank");
    assert_eq!(stored[0].location_canonical, "Bengaluru");
}

#[tokio::test]
async fn source_recovering_within_retry_budget_succeeds() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .page(
                "https://naukri.test/",
                ld_page("Acme Bank", "Product Manager", "https://naukri.test/job/acme-1"),
            )
            .failing("https://naukri.test/", 2),
    );
    let portals = vec![portal(Source::Naukri, "https://naukri.test", 1)];

    let run = orchestrator(transport.clone())
        .run(&portals, &queries())
        .await
        .unwrap();
    let outcome = run.outcomes[&Source::Naukri];
    assert_eq!(outcome.status, PortalStatus::Success);
    assert_eq!(outcome.count, 1);
    assert_eq!(transport.calls_to("https://naukri.test/"), 3);
}

#[tokio::test]
async fn exhausted_source_fails_without_touching_siblings() {
    let transport = Arc::new(acme_transport().failing("https://iimjobs.test/", 10));
    let registry = acme_registry();

    let run = orchestrator(transport.clone())
        .run(&registry.portals, &registry.queries)
        .await
        .unwrap();
    let iimjobs = run.outcomes[&Source::IimJobs];
    assert_eq!(iimjobs.status, PortalStatus::Failed);
    assert_eq!(iimjobs.count, 0);
    assert_eq!(run.outcomes[&Source::Naukri].status, PortalStatus::Success);
    assert_eq!(run.records.len(), 1);
    assert_eq!(transport.calls_to("https://iimjobs.test/"), 4);
}

struct PanickingAdapter;

impl SourceAdapter for PanickingAdapter {
    fn source(&self) -> Source {
        Source::Indeed
    }

    fn default_base_url(&self) -> &'static str {
        "https://indeed.test/jobs"
    }

    fn default_render(&self) -> bool {
        false
    }

    fn listing_requests(
        &self,
        base: &str,
        _titles: &[String],
        _locations: &[String],
        _max_pages: u32,
    ) -> Result<Vec<ListingRequest>, AdapterError> {
        Ok(vec![ListingRequest {
            url: base.to_string(),
            title: "Product Manager".to_string(),
            location: "Bengaluru".to_string(),
            page: 1,
        }])
    }

    fn strategies(&self) -> &'static [Strategy] {
        &[]
    }

    fn parse_listing(
        &self,
        _body: &str,
        _ctx: &PageContext<'_>,
    ) -> Result<Vec<RawJobRecord>, AdapterError> {
        panic!("extractor bug");
    }
}

#[tokio::test]
async fn panicking_source_is_a_failed_outcome() {
    let transport = Arc::new(acme_transport().page("https://indeed.test/", "<html></html>".to_string()));
    let portals = vec![
        portal(Source::Indeed, "https://indeed.test/jobs", 1),
        portal(Source::Naukri, "https://naukri.test", 1),
    ];
    let (tx, mut rx) = mpsc::unbounded_channel();

    let run = orchestrator(transport)
        .with_adapters(|source| match source {
            Source::Indeed => Box::new(PanickingAdapter) as Box<dyn SourceAdapter>,
            other => adapter_for_source(other),
        })
        .with_progress(tx)
        .run(&portals, &queries())
        .await
        .unwrap();

    let indeed = run.outcomes[&Source::Indeed];
    assert_eq!(indeed.status, PortalStatus::Failed);
    assert_eq!(indeed.count, 0);
    let naukri = run.outcomes[&Source::Naukri];
    assert_eq!(naukri.status, PortalStatus::Success);
    assert_eq!(naukri.count, 1);

    let mut started = 0;
    let mut finished = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            ProgressEvent::SourceStarted { total, .. } => {
                assert_eq!(total, 2);
                started += 1;
            }
            ProgressEvent::SourceFinished { source, done, total, .. } => {
                assert_eq!(total, 2);
                finished.push((source, done));
            }
        }
    }
    assert_eq!(started, 2);
    assert_eq!(finished.len(), 2);
    assert_eq!(finished.iter().map(|(_, done)| *done).collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn no_enabled_sources_is_a_hard_error() {
    let transport = Arc::new(ScriptedTransport::new());
    let portals = vec![PortalConfig {
        enabled: false,
        ..PortalConfig::new(Source::LinkedIn)
    }];
    let err = orchestrator(transport)
        .run(&portals, &queries())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NoEnabledSources));
}

#[tokio::test]
async fn all_sources_empty_is_a_valid_run() {
    let transport = Arc::new(
        ScriptedTransport::new().page("https://naukri.test/", "<html><body></body></html>".to_string()),
    );
    let portals = vec![portal(Source::Naukri, "https://naukri.test", 1)];
    let run = orchestrator(transport).run(&portals, &queries()).await.unwrap();
    assert!(run.records.is_empty());
    assert_eq!(run.outcomes[&Source::Naukri].status, PortalStatus::Success);
}

#[tokio::test]
async fn run_once_admits_and_writes_reports() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig {
        database_url: None,
        cache_dir: dir.path().join("cache"),
        cache_enabled: false,
        scheduler_enabled: false,
        sync_cron: "0 0 6 * * *".to_string(),
        reports_dir: dir.path().join("reports"),
        workspace_root: dir.path().to_path_buf(),
    };
    let store = Arc::new(MemoryJobStore::new());
    let pipeline = ScrapePipeline::new(
        config,
        acme_registry(),
        orchestrator(Arc::new(acme_transport())),
    )
    .with_gate(DedupGate::new(store.clone()));

    let summary = pipeline.run_once().await.unwrap();
    assert_eq!(summary.unique_count, 2);
    assert_eq!(summary.admission, Some(AdmissionSummary { inserted: 1, skipped: 1 }));
    assert_eq!(store.len(), 1);

    let run_dir = dir.path().join("reports").join(summary.run_id.to_string());
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("run_report.json")).unwrap())
            .unwrap();
    assert_eq!(report["summary"]["outcomes"]["naukri"]["status"], "success");
    assert_eq!(report["records"].as_array().unwrap().len(), 2);
    let brief = std::fs::read_to_string(run_dir.join("scrape_brief.md")).unwrap();
    assert!(brief.contains("Naukri: success"), "{brief}");
    assert!(brief.contains("Stored: 1 (skipped 1)"), "{brief}");

    assert!(pipeline.orchestrator().scraping().worker_count >= 1);
    assert!(Arc::new(pipeline).maybe_build_scheduler().await.unwrap().is_none());
}
