//! Acquisition orchestration, dedup and scheduled scrape runs.

pub mod config;
pub mod dedup;
pub mod gate;
pub mod orchestrator;
pub mod pipeline;

use jobscout_core::Source;
use thiserror::Error;

pub use config::{
    PortalConfig, QueryConfig, RenderConfig, ScrapingConfig, SourceRegistry, SyncConfig,
};
pub use dedup::{dedup_batch, normalize_role, roles_match, RoleMatchConfig};
pub use gate::{
    Admission, AdmissionSummary, DedupGate, JobStore, MemoryJobStore, PgJobStore, StoredJob,
    DEFAULT_RECENT_WINDOW,
};
pub use orchestrator::{AdapterLookup, Orchestrator, ProgressEvent, ScrapeRun, SourcePlan};
pub use pipeline::{build_fetcher, RunSummary, ScrapePipeline};

pub const CRATE_NAME: &str = "jobscout-sync";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no portals are enabled in the source registry")]
    NoEnabledSources,
    #[error("portal {0} is configured more than once")]
    DuplicatePortal(Source),
    #[error("worker_count must be at least 1")]
    NoWorkers,
    #[error("request_delay_min ({min}s) exceeds request_delay_max ({max}s)")]
    InvalidDelay { min: f64, max: f64 },
    #[error("request delay {0}s is not a usable duration")]
    DelayOutOfRange(f64),
    #[error("cache_ttl_hours {0} is too large")]
    CacheTtlTooLarge(u64),
}
