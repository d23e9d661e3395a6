use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use jobscout_core::{canonical_location, normalize_company, RawJobRecord, StoredJobIdentity};
use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::dedup::RoleMatchConfig;

/// How many of the most recently stored jobs the fuzzy check looks at.
pub const DEFAULT_RECENT_WINDOW: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredJob {
    pub identity: StoredJobIdentity,
    pub record: RawJobRecord,
    pub location_canonical: String,
    pub date_found: NaiveDate,
}

impl StoredJob {
    pub fn from_record(record: &RawJobRecord, date_found: NaiveDate) -> Self {
        Self {
            identity: StoredJobIdentity::for_record(record),
            location_canonical: canonical_location(&record.location),
            record: record.clone(),
            date_found,
        }
    }
}

/// The slice of the job store the dedup gate depends on.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn exists_by_identity(&self, job_id: &str) -> Result<bool>;

    /// Identity of a stored job among the `window` most recent whose
    /// normalized company equals `normalized_company` and whose role reads
    /// as the same posting as `role`.
    async fn find_fuzzy_match(
        &self,
        normalized_company: &str,
        role: &str,
        window: usize,
    ) -> Result<Option<String>>;

    async fn insert(&self, job: &StoredJob) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted { job_id: String },
    Duplicate { job_id: String },
    FuzzyDuplicate { matched: String },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionSummary {
    pub inserted: usize,
    pub skipped: usize,
}

pub struct DedupGate {
    store: Arc<dyn JobStore>,
    window: usize,
}

impl std::fmt::Debug for DedupGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupGate").field("window", &self.window).finish()
    }
}

impl DedupGate {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            window: DEFAULT_RECENT_WINDOW,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub async fn admit(&self, record: &RawJobRecord) -> Result<Admission> {
        let job = StoredJob::from_record(record, Utc::now().date_naive());
        let identity = &job.identity;

        if self.store.exists_by_identity(&identity.job_id).await? {
            debug!(job_id = %identity.job_id, "exact duplicate rejected");
            return Ok(Admission::Duplicate {
                job_id: identity.job_id.clone(),
            });
        }

        if let Some(matched) = self
            .store
            .find_fuzzy_match(&identity.normalized_company, &identity.role, self.window)
            .await?
        {
            debug!(job_id = %identity.job_id, %matched, role = %identity.role, "fuzzy duplicate rejected");
            return Ok(Admission::FuzzyDuplicate { matched });
        }

        self.store.insert(&job).await?;
        Ok(Admission::Admitted {
            job_id: identity.job_id.clone(),
        })
    }

    /// Admit records one at a time, so later records see earlier inserts.
    pub async fn admit_all(&self, records: &[RawJobRecord]) -> Result<AdmissionSummary> {
        let mut summary = AdmissionSummary::default();
        for record in records {
            if self.admit(record).await?.is_admitted() {
                summary.inserted += 1;
            } else {
                summary.skipped += 1;
            }
        }
        info!(inserted = summary.inserted, skipped = summary.skipped, "admission finished");
        Ok(summary)
    }
}

/// In-process store for tests and database-less runs. Insertion order is recency.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<StoredJob>>,
    roles: RoleMatchConfig,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<StoredJob> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StoredJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn exists_by_identity(&self, job_id: &str) -> Result<bool> {
        Ok(self.lock().iter().any(|job| job.identity.job_id == job_id))
    }

    async fn find_fuzzy_match(
        &self,
        normalized_company: &str,
        role: &str,
        window: usize,
    ) -> Result<Option<String>> {
        Ok(self
            .lock()
            .iter()
            .rev()
            .take(window)
            .find(|job| {
                job.identity.normalized_company == normalized_company
                    && self.roles.roles_match(&job.identity.role, role)
            })
            .map(|job| job.identity.job_id.clone()))
    }

    async fn insert(&self, job: &StoredJob) -> Result<()> {
        let mut jobs = self.lock();
        if !jobs.iter().any(|j| j.identity.job_id == job.identity.job_id) {
            jobs.push(job.clone());
        }
        Ok(())
    }
}

/// Postgres-backed store; schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
    roles: RoleMatchConfig,
}

impl PgJobStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            roles: RoleMatchConfig::default(),
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("running migrations")
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn exists_by_identity(&self, job_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM jobs WHERE job_id = $1) AS found")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await
            .context("checking job identity")?;
        Ok(row.try_get("found")?)
    }

    async fn find_fuzzy_match(
        &self,
        normalized_company: &str,
        role: &str,
        window: usize,
    ) -> Result<Option<String>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, role
            FROM (
                SELECT job_id, normalized_company, role, id
                FROM jobs
                ORDER BY created_at DESC, id DESC
                LIMIT $2
            ) recent
            WHERE normalized_company = $1
            ORDER BY id DESC
            "#,
        )
        .bind(normalized_company)
        .bind(i64::try_from(window).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("loading recent jobs for fuzzy match")?;

        for row in rows {
            let stored_role: String = row.try_get("role")?;
            if self.roles.roles_match(&stored_role, role) {
                return Ok(Some(row.try_get("job_id")?));
            }
        }
        Ok(None)
    }

    async fn insert(&self, job: &StoredJob) -> Result<()> {
        let record = &job.record;
        sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, source, company, normalized_company, role, salary, salary_currency,
                location, location_canonical, description, apply_url, date_posted, date_found
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(&job.identity.job_id)
        .bind(record.source.key())
        .bind(&record.company)
        .bind(&job.identity.normalized_company)
        .bind(&record.role)
        .bind(&record.salary)
        .bind(&record.salary_currency)
        .bind(&record.location)
        .bind(&job.location_canonical)
        .bind(&record.description)
        .bind(&record.apply_url)
        .bind(record.date_posted)
        .bind(job.date_found)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting job {}", job.identity.job_id))?;
        Ok(())
    }
}
