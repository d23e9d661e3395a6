use std::collections::HashSet;
use std::sync::LazyLock;

use jobscout_core::{RawJobRecord, Source};
use regex::Regex;
use serde_json::Value as JsonValue;

use super::{cross_product, request, search_url};
use crate::embedded::{
    balanced_json_at, blobs_after, description_from, find_results, first_text, posted_date_of,
};
use crate::markup::{base_url, url_with_query, CardLayout};
use crate::{AdapterError, ListingRequest, PageContext, SourceAdapter, Strategy, StrategyResult};

const RESULTS_PER_PAGE: u32 = 10;
const POSTED_WITHIN_DAYS: &str = "3";

static INITIAL_DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"window\._initialData\s*=").expect("initial data pattern compiles"));
static JOB_CARDS_PROVIDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.mosaic\.providerData\["mosaic-provider-jobcards"\]\s*="#)
        .expect("provider pattern compiles")
});

fn apply_fallback(ctx: &PageContext<'_>, role: &str, company: &str) -> String {
    let q = format!("{role} {company}");
    search_url(ctx, "/jobs", &[("q", q.as_str())])
}

fn view_job_url(ctx: &PageContext<'_>, job_key: &str) -> Option<String> {
    let mut url = base_url(ctx.base_url).ok()?.join("/viewjob").ok()?;
    url.query_pairs_mut().append_pair("jk", job_key);
    Some(url.to_string())
}

/// The `_initialData` blob (first assignment only) plus every job-cards provider blob.
fn state_blobs(body: &str) -> Vec<JsonValue> {
    let mut blobs = Vec::new();
    if let Some(m) = INITIAL_DATA.find(body) {
        if let Some(blob) = body[m.end()..]
            .find('{')
            .and_then(|offset| balanced_json_at(body, m.end() + offset))
            .filter(JsonValue::is_object)
        {
            blobs.push(blob);
        }
    }
    blobs.extend(blobs_after(body, &JOB_CARDS_PROVIDER));
    blobs
}

fn job_location(job: &JsonValue) -> Option<String> {
    match job.get("formattedLocation").or_else(|| job.get("location"))? {
        JsonValue::String(s) => Some(s.clone()),
        loc @ JsonValue::Object(_) => loc
            .get("formatted")
            .and_then(|f| first_text(f, &["long"]))
            .or_else(|| first_text(loc, &["fullAddress", "city"])),
        _ => None,
    }
}

fn salary_text(job: &JsonValue) -> Option<String> {
    let salary = job.get("salary").or_else(|| job.get("salarySnippet"))?;
    first_text(salary, &["text", "salaryTextFormatted"])
}

fn result_record(item: &JsonValue, ctx: &PageContext<'_>) -> Option<RawJobRecord> {
    let job = item.get("job").unwrap_or(item);
    let role = first_text(job, &["title", "displayTitle"])?;
    let company = first_text(job, &["sourceEmployerName", "company", "truncatedCompany"])?;
    let location = job_location(job).unwrap_or_else(|| ctx.location.to_string());
    let apply_url = first_text(job, &["key", "jobkey"])
        .and_then(|key| view_job_url(ctx, &key))
        .unwrap_or_else(|| apply_fallback(ctx, &role, &company));
    let description = job
        .get("snippet")
        .and_then(JsonValue::as_str)
        .map(description_from)
        .unwrap_or_default();
    let date_posted = posted_date_of(
        job,
        &["datePublished", "pubDate", "createDate", "formattedRelativeTime"],
        ctx.now,
    );

    RawJobRecord::new(Source::Indeed, company, role, location, apply_url).map(|r| {
        r.with_salary(salary_text(job))
            .with_description(description)
            .with_date_posted(date_posted)
    })
}

fn embedded_state(body: &str, ctx: &PageContext<'_>) -> StrategyResult {
    let blobs = state_blobs(body);
    if blobs.is_empty() {
        return Ok(None);
    }

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for blob in &blobs {
        let Some(results) = find_results(blob, 0) else {
            continue;
        };
        for item in results {
            let job = item.get("job").unwrap_or(item);
            if let Some(key) = first_text(job, &["jobkey", "key"]) {
                if !seen.insert(key) {
                    continue;
                }
            }
            records.extend(result_record(item, ctx));
        }
    }
    Ok(Some(records))
}

const CARDS: CardLayout = CardLayout {
    source: Source::Indeed,
    cards: &["div.job_seen_beacon, div.jobsearch-SerpJobCard, div.cardOutline, td.resultContent"],
    title: "h2.jobTitle span[title], h2.jobTitle a, a.jcs-JobTitle",
    company: "span[data-testid='company-name'], span.companyName, span.company",
    location: Some("div[data-testid='text-location'], div.companyLocation, span.location"),
    salary: Some("div.salary-snippet-container, div.metadata.salary-snippet-container, span.salary-snippet"),
    description: None,
    link: Some("a[href*='/rc/clk'], a[data-jk], h2.jobTitle a"),
    date: Some("span.date, span[data-testid='myJobsStateDate'], span.css-qvloho"),
    default_location: None,
    fallback_apply_url: apply_fallback,
};

fn serp_cards(body: &str, ctx: &PageContext<'_>) -> StrategyResult {
    CARDS.extract(body, ctx)
}

static STRATEGIES: [Strategy; 2] = [
    Strategy {
        name: "embedded-state",
        run: embedded_state,
    },
    Strategy {
        name: "serp-cards",
        run: serp_cards,
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct IndeedAdapter;

pub fn indeed_adapter() -> IndeedAdapter {
    IndeedAdapter
}

impl SourceAdapter for IndeedAdapter {
    fn source(&self) -> Source {
        Source::Indeed
    }

    fn default_base_url(&self) -> &'static str {
        "https://in.indeed.com/jobs"
    }

    fn default_render(&self) -> bool {
        false
    }

    fn listing_requests(
        &self,
        base: &str,
        titles: &[String],
        locations: &[String],
        max_pages: u32,
    ) -> Result<Vec<ListingRequest>, AdapterError> {
        let base = base_url(base)?;
        let mut out = Vec::new();
        for (title, location) in cross_product(titles, locations) {
            for page in 0..max_pages.max(1) {
                let start = (page * RESULTS_PER_PAGE).to_string();
                let url = url_with_query(
                    &base,
                    &[
                        ("q", title.as_str()),
                        ("l", location.as_str()),
                        ("start", start.as_str()),
                        ("fromage", POSTED_WITHIN_DAYS),
                    ],
                );
                out.push(request(url, title, location, page + 1));
            }
        }
        Ok(out)
    }

    fn strategies(&self) -> &'static [Strategy] {
        &STRATEGIES
    }
}
