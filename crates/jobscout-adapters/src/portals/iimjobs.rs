use jobscout_core::{RawJobRecord, Source};
use scraper::Html;
use serde_json::Value as JsonValue;

use super::{cross_product, page_fallback, request};
use crate::embedded::{
    description_from, first_text, json_ld_records, next_data_page_props, page_props_items,
    posted_date_of,
};
use crate::markup::{base_url, resolve_url, url_with_query, CardLayout};
use crate::{AdapterError, ListingRequest, PageContext, SourceAdapter, Strategy, StrategyResult};

const PAGE_PROPS_KEYS: &[&str] = &["jobfeed", "jobs", "searchResults", "jobList", "initialJobs"];
const NESTED_LIST_KEYS: &[&str] = &["jobs", "data"];

fn json_ld(body: &str, ctx: &PageContext<'_>) -> StrategyResult {
    json_ld_records(Source::IimJobs, body, ctx, page_fallback)
}

fn next_data_record(item: &JsonValue, ctx: &PageContext<'_>) -> Option<RawJobRecord> {
    let role = first_text(item, &["title", "jobTitle", "heading"])?;
    let company = first_text(item, &["company", "companyName", "organization"])?;
    let location = first_text(item, &["location", "city"]).unwrap_or_else(|| ctx.location.to_string());
    let apply_url = first_text(item, &["url", "jobUrl", "slug"])
        .and_then(|href| resolve_url(ctx.base_url, &href).ok())
        .unwrap_or_else(|| page_fallback(ctx, &role, &company));
    let description = first_text(item, &["description", "snippet"])
        .map(|d| description_from(&d))
        .unwrap_or_default();
    let date_posted = posted_date_of(item, &["postedOn", "createdAt", "datePosted"], ctx.now);

    RawJobRecord::new(Source::IimJobs, company, role, location, apply_url).map(|r| {
        r.with_salary(first_text(item, &["salary", "ctc"]))
            .with_description(description)
            .with_date_posted(date_posted)
    })
}

fn next_data(body: &str, ctx: &PageContext<'_>) -> StrategyResult {
    let document = Html::parse_document(body);
    let Some(props) = next_data_page_props(&document)? else {
        return Ok(None);
    };
    let items = page_props_items(&props, PAGE_PROPS_KEYS, NESTED_LIST_KEYS);
    Ok(Some(
        items.into_iter().filter_map(|item| next_data_record(item, ctx)).collect(),
    ))
}

const CARDS: CardLayout = CardLayout {
    source: Source::IimJobs,
    cards: &["div.job-listing, div.jobTuple, div[class*='job-card'], div[class*='job-listing'], \
              div[class*='jobCard'], li.listing, li[class*='job']"],
    title: "h2 a, h3 a, a.job-title, a[class*='title'], a[class*='jobTitle'], a[class*='heading']",
    company: "span.company, div.company, a[class*='company'], span[class*='company'], span[class*='org']",
    location: Some(
        "span.location, div.location, span[class*='loc'], span[class*='location'], span[class*='city']",
    ),
    salary: Some("span.salary, div.salary, span[class*='sal'], span[class*='salary'], span[class*='ctc']"),
    description: Some(
        "div.description, p.desc, span.desc, div[class*='description'], span[class*='snippet']",
    ),
    link: None,
    date: None,
    default_location: None,
    fallback_apply_url: page_fallback,
};

fn listing_cards(body: &str, ctx: &PageContext<'_>) -> StrategyResult {
    CARDS.extract(body, ctx)
}

static STRATEGIES: [Strategy; 3] = [
    Strategy {
        name: "json-ld",
        run: json_ld,
    },
    Strategy {
        name: "next-data",
        run: next_data,
    },
    Strategy {
        name: "listing-cards",
        run: listing_cards,
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct IimJobsAdapter;

pub fn iimjobs_adapter() -> IimJobsAdapter {
    IimJobsAdapter
}

impl SourceAdapter for IimJobsAdapter {
    fn source(&self) -> Source {
        Source::IimJobs
    }

    fn default_base_url(&self) -> &'static str {
        "https://www.iimjobs.com"
    }

    fn default_render(&self) -> bool {
        true
    }

    fn listing_requests(
        &self,
        base: &str,
        titles: &[String],
        locations: &[String],
        _max_pages: u32,
    ) -> Result<Vec<ListingRequest>, AdapterError> {
        let search = base_url(base)?
            .join("/search")
            .map_err(|source| AdapterError::BaseUrl {
                url: base.to_string(),
                source,
            })?;
        Ok(cross_product(titles, locations)
            .map(|(title, location)| {
                let url = url_with_query(&search, &[("q", title.as_str()), ("l", location.as_str())]);
                request(url, title, location, 1)
            })
            .collect())
    }

    fn strategies(&self) -> &'static [Strategy] {
        &STRATEGIES
    }
}
