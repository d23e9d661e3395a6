use jobscout_core::{RawJobRecord, Source};
use scraper::Html;
use serde_json::Value as JsonValue;

use super::{cross_product, request};
use crate::embedded::{
    description_from, first_text, json_ld_records, json_at, next_data_page_props,
    page_props_items, posted_date_of,
};
use crate::markup::{base_url, resolve_url, CardLayout};
use crate::{AdapterError, ListingRequest, PageContext, SourceAdapter, Strategy, StrategyResult};

const POSTED_WITHIN_DAYS: &str = "3";
const PAGE_PROPS_KEYS: &[&str] = &["jobDetails", "searchResult", "jobfeed", "initialJobs", "jobs"];
const NESTED_LIST_KEYS: &[&str] = &["jobDetails", "jobs"];

fn slug(text: &str) -> String {
    text.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}

fn apply_fallback(ctx: &PageContext<'_>, _role: &str, _company: &str) -> String {
    base_url(ctx.base_url)
        .ok()
        .and_then(|base| base.join(&format!("/{}-jobs", slug(ctx.title))).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| ctx.page_url.to_string())
}

fn json_ld(body: &str, ctx: &PageContext<'_>) -> StrategyResult {
    json_ld_records(Source::Naukri, body, ctx, apply_fallback)
}

fn placeholder(item: &JsonValue, key: &str) -> Option<String> {
    json_at(item, &["placeholders", key])
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn next_data_record(item: &JsonValue, ctx: &PageContext<'_>) -> Option<RawJobRecord> {
    let role = first_text(item, &["title", "jobTitle", "designations"])?;
    let company = first_text(item, &["companyName", "company"])?;
    let location = first_text(item, &["location"])
        .or_else(|| placeholder(item, "location"))
        .unwrap_or_else(|| ctx.location.to_string());
    let salary = first_text(item, &["salary"]).or_else(|| placeholder(item, "salary"));
    let apply_url = first_text(item, &["jdURL", "url"])
        .and_then(|href| resolve_url(ctx.base_url, &href).ok())
        .unwrap_or_else(|| apply_fallback(ctx, &role, &company));
    let description = first_text(item, &["description", "jobDescription"])
        .map(|d| description_from(&d))
        .unwrap_or_default();
    let date_posted = posted_date_of(
        item,
        &["createdDate", "datePosted", "footerPlaceholderLabel"],
        ctx.now,
    );

    RawJobRecord::new(Source::Naukri, company, role, location, apply_url).map(|r| {
        r.with_salary(salary)
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
    source: Source::Naukri,
    cards: &["article.jobTuple, div.srp-jobtuple-wrapper, div.cust-job-tuple, \
              div[class*='jobTuple'], div[class*='job-tuple'], div[class*='srp-tuple']"],
    title: "a.title, a[class*='title'], h2 a, a[class*='jobTitle'], a[class*='designation']",
    company: "a.subTitle, a[class*='comp-name'], span[class*='comp-name'], a[class*='companyName']",
    location: Some(
        "span[class*='locWdth'], span[class*='loc-wrap'], span[class*='location'], span[class*='loc'] span",
    ),
    salary: Some("span[class*='sal-wrap'] span, span[class*='salary'], li[class*='salary'] span"),
    description: Some(
        "div[class*='job-description'], span[class*='job-description'], div[class*='description']",
    ),
    link: None,
    date: Some("span.job-post-day, span[class*='job-post-day'], span[class*='postDay']"),
    default_location: None,
    fallback_apply_url: apply_fallback,
};

fn tuple_cards(body: &str, ctx: &PageContext<'_>) -> StrategyResult {
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
        name: "tuple-cards",
        run: tuple_cards,
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct NaukriAdapter;

pub fn naukri_adapter() -> NaukriAdapter {
    NaukriAdapter
}

impl SourceAdapter for NaukriAdapter {
    fn source(&self) -> Source {
        Source::Naukri
    }

    fn default_base_url(&self) -> &'static str {
        "https://www.naukri.com"
    }

    fn default_render(&self) -> bool {
        true
    }

    /// Pages are 1-based and live in the path, not the query.
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
            for page in 1..=max_pages.max(1) {
                let path = format!("/{}-jobs-in-{}-{page}", slug(title), slug(location));
                let mut url = base.join(&path).map_err(|source| AdapterError::BaseUrl {
                    url: base.to_string(),
                    source,
                })?;
                url.query_pairs_mut().append_pair("jobAge", POSTED_WITHIN_DAYS);
                out.push(request(url.to_string(), title, location, page));
            }
        }
        Ok(out)
    }

    fn strategies(&self) -> &'static [Strategy] {
        &STRATEGIES
    }
}
